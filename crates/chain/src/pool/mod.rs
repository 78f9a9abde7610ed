//! Transaction Mempool: a nonce-ordered holding area for transactions not yet included in a
//! block.
//!
//! Tracks readiness per sender by nonce only: no gas-price replacement, no pool size limits, no
//! eviction. Cross-sender ordering is otherwise unconstrained by Ethereum itself, so this mempool
//! picks one deterministic rule and documents it: senders are iterated in ascending address order.
pub mod transactions;

use std::collections::BTreeMap;

use chain_core::Transaction;
use ethers_core::types::{Address, U256};
use parking_lot::RwLock;
use tracing::{trace, warn};

use crate::error::PoolError;
use transactions::SenderState;

/// The mempool's only external dependency: the current on-chain nonce for an account. Infallible
/// from the mempool's perspective — a backend that can't answer this has no business holding a
/// pool open, so implementations are expected to fall back to `U256::zero()` for an account
/// they've never seen rather than erroring.
#[auto_impl::auto_impl(Box, Arc)]
pub trait AccountStateOracle: Send + Sync {
    fn nonce(&self, address: Address) -> U256;
}

/// Holds not-yet-mined transactions, keyed by sender then nonce. Cheap to clone — the sender map
/// lives behind a `parking_lot::RwLock`, consistent with this crate's single-writer-at-a-time
/// concurrency model.
#[derive(Clone)]
pub struct Mempool<O> {
    oracle: O,
    senders: std::sync::Arc<RwLock<BTreeMap<Address, SenderState>>>,
}

impl<O: AccountStateOracle> Mempool<O> {
    pub fn new(oracle: O) -> Self {
        Self { oracle, senders: Default::default() }
    }

    /// Admits a transaction into the pool. Rejects it outright if its nonce is already stale
    /// against the account's on-chain nonce; otherwise places it in the sender's pending or
    /// queued set depending on whether it's immediately executable.
    pub fn add_transaction(&self, tx: Transaction) -> Result<(), PoolError> {
        let account_nonce = self.oracle.nonce(tx.from);
        if tx.nonce < account_nonce {
            warn!(target: "txpool", "[{:?}] nonce {} below account nonce {}", tx.hash, tx.nonce, account_nonce);
            return Err(PoolError::NonceTooLow { tx_nonce: tx.nonce, account_nonce });
        }
        trace!(target: "txpool", "[{:?}] adding transaction from {:?} nonce {}", tx.hash, tx.from, tx.nonce);
        let mut senders = self.senders.write();
        senders.entry(tx.from).or_insert_with(|| SenderState::new(account_nonce)).insert(tx);
        Ok(())
    }

    /// All transactions that are currently executable, in deterministic order: senders ascending
    /// by address, and within a sender, ascending by nonce.
    pub fn get_pending_transactions(&self) -> Vec<Transaction> {
        self.senders.read().values().flat_map(|s| s.pending().cloned().collect::<Vec<_>>()).collect()
    }

    /// The nonce a sender's next executable transaction would need, accounting for whatever is
    /// already pending — not just the account's on-chain nonce.
    pub fn get_executable_nonce(&self, address: Address) -> U256 {
        match self.senders.read().get(&address) {
            Some(sender) => sender.exec_nonce(),
            None => self.oracle.nonce(address),
        }
    }
}

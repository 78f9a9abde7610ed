//! Per-sender transaction queues: nonce-ordered readiness tracking, not fee-based eviction or
//! replacement (both out of scope here — see the mempool's module doc).
use std::collections::BTreeMap;

use chain_core::Transaction;
use ethers_core::types::U256;
use tracing::trace;

/// One sender's view of the pool: transactions contiguous with the account's on-chain nonce
/// (`pending`), transactions that skip ahead of a gap (`queued`), and the next nonce that would
/// become executable (`exec_nonce`) if a block were produced right now.
#[derive(Debug)]
pub(crate) struct SenderState {
    pending: BTreeMap<U256, Transaction>,
    queued: BTreeMap<U256, Transaction>,
    exec_nonce: U256,
}

impl SenderState {
    pub(crate) fn new(account_nonce: U256) -> Self {
        Self { pending: BTreeMap::new(), queued: BTreeMap::new(), exec_nonce: account_nonce }
    }

    pub(crate) fn exec_nonce(&self) -> U256 {
        self.exec_nonce
    }

    pub(crate) fn pending(&self) -> impl Iterator<Item = &Transaction> {
        self.pending.values()
    }

    /// Places `tx` in `pending` if it is contiguous with what's already executable, promoting any
    /// previously-queued transactions that become contiguous as a result; otherwise parks it in
    /// `queued` to wait for the gap ahead of it to fill in.
    ///
    /// A transaction landing on a nonce that's already occupied (whether pending or queued)
    /// simply replaces the one there — there's no gas-price comparison to decide a winner, since
    /// replacement-by-fee-bump is out of scope for this core.
    pub(crate) fn insert(&mut self, tx: Transaction) {
        let nonce = tx.nonce;
        if nonce < self.exec_nonce {
            self.pending.insert(nonce, tx);
            return;
        }
        if nonce > self.exec_nonce {
            trace!(target: "txpool", "queuing transaction at nonce {} (next executable is {})", nonce, self.exec_nonce);
            self.queued.insert(nonce, tx);
            return;
        }

        self.pending.insert(nonce, tx);
        self.exec_nonce = nonce + U256::one();
        while let Some(next) = self.queued.remove(&self.exec_nonce) {
            trace!(target: "txpool", "promoting queued transaction at nonce {} to pending", self.exec_nonce);
            self.pending.insert(self.exec_nonce, next);
            self.exec_nonce += U256::one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers_core::types::Address;

    fn tx(nonce: u64) -> Transaction {
        let mut t = Transaction {
            hash: Default::default(),
            from: Address::zero(),
            nonce: U256::from(nonce),
            to: None,
            value: U256::zero(),
            gas_limit: U256::zero(),
            gas_price: U256::zero(),
            input: Default::default(),
            chain_id: None,
        };
        t.hash = chain_core::compute_transaction_hash(&t);
        t
    }

    #[test]
    fn contiguous_insert_advances_exec_nonce() {
        let mut sender = SenderState::new(U256::zero());
        sender.insert(tx(0));
        assert_eq!(sender.exec_nonce(), U256::from(1));
        assert_eq!(sender.pending().count(), 1);
    }

    #[test]
    fn out_of_order_insert_queues_until_the_gap_fills() {
        let mut sender = SenderState::new(U256::zero());
        sender.insert(tx(2));
        assert_eq!(sender.exec_nonce(), U256::zero());
        assert_eq!(sender.pending().count(), 0);

        sender.insert(tx(1));
        assert_eq!(sender.exec_nonce(), U256::zero());

        sender.insert(tx(0));
        assert_eq!(sender.exec_nonce(), U256::from(3));
        assert_eq!(sender.pending().count(), 3);
    }
}

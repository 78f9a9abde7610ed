//! Transaction data shared across the fork source and the hybrid store.
use crate::serde_helpers::deserialize_number;
use ethers_core::{
    types::{Address, Bytes, H256, U256, U64},
    utils::{keccak256, rlp},
};
use rlp::{Encodable, RlpStream};
use serde::{Deserialize, Serialize};

pub type TxHash = H256;

/// A transaction as it appears inside a block or in the mempool.
///
/// Signature recovery is assumed to have already happened upstream (in the remote node, or in
/// whatever submits transactions locally) — the core only ever sees an already-recovered
/// `from`. Carries no EVM execution fields (gas refund, logs, status) — those belong to whatever
/// runs a block, not to the store that indexes it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: TxHash,
    pub from: Address,
    #[serde(deserialize_with = "deserialize_number")]
    pub nonce: U256,
    pub to: Option<Address>,
    #[serde(deserialize_with = "deserialize_number")]
    pub value: U256,
    #[serde(deserialize_with = "deserialize_number")]
    pub gas_limit: U256,
    #[serde(deserialize_with = "deserialize_number")]
    pub gas_price: U256,
    pub input: Bytes,
    pub chain_id: Option<U64>,
}

impl Transaction {
    pub fn hash(&self) -> TxHash {
        self.hash
    }
}

impl Encodable for Transaction {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(8);
        s.append(&self.nonce);
        s.append(&self.gas_price);
        s.append(&self.gas_limit);
        match self.to {
            Some(to) => s.append(&to),
            None => s.append_empty_data(),
        };
        s.append(&self.value);
        s.append(&self.input.0.as_ref());
        s.append(&self.chain_id.unwrap_or_default());
        s.append(&self.from);
    }
}

/// Returns a deterministic hash for a transaction from its fields, used by test fixtures and
/// local block assembly that don't go through a real signer.
pub fn compute_transaction_hash(tx: &Transaction) -> TxHash {
    H256::from_slice(keccak256(rlp::encode(tx)).as_slice())
}

//! Aggregated error types for the hybrid store and mempool.
use ethers_core::types::U256;

/// Errors raised by the remote block source: transport failures and responses that don't match
/// the expected JSON-RPC shape. An explicit `null`/absent result is not an error — see the
/// `Option` return types on `RemoteBlockSource`.
#[derive(thiserror::Error, Debug)]
pub enum UpstreamError {
    #[error("upstream transport error: {0}")]
    Transport(String),
    #[error("unexpected upstream response shape: {0}")]
    InvalidResponse(String),
}

#[derive(thiserror::Error, Debug)]
pub enum BlockchainError {
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    /// A delete/total-difficulty operation referenced a hash unknown to the local indexes.
    /// Upstream is never consulted for these operations (§4.2).
    #[error("block not found")]
    BlockNotFound,
    /// `appendBlock` was called with `number != latest + 1`.
    #[error("invalid block number: expected {expected}, got {actual}")]
    InvalidBlockNumber { expected: u64, actual: u64 },
    /// `appendBlock` was called with a block whose `parent_hash` doesn't match the current tip.
    #[error("invalid parent hash")]
    InvalidParentHash,
    /// `deleteLaterBlocks` was given a block that isn't the one currently stored at its height.
    #[error("block is not the canonical block stored at its height")]
    InvalidBlock,
    /// An attempt to drop (or cascade a deletion into) the immutable remote prefix
    /// `[0 .. fork_height]`.
    #[error("cannot delete a block at or before the fork height")]
    CannotDeleteRemote,
    /// An operation that is intentionally unimplemented by this core (e.g. unbounded iteration
    /// over every historical block).
    #[error("operation not supported")]
    NotSupported,
}

/// Errors raised by the mempool.
#[derive(thiserror::Error, Debug)]
pub enum PoolError {
    /// `tx.nonce < ASO.getNonce(tx.from)`.
    #[error("nonce too low: transaction nonce {tx_nonce}, account nonce {account_nonce}")]
    NonceTooLow { tx_nonce: U256, account_nonce: U256 },
}

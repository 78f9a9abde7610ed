//! Remote Block Source and Hybrid Block Store: the two collaborators that give this crate its
//! "forked chain" behavior. There is no EVM or state backend here — this crate only ever stores
//! headers, bodies and difficulties.
pub mod convert;
pub mod fork;
pub mod storage;

pub use fork::{EthRpcSource, RemoteBlock, RemoteBlockSource, RemoteTransaction};
pub use storage::{BlockId, HybridBlockStore};

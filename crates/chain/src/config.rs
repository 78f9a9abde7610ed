//! Fork configuration: the small, synchronous surface needed to stand up a [`HybridBlockStore`].
//!
//! Deliberately narrow — no chain id, compute-unit throttling, or genesis/account configuration,
//! all of which belong to the broader node this crate is a component of.
use std::time::Duration;

use crate::backend::{EthRpcSource, HybridBlockStore, RemoteBlockSource};
use crate::error::BlockchainError;

/// Where to fork from and how patient to be with the upstream endpoint.
#[derive(Clone, Debug)]
pub struct ForkConfig {
    pub eth_rpc_url: String,
    /// The block to fork at. `None` means "whatever upstream reports as latest right now".
    pub fork_block_number: Option<u64>,
    pub http_timeout: Option<Duration>,
}

impl ForkConfig {
    pub fn new(eth_rpc_url: impl Into<String>) -> Self {
        Self { eth_rpc_url: eth_rpc_url.into(), fork_block_number: None, http_timeout: None }
    }

    pub fn at_block(mut self, number: u64) -> Self {
        self.fork_block_number = Some(number);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    /// Resolves this config into a live store: connects to the upstream endpoint, determines the
    /// fork height (fetching the current tip if none was pinned), and fetches the single block
    /// the store seeds itself with. This is the only place the core blocks on a live network call
    /// before it's usable — everything after this is demand-loaded lazily.
    pub async fn connect(self) -> Result<HybridBlockStore<EthRpcSource>, BlockchainError> {
        let source = match self.http_timeout {
            Some(timeout) => EthRpcSource::with_timeout(&self.eth_rpc_url, timeout)?,
            None => EthRpcSource::new(&self.eth_rpc_url)?,
        };
        let fork_number = match self.fork_block_number {
            Some(n) => n,
            None => source.latest_block_number().await?,
        };
        let remote = source
            .block_by_number(fork_number, true)
            .await?
            .ok_or(BlockchainError::BlockNotFound)?;
        Ok(HybridBlockStore::new(source, remote.block, remote.total_difficulty))
    }
}

//! The hybrid block store: a local append-only tail layered over a demand-loaded, cached view of
//! an upstream chain.
use std::collections::HashMap;
use std::sync::Arc;

use chain_core::{Block, Transaction, TxHash};
use ethers_core::types::{H256, U256};
use parking_lot::RwLock;
use tracing::{trace, warn};

use crate::backend::fork::{RemoteBlock, RemoteBlockSource};
use crate::error::BlockchainError;

/// Identifies a block the way the public API does: by height, by hash, or "whatever the local
/// tip currently is".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockId {
    Number(u64),
    Hash(H256),
    Latest,
}

/// The five indexes described in the data model, plus the two height markers that separate the
/// immutable remote prefix from the mutable local tail.
///
/// Invariants (enforced by `HybridBlockStore`, not by this struct in isolation):
/// - I1..I7: every entry in `by_number`/`by_hash` has a matching `total_difficulty`, and every
///   transaction in a cached block is reachable through both transaction indexes.
/// - Blocks at heights `0..=fork_height` are immutable once cached; only heights
///   `fork_height+1..=latest_height` may be appended to or unwound.
#[derive(Default)]
struct BlockchainStorage {
    by_number: HashMap<u64, H256>,
    by_hash: HashMap<H256, Block>,
    total_difficulty: HashMap<H256, U256>,
    tx_by_hash: HashMap<TxHash, Transaction>,
    tx_to_block_hash: HashMap<TxHash, H256>,
    fork_height: u64,
    latest_height: u64,
}

impl BlockchainStorage {
    fn tip_hash(&self) -> Option<H256> {
        self.by_number.get(&self.latest_height).copied()
    }

    /// Inserts a block's indexes. Idempotent: re-inserting an already-cached hash is a no-op, so
    /// callers that raced a demand-load don't need to coordinate beyond this check.
    fn insert(&mut self, number: u64, block: Block, total_difficulty: U256) {
        let hash = block.hash();
        if self.by_hash.contains_key(&hash) {
            return;
        }
        for tx in &block.transactions {
            self.tx_by_hash.insert(tx.hash, tx.clone());
            self.tx_to_block_hash.insert(tx.hash, hash);
        }
        self.by_number.insert(number, hash);
        self.total_difficulty.insert(hash, total_difficulty);
        self.by_hash.insert(hash, block);
    }

    fn remove(&mut self, number: u64, hash: H256) {
        if let Some(block) = self.by_hash.remove(&hash) {
            for tx in &block.transactions {
                self.tx_by_hash.remove(&tx.hash);
                self.tx_to_block_hash.remove(&tx.hash);
            }
        }
        self.total_difficulty.remove(&hash);
        if self.by_number.get(&number) == Some(&hash) {
            self.by_number.remove(&number);
        }
    }
}

/// The hybrid block store itself: a cache of `BlockchainStorage` plus the remote source it
/// demand-loads from. Cheap to clone — the storage lives behind an `Arc<RwLock<_>>`, matching
/// the single-writer discipline described for the in-memory backend (§5): the write lock is
/// never held across an `.await`, so a remote fetch never blocks an unrelated local read.
#[derive(Clone)]
pub struct HybridBlockStore<F> {
    storage: Arc<RwLock<BlockchainStorage>>,
    remote: F,
}

impl<F: RemoteBlockSource> HybridBlockStore<F> {
    /// Seeds the store with the block the fork started from. `fork_height` and `latest_height`
    /// both start at `fork_block`'s number: nothing has been appended locally yet.
    pub fn new(remote: F, fork_block: Block, fork_total_difficulty: U256) -> Self {
        let number = fork_block.number();
        let mut storage = BlockchainStorage { fork_height: number, latest_height: number, ..Default::default() };
        storage.insert(number, fork_block, fork_total_difficulty);
        Self { storage: Arc::new(RwLock::new(storage)), remote }
    }

    pub fn fork_height(&self) -> u64 {
        self.storage.read().fork_height
    }

    pub fn latest_height(&self) -> u64 {
        self.storage.read().latest_height
    }

    /// Looks up a block, demand-loading and caching it from upstream on a local miss within the
    /// remote prefix. Heights past `fork_height` are never looked up remotely: the local tail is
    /// authoritative there, and a miss means the block genuinely doesn't exist (yet).
    pub async fn get_block(&self, id: BlockId) -> Result<Option<Block>, BlockchainError> {
        let id = match id {
            BlockId::Latest => BlockId::Number(self.latest_height()),
            other => other,
        };

        if let Some(block) = self.lookup_local(id) {
            return Ok(Some(block));
        }

        let fork_height = self.storage.read().fork_height;
        let remote_block = match id {
            BlockId::Number(number) => {
                if number > fork_height {
                    return Ok(None);
                }
                self.remote.block_by_number(number, true).await?
            }
            BlockId::Hash(hash) => self.remote.block_by_hash(hash, true).await?,
            BlockId::Latest => unreachable!("resolved above"),
        };

        let Some(RemoteBlock { block, total_difficulty }) = remote_block else {
            return Ok(None);
        };
        let number = block.number();
        // I6: a hash lookup carries no number up front, so the ceiling can only be enforced once
        // the remote response is in hand. Refuse to cache (or return) anything past the fork.
        if number > fork_height {
            return Ok(None);
        }
        trace!(target: "backend::storage", number, hash = ?block.hash(), "caching demand-loaded block");
        let mut storage = self.storage.write();
        storage.insert(number, block.clone(), total_difficulty);
        Ok(Some(block))
    }

    fn lookup_local(&self, id: BlockId) -> Option<Block> {
        let storage = self.storage.read();
        match id {
            BlockId::Number(number) => {
                let hash = storage.by_number.get(&number)?;
                storage.by_hash.get(hash).cloned()
            }
            BlockId::Hash(hash) => storage.by_hash.get(&hash).cloned(),
            BlockId::Latest => unreachable!("resolved before lookup"),
        }
    }

    pub async fn get_latest_block(&self) -> Result<Option<Block>, BlockchainError> {
        self.get_block(BlockId::Latest).await
    }

    /// Appends a block to the local tail. The block must extend the current tip exactly: its
    /// number must be `latest_height + 1` and its `parent_hash` must match the tip's hash.
    pub fn append_block(&self, block: Block) -> Result<(), BlockchainError> {
        let mut storage = self.storage.write();
        let expected = storage.latest_height + 1;
        if block.number() != expected {
            return Err(BlockchainError::InvalidBlockNumber { expected, actual: block.number() });
        }
        let tip_hash = storage.tip_hash().ok_or(BlockchainError::BlockNotFound)?;
        if block.header.parent_hash != tip_hash {
            return Err(BlockchainError::InvalidParentHash);
        }
        let parent_td = *storage.total_difficulty.get(&tip_hash).ok_or(BlockchainError::BlockNotFound)?;
        let total_difficulty = parent_td + block.header.difficulty;
        let number = block.number();
        storage.insert(number, block, total_difficulty);
        storage.latest_height = number;
        Ok(())
    }

    /// Drops a block and cascades upward: every block from `block.number()` through the current
    /// tip is removed, not just the one named. A reorg invalidates everything built on top of the
    /// dropped block just as much as the block itself — only the block's own parent survives.
    /// Only ever valid for blocks past the fork height — the remote prefix is immutable for the
    /// lifetime of the store.
    pub fn delete_block(&self, hash: H256) -> Result<(), BlockchainError> {
        let mut storage = self.storage.write();
        let block = storage.by_hash.get(&hash).ok_or(BlockchainError::BlockNotFound)?;
        let number = block.number();
        if number <= storage.fork_height {
            return Err(BlockchainError::CannotDeleteRemote);
        }
        let mut height = storage.latest_height;
        while height >= number {
            if let Some(h) = storage.by_number.get(&height).copied() {
                storage.remove(height, h);
            } else {
                warn!(target: "backend::storage", height, "gap in local tail during delete");
            }
            if height == 0 {
                break;
            }
            height -= 1;
        }
        storage.latest_height = number - 1;
        Ok(())
    }

    /// Unwinds the local tail back to `block`: every block stored at a height greater than
    /// `block`'s is dropped, in descending order, down to (but not including) `block` itself.
    /// This is the reorg primitive — callers append the new canonical chain on top afterward.
    pub fn delete_later_blocks(&self, block: &Block) -> Result<(), BlockchainError> {
        let mut storage = self.storage.write();
        let number = block.number();
        let canonical = storage.by_number.get(&number).copied();
        if canonical != Some(block.hash()) {
            return Err(BlockchainError::InvalidBlock);
        }
        if number < storage.fork_height {
            return Err(BlockchainError::CannotDeleteRemote);
        }
        let mut height = storage.latest_height;
        while height > number {
            if let Some(hash) = storage.by_number.get(&height).copied() {
                storage.remove(height, hash);
            } else {
                warn!(target: "backend::storage", height, "gap in local tail during unwind");
            }
            height -= 1;
        }
        storage.latest_height = number;
        Ok(())
    }

    pub fn get_total_difficulty_cached(&self, hash: H256) -> Option<U256> {
        self.storage.read().total_difficulty.get(&hash).copied()
    }

    /// Intentionally unimplemented: iterating every block in the remote prefix would mean
    /// fetching `0..=fork_height` upstream one at a time, which this store has no business doing
    /// on a caller's behalf (the remote source is not a cache-warming tool). Kept as an explicit
    /// method rather than simply absent so callers get a typed "not supported" instead of
    /// discovering it's missing at compile time with no signal as to why.
    pub fn iter_blocks(&self) -> Result<std::iter::Empty<Block>, BlockchainError> {
        Err(BlockchainError::NotSupported)
    }

    /// As `get_total_difficulty_cached`, but demand-loads the owning block first on a miss —
    /// total difficulty is only ever known once a block has been cached.
    pub async fn get_total_difficulty(&self, hash: H256) -> Result<U256, BlockchainError> {
        if let Some(td) = self.get_total_difficulty_cached(hash) {
            return Ok(td);
        }
        self.get_block(BlockId::Hash(hash)).await?;
        self.get_total_difficulty_cached(hash).ok_or(BlockchainError::BlockNotFound)
    }

    /// Shared remote-fetch path for `get_transaction`/`get_block_by_transaction_hash`: fetches the
    /// raw upstream record for a transaction not already cached locally, and — if it's mined
    /// within the fork prefix — installs it into `tx_by_hash` (but not `tx_to_block_hash`; see
    /// `get_transaction`'s doc comment). A transaction upstream reports as still pending (no
    /// containing block) or mined past the fork height is treated as not found.
    async fn fetch_mined_transaction(&self, hash: TxHash) -> Result<Option<RemoteTransaction>, BlockchainError> {
        let Some(remote_tx) = self.remote.transaction_by_hash(hash).await? else {
            return Ok(None);
        };
        let fork_height = self.storage.read().fork_height;
        match remote_tx.block_number {
            Some(number) if number <= fork_height => {}
            _ => return Ok(None),
        }
        self.storage.write().tx_by_hash.insert(hash, remote_tx.transaction.clone());
        Ok(Some(remote_tx))
    }

    /// Looks up a transaction by hash. A local hit returns directly; otherwise demand-loads it
    /// from upstream via `fetch_mined_transaction`. Note this never populates `tx_to_block_hash`
    /// — the containing block itself hasn't been ingested by this call, only the bare
    /// transaction record.
    pub async fn get_transaction(&self, hash: TxHash) -> Result<Option<Transaction>, BlockchainError> {
        if let Some(tx) = self.storage.read().tx_by_hash.get(&hash).cloned() {
            return Ok(Some(tx));
        }
        Ok(self.fetch_mined_transaction(hash).await?.map(|r| r.transaction))
    }

    /// Finds the block a transaction was mined in. Prefers an already-known block binding;
    /// otherwise fetches the transaction's coordinates from upstream and, if it carries a block
    /// hash, demand-loads that block — whose ingestion rule (§4.2) then installs
    /// `tx_to_block_hash` for every transaction inside it, including this one.
    pub async fn get_block_by_transaction_hash(&self, hash: TxHash) -> Result<Option<Block>, BlockchainError> {
        if let Some(block_hash) = self.storage.read().tx_to_block_hash.get(&hash).copied() {
            return self.get_block(BlockId::Hash(block_hash)).await;
        }
        let block_hash = if self.storage.read().tx_by_hash.contains_key(&hash) {
            // Already cached via a prior `get_transaction` with no block binding recorded, and
            // there's no fresh upstream record to learn one from.
            None
        } else {
            self.fetch_mined_transaction(hash).await?.and_then(|r| r.block_hash)
        };
        let Some(block_hash) = block_hash else {
            return Ok(None);
        };
        self.get_block(BlockId::Hash(block_hash)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fork::RemoteTransaction;
    use async_trait::async_trait;
    use chain_core::PartialHeader;
    use parking_lot::Mutex;

    /// A fake remote source backed by a fixed in-memory chain, for exercising demand-load and
    /// caching behavior without a real network call.
    #[derive(Default)]
    struct FakeRemote {
        blocks: Vec<Block>,
        fetch_counts: Mutex<HashMap<H256, u32>>,
    }

    fn block(number: u64, parent_hash: H256) -> Block {
        Block::new(PartialHeader { number: number.into(), parent_hash, ..Default::default() }, vec![])
    }

    #[async_trait]
    impl RemoteBlockSource for FakeRemote {
        async fn block_by_number(&self, number: u64, _: bool) -> Result<Option<RemoteBlock>, crate::error::UpstreamError> {
            let Some(b) = self.blocks.iter().find(|b| b.number() == number).cloned() else {
                return Ok(None);
            };
            *self.fetch_counts.lock().entry(b.hash()).or_default() += 1;
            Ok(Some(RemoteBlock { block: b, total_difficulty: U256::from(number) }))
        }

        async fn block_by_hash(&self, hash: H256, _: bool) -> Result<Option<RemoteBlock>, crate::error::UpstreamError> {
            let Some(b) = self.blocks.iter().find(|b| b.hash() == hash).cloned() else {
                return Ok(None);
            };
            *self.fetch_counts.lock().entry(hash).or_default() += 1;
            let number = b.number();
            Ok(Some(RemoteBlock { block: b, total_difficulty: U256::from(number) }))
        }

        async fn transaction_by_hash(&self, hash: TxHash) -> Result<Option<RemoteTransaction>, crate::error::UpstreamError> {
            for b in &self.blocks {
                if let Some(tx) = b.transactions.iter().find(|t| t.hash == hash) {
                    return Ok(Some(RemoteTransaction {
                        transaction: tx.clone(),
                        block_hash: Some(b.hash()),
                        block_number: Some(b.number()),
                    }));
                }
            }
            Ok(None)
        }

        async fn latest_block_number(&self) -> Result<u64, crate::error::UpstreamError> {
            Ok(self.blocks.last().map(|b| b.number()).unwrap_or_default())
        }
    }

    /// `ancestor` (98) and `fork_base` (100, the fork height `F`) both live only upstream; the
    /// store is seeded with `fork_base` already cached. `remote` also carries a block at 101 —
    /// past `F` — purely to prove I6 refuses to cache it even though upstream "has" it.
    fn fixture() -> (HybridBlockStore<FakeRemote>, Block, Block) {
        let ancestor = block(98, H256::zero());
        let fork_base = block(100, ancestor.hash());
        let beyond_fork = block(101, fork_base.hash());
        let remote = FakeRemote {
            blocks: vec![ancestor.clone(), fork_base.clone(), beyond_fork],
            ..Default::default()
        };
        (HybridBlockStore::new(remote, fork_base.clone(), U256::from(100u64)), fork_base, ancestor)
    }

    #[tokio::test]
    async fn demand_loads_and_caches_exactly_once() {
        let (store, _, ancestor) = fixture();
        let first = store.get_block(BlockId::Number(ancestor.number())).await.unwrap().unwrap();
        let second = store.get_block(BlockId::Number(ancestor.number())).await.unwrap().unwrap();
        assert_eq!(first.hash(), second.hash());
        assert_eq!(*store.remote.fetch_counts.lock().get(&first.hash()).unwrap(), 1);
    }

    #[tokio::test]
    async fn boundary_rejects_heights_past_fork_without_contacting_upstream() {
        let (store, _, _) = fixture();
        assert!(store.get_block(BlockId::Number(101)).await.unwrap().is_none());
        assert!(store.remote.fetch_counts.lock().is_empty());
    }

    #[tokio::test]
    async fn hash_lookup_past_fork_height_is_not_cached() {
        // the fake remote indexes by hash irrespective of height, so looking up `beyond_fork`'s
        // hash directly exercises the post-fetch I6 check rather than the cheaper number-based
        // short-circuit `boundary_rejects_heights_past_fork_without_contacting_upstream` covers.
        let ancestor = block(98, H256::zero());
        let fork_base = block(100, ancestor.hash());
        let beyond_fork = block(101, fork_base.hash());
        let beyond_fork_hash = beyond_fork.hash();
        let remote = FakeRemote { blocks: vec![ancestor, fork_base.clone(), beyond_fork], ..Default::default() };
        let store = HybridBlockStore::new(remote, fork_base, U256::from(100u64));

        assert!(store.get_block(BlockId::Hash(beyond_fork_hash)).await.unwrap().is_none());
        // still shouldn't be cached after the round trip above.
        assert!(store.get_block(BlockId::Hash(beyond_fork_hash)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn append_requires_contiguous_parent() {
        let (store, genesis, _) = fixture();
        let wrong_parent = block(genesis.number() + 1, H256::repeat_byte(1));
        assert!(matches!(
            store.append_block(wrong_parent),
            Err(BlockchainError::InvalidParentHash)
        ));

        let good = block(genesis.number() + 1, genesis.hash());
        store.append_block(good).unwrap();
        assert_eq!(store.latest_height(), genesis.number() + 1);
    }

    #[tokio::test]
    async fn append_accumulates_total_difficulty_over_the_parent() {
        let (store, genesis, _) = fixture();
        let genesis_td = store.get_total_difficulty(genesis.hash()).await.unwrap();

        let partial = PartialHeader {
            number: (genesis.number() + 1).into(),
            parent_hash: genesis.hash(),
            difficulty: U256::from(1000u64),
            ..Default::default()
        };
        let b1 = Block::new(partial, vec![]);
        let b1_hash = b1.hash();
        store.append_block(b1).unwrap();

        assert_eq!(store.get_total_difficulty(b1_hash).await.unwrap(), genesis_td + U256::from(1000u64));
    }

    #[tokio::test]
    async fn cannot_delete_remote_blocks() {
        let (store, genesis, _) = fixture();
        assert!(matches!(
            store.delete_block(genesis.hash()),
            Err(BlockchainError::CannotDeleteRemote)
        ));
    }

    #[tokio::test]
    async fn delete_block_cascades_through_every_higher_local_block() {
        let (store, genesis, _) = fixture();
        let b1 = block(genesis.number() + 1, genesis.hash());
        let b1_hash = b1.hash();
        store.append_block(b1).unwrap();
        let b2 = block(genesis.number() + 2, b1_hash);
        let b2_hash = b2.hash();
        store.append_block(b2).unwrap();
        let b3 = block(genesis.number() + 3, b2_hash);
        let b3_hash = b3.hash();
        store.append_block(b3).unwrap();

        store.delete_block(b1_hash).unwrap();

        assert!(store.get_block(BlockId::Hash(b1_hash)).await.unwrap().is_none());
        assert!(store.get_block(BlockId::Hash(b2_hash)).await.unwrap().is_none());
        assert!(store.get_block(BlockId::Hash(b3_hash)).await.unwrap().is_none());
        assert_eq!(store.latest_height(), genesis.number());
        assert_eq!(store.get_block(BlockId::Hash(genesis.hash())).await.unwrap().unwrap().hash(), genesis.hash());
    }

    #[tokio::test]
    async fn delete_later_blocks_unwinds_to_the_given_block() {
        let (store, genesis, _) = fixture();
        let b101 = block(genesis.number() + 1, genesis.hash());
        store.append_block(b101.clone()).unwrap();
        let b102 = block(102, b101.hash());
        store.append_block(b102).unwrap();

        store.delete_later_blocks(&b101).unwrap();
        assert_eq!(store.latest_height(), 101);
        assert!(store.get_block(BlockId::Number(102)).await.unwrap().is_none());
    }

    fn block_with_tx(number: u64, parent_hash: H256, tx: Transaction) -> Block {
        Block::new(PartialHeader { number: number.into(), parent_hash, ..Default::default() }, vec![tx])
    }

    fn tx(nonce: u64) -> Transaction {
        Transaction {
            hash: H256::from_low_u64_be(nonce + 1),
            from: ethers_core::types::Address::zero(),
            nonce: U256::from(nonce),
            to: None,
            value: U256::zero(),
            gas_limit: U256::zero(),
            gas_price: U256::zero(),
            input: Default::default(),
            chain_id: None,
        }
    }

    #[tokio::test]
    async fn get_transaction_demand_loads_but_does_not_bind_a_block() {
        // The mined tx lives in `ancestor`, which is *not* the seed block — so it starts out
        // wholly uncached, and only `get_transaction`'s own upstream fetch can surface it.
        let mined_tx = tx(0);
        let tx_hash = mined_tx.hash;
        let ancestor = block_with_tx(98, H256::zero(), mined_tx);
        let ancestor_hash = ancestor.hash();
        let fork_base = block(100, ancestor.hash());
        let remote = FakeRemote { blocks: vec![ancestor, fork_base.clone()], ..Default::default() };
        let store = HybridBlockStore::new(remote, fork_base, U256::from(100u64));

        let found = store.get_transaction(tx_hash).await.unwrap().unwrap();
        assert_eq!(found.hash, tx_hash);
        // getTransaction never ingests the containing block, so the tx/block binding is absent
        // and the block itself stays uncached even though it's the one the tx was mined in.
        assert!(store.storage.read().tx_to_block_hash.get(&tx_hash).is_none());
        assert!(store.remote.fetch_counts.lock().get(&ancestor_hash).is_none());
    }

    #[tokio::test]
    async fn get_block_by_transaction_hash_ingests_the_owning_block() {
        let mined_tx = tx(0);
        let tx_hash = mined_tx.hash;
        let ancestor = block_with_tx(98, H256::zero(), mined_tx);
        let ancestor_hash = ancestor.hash();
        let fork_base = block(100, ancestor.hash());
        let remote = FakeRemote { blocks: vec![ancestor, fork_base.clone()], ..Default::default() };
        let store = HybridBlockStore::new(remote, fork_base, U256::from(100u64));

        let found = store.get_block_by_transaction_hash(tx_hash).await.unwrap().unwrap();
        assert_eq!(found.hash(), ancestor_hash);
        assert_eq!(store.storage.read().tx_to_block_hash.get(&tx_hash).copied(), Some(ancestor_hash));
    }

    #[test]
    fn iter_blocks_is_not_supported() {
        let (store, _, _) = fixture();
        assert!(matches!(store.iter_blocks(), Err(BlockchainError::NotSupported)));
    }

    #[tokio::test]
    async fn transaction_mined_past_fork_height_is_absent() {
        let ancestor = block(98, H256::zero());
        let fork_base = block(100, ancestor.hash());
        let mined_tx = tx(0);
        let tx_hash = mined_tx.hash;
        let beyond_fork = block_with_tx(101, fork_base.hash(), mined_tx);
        let remote = FakeRemote { blocks: vec![ancestor, fork_base.clone(), beyond_fork], ..Default::default() };
        let store = HybridBlockStore::new(remote, fork_base, U256::from(100u64));

        assert!(store.get_transaction(tx_hash).await.unwrap().is_none());
        assert!(store.get_block_by_transaction_hash(tx_hash).await.unwrap().is_none());
    }
}

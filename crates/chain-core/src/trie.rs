//! Trie-root helper adapted for the subset of RLP tries the block header needs.
use ethers_core::{types::H256, utils::keccak256};
use hash256_std_hasher::Hash256StdHasher;
use hash_db::Hasher;

/// Concrete `Hasher` impl for the Keccak-256 hash, as used throughout Ethereum's tries.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Keccak256Hasher;

impl Hasher for Keccak256Hasher {
    type Out = H256;
    type StdHasher = Hash256StdHasher;
    const LENGTH: usize = 32;

    fn hash(x: &[u8]) -> Self::Out {
        H256::from_slice(keccak256(x).as_slice())
    }
}

/// Generates a trie root hash for an ordered list of RLP-encoded values (e.g. a block's
/// transactions, keyed by their index).
pub fn ordered_trie_root<I, V>(input: I) -> H256
where
    I: IntoIterator<Item = V>,
    V: AsRef<[u8]>,
{
    triehash::ordered_trie_root::<Keccak256Hasher, I>(input)
}

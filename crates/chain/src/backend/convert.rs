//! Conversions between the upstream provider's wire types and this crate's data model: the
//! upstream client speaks `ethers_core::types::{Block, Transaction}`, the store speaks
//! `chain_core`'s leaner equivalents.
use crate::error::UpstreamError;
use chain_core::{Block, PartialHeader, Transaction};
use ethers_core::types::{Block as EthersBlock, Transaction as EthersTransaction, U64};

pub(crate) fn convert_transaction(tx: EthersTransaction) -> Transaction {
    Transaction {
        hash: tx.hash,
        from: tx.from,
        nonce: tx.nonce,
        to: tx.to,
        value: tx.value,
        gas_limit: tx.gas,
        gas_price: tx.gas_price.unwrap_or_default(),
        input: tx.input,
        chain_id: tx.chain_id.map(|id| U64::from(id.as_u64())),
    }
}

/// Converts a full (`includeTx=true`) block from the upstream provider. Fails with
/// `UpstreamError` if the block is missing fields that are only absent for a pending block
/// (`hash`, `number`) — the core never deals in pending blocks.
pub(crate) fn convert_block(block: EthersBlock<EthersTransaction>) -> Result<Block, UpstreamError> {
    let number = block
        .number
        .ok_or_else(|| UpstreamError::InvalidResponse("block missing number".into()))?;
    let hash = block
        .hash
        .ok_or_else(|| UpstreamError::InvalidResponse("block missing hash".into()))?;

    let partial_header = PartialHeader {
        parent_hash: block.parent_hash,
        beneficiary: block.author.unwrap_or_default(),
        state_root: block.state_root,
        receipts_root: block.receipts_root,
        logs_bloom: block.logs_bloom.unwrap_or_default(),
        difficulty: block.difficulty,
        number,
        gas_limit: block.gas_limit,
        gas_used: block.gas_used,
        timestamp: block.timestamp.as_u64(),
        extra_data: block.extra_data,
        mix_hash: block.mix_hash.unwrap_or_default(),
        nonce: block.nonce.map(|n| U64::from(n.to_low_u64_be())).unwrap_or_default(),
    };

    let transactions = block.transactions.into_iter().map(convert_transaction).collect();

    // Trust the upstream node's own hash and transactions root rather than rederiving them — see
    // `Block::from_remote`'s doc comment for why recomputation would be both unnecessary and
    // fragile across hardforks.
    Ok(Block::from_remote(partial_header, block.transactions_root, transactions, hash))
}

//! The hash-chained record of committed settlements.

use crate::domain::account::Amount;
use crate::domain::identity::{self, MerchantId, Mmid, TxId};
use crate::error::{BankError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Length in hex characters of a block hash.
pub const HASH_LEN: usize = 64;

/// SHA-256 hex digest linking blocks together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockHash(String);

impl BlockHash {
    /// The `prev_hash` of the first block.
    pub fn zero() -> Self {
        Self("0".repeat(HASH_LEN))
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn compute(tx_id: &TxId, prev_hash: &BlockHash, timestamp: &DateTime<Utc>) -> Self {
        let timestamp = identity::timestamp_text(timestamp);
        Self(identity::digest(&[tx_id.as_str(), prev_hash.as_str(), &timestamp]))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A transfer that has been committed to the accounts and awaits its place
/// in the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingBlock {
    pub tx_id: TxId,
    pub mmid: Mmid,
    pub merchant_id: MerchantId,
    pub amount: Amount,
    pub timestamp: DateTime<Utc>,
}

/// One immutable, hash-linked record of a committed transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerBlock {
    pub tx_id: TxId,
    pub mmid: Mmid,
    pub merchant_id: MerchantId,
    pub amount: Amount,
    pub timestamp: DateTime<Utc>,
    pub prev_hash: BlockHash,
    pub hash: BlockHash,
}

impl LedgerBlock {
    fn seal(pending: PendingBlock, prev_hash: BlockHash) -> Self {
        let hash = BlockHash::compute(&pending.tx_id, &prev_hash, &pending.timestamp);
        Self {
            tx_id: pending.tx_id,
            mmid: pending.mmid,
            merchant_id: pending.merchant_id,
            amount: pending.amount,
            timestamp: pending.timestamp,
            prev_hash,
            hash,
        }
    }

    /// True when the stored hash matches the block's own contents.
    pub fn is_sealed(&self) -> bool {
        BlockHash::compute(&self.tx_id, &self.prev_hash, &self.timestamp) == self.hash
    }
}

/// Append-only sequence of blocks. Knows nothing about locking; the store
/// that owns it serializes access.
#[derive(Debug, Default, Clone)]
pub struct Chain {
    blocks: Vec<LedgerBlock>,
    tx_ids: HashSet<TxId>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tail_hash(&self) -> BlockHash {
        self.blocks
            .last()
            .map(|block| block.hash.clone())
            .unwrap_or_else(BlockHash::zero)
    }

    pub fn append(&mut self, pending: PendingBlock) -> Result<LedgerBlock> {
        if self.tx_ids.contains(&pending.tx_id) {
            return Err(BankError::InternalError(format!(
                "transaction {} is already in the ledger",
                pending.tx_id
            )));
        }
        let block = LedgerBlock::seal(pending, self.tail_hash());
        self.tx_ids.insert(block.tx_id.clone());
        self.blocks.push(block.clone());
        Ok(block)
    }

    pub fn contains(&self, tx_id: &TxId) -> bool {
        self.tx_ids.contains(tx_id)
    }

    pub fn blocks(&self) -> &[LedgerBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Outcome of checking a sequence of blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    pub total_blocks: usize,
    pub verified_blocks: usize,
    pub first_invalid_index: Option<usize>,
    pub error_message: Option<String>,
}

impl ChainVerification {
    pub fn is_valid(&self) -> bool {
        self.first_invalid_index.is_none()
    }
}

/// Recomputes every hash and checks every link, stopping at the first
/// broken block.
pub fn verify_chain(blocks: &[LedgerBlock]) -> ChainVerification {
    let mut result = ChainVerification {
        total_blocks: blocks.len(),
        verified_blocks: 0,
        first_invalid_index: None,
        error_message: None,
    };
    let mut expected_prev = BlockHash::zero();

    for (i, block) in blocks.iter().enumerate() {
        let problem = if block.prev_hash != expected_prev {
            Some(format!(
                "block {i} has broken chain link (expected prev: {expected_prev}, got: {})",
                block.prev_hash
            ))
        } else if !block.is_sealed() {
            Some(format!("block {i} has invalid hash"))
        } else {
            None
        };

        if let Some(message) = problem {
            result.first_invalid_index = Some(i);
            result.error_message = Some(message);
            return result;
        }

        expected_prev = block.hash.clone();
        result.verified_blocks = i + 1;
    }
    result
}

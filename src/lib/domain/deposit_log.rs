//! Rebuilding the commitment tree from the ledger's `Deposit` event log.
//!
//! Nothing here is cached. Every withdrawal replays the full log so that the
//! only source of truth is the ledger itself.

use alloy::primitives::B256;
use serde::{
    Deserialize,
    Serialize,
};
use thiserror::Error;

use super::{
    commitment::Commitment,
    merkle::{
        MerkleError,
        MerkleTree,
    },
};
use crate::crypto::hasher::FieldHasher;

/// A single `Deposit(commitment, leafIndex, timestamp)` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositEvent {
    pub commitment: Commitment,
    pub leaf_index: u32,
    /// Block timestamp recorded by the contract.
    pub timestamp: u64,
    pub block_number: u64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogCorruption {
    #[error("expected leaf index {expected}, found {found}")]
    Gap { expected: u32, found: u32 },

    #[error("leaf index {index} appears more than once")]
    Duplicate { index: u32 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconstructError {
    #[error("corrupted deposit log: {0}")]
    CorruptedLog(LogCorruption),

    #[error(transparent)]
    Tree(#[from] MerkleError),
}

/// Order events by leaf index and check they form `0..n` exactly.
pub fn ordered_leaves(events: &[DepositEvent]) -> Result<Vec<B256>, ReconstructError> {
    let mut sorted = events.to_vec();
    sorted.sort_by_key(|e| e.leaf_index);

    let mut leaves = Vec::with_capacity(sorted.len());
    for (expected, event) in sorted.iter().enumerate() {
        let expected = expected as u32;
        if event.leaf_index != expected {
            let corruption = if event.leaf_index < expected {
                LogCorruption::Duplicate {
                    index: event.leaf_index,
                }
            } else {
                LogCorruption::Gap {
                    expected,
                    found: event.leaf_index,
                }
            };
            return Err(ReconstructError::CorruptedLog(corruption));
        }
        leaves.push(event.commitment.0);
    }

    Ok(leaves)
}

/// Rebuild the tree of the given height from an (unordered) event log.
pub fn reconstruct<H: FieldHasher>(
    height: usize,
    events: &[DepositEvent],
) -> Result<MerkleTree<H>, ReconstructError> {
    let leaves = ordered_leaves(events)?;
    Ok(MerkleTree::build(height, leaves)?)
}

/// Leaf index of the first event carrying `commitment`.
pub fn locate(events: &[DepositEvent], commitment: &Commitment) -> Option<u32> {
    events
        .iter()
        .find(|e| e.commitment == *commitment)
        .map(|e| e.leaf_index)
}

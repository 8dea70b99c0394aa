use std::fmt;

use alloy::primitives::B256;
use serde::{
    Deserialize,
    Serialize,
};

/// A commitment is the on-chain representation of a deposit and the leaf
/// value in the commitment tree.
/// commitment = poseidon2(nullifier, secret)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment(pub B256);

impl From<B256> for Commitment {
    fn from(value: B256) -> Self {
        Self(value)
    }
}

impl From<Commitment> for B256 {
    fn from(value: Commitment) -> Self {
        value.0
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Revealed at withdrawal time to mark the note as spent.
/// nullifier_hash = poseidon1(nullifier)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NullifierHash(pub B256);

impl From<B256> for NullifierHash {
    fn from(value: B256) -> Self {
        Self(value)
    }
}

impl From<NullifierHash> for B256 {
    fn from(value: NullifierHash) -> Self {
        value.0
    }
}

impl fmt::Display for NullifierHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

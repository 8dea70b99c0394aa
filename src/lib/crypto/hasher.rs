//! Pluggable two-arity field hash.
//!
//! The Merkle tree and the commitment scheme only ever need `H(a)` and
//! `H(a, b)` over 32-byte field elements. Whatever implements this trait must
//! match the paired circuit and on-chain verifier bit for bit.

use std::fmt::Debug;

use alloy::primitives::B256;

use super::poseidon::{
    poseidon1,
    poseidon2,
};

pub trait FieldHasher: Clone + Debug + Default + Send + Sync + 'static {
    /// Single-input hash (nullifier hash domain).
    fn hash1(a: B256) -> B256;

    /// Two-input hash (commitments and Merkle nodes, `left ‖ right`).
    fn hash2(left: B256, right: B256) -> B256;
}

/// Circom-compatible Poseidon over BN254.
#[derive(Debug, Default, Clone, Copy)]
pub struct PoseidonHasher;

impl FieldHasher for PoseidonHasher {
    fn hash1(a: B256) -> B256 {
        poseidon1(a)
    }

    fn hash2(left: B256, right: B256) -> B256 {
        poseidon2(left, right)
    }
}

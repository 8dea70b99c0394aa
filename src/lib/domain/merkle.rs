use std::marker::PhantomData;

use alloy::primitives::{
    B256,
    keccak256,
};
use serde::{
    Deserialize,
    Serialize,
};
use thiserror::Error;

use crate::crypto::{
    hasher::{
        FieldHasher,
        PoseidonHasher,
    },
    poseidon::reduce_to_field,
};

/// Tree height used by deployed instances unless configured otherwise.
pub const DEFAULT_TREE_HEIGHT: usize = 20;

/// Largest supported height (2^32 leaves, matching the contract's `uint32` leaf index).
pub const MAX_TREE_HEIGHT: usize = 32;

/// The empty-leaf value: `keccak256("tornado") mod p`.
pub fn zero_value() -> B256 {
    reduce_to_field(keccak256(b"tornado"))
}

/// Zero value for every level, `zeros[0]` is the empty leaf and
/// `zeros[height]` is the root of an empty tree.
pub fn zero_levels<H: FieldHasher>(height: usize) -> Vec<B256> {
    let mut zeros = Vec::with_capacity(height + 1);
    zeros.push(zero_value());
    for level in 0..height {
        let below = zeros[level];
        zeros.push(H::hash2(below, below));
    }
    zeros
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("tree height must be between 1 and {MAX_TREE_HEIGHT}, got {0}")]
    InvalidHeight(usize),

    #[error("tree capacity {capacity} exceeded by {leaves} leaves")]
    CapacityExceeded { capacity: u64, leaves: u64 },

    #[error("leaf index {index} out of range for {len} leaves")]
    IndexOutOfRange { index: u64, len: u64 },
}

/// Merkle inclusion path for a single leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionPath {
    /// Root this path proves membership against.
    pub root: B256,
    /// The leaf index in the tree.
    pub leaf_index: u64,
    /// Sibling hashes from the leaf level up to just below the root.
    pub path_elements: Vec<B256>,
    /// 0 if the node at this level is a left child, 1 if right.
    pub path_index: Vec<u8>,
}

impl InclusionPath {
    pub fn height(&self) -> usize {
        self.path_elements.len()
    }

    /// Fold the path over `leaf` the same way the circuit does.
    pub fn compute_root<H: FieldHasher>(&self, leaf: B256) -> B256 {
        self.path_elements
            .iter()
            .zip(&self.path_index)
            .fold(leaf, |node, (&sibling, &index)| {
                if index == 0 {
                    H::hash2(node, sibling)
                } else {
                    H::hash2(sibling, node)
                }
            })
    }
}

/// Fixed-height binary Merkle tree over commitments in deposit order.
///
/// Every populated node is kept, level by level. A missing right sibling is
/// the zero value of its level. Inserting a leaf rehashes one node per level.
#[derive(Debug, Clone)]
pub struct MerkleTree<H: FieldHasher = PoseidonHasher> {
    height: usize,
    /// `layers[0]` holds the leaves, `layers[height]` at most the root.
    layers: Vec<Vec<B256>>,
    zeros: Vec<B256>,
    _hasher: PhantomData<H>,
}

impl<H: FieldHasher> MerkleTree<H> {
    /// Create an empty tree.
    pub fn new(height: usize) -> Result<Self, MerkleError> {
        Self::build(height, Vec::new())
    }

    /// Build a tree over `leaves`, in order.
    pub fn build(height: usize, leaves: Vec<B256>) -> Result<Self, MerkleError> {
        if height == 0 || height > MAX_TREE_HEIGHT {
            return Err(MerkleError::InvalidHeight(height));
        }
        let capacity = 1u64 << height;
        if leaves.len() as u64 > capacity {
            return Err(MerkleError::CapacityExceeded {
                capacity,
                leaves: leaves.len() as u64,
            });
        }

        let zeros = zero_levels::<H>(height);
        let mut layers = Vec::with_capacity(height + 1);
        layers.push(leaves);
        for level in 0..height {
            let next: Vec<B256> = layers[level]
                .chunks(2)
                .map(|pair| {
                    let right = pair.get(1).copied().unwrap_or(zeros[level]);
                    H::hash2(pair[0], right)
                })
                .collect();
            layers.push(next);
        }

        Ok(Self {
            height,
            layers,
            zeros,
            _hasher: PhantomData,
        })
    }

    /// Append a leaf, returning its index.
    pub fn insert(&mut self, leaf: B256) -> Result<u64, MerkleError> {
        let index = self.len() as u64;
        if index >= self.capacity() {
            return Err(MerkleError::CapacityExceeded {
                capacity: self.capacity(),
                leaves: index + 1,
            });
        }

        self.layers[0].push(leaf);
        let mut node = index as usize;
        for level in 0..self.height {
            let left = node & !1;
            let right = self.layers[level]
                .get(left + 1)
                .copied()
                .unwrap_or(self.zeros[level]);
            let parent = H::hash2(self.layers[level][left], right);

            node >>= 1;
            let above = &mut self.layers[level + 1];
            if node < above.len() {
                above[node] = parent;
            } else {
                above.push(parent);
            }
        }
        Ok(index)
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.height
    }

    /// Get the number of leaves in the tree.
    pub fn len(&self) -> usize {
        self.layers[0].len()
    }

    /// Check if the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.layers[0].is_empty()
    }

    pub fn leaves(&self) -> &[B256] {
        &self.layers[0]
    }

    pub fn zero_levels(&self) -> &[B256] {
        &self.zeros
    }

    pub fn root(&self) -> B256 {
        self.layers[self.height]
            .first()
            .copied()
            .unwrap_or(self.zeros[self.height])
    }

    /// Inclusion path for the leaf at `leaf_index`.
    pub fn path(&self, leaf_index: u64) -> Result<InclusionPath, MerkleError> {
        let len = self.len() as u64;
        if leaf_index >= len {
            return Err(MerkleError::IndexOutOfRange {
                index: leaf_index,
                len,
            });
        }

        let mut path_elements = Vec::with_capacity(self.height);
        let mut path_index = Vec::with_capacity(self.height);
        let mut index = leaf_index as usize;

        for (level, nodes) in self.layers.iter().take(self.height).enumerate() {
            let sibling = nodes.get(index ^ 1).copied().unwrap_or(self.zeros[level]);
            path_elements.push(sibling);
            path_index.push((index & 1) as u8);
            index >>= 1;
        }

        Ok(InclusionPath {
            root: self.root(),
            leaf_index,
            path_elements,
            path_index,
        })
    }
}

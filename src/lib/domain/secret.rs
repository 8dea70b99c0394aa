use std::fmt;

use alloy::primitives::{
    B256,
    U256,
};
use rand::Rng;
use thiserror::Error;

use super::commitment::{
    Commitment,
    NullifierHash,
};
use crate::crypto::hasher::{
    FieldHasher,
    PoseidonHasher,
};

/// Width of each preimage half in bytes.
pub const HALF_BYTES: usize = 31;

/// Width of the full preimage (`nullifier ‖ secret`) in bytes.
pub const PREIMAGE_BYTES: usize = 2 * HALF_BYTES;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{field} does not fit in {HALF_BYTES} bytes")]
pub struct SecretRangeError {
    pub field: &'static str,
}

/// The depositor's private `(nullifier, secret)` pair.
///
/// Both halves are 31-byte integers so that they always lie inside the
/// BN254 scalar field.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    nullifier: U256,
    secret: U256,
}

impl Secret {
    /// Generate a fresh secret from the thread-local CSPRNG.
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let mut nullifier = [0u8; HALF_BYTES];
        let mut secret = [0u8; HALF_BYTES];
        rng.fill(&mut nullifier[..]);
        rng.fill(&mut secret[..]);

        Self {
            nullifier: U256::from_le_slice(&nullifier),
            secret: U256::from_le_slice(&secret),
        }
    }

    /// Build a secret from explicit values (for tests or recovery).
    pub fn new(nullifier: U256, secret: U256) -> Result<Self, SecretRangeError> {
        if nullifier.bit_len() > HALF_BYTES * 8 {
            return Err(SecretRangeError { field: "nullifier" });
        }
        if secret.bit_len() > HALF_BYTES * 8 {
            return Err(SecretRangeError { field: "secret" });
        }
        Ok(Self { nullifier, secret })
    }

    /// Rebuild a secret from its 62-byte little-endian preimage.
    pub fn from_preimage(preimage: &[u8; PREIMAGE_BYTES]) -> Self {
        Self {
            nullifier: U256::from_le_slice(&preimage[..HALF_BYTES]),
            secret: U256::from_le_slice(&preimage[HALF_BYTES..]),
        }
    }

    pub fn nullifier(&self) -> U256 {
        self.nullifier
    }

    pub fn secret(&self) -> U256 {
        self.secret
    }

    /// preimage = le31(nullifier) ‖ le31(secret)
    pub fn preimage(&self) -> [u8; PREIMAGE_BYTES] {
        let mut preimage = [0u8; PREIMAGE_BYTES];
        preimage[..HALF_BYTES]
            .copy_from_slice(&self.nullifier.to_le_bytes::<32>()[..HALF_BYTES]);
        preimage[HALF_BYTES..]
            .copy_from_slice(&self.secret.to_le_bytes::<32>()[..HALF_BYTES]);
        preimage
    }

    /// commitment = poseidon2(nullifier, secret)
    pub fn commitment(&self) -> Commitment {
        self.commitment_with::<PoseidonHasher>()
    }

    /// nullifier_hash = poseidon1(nullifier)
    pub fn nullifier_hash(&self) -> NullifierHash {
        self.nullifier_hash_with::<PoseidonHasher>()
    }

    pub fn commitment_with<H: FieldHasher>(&self) -> Commitment {
        Commitment(H::hash2(self.nullifier.into(), self.secret.into()))
    }

    pub fn nullifier_hash_with<H: FieldHasher>(&self) -> NullifierHash {
        // The nullifier occupies a full left-padded field word on its own.
        NullifierHash(H::hash1(B256::from(self.nullifier)))
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("commitment", &self.commitment())
            .finish_non_exhaustive()
    }
}

use std::{
    future::Future,
    sync::Arc,
};

use thiserror::Error;

use crate::domain::{
    proof::WithdrawProof,
    witness::WithdrawWitness,
};

/// Errors that can occur during proof generation.
#[derive(Debug, Error)]
pub enum ProverError {
    #[error("Witness generation failed: {0}")]
    WitnessError(String),

    #[error("Proof generation failed: {0}")]
    ProofGenerationError(String),

    #[error("Prover binary not found: {0}")]
    BinaryNotFound(String),

    #[error("Prover timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Public input mismatch: {0}")]
    PublicInputMismatch(String),
}

/// Trait for generating withdraw proofs.
///
/// Implementations may shell out to an external prover (snarkjs) or use an
/// in-process proving library. The backend is opaque: given a witness it
/// either returns a proof whose public inputs equal the witness' or fails.
pub trait Prover: Send + Sync {
    /// Generate a proof for a withdraw operation.
    ///
    /// The withdraw circuit proves:
    /// - The commitment `H(nullifier, secret)` is a leaf under `root`
    /// - `nullifier_hash` is correctly derived from the nullifier
    /// - recipient, relayer, fee and refund are bound to the proof
    fn prove_withdraw(
        &self,
        witness: &WithdrawWitness,
    ) -> impl Future<Output = Result<WithdrawProof, ProverError>> + Send;
}

impl<T: Prover> Prover for Arc<T> {
    fn prove_withdraw(
        &self,
        witness: &WithdrawWitness,
    ) -> impl Future<Output = Result<WithdrawProof, ProverError>> + Send {
        (**self).prove_withdraw(witness)
    }
}

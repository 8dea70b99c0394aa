use std::{
    sync::atomic::{
        AtomicUsize,
        Ordering,
    },
    time::Duration,
};

use alloy::primitives::{
    B256,
    Bytes,
    keccak256,
};

use crate::{
    domain::{
        proof::{
            WithdrawCallArgs,
            WithdrawProof,
        },
        witness::{
            WithdrawPublicInputs,
            WithdrawWitness,
        },
    },
    ports::prover::{
        Prover,
        ProverError,
    },
};

/// Size of a packed Groth16 proof.
const PROOF_BYTES: usize = 256;

/// Mock prover for testing and offline runs.
///
/// Produces a 256-byte "proof" bound to the public inputs by a keccak
/// digest. `MemoryLedger` accepts exactly these proofs. No circuit runs; the
/// private inputs are only sanity-checked against the path length.
#[derive(Debug, Default)]
pub struct MockProver {
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl MockProver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` before returning, to emulate a slow prover.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Some(delay),
        }
    }

    /// Number of times `prove_withdraw` was entered.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn binding_digest(public: &WithdrawPublicInputs) -> B256 {
    let words = public.as_array();
    keccak256(words.iter().flat_map(|word| word.0).collect::<Vec<u8>>())
}

/// Proof bytes the mock prover emits for `public`.
pub fn bound_proof(public: &WithdrawPublicInputs) -> Bytes {
    let digest = binding_digest(public);
    Bytes::from(digest.as_slice().repeat(PROOF_BYTES / 32))
}

/// Check a call's proof against its public arguments.
pub fn is_bound(args: &WithdrawCallArgs) -> bool {
    let public = WithdrawPublicInputs {
        root: args.root,
        nullifier_hash: args.nullifier_hash,
        recipient: args.recipient,
        relayer: args.relayer,
        fee: args.fee,
        refund: args.refund,
    };
    args.proof == bound_proof(&public)
}

impl Prover for MockProver {
    async fn prove_withdraw(&self, witness: &WithdrawWitness) -> Result<WithdrawProof, ProverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let private = &witness.private;
        if private.path_elements.len() != private.path_index.len() {
            return Err(ProverError::WitnessError(format!(
                "path has {} elements but {} indices",
                private.path_elements.len(),
                private.path_index.len()
            )));
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        Ok(WithdrawProof::new(
            bound_proof(&witness.public),
            witness.public,
        ))
    }
}

//! Turns a reconstructed tree and a note's secret into circuit inputs, and
//! circuit inputs into a proof.

use std::time::Instant;

use tracing::{
    debug,
    info,
};

use crate::{
    crypto::hasher::FieldHasher,
    domain::{
        deposit_log::{
            DepositEvent,
            locate,
        },
        merkle::MerkleTree,
        proof::WithdrawProof,
        secret::Secret,
        witness::{
            WithdrawParams,
            WithdrawWitness,
        },
    },
    ports::{
        ledger::Ledger,
        prover::{
            Prover,
            ProverError,
        },
    },
    withdrawal::WithdrawalError,
};

/// Build the withdraw witness against the ledger's current state.
///
/// Checks run in a fixed order: root known, nullifier unspent, commitment
/// present. Given the same ledger state the result is identical.
pub async fn build_witness<L: Ledger, H: FieldHasher>(
    ledger: &L,
    tree: &MerkleTree<H>,
    events: &[DepositEvent],
    secret: &Secret,
    params: &WithdrawParams,
) -> Result<WithdrawWitness, WithdrawalError> {
    let root = tree.root();
    if !ledger.is_known_root(root).await? {
        return Err(WithdrawalError::StaleRoot(root));
    }

    let nullifier_hash = secret.nullifier_hash_with::<H>();
    if ledger.is_spent(nullifier_hash.0).await? {
        return Err(WithdrawalError::AlreadySpent(nullifier_hash.0));
    }

    let commitment = secret.commitment_with::<H>();
    let leaf_index =
        locate(events, &commitment).ok_or(WithdrawalError::CommitmentNotFound(commitment))?;

    let path = tree.path(u64::from(leaf_index))?;
    debug_assert_eq!(path.compute_root::<H>(commitment.0), root);
    debug!(leaf_index, %root, "inclusion path built");

    Ok(WithdrawWitness::new_with::<H>(secret, path, params))
}

/// Run the prover once. No retries.
pub async fn prove<P: Prover>(
    prover: &P,
    witness: &WithdrawWitness,
) -> Result<WithdrawProof, ProverError> {
    let started = Instant::now();
    let proof = prover.prove_withdraw(witness).await?;

    if proof.public_inputs != witness.public {
        return Err(ProverError::PublicInputMismatch(
            "proof public inputs differ from the witness".to_string(),
        ));
    }

    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        proof_bytes = proof.proof.len(),
        "withdraw proof generated"
    );
    Ok(proof)
}

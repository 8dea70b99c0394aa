use std::{
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};

use alloy::primitives::{
    Address,
    B256,
    U256,
};
use serde::{
    Deserialize,
    Serialize,
};
use tokio::process::Command;

use crate::{
    config::ProverConfig,
    domain::{
        proof::{
            Groth16Proof,
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

/// Format a field element as the decimal string circom expects.
fn format_field(value: &B256) -> String {
    U256::from_be_bytes(value.0).to_string()
}

fn format_address(addr: &Address) -> String {
    U256::from_be_slice(addr.as_slice()).to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawCircuitInput {
    root: String,
    nullifier_hash: String,
    recipient: String,
    relayer: String,
    fee: String,
    refund: String,
    nullifier: String,
    secret: String,
    path_elements: Vec<String>,
    path_indices: Vec<u8>,
}

impl From<&WithdrawWitness> for WithdrawCircuitInput {
    fn from(w: &WithdrawWitness) -> Self {
        Self {
            root: format_field(&w.public.root),
            nullifier_hash: format_field(&w.public.nullifier_hash),
            recipient: format_address(&w.public.recipient),
            relayer: format_address(&w.public.relayer),
            fee: w.public.fee.to_string(),
            refund: w.public.refund.to_string(),
            nullifier: w.private.nullifier.to_string(),
            secret: w.private.secret.to_string(),
            path_elements: w.private.path_elements.iter().map(format_field).collect(),
            path_indices: w.private.path_index.clone(),
        }
    }
}

/// The `proof.json` snarkjs writes. Points are projective, the last
/// coordinate is dropped.
#[derive(Debug, Deserialize)]
struct SnarkjsProof {
    pi_a: Vec<String>,
    pi_b: Vec<Vec<String>>,
    pi_c: Vec<String>,
}

fn parse_u256(value: &str) -> Result<U256, ProverError> {
    value
        .parse()
        .map_err(|e| ProverError::SerializationError(format!("invalid field `{value}`: {e}")))
}

fn parse_pair(coords: &[String]) -> Result<[U256; 2], ProverError> {
    match coords {
        [x, y, ..] => Ok([parse_u256(x)?, parse_u256(y)?]),
        _ => Err(ProverError::SerializationError(format!(
            "expected at least 2 coordinates, got {}",
            coords.len()
        ))),
    }
}

impl TryFrom<SnarkjsProof> for Groth16Proof {
    type Error = ProverError;

    fn try_from(p: SnarkjsProof) -> Result<Self, Self::Error> {
        let b = match p.pi_b.as_slice() {
            [x, y, ..] => [parse_pair(x)?, parse_pair(y)?],
            _ => {
                return Err(ProverError::SerializationError(
                    "pi_b must have at least 2 points".to_string(),
                ));
            }
        };

        Ok(Self {
            a: parse_pair(&p.pi_a)?,
            b,
            c: parse_pair(&p.pi_c)?,
        })
    }
}

/// Check `public.json` against the inputs the proof was requested for.
fn check_public_signals(
    signals: &[String],
    expected: &WithdrawPublicInputs,
) -> Result<(), ProverError> {
    let expected = [
        ("root", format_field(&expected.root)),
        ("nullifierHash", format_field(&expected.nullifier_hash)),
        ("recipient", format_address(&expected.recipient)),
        ("relayer", format_address(&expected.relayer)),
        ("fee", expected.fee.to_string()),
        ("refund", expected.refund.to_string()),
    ];

    if signals.len() != expected.len() {
        return Err(ProverError::PublicInputMismatch(format!(
            "expected {} public signals, got {}",
            expected.len(),
            signals.len()
        )));
    }

    for (signal, (name, want)) in signals.iter().zip(expected) {
        if parse_u256(signal)? != parse_u256(&want)? {
            return Err(ProverError::PublicInputMismatch(format!(
                "{name}: prover returned {signal}, expected {want}"
            )));
        }
    }
    Ok(())
}

/// SnarkjsProver generates Groth16 proofs by shelling out to `snarkjs`.
///
/// Each call:
/// 1. Writes `input.json` into a fresh temporary directory
/// 2. Runs `snarkjs groth16 fullprove` against the circuit wasm and zkey
/// 3. Reads `proof.json` and `public.json` back
///
/// The child process is killed if the call is dropped or times out.
pub struct SnarkjsProver {
    snarkjs_bin: PathBuf,
    circuit_wasm: PathBuf,
    proving_key: PathBuf,
    timeout: Duration,
}

impl SnarkjsProver {
    pub fn new(
        snarkjs_bin: impl Into<PathBuf>,
        circuit_wasm: impl Into<PathBuf>,
        proving_key: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            snarkjs_bin: snarkjs_bin.into(),
            circuit_wasm: circuit_wasm.into(),
            proving_key: proving_key.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ProverConfig) -> Self {
        Self::new(
            &config.snarkjs_bin,
            &config.circuit_wasm,
            &config.proving_key,
            config.timeout,
        )
    }

    async fn fullprove(&self, dir: &Path) -> Result<(), ProverError> {
        let mut command = Command::new(&self.snarkjs_bin);
        command
            .arg("groth16")
            .arg("fullprove")
            .arg(dir.join("input.json"))
            .arg(&self.circuit_wasm)
            .arg(&self.proving_key)
            .arg(dir.join("proof.json"))
            .arg(dir.join("public.json"))
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => return Err(ProverError::Timeout(self.timeout)),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProverError::BinaryNotFound(
                    self.snarkjs_bin.display().to_string(),
                ));
            }
            Ok(result) => result?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProverError::ProofGenerationError(format!(
                "snarkjs fullprove failed: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl Prover for SnarkjsProver {
    async fn prove_withdraw(&self, witness: &WithdrawWitness) -> Result<WithdrawProof, ProverError> {
        let input = serde_json::to_vec(&WithdrawCircuitInput::from(witness))
            .map_err(|e| ProverError::SerializationError(e.to_string()))?;

        let dir = tempfile::tempdir()?;
        tokio::fs::write(dir.path().join("input.json"), input).await?;

        tracing::debug!(
            leaf_index = witness.leaf_index,
            dir = %dir.path().display(),
            "running snarkjs groth16 fullprove"
        );
        self.fullprove(dir.path()).await?;

        let proof: SnarkjsProof = read_json(&dir.path().join("proof.json")).await?;
        let signals: Vec<String> = read_json(&dir.path().join("public.json")).await?;
        check_public_signals(&signals, &witness.public)?;

        let proof = Groth16Proof::try_from(proof)?;
        Ok(WithdrawProof::new(proof.to_solidity_bytes(), witness.public))
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ProverError> {
    let bytes = tokio::fs::read(path).await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ProverError::SerializationError(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        merkle::MerkleTree,
        secret::Secret,
        witness::WithdrawParams,
    };

    fn witness() -> WithdrawWitness {
        let secret = Secret::new(U256::from(11u64), U256::from(22u64)).unwrap();
        let tree: MerkleTree = MerkleTree::build(4, vec![secret.commitment().0]).unwrap();
        let params = WithdrawParams::new(Address::repeat_byte(0x01))
            .with_relayer(Address::repeat_byte(0x02), U256::from(3u64));
        WithdrawWitness::new(&secret, tree.path(0).unwrap(), &params)
    }

    fn public_json(w: &WithdrawWitness) -> String {
        let p = &w.public;
        serde_json::to_string(&[
            format_field(&p.root),
            format_field(&p.nullifier_hash),
            format_address(&p.recipient),
            format_address(&p.relayer),
            p.fee.to_string(),
            p.refund.to_string(),
        ])
        .unwrap()
    }

    const PROOF_JSON: &str = r#"{
        "pi_a": ["1", "2", "1"],
        "pi_b": [["3", "4"], ["5", "6"], ["1", "0"]],
        "pi_c": ["7", "8", "1"],
        "protocol": "groth16",
        "curve": "bn128"
    }"#;

    #[test]
    fn test_circuit_input_uses_circom_names() {
        let w = witness();
        let json = serde_json::to_value(WithdrawCircuitInput::from(&w)).unwrap();

        for key in [
            "root",
            "nullifierHash",
            "recipient",
            "relayer",
            "fee",
            "refund",
            "nullifier",
            "secret",
            "pathElements",
            "pathIndices",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["nullifier"], "11");
        assert_eq!(json["fee"], "3");
        assert_eq!(json["pathElements"].as_array().unwrap().len(), 4);
        assert_eq!(json["pathIndices"], serde_json::json!([0, 0, 0, 0]));
    }

    #[test]
    fn test_parse_snarkjs_proof() {
        let parsed: SnarkjsProof = serde_json::from_str(PROOF_JSON).unwrap();
        let proof = Groth16Proof::try_from(parsed).unwrap();
        assert_eq!(proof.a, [U256::from(1u64), U256::from(2u64)]);
        assert_eq!(proof.b[1], [U256::from(5u64), U256::from(6u64)]);
        assert_eq!(proof.c, [U256::from(7u64), U256::from(8u64)]);
    }

    #[test]
    fn test_public_signal_mismatch() {
        let w = witness();
        let mut signals: Vec<String> = serde_json::from_str(&public_json(&w)).unwrap();
        assert!(check_public_signals(&signals, &w.public).is_ok());

        signals[4] = "4".to_string();
        assert!(matches!(
            check_public_signals(&signals, &w.public),
            Err(ProverError::PublicInputMismatch(msg)) if msg.starts_with("fee")
        ));

        signals.pop();
        assert!(matches!(
            check_public_signals(&signals, &w.public),
            Err(ProverError::PublicInputMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let prover = SnarkjsProver::new(
            "/nonexistent/snarkjs",
            "withdraw.wasm",
            "withdraw.zkey",
            Duration::from_secs(5),
        );
        assert!(matches!(
            prover.prove_withdraw(&witness()).await,
            Err(ProverError::BinaryNotFound(_))
        ));
    }

    #[cfg(unix)]
    fn fake_snarkjs(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("snarkjs");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fullprove_roundtrip_with_fake_binary() {
        let w = witness();
        let bin_dir = tempfile::tempdir().unwrap();
        // $6 and $7 are the proof.json and public.json paths
        let body = format!(
            "cat > \"$6\" <<'EOF'\n{PROOF_JSON}\nEOF\nprintf '%s' '{}' > \"$7\"",
            public_json(&w)
        );
        let bin = fake_snarkjs(bin_dir.path(), &body);

        let prover = SnarkjsProver::new(bin, "withdraw.wasm", "withdraw.zkey", Duration::from_secs(10));
        let proof = prover.prove_withdraw(&w).await.unwrap();

        assert_eq!(proof.public_inputs, w.public);
        assert_eq!(proof.proof.len(), 256);
        assert_eq!(U256::from_be_slice(&proof.proof[64..96]), U256::from(4u64));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_run_surfaces_stderr() {
        let bin_dir = tempfile::tempdir().unwrap();
        let bin = fake_snarkjs(bin_dir.path(), "echo 'Error: Assert Failed' >&2\nexit 1");

        let prover = SnarkjsProver::new(bin, "withdraw.wasm", "withdraw.zkey", Duration::from_secs(10));
        assert!(matches!(
            prover.prove_withdraw(&witness()).await,
            Err(ProverError::ProofGenerationError(msg)) if msg.contains("Assert Failed")
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout() {
        let bin_dir = tempfile::tempdir().unwrap();
        let bin = fake_snarkjs(bin_dir.path(), "sleep 5");

        let prover = SnarkjsProver::new(bin, "withdraw.wasm", "withdraw.zkey", Duration::from_millis(100));
        assert!(matches!(
            prover.prove_withdraw(&witness()).await,
            Err(ProverError::Timeout(_))
        ));
    }
}

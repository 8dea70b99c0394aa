use alloy::{
    hex,
    primitives::{
        Address,
        B256,
        Bytes,
        U256,
    },
};
use serde::{
    Deserialize,
    Serialize,
};

use super::witness::WithdrawPublicInputs;

/// A Groth16 proof over BN254 with coordinates in prover order.
///
/// `b` holds G2 coordinates as `[c0, c1]` pairs, the way snarkjs emits them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Groth16Proof {
    pub a: [U256; 2],
    pub b: [[U256; 2]; 2],
    pub c: [U256; 2],
}

impl Groth16Proof {
    /// 256-byte calldata layout expected by the Solidity verifier:
    /// `a.x a.y b.x.c1 b.x.c0 b.y.c1 b.y.c0 c.x c.y`.
    pub fn to_solidity_bytes(&self) -> Bytes {
        let words = [
            self.a[0],
            self.a[1],
            self.b[0][1],
            self.b[0][0],
            self.b[1][1],
            self.b[1][0],
            self.c[0],
            self.c[1],
        ];

        let mut out = Vec::with_capacity(words.len() * 32);
        for word in words {
            out.extend_from_slice(&word.to_be_bytes::<32>());
        }
        Bytes::from(out)
    }
}

/// ZK proof output for the withdraw circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawProof {
    /// The serialized proof bytes
    pub proof: Bytes,
    pub public_inputs: WithdrawPublicInputs,
}

impl WithdrawProof {
    pub fn new(proof: Bytes, public_inputs: WithdrawPublicInputs) -> Self {
        Self {
            proof,
            public_inputs,
        }
    }

    pub fn to_call_args(&self) -> WithdrawCallArgs {
        let p = &self.public_inputs;
        WithdrawCallArgs {
            proof: self.proof.clone(),
            root: p.root,
            nullifier_hash: p.nullifier_hash,
            recipient: p.recipient,
            relayer: p.relayer,
            fee: p.fee,
            refund: p.refund,
        }
    }
}

/// Arguments of `withdraw(proof, root, nullifierHash, recipient, relayer, fee, refund)`.
///
/// Field order is the verifier's parameter order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawCallArgs {
    pub proof: Bytes,
    pub root: B256,
    pub nullifier_hash: B256,
    pub recipient: Address,
    pub relayer: Address,
    pub fee: U256,
    pub refund: U256,
}

impl WithdrawCallArgs {
    /// The six public arguments as fixed-width `0x` hex: 32 bytes for field
    /// elements and amounts, 20 bytes for addresses.
    pub fn hex_args(&self) -> [String; 6] {
        [
            hex::encode_prefixed(self.root),
            hex::encode_prefixed(self.nullifier_hash),
            hex::encode_prefixed(self.recipient),
            hex::encode_prefixed(self.relayer),
            hex::encode_prefixed(self.fee.to_be_bytes::<32>()),
            hex::encode_prefixed(self.refund.to_be_bytes::<32>()),
        ]
    }
}

use std::fmt;

use alloy::primitives::{
    Address,
    B256,
    U256,
};
use serde::{
    Deserialize,
    Serialize,
};

use super::{
    merkle::InclusionPath,
    secret::Secret,
};
use crate::crypto::hasher::{
    FieldHasher,
    PoseidonHasher,
};

/// Caller-chosen public parameters of a withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawParams {
    pub recipient: Address,
    /// Relayer paid `fee` out of the denomination; zero when self-relaying.
    pub relayer: Address,
    pub fee: U256,
    /// Native asset forwarded to the recipient on token instances.
    pub refund: U256,
}

impl WithdrawParams {
    pub fn new(recipient: Address) -> Self {
        Self {
            recipient,
            relayer: Address::ZERO,
            fee: U256::ZERO,
            refund: U256::ZERO,
        }
    }

    pub fn with_relayer(mut self, relayer: Address, fee: U256) -> Self {
        self.relayer = relayer;
        self.fee = fee;
        self
    }

    pub fn with_refund(mut self, refund: U256) -> Self {
        self.refund = refund;
        self
    }
}

/// Public inputs of the withdraw circuit, in circuit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawPublicInputs {
    pub root: B256,
    pub nullifier_hash: B256,
    pub recipient: Address,
    pub relayer: Address,
    pub fee: U256,
    pub refund: U256,
}

impl WithdrawPublicInputs {
    /// The public inputs as field words, in circuit order.
    pub fn as_array(&self) -> [B256; 6] {
        [
            self.root,
            self.nullifier_hash,
            B256::left_padding_from(self.recipient.as_slice()),
            B256::left_padding_from(self.relayer.as_slice()),
            self.fee.into(),
            self.refund.into(),
        ]
    }
}

/// Private inputs of the withdraw circuit.
#[derive(Clone, PartialEq, Eq)]
pub struct WithdrawPrivateInputs {
    pub nullifier: U256,
    pub secret: U256,
    pub path_elements: Vec<B256>,
    pub path_index: Vec<u8>,
}

impl fmt::Debug for WithdrawPrivateInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WithdrawPrivateInputs")
            .field("path_elements", &self.path_elements)
            .field("path_index", &self.path_index)
            .finish_non_exhaustive()
    }
}

/// Witness (public + private inputs) for the withdraw circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawWitness {
    pub public: WithdrawPublicInputs,
    pub private: WithdrawPrivateInputs,
    /// Leaf the path was taken for. Not a circuit input.
    pub leaf_index: u64,
}

impl WithdrawWitness {
    pub fn new(secret: &Secret, path: InclusionPath, params: &WithdrawParams) -> Self {
        Self::new_with::<PoseidonHasher>(secret, path, params)
    }

    /// Assemble a witness whose nullifier hash is computed with `H`.
    pub fn new_with<H: FieldHasher>(
        secret: &Secret,
        path: InclusionPath,
        params: &WithdrawParams,
    ) -> Self {
        Self {
            public: WithdrawPublicInputs {
                root: path.root,
                nullifier_hash: secret.nullifier_hash_with::<H>().0,
                recipient: params.recipient,
                relayer: params.relayer,
                fee: params.fee,
                refund: params.refund,
            },
            private: WithdrawPrivateInputs {
                nullifier: secret.nullifier(),
                secret: secret.secret(),
                path_elements: path.path_elements,
                path_index: path.path_index,
            },
            leaf_index: path.leaf_index,
        }
    }
}

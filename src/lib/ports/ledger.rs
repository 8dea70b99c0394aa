use std::{
    future::Future,
    sync::Arc,
};

use alloy::primitives::{
    B256,
    U256,
};
use thiserror::Error;

use crate::domain::{
    commitment::Commitment,
    deposit_log::DepositEvent,
    proof::WithdrawCallArgs,
};

/// Transaction receipt information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    /// Transaction hash
    pub tx_hash: B256,
    /// Block number
    pub block_number: u64,
    /// Gas used
    pub gas_used: u64,
    /// Whether the transaction succeeded
    pub success: bool,
}

/// What a revert message means for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertKind {
    /// Someone else spent the nullifier first.
    NullifierSpent,
    /// The root fell out of the contract's history.
    UnknownRoot,
    /// The verifier rejected the proof.
    InvalidProof,
    /// Fee, refund or value don't satisfy the contract's checks.
    InvalidRequest,
    Other,
}

/// A ledger revert, message kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevertReason {
    pub message: String,
    pub kind: RevertKind,
}

impl RevertReason {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();

        let kind = if lower.contains("already spent") {
            RevertKind::NullifierSpent
        } else if lower.contains("merkle root") {
            RevertKind::UnknownRoot
        } else if lower.contains("invalid withdraw proof") {
            RevertKind::InvalidProof
        } else if lower.contains("fee exceeds")
            || lower.contains("supposed to be zero")
            || lower.contains("refund")
            || lower.contains("denomination")
        {
            RevertKind::InvalidRequest
        } else {
            RevertKind::Other
        };

        Self { message, kind }
    }

    /// The request was valid but another withdrawal got there first.
    pub fn is_race_lost(&self) -> bool {
        matches!(self.kind, RevertKind::NullifierSpent | RevertKind::UnknownRoot)
    }
}

impl std::fmt::Display for RevertReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Errors that can occur during ledger interactions.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Transaction reverted: {0}")]
    Reverted(RevertReason),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Signer error: {0}")]
    Signer(String),

    #[error("no signer configured, ledger is read-only")]
    ReadOnly,
}

/// Port for the mixer instance on the ledger.
///
/// Implementations:
/// - `EthereumRpc` (alloy)
/// - `MemoryLedger` for tests and offline runs
pub trait Ledger: Send + Sync {
    /// All `Deposit` events in `[from_block, to_block]`, `None` meaning latest.
    fn get_deposit_events(
        &self,
        from_block: u64,
        to_block: Option<u64>,
    ) -> impl Future<Output = Result<Vec<DepositEvent>, LedgerError>> + Send;

    /// Check if a root is in the contract's root history.
    fn is_known_root(
        &self,
        root: B256,
    ) -> impl Future<Output = Result<bool, LedgerError>> + Send;

    /// Check if a nullifier hash has been spent.
    fn is_spent(
        &self,
        nullifier_hash: B256,
    ) -> impl Future<Output = Result<bool, LedgerError>> + Send;

    /// Deposit a commitment, sending `value` along.
    fn submit_deposit(
        &self,
        commitment: Commitment,
        value: U256,
    ) -> impl Future<Output = Result<TxReceipt, LedgerError>> + Send;

    /// Submit a withdrawal, sending `value` (the refund) along.
    fn submit_withdrawal(
        &self,
        args: &WithdrawCallArgs,
        value: U256,
    ) -> impl Future<Output = Result<TxReceipt, LedgerError>> + Send;
}

impl<T: Ledger> Ledger for Arc<T> {
    fn get_deposit_events(
        &self,
        from_block: u64,
        to_block: Option<u64>,
    ) -> impl Future<Output = Result<Vec<DepositEvent>, LedgerError>> + Send {
        (**self).get_deposit_events(from_block, to_block)
    }

    fn is_known_root(
        &self,
        root: B256,
    ) -> impl Future<Output = Result<bool, LedgerError>> + Send {
        (**self).is_known_root(root)
    }

    fn is_spent(
        &self,
        nullifier_hash: B256,
    ) -> impl Future<Output = Result<bool, LedgerError>> + Send {
        (**self).is_spent(nullifier_hash)
    }

    fn submit_deposit(
        &self,
        commitment: Commitment,
        value: U256,
    ) -> impl Future<Output = Result<TxReceipt, LedgerError>> + Send {
        (**self).submit_deposit(commitment, value)
    }

    fn submit_withdrawal(
        &self,
        args: &WithdrawCallArgs,
        value: U256,
    ) -> impl Future<Output = Result<TxReceipt, LedgerError>> + Send {
        (**self).submit_withdrawal(args, value)
    }
}

//! Withdrawal orchestration: note in, confirmed (or rejected) withdrawal out.

use std::{
    fmt,
    sync::atomic::{
        AtomicBool,
        Ordering,
    },
};

use alloy::primitives::{
    B256,
    U256,
};
use tokio::sync::Notify;
use tracing::{
    debug,
    info,
    warn,
};

use crate::{
    assembler,
    crypto::hasher::PoseidonHasher,
    domain::{
        commitment::Commitment,
        deposit_log::{
            DepositEvent,
            ReconstructError,
            locate,
            reconstruct,
        },
        merkle::{
            MerkleError,
            MerkleTree,
        },
        note::{
            Note,
            NoteFormatError,
        },
        witness::{
            WithdrawParams,
            WithdrawWitness,
        },
    },
    ports::{
        ledger::{
            Ledger,
            LedgerError,
            RevertReason,
            TxReceipt,
        },
        prover::{
            Prover,
            ProverError,
        },
    },
};

/// Error type for a deposit or withdrawal attempt.
#[derive(Debug, thiserror::Error)]
pub enum WithdrawalError {
    #[error("invalid note: {0}")]
    Format(#[from] NoteFormatError),

    #[error("note {field} is `{found}` but the instance is `{expected}`")]
    InstanceMismatch {
        field: &'static str,
        expected: String,
        found: String,
    },

    #[error("configured denomination {configured} differs from the instance's {on_chain}")]
    DenominationMismatch { configured: U256, on_chain: U256 },

    #[error("refund must be zero on a native-currency instance")]
    NonZeroRefund,

    #[error("fee {fee} exceeds the denomination {denomination}")]
    FeeExceedsDenomination { fee: U256, denomination: U256 },

    #[error("tree reconstruction failed: {0}")]
    Reconstruct(#[from] ReconstructError),

    #[error("merkle error: {0}")]
    Merkle(#[from] MerkleError),

    #[error("root {0} is not in the ledger's root history")]
    StaleRoot(B256),

    #[error("nullifier hash {0} has already been spent")]
    AlreadySpent(B256),

    #[error("commitment {0} not found in the deposit log")]
    CommitmentNotFound(Commitment),

    #[error("prover error: {0}")]
    Prover(#[from] ProverError),

    #[error("ledger rejected the withdrawal: {0}")]
    Reverted(RevertReason),

    #[error("ledger error: {0}")]
    Ledger(LedgerError),

    #[error("cancelled")]
    Cancelled,
}

impl From<LedgerError> for WithdrawalError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Reverted(reason) => Self::Reverted(reason),
            other => Self::Ledger(other),
        }
    }
}

/// Pipeline states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WithdrawalState {
    Parsed,
    Validated,
    Proving,
    Proven,
    Submitted,
    Confirmed,
    Rejected,
}

impl fmt::Display for WithdrawalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parsed => "parsed",
            Self::Validated => "validated",
            Self::Proving => "proving",
            Self::Proven => "proven",
            Self::Submitted => "submitted",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Final result of [`Tornado::withdraw`].
#[derive(Debug)]
pub enum WithdrawalOutcome {
    Confirmed {
        receipt: TxReceipt,
        nullifier_hash: B256,
        root: B256,
    },
    Rejected {
        /// Last state reached; `None` if the note didn't parse.
        failed_at: Option<WithdrawalState>,
        reason: WithdrawalError,
    },
}

impl WithdrawalOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }
}

/// Result of a successful deposit. The note is the only way to withdraw.
#[derive(Debug)]
pub struct DepositReceipt {
    pub note: Note,
    pub commitment: Commitment,
    /// Leaf index from the `Deposit` event, if it could be read back.
    pub leaf_index: Option<u32>,
    pub receipt: TxReceipt,
}

/// Caller-held cancellation flag.
///
/// Cancelling before or during proving aborts the attempt. Once the
/// withdrawal has been submitted it is ignored.
#[derive(Debug, Default)]
pub struct CancelSignal {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// The instance a client is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceConfig {
    pub network_id: u64,
    pub currency: String,
    pub amount: String,
    /// Amount in base units the contract holds per deposit.
    pub denomination: U256,
    pub merkle_tree_height: usize,
    /// Block to start event scans from.
    pub deployment_block: u64,
    /// Native-currency instance: deposits carry value, refunds must be zero.
    pub native: bool,
}

impl InstanceConfig {
    /// Check the configured denomination against the one the ledger reports.
    pub fn verify_denomination(&self, on_chain: U256) -> Result<(), WithdrawalError> {
        if self.denomination != on_chain {
            return Err(WithdrawalError::DenominationMismatch {
                configured: self.denomination,
                on_chain,
            });
        }
        Ok(())
    }
}

/// Withdrawal orchestrator for a single mixer instance.
///
/// Generic over `Ledger` (instance contract) and `Prover` (withdraw circuit).
/// Holds no per-withdrawal state, so one value can serve concurrent calls.
pub struct Tornado<L: Ledger, P: Prover> {
    ledger: L,
    prover: P,
    instance: InstanceConfig,
}

impl<L: Ledger, P: Prover> Tornado<L, P> {
    pub fn new(ledger: L, prover: P, instance: InstanceConfig) -> Self {
        Self {
            ledger,
            prover,
            instance,
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn instance(&self) -> &InstanceConfig {
        &self.instance
    }

    /// Deposit into the instance with a fresh secret.
    ///
    /// `currency` and `amount` must name this instance. If the submission
    /// fails the note is lost with the error; callers that must keep it
    /// whatever happens use [`new_note`](Self::new_note) and
    /// [`submit_deposit`](Self::submit_deposit).
    pub async fn deposit(
        &self,
        currency: &str,
        amount: &str,
    ) -> Result<DepositReceipt, WithdrawalError> {
        let note = self.new_note(currency, amount)?;
        self.submit_deposit(note).await
    }

    /// Generate a note for this instance without touching the ledger.
    pub fn new_note(&self, currency: &str, amount: &str) -> Result<Note, WithdrawalError> {
        self.check_denomination(currency, amount)?;
        Ok(Note::random(
            self.instance.currency.clone(),
            self.instance.amount.clone(),
            self.instance.network_id,
        )?)
    }

    /// Submit the commitment of `note`.
    ///
    /// Reading back the leaf index is best effort: once the deposit is mined
    /// a failed event query only leaves `leaf_index` empty.
    pub async fn submit_deposit(&self, note: Note) -> Result<DepositReceipt, WithdrawalError> {
        self.check_instance(&note)?;

        let commitment = note.commitment();
        let value = if self.instance.native {
            self.instance.denomination
        } else {
            U256::ZERO
        };

        info!(%commitment, "submitting deposit");
        let receipt = self.ledger.submit_deposit(commitment, value).await?;

        let leaf_index = match self
            .ledger
            .get_deposit_events(receipt.block_number, Some(receipt.block_number))
            .await
        {
            Ok(events) => locate(&events, &commitment),
            Err(err) => {
                warn!(%commitment, %err, "deposit mined but its event could not be read");
                None
            }
        };
        info!(
            tx_hash = %receipt.tx_hash,
            block = receipt.block_number,
            leaf_index = ?leaf_index,
            "deposit confirmed"
        );

        Ok(DepositReceipt {
            note,
            commitment,
            leaf_index,
            receipt,
        })
    }

    /// Rebuild the instance's tree from its full deposit log.
    pub async fn load_tree(&self) -> Result<(MerkleTree, Vec<DepositEvent>), WithdrawalError> {
        let events = self
            .ledger
            .get_deposit_events(self.instance.deployment_block, None)
            .await?;
        let tree = reconstruct::<PoseidonHasher>(self.instance.merkle_tree_height, &events)?;
        debug!(leaves = tree.len(), root = %tree.root(), "tree reconstructed");
        Ok((tree, events))
    }

    /// Build the witness for a note without proving it.
    pub async fn prepare(
        &self,
        note: &Note,
        params: &WithdrawParams,
    ) -> Result<WithdrawWitness, WithdrawalError> {
        self.validate(note, params)?;
        let (tree, events) = self.load_tree().await?;
        assembler::build_witness(&self.ledger, &tree, &events, note.secret(), params).await
    }

    /// Withdraw the deposit behind `note` to `params.recipient`.
    ///
    /// Every failure is reported as [`WithdrawalOutcome::Rejected`] with the
    /// last state reached.
    pub async fn withdraw(
        &self,
        note: &str,
        params: WithdrawParams,
        cancel: &CancelSignal,
    ) -> WithdrawalOutcome {
        let mut reached = None;
        match self.run_withdraw(note, &params, cancel, &mut reached).await {
            Ok(outcome) => outcome,
            Err(reason) => {
                match &reason {
                    WithdrawalError::Reverted(revert) if revert.is_race_lost() => {
                        warn!(failed_at = ?reached, %revert, "withdrawal lost a race")
                    }
                    _ => warn!(failed_at = ?reached, %reason, "withdrawal rejected"),
                }
                debug!(from = ?reached, to = %WithdrawalState::Rejected, "transition");
                WithdrawalOutcome::Rejected {
                    failed_at: reached,
                    reason,
                }
            }
        }
    }

    async fn run_withdraw(
        &self,
        note: &str,
        params: &WithdrawParams,
        cancel: &CancelSignal,
        reached: &mut Option<WithdrawalState>,
    ) -> Result<WithdrawalOutcome, WithdrawalError> {
        let note = Note::decode(note)?;
        let nullifier_hash = note.nullifier_hash().0;
        transition(reached, WithdrawalState::Parsed);
        info!(commitment = %note.commitment(), %nullifier_hash, "note parsed");

        let witness = self.prepare(&note, params).await?;
        let root = witness.public.root;
        transition(reached, WithdrawalState::Validated);
        info!(leaf_index = witness.leaf_index, %root, "witness ready");

        if cancel.is_cancelled() {
            return Err(WithdrawalError::Cancelled);
        }

        transition(reached, WithdrawalState::Proving);
        let proof = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WithdrawalError::Cancelled),
            proof = assembler::prove(&self.prover, &witness) => proof?,
        };

        if cancel.is_cancelled() {
            return Err(WithdrawalError::Cancelled);
        }
        transition(reached, WithdrawalState::Proven);

        let args = proof.to_call_args();
        transition(reached, WithdrawalState::Submitted);
        info!(
            recipient = %args.recipient,
            relayer = %args.relayer,
            fee = %args.fee,
            refund = %args.refund,
            "submitting withdrawal"
        );
        let receipt = self.ledger.submit_withdrawal(&args, args.refund).await?;
        if !receipt.success {
            return Err(WithdrawalError::Reverted(RevertReason::new(
                "withdraw transaction failed",
            )));
        }

        transition(reached, WithdrawalState::Confirmed);
        info!(tx_hash = %receipt.tx_hash, block = receipt.block_number, "withdrawal confirmed");

        Ok(WithdrawalOutcome::Confirmed {
            receipt,
            nullifier_hash,
            root,
        })
    }

    /// Checks that need neither the ledger nor the prover.
    fn validate(&self, note: &Note, params: &WithdrawParams) -> Result<(), WithdrawalError> {
        self.check_instance(note)?;

        if self.instance.native && !params.refund.is_zero() {
            return Err(WithdrawalError::NonZeroRefund);
        }
        if params.fee > self.instance.denomination {
            return Err(WithdrawalError::FeeExceedsDenomination {
                fee: params.fee,
                denomination: self.instance.denomination,
            });
        }
        Ok(())
    }

    fn check_instance(&self, note: &Note) -> Result<(), WithdrawalError> {
        if note.network_id() != self.instance.network_id {
            return Err(WithdrawalError::InstanceMismatch {
                field: "network id",
                expected: self.instance.network_id.to_string(),
                found: note.network_id().to_string(),
            });
        }
        self.check_denomination(note.currency(), note.amount())
    }

    fn check_denomination(&self, currency: &str, amount: &str) -> Result<(), WithdrawalError> {
        if !currency.eq_ignore_ascii_case(&self.instance.currency) {
            return Err(WithdrawalError::InstanceMismatch {
                field: "currency",
                expected: self.instance.currency.clone(),
                found: currency.to_string(),
            });
        }
        if amount != self.instance.amount {
            return Err(WithdrawalError::InstanceMismatch {
                field: "amount",
                expected: self.instance.amount.clone(),
                found: amount.to_string(),
            });
        }
        Ok(())
    }
}

fn transition(reached: &mut Option<WithdrawalState>, next: WithdrawalState) {
    debug!(from = ?reached, to = %next, "transition");
    *reached = Some(next);
}

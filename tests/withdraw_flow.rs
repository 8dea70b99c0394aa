//! End-to-end withdrawal flow against the in-memory ledger.
//!
//! The mock prover stands in for snarkjs; the ledger accepts only proofs it
//! produced for the same public arguments, so a tampered call still fails.

use std::sync::{
    Arc,
    atomic::{
        AtomicBool,
        Ordering,
    },
};

use alloy::primitives::{
    Address,
    B256,
    U256,
};

use tornado_client::{
    adapters::{
        memory_ledger::MemoryLedger,
        mock_prover::MockProver,
    },
    domain::{
        commitment::Commitment,
        deposit_log::DepositEvent,
        note::Note,
        proof::{
            WithdrawCallArgs,
            WithdrawProof,
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
            RevertKind,
            TxReceipt,
        },
        prover::{
            Prover,
            ProverError,
        },
    },
    withdrawal::{
        CancelSignal,
        InstanceConfig,
        Tornado,
        WithdrawalError,
        WithdrawalOutcome,
        WithdrawalState,
    },
};

const HEIGHT: usize = 20;

fn denomination() -> U256 {
    U256::from(10u64).pow(U256::from(17u64))
}

fn instance(native: bool) -> InstanceConfig {
    InstanceConfig {
        network_id: 1337,
        currency: if native { "eth" } else { "dai" }.to_string(),
        amount: "0.1".to_string(),
        denomination: denomination(),
        merkle_tree_height: HEIGHT,
        deployment_block: 0,
        native,
    }
}

struct Harness {
    ledger: Arc<MemoryLedger>,
    prover: Arc<MockProver>,
    tornado: Tornado<Arc<MemoryLedger>, Arc<MockProver>>,
}

fn harness(native: bool) -> Harness {
    let ledger = Arc::new(MemoryLedger::new(HEIGHT, denomination(), native).unwrap());
    let prover = Arc::new(MockProver::new());
    let tornado = Tornado::new(Arc::clone(&ledger), Arc::clone(&prover), instance(native));
    Harness {
        ledger,
        prover,
        tornado,
    }
}

async fn deposit(h: &Harness) -> Note {
    let instance = h.tornado.instance();
    h.tornado
        .deposit(&instance.currency, &instance.amount)
        .await
        .unwrap()
        .note
}

fn rejection(outcome: WithdrawalOutcome) -> (Option<WithdrawalState>, WithdrawalError) {
    match outcome {
        WithdrawalOutcome::Rejected { failed_at, reason } => (failed_at, reason),
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_deposit_then_withdraw_confirms() {
    let h = harness(true);
    let _before = deposit(&h).await;
    let note = deposit(&h).await;
    let _after = deposit(&h).await;

    let recipient = Address::repeat_byte(0x42);
    let outcome = h
        .tornado
        .withdraw(&note.encode(), WithdrawParams::new(recipient), &CancelSignal::new())
        .await;

    match outcome {
        WithdrawalOutcome::Confirmed {
            receipt,
            nullifier_hash,
            root,
        } => {
            assert!(receipt.success);
            assert_eq!(nullifier_hash, note.nullifier_hash().0);
            assert_eq!(root, h.ledger.root().await);
        }
        other => panic!("expected confirmation, got {other:?}"),
    }

    let withdrawals = h.ledger.withdrawals().await;
    assert_eq!(withdrawals.len(), 1);
    assert_eq!(withdrawals[0].recipient, recipient);
    assert!(h.ledger.is_spent(note.nullifier_hash().0).await.unwrap());
    assert_eq!(h.prover.calls(), 1);
}

#[tokio::test]
async fn test_second_withdraw_is_already_spent_without_proving() {
    let h = harness(true);
    let note = deposit(&h).await.encode();
    let params = WithdrawParams::new(Address::repeat_byte(0x42));

    assert!(h.tornado.withdraw(&note, params, &CancelSignal::new()).await.is_confirmed());
    let (failed_at, reason) = rejection(h.tornado.withdraw(&note, params, &CancelSignal::new()).await);

    assert_eq!(failed_at, Some(WithdrawalState::Parsed));
    assert!(matches!(reason, WithdrawalError::AlreadySpent(_)));
    assert_eq!(h.prover.calls(), 1);
}

#[tokio::test]
async fn test_stale_root_is_rejected_before_proving() {
    let h = harness(true);
    let note = deposit(&h).await.encode();
    h.ledger.expire_root_history().await;

    let (failed_at, reason) = rejection(
        h.tornado
            .withdraw(&note, WithdrawParams::new(Address::ZERO), &CancelSignal::new())
            .await,
    );
    assert_eq!(failed_at, Some(WithdrawalState::Parsed));
    assert!(matches!(reason, WithdrawalError::StaleRoot(_)));
    assert_eq!(h.prover.calls(), 0);
}

#[tokio::test]
async fn test_foreign_note_is_not_found() {
    let h = harness(true);
    deposit(&h).await;
    let stranger = Note::random("eth", "0.1", 1337).unwrap().encode();

    let (_, reason) = rejection(
        h.tornado
            .withdraw(&stranger, WithdrawParams::new(Address::ZERO), &CancelSignal::new())
            .await,
    );
    assert!(matches!(reason, WithdrawalError::CommitmentNotFound(_)));
}

#[tokio::test]
async fn test_out_of_order_event_delivery() {
    let h = harness(true);
    let notes = [deposit(&h).await, deposit(&h).await, deposit(&h).await];
    h.ledger.set_reverse_delivery(true).await;

    let outcome = h
        .tornado
        .withdraw(
            &notes[0].encode(),
            WithdrawParams::new(Address::repeat_byte(0x42)),
            &CancelSignal::new(),
        )
        .await;
    assert!(outcome.is_confirmed());
}

#[tokio::test]
async fn test_witness_is_idempotent() {
    let h = harness(true);
    let note = deposit(&h).await;
    deposit(&h).await;
    let params = WithdrawParams::new(Address::repeat_byte(0x42));

    let first = h.tornado.prepare(&note, &params).await.unwrap();
    let second = h.tornado.prepare(&note, &params).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.leaf_index, 0);
}

#[tokio::test]
async fn test_single_deposit_path_is_zero_levels() {
    let h = harness(true);
    let note = deposit(&h).await;

    let witness = h
        .tornado
        .prepare(&note, &WithdrawParams::new(Address::ZERO))
        .await
        .unwrap();
    let (tree, _) = h.tornado.load_tree().await.unwrap();

    assert_eq!(witness.private.path_elements, tree.zero_levels()[..HEIGHT].to_vec());
    assert_eq!(witness.private.path_index, vec![0u8; HEIGHT]);
}

#[tokio::test]
async fn test_cancelled_withdrawal_submits_nothing() {
    let h = harness(true);
    let note = deposit(&h).await.encode();
    let cancel = CancelSignal::new();
    cancel.cancel();

    let (_, reason) = rejection(
        h.tornado
            .withdraw(&note, WithdrawParams::new(Address::ZERO), &cancel)
            .await,
    );
    assert!(matches!(reason, WithdrawalError::Cancelled));
    assert!(h.ledger.withdrawals().await.is_empty());
    assert!(!h.ledger.is_spent(Note::decode(&note).unwrap().nullifier_hash().0).await.unwrap());
}

#[tokio::test]
async fn test_token_instance_forwards_refund() {
    let h = harness(false);
    let note = deposit(&h).await.encode();
    let refund = U256::from(1_000u64);

    let outcome = h
        .tornado
        .withdraw(
            &note,
            WithdrawParams::new(Address::repeat_byte(0x42)).with_refund(refund),
            &CancelSignal::new(),
        )
        .await;
    assert!(outcome.is_confirmed());
    assert_eq!(h.ledger.withdrawals().await[0].refund, refund);
}

/// A prover during whose run a competing withdrawal lands.
struct RacingProver {
    ledger: Arc<MemoryLedger>,
    inner: MockProver,
}

impl Prover for RacingProver {
    async fn prove_withdraw(&self, witness: &WithdrawWitness) -> Result<WithdrawProof, ProverError> {
        self.ledger.mark_spent(witness.public.nullifier_hash).await;
        self.inner.prove_withdraw(witness).await
    }
}

#[tokio::test]
async fn test_lost_race_surfaces_revert_reason() {
    let ledger = Arc::new(MemoryLedger::new(HEIGHT, denomination(), true).unwrap());
    let prover = RacingProver {
        ledger: Arc::clone(&ledger),
        inner: MockProver::new(),
    };
    let tornado = Tornado::new(Arc::clone(&ledger), prover, instance(true));
    let note = tornado.deposit("eth", "0.1").await.unwrap().note.encode();

    let (failed_at, reason) = rejection(
        tornado
            .withdraw(&note, WithdrawParams::new(Address::repeat_byte(0x42)), &CancelSignal::new())
            .await,
    );

    assert_eq!(failed_at, Some(WithdrawalState::Submitted));
    match reason {
        WithdrawalError::Reverted(revert) => {
            assert_eq!(revert.kind, RevertKind::NullifierSpent);
            assert_eq!(revert.message, "The note has been already spent");
            assert!(revert.is_race_lost());
        }
        other => panic!("expected revert, got {other:?}"),
    }
}

/// A ledger whose event queries time out while `failing` is set.
struct FlakyEvents {
    inner: Arc<MemoryLedger>,
    failing: AtomicBool,
}

impl Ledger for FlakyEvents {
    async fn get_deposit_events(
        &self,
        from_block: u64,
        to_block: Option<u64>,
    ) -> Result<Vec<DepositEvent>, LedgerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LedgerError::Rpc("timeout".into()));
        }
        self.inner.get_deposit_events(from_block, to_block).await
    }

    async fn is_known_root(&self, root: B256) -> Result<bool, LedgerError> {
        self.inner.is_known_root(root).await
    }

    async fn is_spent(&self, nullifier_hash: B256) -> Result<bool, LedgerError> {
        self.inner.is_spent(nullifier_hash).await
    }

    async fn submit_deposit(
        &self,
        commitment: Commitment,
        value: U256,
    ) -> Result<TxReceipt, LedgerError> {
        self.inner.submit_deposit(commitment, value).await
    }

    async fn submit_withdrawal(
        &self,
        args: &WithdrawCallArgs,
        value: U256,
    ) -> Result<TxReceipt, LedgerError> {
        self.inner.submit_withdrawal(args, value).await
    }
}

#[tokio::test]
async fn test_deposit_keeps_note_when_event_read_fails() {
    let inner = Arc::new(MemoryLedger::new(HEIGHT, denomination(), true).unwrap());
    let ledger = Arc::new(FlakyEvents {
        inner: Arc::clone(&inner),
        failing: AtomicBool::new(true),
    });
    let tornado = Tornado::new(Arc::clone(&ledger), MockProver::new(), instance(true));

    let deposit = tornado.deposit("eth", "0.1").await.unwrap();
    assert_eq!(deposit.leaf_index, None);
    assert!(deposit.receipt.success);

    // the deposit landed, and the returned note can still withdraw it
    ledger.failing.store(false, Ordering::SeqCst);
    let events = inner.get_deposit_events(0, None).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].commitment, deposit.commitment);

    let outcome = tornado
        .withdraw(
            &deposit.note.encode(),
            WithdrawParams::new(Address::repeat_byte(0x42)),
            &CancelSignal::new(),
        )
        .await;
    assert!(outcome.is_confirmed());
}

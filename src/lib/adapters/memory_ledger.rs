use std::{
    collections::{
        HashSet,
        VecDeque,
    },
    time::{
        SystemTime,
        UNIX_EPOCH,
    },
};

use alloy::primitives::{
    B256,
    U256,
    keccak256,
};
use tokio::sync::Mutex;

use super::mock_prover;
use crate::{
    domain::{
        commitment::Commitment,
        deposit_log::DepositEvent,
        merkle::{
            MerkleError,
            MerkleTree,
        },
        proof::WithdrawCallArgs,
    },
    ports::ledger::{
        Ledger,
        LedgerError,
        RevertReason,
        TxReceipt,
    },
};

/// Number of recent roots the contract accepts.
pub const ROOT_HISTORY_SIZE: usize = 30;

/// Gas reported for every receipt. The in-memory ledger has no gas model.
const MOCK_GAS_USED: u64 = 21_000;

struct LedgerState {
    tree: MerkleTree,
    events: Vec<DepositEvent>,
    commitments: HashSet<Commitment>,
    roots: VecDeque<B256>,
    spent: HashSet<B256>,
    withdrawals: Vec<WithdrawCallArgs>,
    block_number: u64,
    reverse_delivery: bool,
}

impl LedgerState {
    fn next_receipt(&mut self) -> TxReceipt {
        self.block_number += 1;
        TxReceipt {
            tx_hash: keccak256(self.block_number.to_be_bytes()),
            block_number: self.block_number,
            gas_used: MOCK_GAS_USED,
            success: true,
        }
    }

    fn push_root(&mut self, root: B256) {
        if self.roots.len() == ROOT_HISTORY_SIZE {
            self.roots.pop_front();
        }
        self.roots.push_back(root);
    }
}

/// In-process mixer instance with the contract's deposit and withdraw checks.
///
/// Proofs are accepted only if they come from [`mock_prover::MockProver`]
/// for the same public arguments.
pub struct MemoryLedger {
    denomination: U256,
    native: bool,
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new(height: usize, denomination: U256, native: bool) -> Result<Self, MerkleError> {
        let tree = MerkleTree::new(height)?;
        let mut roots = VecDeque::with_capacity(ROOT_HISTORY_SIZE);
        roots.push_back(tree.root());

        Ok(Self {
            denomination,
            native,
            state: Mutex::new(LedgerState {
                tree,
                events: Vec::new(),
                commitments: HashSet::new(),
                roots,
                spent: HashSet::new(),
                withdrawals: Vec::new(),
                block_number: 0,
                reverse_delivery: false,
            }),
        })
    }

    pub fn denomination(&self) -> U256 {
        self.denomination
    }

    /// Current root of the on-"chain" tree.
    pub async fn root(&self) -> B256 {
        self.state.lock().await.tree.root()
    }

    /// Mark a nullifier hash spent without a withdrawal (simulates a competitor).
    pub async fn mark_spent(&self, nullifier_hash: B256) {
        self.state.lock().await.spent.insert(nullifier_hash);
    }

    /// Forget every historical root, as if many deposits had happened since.
    pub async fn expire_root_history(&self) {
        self.state.lock().await.roots.clear();
    }

    /// Return events newest first from `get_deposit_events`.
    pub async fn set_reverse_delivery(&self, reverse: bool) {
        self.state.lock().await.reverse_delivery = reverse;
    }

    /// Withdrawals accepted so far (for test assertions).
    pub async fn withdrawals(&self) -> Vec<WithdrawCallArgs> {
        self.state.lock().await.withdrawals.clone()
    }
}

fn revert(message: &str) -> LedgerError {
    LedgerError::Reverted(RevertReason::new(message))
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Ledger for MemoryLedger {
    async fn get_deposit_events(
        &self,
        from_block: u64,
        to_block: Option<u64>,
    ) -> Result<Vec<DepositEvent>, LedgerError> {
        let state = self.state.lock().await;
        let to_block = to_block.unwrap_or(state.block_number);

        let mut events: Vec<DepositEvent> = state
            .events
            .iter()
            .filter(|e| e.block_number >= from_block && e.block_number <= to_block)
            .copied()
            .collect();
        if state.reverse_delivery {
            events.reverse();
        }
        Ok(events)
    }

    async fn is_known_root(&self, root: B256) -> Result<bool, LedgerError> {
        if root.is_zero() {
            return Ok(false);
        }
        Ok(self.state.lock().await.roots.contains(&root))
    }

    async fn is_spent(&self, nullifier_hash: B256) -> Result<bool, LedgerError> {
        Ok(self.state.lock().await.spent.contains(&nullifier_hash))
    }

    async fn submit_deposit(
        &self,
        commitment: Commitment,
        value: U256,
    ) -> Result<TxReceipt, LedgerError> {
        let mut state = self.state.lock().await;

        if state.commitments.contains(&commitment) {
            return Err(revert("The commitment has been submitted"));
        }
        if self.native && value != self.denomination {
            return Err(revert(
                "Please send `mixDenomination` ETH along with transaction",
            ));
        }
        if !self.native && !value.is_zero() {
            return Err(revert("ETH value is supposed to be 0 for ERC20 instance"));
        }

        let leaf_index = state
            .tree
            .insert(commitment.0)
            .map_err(|_| revert("Merkle tree is full. No more leafs can be added"))?;
        let root = state.tree.root();
        state.push_root(root);
        state.commitments.insert(commitment);

        let receipt = state.next_receipt();
        state.events.push(DepositEvent {
            commitment,
            leaf_index: leaf_index as u32,
            timestamp: now(),
            block_number: receipt.block_number,
        });

        Ok(receipt)
    }

    async fn submit_withdrawal(
        &self,
        args: &WithdrawCallArgs,
        value: U256,
    ) -> Result<TxReceipt, LedgerError> {
        let mut state = self.state.lock().await;

        if args.fee > self.denomination {
            return Err(revert("Fee exceeds transfer value"));
        }
        if state.spent.contains(&args.nullifier_hash) {
            return Err(revert("The note has been already spent"));
        }
        if args.root.is_zero() || !state.roots.contains(&args.root) {
            return Err(revert("Cannot find your merkle root"));
        }
        if !mock_prover::is_bound(args) {
            return Err(revert("Invalid withdraw proof"));
        }
        if self.native {
            if !value.is_zero() {
                return Err(revert(
                    "Message value is supposed to be zero for ETH instance",
                ));
            }
            if !args.refund.is_zero() {
                return Err(revert(
                    "Refund value is supposed to be zero for ETH instance",
                ));
            }
        } else if value != args.refund {
            return Err(revert("Incorrect refund amount received by the contract"));
        }

        state.spent.insert(args.nullifier_hash);
        state.withdrawals.push(args.clone());
        Ok(state.next_receipt())
    }
}

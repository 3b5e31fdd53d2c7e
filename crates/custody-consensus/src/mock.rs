//! In-memory settlement contract for tests.
//!
//! Behaves like the on-chain contract closely enough to exercise the
//! validator: settlement ids are sequential, soft-fork proofs are checked
//! against their roots, the winner is the root with the most votes (earliest
//! submission on ties), and finalizing or executing a batch twice reverts.
//! Phase and batch are set by the test.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use custody_types::{
    BatchNumber, BatchPhase, ContentHash, CustodyError, EpochSchedule, Hash32, Result,
    SettlementId,
};

use crate::contract::{SettlementContract, async_trait};
use crate::merkle::{MerkleProof, leaf_hash};

/// A recorded `submit_soft_fork` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftForkCall {
    pub batch: BatchNumber,
    pub root: Hash32,
    pub content_hash: ContentHash,
    pub settlement_id: SettlementId,
}

#[derive(Debug)]
struct MockState {
    phase: BatchPhase,
    batch: BatchNumber,
    next_settlement: u64,
    schedules: Vec<(BatchNumber, EpochSchedule, SettlementId)>,
    soft_forks: Vec<SoftForkCall>,
    votes: Vec<(BatchNumber, Hash32)>,
    finalizations: Vec<BatchNumber>,
    executions: Vec<(BatchNumber, SettlementId)>,
    winners: HashMap<BatchNumber, Hash32>,
    content: HashMap<Hash32, ContentHash>,
    executed: HashSet<BatchNumber>,
    fail_next: HashMap<&'static str, usize>,
}

/// Scriptable [`SettlementContract`].
#[derive(Debug)]
pub struct MockSettlementContract {
    state: Mutex<MockState>,
}

impl Default for MockSettlementContract {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSettlementContract {
    /// Batch 1, phase IDLE.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                phase: BatchPhase::Idle,
                batch: BatchNumber(1),
                next_settlement: 1,
                schedules: Vec::new(),
                soft_forks: Vec::new(),
                votes: Vec::new(),
                finalizations: Vec::new(),
                executions: Vec::new(),
                winners: HashMap::new(),
                content: HashMap::new(),
                executed: HashSet::new(),
                fail_next: HashMap::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_phase(&self, phase: BatchPhase) {
        self.state().phase = phase;
    }

    pub fn set_batch(&self, batch: BatchNumber) {
        self.state().batch = batch;
    }

    /// Move to the next batch and back to SETTLEMENT.
    pub fn advance_batch(&self) -> BatchNumber {
        let mut state = self.state();
        state.batch = state.batch.next();
        state.phase = BatchPhase::Settlement;
        state.batch
    }

    /// Make the next call named `call` revert.
    pub fn fail_next(&self, call: &'static str) {
        *self.state().fail_next.entry(call).or_default() += 1;
    }

    /// Register a winner directly, bypassing proposals and votes.
    pub fn set_winner(&self, batch: BatchNumber, root: Hash32, content_hash: ContentHash) {
        let mut state = self.state();
        state.winners.insert(batch, root);
        state.content.insert(root, content_hash);
    }

    #[must_use]
    pub fn schedules(&self) -> Vec<(BatchNumber, EpochSchedule, SettlementId)> {
        self.state().schedules.clone()
    }

    #[must_use]
    pub fn soft_forks(&self) -> Vec<SoftForkCall> {
        self.state().soft_forks.clone()
    }

    #[must_use]
    pub fn votes(&self) -> Vec<(BatchNumber, Hash32)> {
        self.state().votes.clone()
    }

    #[must_use]
    pub fn finalizations(&self) -> Vec<BatchNumber> {
        self.state().finalizations.clone()
    }

    #[must_use]
    pub fn executions(&self) -> Vec<(BatchNumber, SettlementId)> {
        self.state().executions.clone()
    }
}

impl MockState {
    fn check(&mut self, call: &'static str) -> Result<()> {
        if let Some(remaining) = self.fail_next.get_mut(call).filter(|n| **n > 0) {
            *remaining -= 1;
            return Err(CustodyError::contract(call, "injected failure"));
        }
        Ok(())
    }

    fn require_phase(&self, call: &'static str, phase: BatchPhase) -> Result<()> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(CustodyError::contract(
                call,
                format!("not allowed in {} (needs {phase})", self.phase),
            ))
        }
    }

    /// Most-voted root of the current batch, earliest submission first on ties.
    fn leading_root(&self) -> Option<Hash32> {
        let batch = self.batch;
        let mut best: Option<(Hash32, usize)> = None;
        for fork in self.soft_forks.iter().filter(|f| f.batch == batch) {
            let count = self
                .votes
                .iter()
                .filter(|(b, root)| *b == batch && *root == fork.root)
                .count();
            if best.is_none_or(|(_, top)| count > top) {
                best = Some((fork.root, count));
            }
        }
        best.map(|(root, _)| root)
    }
}

#[async_trait]
impl SettlementContract for MockSettlementContract {
    async fn get_current_phase(&self) -> Result<BatchPhase> {
        let mut state = self.state();
        state.check("get_current_phase")?;
        Ok(state.phase)
    }

    async fn current_batch(&self) -> Result<BatchNumber> {
        let mut state = self.state();
        state.check("current_batch")?;
        Ok(state.batch)
    }

    async fn create_batch_metadata_settlement(
        &self,
        schedule: EpochSchedule,
    ) -> Result<SettlementId> {
        let mut state = self.state();
        state.check("create_batch_metadata_settlement")?;
        let id = SettlementId(state.next_settlement);
        state.next_settlement += 1;
        let batch = state.batch;
        state.schedules.push((batch, schedule, id));
        Ok(id)
    }

    async fn submit_soft_fork(
        &self,
        root: Hash32,
        content_hash: &ContentHash,
        settlement_id: SettlementId,
        proof: &[Hash32],
    ) -> Result<()> {
        let mut state = self.state();
        state.check("submit_soft_fork")?;
        state.require_phase("submit_soft_fork", BatchPhase::Voting)?;
        let inclusion = MerkleProof {
            leaf: leaf_hash(settlement_id),
            siblings: proof.to_vec(),
        };
        if !inclusion.verify(&root) {
            return Err(CustodyError::contract(
                "submit_soft_fork",
                format!("settlement {settlement_id} not under root {root}"),
            ));
        }
        let batch = state.batch;
        state.content.insert(root, content_hash.clone());
        state.soft_forks.push(SoftForkCall {
            batch,
            root,
            content_hash: content_hash.clone(),
            settlement_id,
        });
        Ok(())
    }

    async fn cast_vote(&self, root: Hash32) -> Result<()> {
        let mut state = self.state();
        state.check("cast_vote")?;
        state.require_phase("cast_vote", BatchPhase::Voting)?;
        let batch = state.batch;
        if !state
            .soft_forks
            .iter()
            .any(|f| f.batch == batch && f.root == root)
        {
            return Err(CustodyError::contract(
                "cast_vote",
                format!("unknown soft fork {root}"),
            ));
        }
        state.votes.push((batch, root));
        Ok(())
    }

    async fn finalize_batch_winner(&self) -> Result<()> {
        let mut state = self.state();
        state.check("finalize_batch_winner")?;
        state.require_phase("finalize_batch_winner", BatchPhase::VotingEnd)?;
        let batch = state.batch;
        if state.winners.contains_key(&batch) {
            return Err(CustodyError::contract(
                "finalize_batch_winner",
                format!("{batch} already finalized"),
            ));
        }
        let root = state.leading_root().ok_or_else(|| {
            CustodyError::contract("finalize_batch_winner", format!("{batch} has no soft forks"))
        })?;
        state.winners.insert(batch, root);
        state.finalizations.push(batch);
        Ok(())
    }

    async fn batch_soft_fork(&self, batch: BatchNumber) -> Result<Option<Hash32>> {
        let mut state = self.state();
        state.check("batch_soft_fork")?;
        Ok(state.winners.get(&batch).copied())
    }

    async fn soft_fork_content_hashes(&self, root: Hash32) -> Result<Option<ContentHash>> {
        let mut state = self.state();
        state.check("soft_fork_content_hashes")?;
        Ok(state.content.get(&root).cloned())
    }

    async fn is_settlement_executed(&self, batch: BatchNumber) -> Result<bool> {
        let mut state = self.state();
        state.check("is_settlement_executed")?;
        Ok(state.executed.contains(&batch))
    }

    async fn execute_settlement(
        &self,
        batch: BatchNumber,
        settlement_id: SettlementId,
        proof: &[Hash32],
    ) -> Result<()> {
        let mut state = self.state();
        state.check("execute_settlement")?;
        let root = state.winners.get(&batch).copied().ok_or_else(|| {
            CustodyError::contract("execute_settlement", format!("{batch} not finalized"))
        })?;
        let inclusion = MerkleProof {
            leaf: leaf_hash(settlement_id),
            siblings: proof.to_vec(),
        };
        if !inclusion.verify(&root) {
            return Err(CustodyError::contract(
                "execute_settlement",
                format!("invalid proof for settlement {settlement_id}"),
            ));
        }
        if !state.executed.insert(batch) {
            return Err(CustodyError::contract(
                "execute_settlement",
                format!("{batch} already executed"),
            ));
        }
        state.executions.push((batch, settlement_id));
        Ok(())
    }
}

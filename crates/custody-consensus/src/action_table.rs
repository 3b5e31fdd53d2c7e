//! Which actions this validator has already completed, keyed by
//! `(batch, phase)`.
//!
//! An action is marked only once it is settled: its contract call succeeded
//! or the contract showed it was no longer needed. A failed call leaves the
//! table untouched and the next tick retries. Entries for earlier batches are
//! pruned on rollover.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use custody_types::{BatchNumber, BatchPhase};

/// A side-effecting step of the epoch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    /// `create_batch_metadata_settlement` (SETTLEMENT).
    ScheduleEpoch,
    /// `submit_soft_fork` (VOTING).
    ProposeSoftFork,
    /// `cast_vote` (VOTING).
    Vote,
    /// `finalize_batch_winner` (VOTING_END).
    Finalize,
    /// `execute_settlement` (VOTING_END).
    Execute,
}

impl Action {
    /// The actions that make up a phase, in order.
    #[must_use]
    pub fn for_phase(phase: BatchPhase) -> &'static [Action] {
        match phase {
            BatchPhase::Idle => &[],
            BatchPhase::Settlement => &[Self::ScheduleEpoch],
            BatchPhase::Voting => &[Self::ProposeSoftFork, Self::Vote],
            BatchPhase::VotingEnd => &[Self::Finalize, Self::Execute],
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ScheduleEpoch => "schedule-epoch",
            Self::ProposeSoftFork => "propose-soft-fork",
            Self::Vote => "vote",
            Self::Finalize => "finalize",
            Self::Execute => "execute",
        };
        f.write_str(name)
    }
}

/// Completed actions per `(batch, phase)`.
#[derive(Debug, Default, Clone)]
pub struct ActionTable {
    done: BTreeMap<(BatchNumber, BatchPhase), BTreeSet<Action>>,
}

impl ActionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_done(&self, batch: BatchNumber, phase: BatchPhase, action: Action) -> bool {
        self.done
            .get(&(batch, phase))
            .is_some_and(|set| set.contains(&action))
    }

    /// Record a completed action. Returns `false` if it was already recorded.
    pub fn mark(&mut self, batch: BatchNumber, phase: BatchPhase, action: Action) -> bool {
        self.done.entry((batch, phase)).or_default().insert(action)
    }

    /// Every action of `phase` is done for `batch`.
    #[must_use]
    pub fn phase_complete(&self, batch: BatchNumber, phase: BatchPhase) -> bool {
        Action::for_phase(phase)
            .iter()
            .all(|a| self.is_done(batch, phase, *a))
    }

    /// Forget every batch before `batch`.
    pub fn prune_before(&mut self, batch: BatchNumber) {
        self.done = self.done.split_off(&(batch, BatchPhase::Idle));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.done.values().map(BTreeSet::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_is_idempotent() {
        let mut table = ActionTable::new();
        assert!(table.mark(BatchNumber(1), BatchPhase::Voting, Action::Vote));
        assert!(!table.mark(BatchNumber(1), BatchPhase::Voting, Action::Vote));
        assert!(table.is_done(BatchNumber(1), BatchPhase::Voting, Action::Vote));
        assert!(!table.is_done(BatchNumber(2), BatchPhase::Voting, Action::Vote));
        assert!(!table.is_done(BatchNumber(1), BatchPhase::VotingEnd, Action::Vote));
    }

    #[test]
    fn phase_complete_needs_every_action() {
        let mut table = ActionTable::new();
        let b = BatchNumber(4);
        assert!(table.phase_complete(b, BatchPhase::Idle));
        table.mark(b, BatchPhase::Voting, Action::ProposeSoftFork);
        assert!(!table.phase_complete(b, BatchPhase::Voting));
        table.mark(b, BatchPhase::Voting, Action::Vote);
        assert!(table.phase_complete(b, BatchPhase::Voting));
    }

    #[test]
    fn prune_drops_earlier_batches_only() {
        let mut table = ActionTable::new();
        table.mark(BatchNumber(1), BatchPhase::VotingEnd, Action::Execute);
        table.mark(BatchNumber(2), BatchPhase::Idle, Action::ScheduleEpoch);
        table.mark(BatchNumber(2), BatchPhase::Settlement, Action::ScheduleEpoch);
        table.prune_before(BatchNumber(2));
        assert!(!table.is_done(BatchNumber(1), BatchPhase::VotingEnd, Action::Execute));
        assert!(table.is_done(BatchNumber(2), BatchPhase::Idle, Action::ScheduleEpoch));
        assert_eq!(table.len(), 2);
    }
}

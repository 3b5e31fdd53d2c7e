//! Per-validator view of the current batch epoch.

use custody_types::{BatchNumber, BatchPhase, BatchRecord, ContentHash, Hash32, SettlementId};

use crate::action_table::{Action, ActionTable};

/// A soft fork this validator submitted in the current batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftForkProposal {
    pub root: Hash32,
    pub content_hash: ContentHash,
    pub settlement_id: SettlementId,
    pub proof: Vec<Hash32>,
}

/// Everything the validator carries between ticks.
#[derive(Debug, Clone, Default)]
pub struct BatchEpoch {
    batch: Option<BatchNumber>,
    phase: Option<BatchPhase>,
    /// Scheduled in SETTLEMENT, consumed by the VOTING proposal.
    pending_settlement: Option<SettlementId>,
    /// Record built for the pending settlement, reused while its proposal is retried.
    draft: Option<BatchRecord>,
    has_voted: bool,
    proposal: Option<SoftForkProposal>,
    actions: ActionTable,
}

impl BatchEpoch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a fresh `(batch, phase)` reading into the state.
    ///
    /// A new batch clears the per-batch flags. Returns `true` when either the
    /// batch or the phase changed.
    pub fn observe(&mut self, batch: BatchNumber, phase: BatchPhase) -> bool {
        let batch_changed = self.batch != Some(batch);
        if batch_changed {
            if let Some(previous) = self.batch {
                tracing::info!(from = %previous, to = %batch, "Batch rolled over");
            }
            self.batch = Some(batch);
            self.has_voted = false;
            self.pending_settlement = None;
            self.draft = None;
            self.proposal = None;
            self.actions.prune_before(batch);
        }
        let phase_changed = self.phase != Some(phase);
        if phase_changed {
            let regressed = self
                .phase
                .filter(|previous| !batch_changed && !previous.can_advance_to(phase));
            if let Some(previous) = regressed {
                tracing::warn!(batch = %batch, from = %previous, to = %phase, "Phase moved backwards");
            }
            self.phase = Some(phase);
        }
        batch_changed || phase_changed
    }

    #[must_use]
    pub fn batch(&self) -> Option<BatchNumber> {
        self.batch
    }

    #[must_use]
    pub fn phase(&self) -> Option<BatchPhase> {
        self.phase
    }

    #[must_use]
    pub fn pending_settlement(&self) -> Option<SettlementId> {
        self.pending_settlement
    }

    pub fn set_pending_settlement(&mut self, id: SettlementId) {
        self.pending_settlement = Some(id);
    }

    pub fn take_pending_settlement(&mut self) -> Option<SettlementId> {
        self.pending_settlement.take()
    }

    /// The record drafted for `settlement_id` in this batch, if any.
    #[must_use]
    pub fn draft(&self, settlement_id: SettlementId) -> Option<&BatchRecord> {
        self.draft
            .as_ref()
            .filter(|record| record.batch_metadata_settlement_id == settlement_id)
    }

    pub fn set_draft(&mut self, record: BatchRecord) {
        self.draft = Some(record);
    }

    #[must_use]
    pub fn has_voted(&self) -> bool {
        self.has_voted
    }

    pub fn set_voted(&mut self) {
        self.has_voted = true;
    }

    #[must_use]
    pub fn proposal(&self) -> Option<&SoftForkProposal> {
        self.proposal.as_ref()
    }

    pub fn set_proposal(&mut self, proposal: SoftForkProposal) {
        self.proposal = Some(proposal);
    }

    /// Whether `action` is done in the current `(batch, phase)`.
    #[must_use]
    pub fn is_done(&self, action: Action) -> bool {
        match (self.batch, self.phase) {
            (Some(batch), Some(phase)) => self.actions.is_done(batch, phase, action),
            _ => false,
        }
    }

    /// Mark `action` done in the current `(batch, phase)`.
    pub fn mark(&mut self, action: Action) -> bool {
        match (self.batch, self.phase) {
            (Some(batch), Some(phase)) => self.actions.mark(batch, phase, action),
            _ => false,
        }
    }

    #[must_use]
    pub fn actions(&self) -> &ActionTable {
        &self.actions
    }
}

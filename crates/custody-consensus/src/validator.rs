//! The validator's batch-epoch state machine.
//!
//! Each [`Validator::tick`] reads the contract's batch counter and phase and
//! performs whatever the phase still needs from this validator:
//!
//! | Phase        | Actions                                                    |
//! |--------------|------------------------------------------------------------|
//! | `IDLE`       | nothing                                                    |
//! | `SETTLEMENT` | schedule the next epoch's metadata settlement              |
//! | `VOTING`     | store a batch record, propose its root, vote for it        |
//! | `VOTING_END` | finalize the winner, then execute the winning settlement   |
//!
//! Actions are recorded in the epoch's action table only after they
//! succeed, so a failed contract call is simply attempted again on the next
//! tick. [`Validator::run`] drives `tick` on a fixed interval until shutdown.

use std::sync::Arc;

use custody_types::{
    BatchNumber, BatchPhase, BatchRecord, CustodyError, EpochSchedule, Result, ValidatorConfig,
};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::action_table::Action;
use crate::contract::{ContentStore, SettlementContract};
use crate::epoch::{BatchEpoch, SoftForkProposal};
use crate::merkle::MerkleTree;
use crate::store::{get_typed, store_typed, unix_now};

/// One validator node's consensus driver.
pub struct Validator {
    contract: Arc<dyn SettlementContract>,
    store: Arc<dyn ContentStore>,
    config: ValidatorConfig,
    epoch: BatchEpoch,
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("config", &self.config)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

impl Validator {
    pub fn new(
        contract: Arc<dyn SettlementContract>,
        store: Arc<dyn ContentStore>,
        config: ValidatorConfig,
    ) -> Self {
        Self {
            contract,
            store,
            config,
            epoch: BatchEpoch::new(),
        }
    }

    #[must_use]
    pub fn epoch(&self) -> &BatchEpoch {
        &self.epoch
    }

    #[must_use]
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Poll the contract once and act on the current phase.
    ///
    /// Returns the actions this tick completed. On error, actions completed
    /// earlier in the same tick stay recorded and the failed one is retried
    /// next time.
    pub async fn tick(&mut self) -> Result<Vec<Action>> {
        let batch = self.contract.current_batch().await?;
        let phase = self.contract.get_current_phase().await?;
        if self.epoch.observe(batch, phase) {
            tracing::debug!(batch = %batch, phase = %phase, "Observed new batch state");
        }

        let mut done = Vec::new();
        let outcome = match phase {
            BatchPhase::Idle => Ok(()),
            BatchPhase::Settlement => self.on_settlement(batch, &mut done).await,
            BatchPhase::Voting => self.on_voting(batch, &mut done).await,
            BatchPhase::VotingEnd => self.on_voting_end(batch, &mut done).await,
        };
        match outcome {
            Ok(()) => Ok(done),
            Err(err) => {
                tracing::warn!(
                    batch = %batch,
                    phase = %phase,
                    completed = done.len(),
                    error = %err,
                    "Tick failed, retrying next poll"
                );
                Err(err)
            }
        }
    }

    async fn on_settlement(&mut self, batch: BatchNumber, done: &mut Vec<Action>) -> Result<()> {
        if self.epoch.is_done(Action::ScheduleEpoch) {
            return Ok(());
        }
        let schedule = EpochSchedule::compute(
            unix_now(),
            self.config.settlement_delay.as_secs(),
            self.config.phase_duration.as_secs(),
        );
        let id = self
            .contract
            .create_batch_metadata_settlement(schedule)
            .await?;
        self.epoch.set_pending_settlement(id);
        self.epoch.mark(Action::ScheduleEpoch);
        done.push(Action::ScheduleEpoch);
        tracing::info!(
            batch = %batch,
            settlement_id = %id,
            settlement_start = schedule.settlement_start,
            voting_start = schedule.voting_start,
            voting_end = schedule.voting_end,
            "Scheduled next epoch"
        );
        Ok(())
    }

    async fn on_voting(&mut self, batch: BatchNumber, done: &mut Vec<Action>) -> Result<()> {
        if self.epoch.has_voted() {
            return Ok(());
        }
        let Some(settlement_id) = self.epoch.pending_settlement() else {
            tracing::debug!(batch = %batch, "No pending settlement, nothing to propose");
            return Ok(());
        };

        if !self.epoch.is_done(Action::ProposeSoftFork) {
            let tree = MerkleTree::from_settlements(&[settlement_id]);
            let root = tree.root();
            let proof = tree.proof(0).map(|p| p.siblings).unwrap_or_default();
            let record = if let Some(draft) = self.epoch.draft(settlement_id) {
                draft.clone()
            } else {
                let record = BatchRecord {
                    timestamp: unix_now(),
                    merkle_root: root,
                    settlements: vec![settlement_id],
                    batch,
                    batch_metadata_settlement_id: settlement_id,
                };
                self.epoch.set_draft(record.clone());
                record
            };
            let content_hash = store_typed(self.store.as_ref(), &record).await?;
            self.contract
                .submit_soft_fork(root, &content_hash, settlement_id, &proof)
                .await?;
            tracing::info!(
                batch = %batch,
                root = %root,
                content_hash = %content_hash,
                settlement_id = %settlement_id,
                "Submitted soft fork"
            );
            self.epoch.set_proposal(SoftForkProposal {
                root,
                content_hash,
                settlement_id,
                proof,
            });
            self.epoch.mark(Action::ProposeSoftFork);
            done.push(Action::ProposeSoftFork);
        }

        let Some(root) = self.epoch.proposal().map(|p| p.root) else {
            return Ok(());
        };
        if !self.epoch.is_done(Action::Vote) {
            self.contract.cast_vote(root).await?;
            tracing::info!(batch = %batch, root = %root, "Cast vote");
            self.epoch.mark(Action::Vote);
            done.push(Action::Vote);
        }
        self.epoch.set_voted();
        self.epoch.take_pending_settlement();
        Ok(())
    }

    async fn on_voting_end(&mut self, batch: BatchNumber, done: &mut Vec<Action>) -> Result<()> {
        if self.epoch.is_done(Action::Execute) {
            return Ok(());
        }

        if !self.epoch.is_done(Action::Finalize) {
            let counter = self.contract.current_batch().await?;
            let finalized = self.contract.batch_soft_fork(batch).await?.is_some();
            if counter == batch && !finalized {
                self.contract.finalize_batch_winner().await?;
                tracing::info!(batch = %batch, "Finalized batch winner");
                done.push(Action::Finalize);
            } else {
                tracing::debug!(
                    batch = %batch,
                    counter = %counter,
                    finalized,
                    "Winner already settled, skipping finalize"
                );
            }
            self.epoch.mark(Action::Finalize);
        }

        if self.contract.is_settlement_executed(batch).await? {
            tracing::debug!(batch = %batch, "Winning settlement already executed");
            self.epoch.mark(Action::Execute);
            return Ok(());
        }

        let root = self
            .contract
            .batch_soft_fork(batch)
            .await?
            .ok_or(CustodyError::NoWinningRoot(batch))?;
        let content_hash = self
            .contract
            .soft_fork_content_hashes(root)
            .await?
            .ok_or_else(|| {
                CustodyError::contract(
                    "soft_fork_content_hashes",
                    format!("no content registered for root {root}"),
                )
            })?;
        let Some((record, _)) =
            get_typed::<BatchRecord>(self.store.as_ref(), &content_hash).await?
        else {
            return Err(CustodyError::MissingRecord(content_hash));
        };
        if record.settlements.is_empty() {
            return Err(CustodyError::EmptyRecord(content_hash));
        }

        let tree = MerkleTree::from_settlements(&record.settlements);
        if tree.root() != root {
            return Err(CustodyError::Store(format!(
                "record {content_hash} commits to {}, not winning root {root}",
                tree.root()
            )));
        }
        let settlement_id = record.batch_metadata_settlement_id;
        let proof = record
            .settlements
            .iter()
            .position(|id| *id == settlement_id)
            .and_then(|index| tree.proof(index))
            .ok_or_else(|| {
                CustodyError::Store(format!(
                    "record {content_hash} does not commit settlement {settlement_id}"
                ))
            })?;

        self.contract
            .execute_settlement(batch, settlement_id, &proof.siblings)
            .await?;
        tracing::info!(
            batch = %batch,
            root = %root,
            settlement_id = %settlement_id,
            "Executed winning settlement"
        );
        self.epoch.mark(Action::Execute);
        done.push(Action::Execute);
        Ok(())
    }

    /// Tick every `poll_interval` until `shutdown` flips to `true` (or its
    /// sender is dropped). Returns the validator for inspection.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Self {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            poll_interval_ms = u64::try_from(self.config.poll_interval.as_millis()).unwrap_or(u64::MAX),
            "Validator started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    // Failures are logged inside `tick`.
                    if let Ok(actions) = self.tick().await {
                        if !actions.is_empty() {
                            tracing::debug!(?actions, "Tick completed");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(batch = ?self.epoch.batch(), "Validator stopped");
        self
    }
}

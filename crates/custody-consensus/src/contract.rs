//! Collaborator interfaces: the on-chain settlement contract and the
//! content-addressed store for off-chain batch records.

pub use async_trait::async_trait;

use custody_types::{
    BatchNumber, BatchPhase, ContentHash, EpochSchedule, Hash32, Result, SettlementId,
};
use serde::{Deserialize, Serialize};

/// The settlement contract as seen by a validator.
///
/// Every call may fail (RPC error, revert, superseded by another
/// validator). Failures surface as [`CustodyError::ContractCall`](custody_types::CustodyError::ContractCall)
/// and are retried on the next tick.
#[async_trait]
pub trait SettlementContract: Send + Sync {
    async fn get_current_phase(&self) -> Result<BatchPhase>;

    async fn current_batch(&self) -> Result<BatchNumber>;

    /// Schedule the next epoch's metadata settlement. Returns its id.
    async fn create_batch_metadata_settlement(
        &self,
        schedule: EpochSchedule,
    ) -> Result<SettlementId>;

    /// Propose `root` (backed by the record at `content_hash`) as this batch's soft fork.
    async fn submit_soft_fork(
        &self,
        root: Hash32,
        content_hash: &ContentHash,
        settlement_id: SettlementId,
        proof: &[Hash32],
    ) -> Result<()>;

    async fn cast_vote(&self, root: Hash32) -> Result<()>;

    async fn finalize_batch_winner(&self) -> Result<()>;

    /// Winning soft-fork root of `batch`, if one was finalized.
    async fn batch_soft_fork(&self, batch: BatchNumber) -> Result<Option<Hash32>>;

    /// Content hash registered with a soft-fork root.
    async fn soft_fork_content_hashes(&self, root: Hash32) -> Result<Option<ContentHash>>;

    /// Whether the winning settlement of `batch` has already been executed.
    async fn is_settlement_executed(&self, batch: BatchNumber) -> Result<bool>;

    async fn execute_settlement(
        &self,
        batch: BatchNumber,
        settlement_id: SettlementId,
        proof: &[Hash32],
    ) -> Result<()>;
}

/// A stored value and when it was first stored (unix seconds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub data: serde_json::Value,
    pub timestamp: u64,
}

/// Content-addressed storage for soft-fork payloads.
///
/// `store` is deterministic and idempotent: the same value always yields the
/// same hash, and storing it again changes nothing.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn store(&self, value: &serde_json::Value) -> Result<ContentHash>;

    async fn get(&self, hash: &ContentHash) -> Result<Option<StoredRecord>>;
}

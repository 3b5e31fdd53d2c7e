//! Batch epoch types for the validator consensus.
//!
//! The settlement contract drives each batch through four phases:
//! **IDLE → SETTLEMENT → VOTING → VOTING_END**
//!
//! During SETTLEMENT, a validator schedules the next epoch's metadata settlement.
//! During VOTING, validators propose soft forks and vote on roots.
//! During VOTING_END, the winning root is finalized and its settlement executed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{BatchNumber, CustodyError, Hash32, SettlementId};

/// The phase of a batch as reported by the settlement contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum BatchPhase {
    /// No batch activity.
    Idle,
    /// Settlements for the batch are being created.
    Settlement,
    /// Soft forks are proposed and voted on.
    Voting,
    /// Voting closed; the winner is finalized and executed.
    VotingEnd,
}

impl BatchPhase {
    /// Numeric value used by the contract.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Settlement => 1,
            Self::Voting => 2,
            Self::VotingEnd => 3,
        }
    }

    /// Phases only move forward within one batch.
    #[must_use]
    pub fn can_advance_to(self, target: Self) -> bool {
        target > self
    }
}

impl TryFrom<u8> for BatchPhase {
    type Error = CustodyError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Idle),
            1 => Ok(Self::Settlement),
            2 => Ok(Self::Voting),
            3 => Ok(Self::VotingEnd),
            other => Err(CustodyError::UnknownPhase(other)),
        }
    }
}

impl fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Settlement => write!(f, "SETTLEMENT"),
            Self::Voting => write!(f, "VOTING"),
            Self::VotingEnd => write!(f, "VOTING_END"),
        }
    }
}

// ---------------------------------------------------------------------------
// EpochSchedule: timestamps of the next batch epoch
// ---------------------------------------------------------------------------

/// Unix timestamps (seconds) passed to `createBatchMetadataSettlement`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSchedule {
    pub settlement_start: u64,
    pub voting_start: u64,
    pub voting_end: u64,
}

impl EpochSchedule {
    /// `settlement_start = now + delay`, each later window `duration` after the previous.
    #[must_use]
    pub fn compute(now: u64, delay: u64, duration: u64) -> Self {
        let settlement_start = now + delay;
        let voting_start = settlement_start + duration;
        Self {
            settlement_start,
            voting_start,
            voting_end: voting_start + duration,
        }
    }
}

// ---------------------------------------------------------------------------
// BatchRecord: the off-chain payload behind a soft-fork root
// ---------------------------------------------------------------------------

/// Content-addressed record backing a soft-fork proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    /// Unix seconds at which the record was built.
    pub timestamp: u64,
    /// Merkle root over `settlements`.
    pub merkle_root: Hash32,
    /// Settlement ids committed by the root, in leaf order.
    pub settlements: Vec<SettlementId>,
    /// Batch the proposal was made in.
    pub batch: BatchNumber,
    /// The metadata settlement scheduled for the next epoch.
    pub batch_metadata_settlement_id: SettlementId,
}

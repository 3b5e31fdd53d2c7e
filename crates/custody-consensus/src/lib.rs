//! # custody-consensus: Validator Batch-Epoch Consensus
//!
//! Drives one validator through the settlement contract's batch cycle
//! (**IDLE → SETTLEMENT → VOTING → VOTING_END**):
//!
//! - **SETTLEMENT**: schedule the next epoch's metadata settlement.
//! - **VOTING**: commit the pending settlement in a Merkle root, store the
//!   backing [`BatchRecord`](custody_types::BatchRecord) in the content store,
//!   submit the root as a soft fork and vote for it.
//! - **VOTING_END**: finalize the winning root and execute its settlement
//!   with a fresh inclusion proof.
//!
//! The contract and the content store are collaborators behind async traits
//! ([`SettlementContract`], [`ContentStore`]). Each `(batch, phase)` action
//! runs at most once per validator; failures are logged and retried on the
//! next poll.

pub mod action_table;
pub mod contract;
pub mod epoch;
pub mod merkle;
pub mod store;
pub mod validator;

#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;

pub use action_table::{Action, ActionTable};
pub use contract::{ContentStore, SettlementContract, StoredRecord};
pub use epoch::{BatchEpoch, SoftForkProposal};
pub use merkle::{MerkleProof, MerkleTree, hash_pair, leaf_hash};
pub use store::{MemoryContentStore, content_hash, get_typed, store_typed};
pub use validator::Validator;

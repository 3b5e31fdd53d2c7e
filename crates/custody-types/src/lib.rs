//! # custody-types
//!
//! Shared types, errors, and configuration for the **custody rollup** core.
//!
//! This crate is the leaf dependency of the workspace. Every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`SettlementId`], [`BatchNumber`], [`ContentHash`], [`Hash32`], [`SessionKey`]
//! - **Batch model**: [`BatchPhase`], [`EpochSchedule`], [`BatchRecord`]
//! - **Configuration**: [`RollupConfig`], [`CodecConfig`], [`SignerConfig`], [`ValidatorConfig`], [`FeedSource`]
//! - **Errors**: [`CustodyError`] with `CR_ERR_` prefix codes
//! - **Constants**: protocol tags, defaults, and limits

pub mod config;
pub mod constants;
pub mod epoch;
pub mod error;
pub mod ids;

// Re-export all primary types at crate root for ergonomic imports:
//   use custody_types::{BatchPhase, CustodyError, SettlementId, ...};

pub use config::*;
pub use epoch::*;
pub use error::*;
pub use ids::*;

// Constants are accessed via `custody_types::constants::FOO`
// (not re-exported to avoid name collisions).

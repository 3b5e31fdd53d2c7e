//! # custody-session
//!
//! **Session Plane**: ordered admission of wire messages between two
//! custody counterparties.
//!
//! A [`Session`] accepts a message only if it is dictionary-valid, routed
//! between the session's two parties, and passes every [`SessionCheck`]:
//!
//! - [`SequenceCheck`]: per-sender `MsgSeqNum` increases by exactly 1, from 1
//! - [`SendingTimeCheck`]: `SendingTime` strictly increases across both parties
//!
//! [`Session::session_hash`] commits to the full ordered log so both parties
//! can compare state and escalate a disagreement on-chain.

pub mod checks;
pub mod registry;
pub mod session;

pub use checks::{SendingTimeCheck, SequenceCheck, SessionCheck, default_checks};
pub use registry::SessionRegistry;
pub use session::{LoggedMessage, Session};

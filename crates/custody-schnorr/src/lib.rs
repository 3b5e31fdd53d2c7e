//! # custody-schnorr
//!
//! **Signing Plane**: n-of-n Schnorr multi-signatures over secp256k1 whose
//! output is checked by an EVM verifier contract.
//!
//! ## Protocol
//!
//! 1. Every participant aggregates the same key set into one [`AggregatedKey`]
//! 2. Round 1: each party commits to fresh nonces and broadcasts [`PublicNonces`]
//! 3. Barrier: nobody signs until every party's nonces for the message are in
//!    (see [`NonceBoard`])
//! 4. Round 2: each party produces a [`PartialSignature`]
//! 5. Any party [`combine`]s the partials into a [`CombinedSignature`]
//!
//! Hashing is Keccak-256 throughout so the challenge matches what the
//! on-chain verifier recomputes.

pub mod aggregate;
pub mod board;
pub mod hash;
pub mod keys;
pub mod nonce;
pub mod sign;
pub mod wire;

pub use aggregate::{AggregatedKey, aggregate_keys};
pub use board::{NonceBoard, RoundTicket, sign_with_board};
pub use keys::{KeyPair, PublicKey};
pub use nonce::{NonceSet, PublicNonces};
pub use sign::{
    CombinedSignature, NonceAggregate, PartialSignature, Round1Nonces, SigningSession,
    aggregate_nonces, combine, verify, verify_partial,
};
pub use wire::SignatureWire;

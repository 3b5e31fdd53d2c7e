//! Error types for the custody rollup core.
//!
//! All errors use the `CR_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Wire codec errors
//! - 2xx: Threshold signing protocol errors
//! - 3xx: Session protocol violations
//! - 4xx: Validator consensus action errors
//! - 9xx: General / internal errors

use thiserror::Error;

use crate::{BatchNumber, ContentHash};

/// Central error enum for all custody rollup operations.
#[derive(Debug, Error)]
pub enum CustodyError {
    // =================================================================
    // Codec Errors (1xx)
    // =================================================================
    /// The tag dictionary itself is inconsistent.
    #[error("CR_ERR_100: Invalid dictionary: {reason}")]
    InvalidDictionary { reason: String },

    /// The message type is not declared in the dictionary.
    #[error("CR_ERR_101: Unknown message type: {0}")]
    UnknownMsgType(String),

    /// The message header carries a different protocol version.
    #[error("CR_ERR_102: BeginString mismatch: expected {expected}, got {actual}")]
    BeginStringMismatch { expected: String, actual: String },

    /// A tag or group marked required is absent.
    #[error("CR_ERR_103: Missing required field: {field}")]
    MissingRequiredField { field: String },

    /// A field is present outside the declared tag set for its level.
    #[error("CR_ERR_104: Unknown field at this level: {field}")]
    UnknownField { field: String },

    /// A NumInGroup value is not a valid count.
    #[error("CR_ERR_105: Malformed group count for {group}: {value}")]
    MalformedGroupCount { group: String, value: String },

    /// A token is not of the form `tag=value`.
    #[error("CR_ERR_106: Malformed token: {token}")]
    MalformedToken { token: String },

    /// Input ended while a repeating group was still open.
    #[error("CR_ERR_107: Truncated repeating group: {group}")]
    TruncatedGroup { group: String },

    /// The same field appears twice at one level.
    #[error("CR_ERR_108: Duplicate field: {field}")]
    DuplicateField { field: String },

    /// A scalar value does not parse as its declared type.
    #[error("CR_ERR_109: Invalid value for {field}: {value} (expected {expected})")]
    InvalidFieldValue {
        field: String,
        value: String,
        expected: String,
    },

    /// A field has the wrong shape (scalar where a group is declared or vice versa).
    #[error("CR_ERR_110: Field shape mismatch: {field}")]
    FieldShapeMismatch { field: String },

    // =================================================================
    // Threshold Signing Errors (2xx)
    // =================================================================
    /// Signing was attempted before round-1 nonces were generated.
    #[error("CR_ERR_200: Signing attempted before nonce generation")]
    NoncesNotGenerated,

    /// The session's nonce set was already consumed by a previous signature.
    #[error("CR_ERR_201: Nonce set already consumed")]
    NonceAlreadyUsed,

    /// A public key or point encoding could not be parsed.
    #[error("CR_ERR_202: Invalid curve point: {reason}")]
    InvalidPoint { reason: String },

    /// A scalar encoding could not be parsed or is out of range.
    #[error("CR_ERR_203: Invalid scalar: {reason}")]
    InvalidScalar { reason: String },

    /// Key aggregation received no keys.
    #[error("CR_ERR_204: Cannot aggregate an empty key set")]
    EmptyKeySet,

    /// The same participant key appears twice.
    #[error("CR_ERR_205: Duplicate participant key: {key_hex}")]
    DuplicateParticipant { key_hex: String },

    /// A participant's round-1 nonces are missing.
    #[error("CR_ERR_206: Missing round-1 nonces for participant {key_hex}")]
    MissingParticipantNonces { key_hex: String },

    /// The signer is not part of the aggregated key.
    #[error("CR_ERR_207: Key {key_hex} is not a participant of the aggregated key")]
    NotAParticipant { key_hex: String },

    /// Partial signatures disagree on the challenge.
    #[error("CR_ERR_208: Partial signatures carry different challenges")]
    ChallengeMismatch,

    /// The round-1 barrier did not complete in time. The round is aborted.
    #[error("CR_ERR_209: Round-1 barrier timed out after {timeout_ms}ms ({received}/{expected} nonce sets)")]
    RoundTimeout {
        timeout_ms: u64,
        received: usize,
        expected: usize,
    },

    /// A party published round-1 nonces twice for the same message.
    #[error("CR_ERR_210: Nonces already published by {key_hex} for this message")]
    NonceAlreadyPublished { key_hex: String },

    /// Nonce count does not match the expected per-party count.
    #[error("CR_ERR_211: Nonce count mismatch: expected {expected}, got {actual}")]
    NonceCountMismatch { expected: usize, actual: usize },

    /// A participant's partial signature is missing at combine time.
    #[error("CR_ERR_212: Missing partial signature from {key_hex}")]
    MissingPartialSignature { key_hex: String },

    /// Another participant abandoned the signing round this party published into.
    #[error("CR_ERR_213: Signing round abandoned; restart with fresh nonces")]
    RoundAbandoned,

    // =================================================================
    // Session Protocol Violations (3xx)
    // =================================================================
    /// The sender's sequence number is not exactly last + 1.
    #[error("CR_ERR_300: Sequence violation for {sender}: expected {expected}, got {actual}")]
    SequenceViolation {
        sender: String,
        expected: u64,
        actual: u64,
    },

    /// Sending time did not strictly increase.
    #[error("CR_ERR_301: Non-monotonic sending time: last {last}, got {actual}")]
    NonMonotonicSendingTime { last: String, actual: String },

    /// A session field required by a check is missing or malformed.
    #[error("CR_ERR_302: Session field invalid: {field}")]
    SessionFieldInvalid { field: String },

    /// The message does not belong to this session's counterparty pair.
    #[error("CR_ERR_303: Message routed to wrong session: {reason}")]
    WrongSession { reason: String },

    // =================================================================
    // Consensus Action Errors (4xx)
    // =================================================================
    /// A settlement-contract call failed.
    #[error("CR_ERR_400: Contract call {call} failed: {reason}")]
    ContractCall { call: String, reason: String },

    /// The content store has no record for the hash.
    #[error("CR_ERR_401: Content record missing: {0}")]
    MissingRecord(ContentHash),

    /// The contract reports no winning soft fork for a batch.
    #[error("CR_ERR_402: No winning soft fork for {0}")]
    NoWinningRoot(BatchNumber),

    /// The stored record does not name a settlement to execute.
    #[error("CR_ERR_403: Record {0} carries no settlement id")]
    EmptyRecord(ContentHash),

    /// The contract reported a phase value outside the known set.
    #[error("CR_ERR_404: Unknown batch phase value: {0}")]
    UnknownPhase(u8),

    /// The content store failed.
    #[error("CR_ERR_405: Content store error: {0}")]
    Store(String),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("CR_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("CR_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config, missing fields, etc.).
    #[error("CR_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error.
    #[error("CR_ERR_903: I/O error: {0}")]
    Io(String),
}

impl CustodyError {
    /// Shorthand for a failed settlement-contract call.
    pub fn contract(call: &str, reason: impl Into<String>) -> Self {
        Self::ContractCall {
            call: call.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for session protocol violations (3xx).
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::SequenceViolation { .. }
                | Self::NonMonotonicSendingTime { .. }
                | Self::SessionFieldInvalid { .. }
                | Self::WrongSession { .. }
        )
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, CustodyError>;

impl From<std::io::Error> for CustodyError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CustodyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

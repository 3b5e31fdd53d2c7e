//! System-wide constants for the custody rollup core.

// ---------------------------------------------------------------------------
// Wire protocol
// ---------------------------------------------------------------------------

/// Protocol version carried in every message header.
pub const DEFAULT_BEGIN_STRING: &str = "CUSTODY.1.0";

/// Default token separator (ASCII SOH).
pub const DEFAULT_SEPARATOR: char = '\x01';

/// Separator used when serializing the session log for hashing.
pub const CANONICAL_SEPARATOR: char = '|';

/// Header tag: protocol version.
pub const TAG_BEGIN_STRING: u32 = 8;

/// Header tag: message type.
pub const TAG_MSG_TYPE: u32 = 35;

/// Session tag: per-sender sequence number.
pub const TAG_MSG_SEQ_NUM: u32 = 34;

/// Session tag: sending party identifier.
pub const TAG_SENDER_COMP_ID: u32 = 49;

/// Session tag: receiving party identifier.
pub const TAG_TARGET_COMP_ID: u32 = 56;

/// Session tag: UTC sending time.
pub const TAG_SENDING_TIME: u32 = 52;

/// Field name of the protocol version header.
pub const FIELD_BEGIN_STRING: &str = "BeginString";

/// Field name of the message type header.
pub const FIELD_MSG_TYPE: &str = "MsgType";

/// Field name of the per-sender sequence number.
pub const FIELD_MSG_SEQ_NUM: &str = "MsgSeqNum";

/// Field name of the sending party.
pub const FIELD_SENDER_COMP_ID: &str = "SenderCompID";

/// Field name of the receiving party.
pub const FIELD_TARGET_COMP_ID: &str = "TargetCompID";

/// Field name of the sending time.
pub const FIELD_SENDING_TIME: &str = "SendingTime";

/// Format of UTC timestamp fields (`YYYYMMDD-HH:MM:SS.sss`).
pub const UTC_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H:%M:%S%.3f";

/// Upper bound on a decoded group count, to bound pre-allocation.
pub const MAX_GROUP_COUNT: usize = 10_000;

// ---------------------------------------------------------------------------
// Threshold signer
// ---------------------------------------------------------------------------

/// Default number of nonces each party commits per signing attempt.
pub const DEFAULT_NONCES_PER_PARTY: usize = 1;

/// Default bound on the round-1 → round-2 wait, in milliseconds.
pub const ROUND_TIMEOUT_MS: u64 = 30_000;

/// Parity byte for an even y-coordinate in the challenge preimage.
pub const PARITY_EVEN: u8 = 27;

/// Parity byte for an odd y-coordinate in the challenge preimage.
pub const PARITY_ODD: u8 = 28;

// ---------------------------------------------------------------------------
// Validator consensus
// ---------------------------------------------------------------------------

/// Default poll interval of the validator loop in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

/// Default delay before the next epoch's settlement phase starts (seconds).
pub const DEFAULT_SETTLEMENT_DELAY_SECS: u64 = 60;

/// Default duration of each settlement/voting window (seconds).
pub const DEFAULT_PHASE_DURATION_SECS: u64 = 300;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

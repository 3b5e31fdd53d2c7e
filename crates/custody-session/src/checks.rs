//! Pluggable admission checks.
//!
//! Each check inspects a candidate message against its own state without
//! mutating it. Only when every check in the chain has passed does the
//! session call [`SessionCheck::commit`] on all of them, so a rejected
//! message leaves no trace in any check.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use custody_codec::{WireMessage, parse_utc_timestamp};
use custody_types::{
    CustodyError, Result,
    constants::{FIELD_MSG_SEQ_NUM, FIELD_SENDER_COMP_ID, FIELD_SENDING_TIME},
};

/// One stage of session admission.
pub trait SessionCheck: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Accept or reject `message` given current state. Must not mutate.
    fn check(&self, message: &WireMessage) -> Result<()>;

    /// Record `message` as accepted. Only called after every check passed.
    fn commit(&mut self, message: &WireMessage);
}

fn field_invalid(field: &str) -> CustodyError {
    CustodyError::SessionFieldInvalid {
        field: field.to_string(),
    }
}

fn sender(message: &WireMessage) -> Result<&str> {
    message
        .scalar(FIELD_SENDER_COMP_ID)
        .ok_or_else(|| field_invalid(FIELD_SENDER_COMP_ID))
}

fn seq_num(message: &WireMessage) -> Result<u64> {
    message
        .scalar(FIELD_MSG_SEQ_NUM)
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| field_invalid(FIELD_MSG_SEQ_NUM))
}

fn sending_time(message: &WireMessage) -> Result<DateTime<Utc>> {
    message
        .scalar(FIELD_SENDING_TIME)
        .and_then(parse_utc_timestamp)
        .ok_or_else(|| field_invalid(FIELD_SENDING_TIME))
}

// ---------------------------------------------------------------------------
// SequenceCheck
// ---------------------------------------------------------------------------

/// Per-sender `MsgSeqNum` must be exactly the previous value + 1, starting at 1.
#[derive(Debug, Default)]
pub struct SequenceCheck {
    last: HashMap<String, u64>,
}

impl SequenceCheck {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last accepted sequence number of `sender` (0 if none yet).
    #[must_use]
    pub fn last(&self, sender: &str) -> u64 {
        self.last.get(sender).copied().unwrap_or(0)
    }
}

impl SessionCheck for SequenceCheck {
    fn name(&self) -> &'static str {
        "sequence"
    }

    fn check(&self, message: &WireMessage) -> Result<()> {
        let sender = sender(message)?;
        let actual = seq_num(message)?;
        let expected = self.last(sender).saturating_add(1);
        if actual != expected {
            return Err(CustodyError::SequenceViolation {
                sender: sender.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    fn commit(&mut self, message: &WireMessage) {
        if let (Ok(sender), Ok(seq)) = (sender(message), seq_num(message)) {
            self.last.insert(sender.to_string(), seq);
        }
    }
}

// ---------------------------------------------------------------------------
// SendingTimeCheck
// ---------------------------------------------------------------------------

/// `SendingTime` must strictly increase across both parties of the session.
#[derive(Debug, Default)]
pub struct SendingTimeCheck {
    last: Option<DateTime<Utc>>,
}

impl SendingTimeCheck {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn last(&self) -> Option<DateTime<Utc>> {
        self.last
    }
}

impl SessionCheck for SendingTimeCheck {
    fn name(&self) -> &'static str {
        "sending-time"
    }

    fn check(&self, message: &WireMessage) -> Result<()> {
        let actual = sending_time(message)?;
        match self.last {
            Some(last) if actual <= last => Err(CustodyError::NonMonotonicSendingTime {
                last: last.to_rfc3339(),
                actual: actual.to_rfc3339(),
            }),
            _ => Ok(()),
        }
    }

    fn commit(&mut self, message: &WireMessage) {
        if let Ok(at) = sending_time(message) {
            self.last = Some(at);
        }
    }
}

/// The default chain: sequence numbers, then sending time.
#[must_use]
pub fn default_checks() -> Vec<Box<dyn SessionCheck>> {
    vec![
        Box::new(SequenceCheck::new()),
        Box::new(SendingTimeCheck::new()),
    ]
}

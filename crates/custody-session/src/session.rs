//! One bilateral session: the ordered log of accepted messages.
//!
//! `admit` is the only way into the log:
//! 1. the message must be dictionary-valid
//! 2. it must be addressed between this session's two counterparties
//! 3. every [`SessionCheck`] must accept it
//!
//! Only then do the checks commit and the message is appended. A rejected
//! message changes nothing.
//!
//! ## Session hash
//!
//! ```text
//! H = keccak256( len(m_1) || m_1 || len(m_2) || m_2 || ... )
//! ```
//!
//! `m_i` is the codec encoding of the i-th accepted message with `|` as
//! separator and `len` its byte length as a big-endian `u64`. Both parties
//! compute the same `H` for the same log, and the log itself can be
//! presented on-chain when they disagree.

use std::fmt;

use custody_codec::{Codec, WireMessage};
use custody_types::{
    CustodyError, Hash32, Result, SessionKey,
    constants::{CANONICAL_SEPARATOR, FIELD_SENDER_COMP_ID, FIELD_TARGET_COMP_ID},
};
use tiny_keccak::{Hasher, Keccak};

use crate::checks::{SessionCheck, default_checks};

/// An accepted message and its canonical encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedMessage {
    pub message: WireMessage,
    pub canonical: String,
}

/// Ordered, append-only log for one counterparty pair.
pub struct Session {
    key: SessionKey,
    codec: Codec,
    checks: Vec<Box<dyn SessionCheck>>,
    log: Vec<LoggedMessage>,
}

impl Session {
    /// Session with the default sequence and sending-time checks.
    #[must_use]
    pub fn new(key: SessionKey, codec: Codec) -> Self {
        Self::with_checks(key, codec, default_checks())
    }

    #[must_use]
    pub fn with_checks(key: SessionKey, codec: Codec, checks: Vec<Box<dyn SessionCheck>>) -> Self {
        Self {
            key,
            codec,
            checks,
            log: Vec::new(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.log.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn messages(&self) -> impl Iterator<Item = &WireMessage> {
        self.log.iter().map(|entry| &entry.message)
    }

    #[must_use]
    pub fn log(&self) -> &[LoggedMessage] {
        &self.log
    }

    fn check_routing(&self, message: &WireMessage) -> Result<()> {
        let field = |name: &str| {
            message
                .scalar(name)
                .ok_or_else(|| CustodyError::SessionFieldInvalid {
                    field: name.to_string(),
                })
        };
        let sender = field(FIELD_SENDER_COMP_ID)?;
        let target = field(FIELD_TARGET_COMP_ID)?;
        if SessionKey::new(sender, target) != self.key {
            return Err(CustodyError::WrongSession {
                reason: format!("{sender}->{target} does not belong to {}", self.key),
            });
        }
        Ok(())
    }

    /// Validate and append `message`. Returns its index in the log.
    ///
    /// # Errors
    /// - codec errors if the message is not dictionary-valid
    /// - [`CustodyError::WrongSession`] if it is addressed to another pair
    /// - the first failing check's protocol violation
    pub fn admit(&mut self, message: WireMessage) -> Result<usize> {
        self.codec.validate(&message)?;
        self.check_routing(&message)?;

        for check in &self.checks {
            if let Err(err) = check.check(&message) {
                tracing::warn!(
                    session = %self.key,
                    check = check.name(),
                    error = %err,
                    "Message rejected"
                );
                return Err(err);
            }
        }

        // Encode before committing anything so a failure here leaves state untouched.
        let canonical = self
            .codec
            .encode_with_separator(&message, CANONICAL_SEPARATOR)?;

        for check in &mut self.checks {
            check.commit(&message);
        }
        self.log.push(LoggedMessage { message, canonical });

        let index = self.log.len() - 1;
        tracing::debug!(session = %self.key, index, "Message admitted");
        Ok(index)
    }

    /// Keccak-256 over the length-prefixed canonical encodings of the log.
    #[must_use]
    pub fn session_hash(&self) -> Hash32 {
        let mut hasher = Keccak::v256();
        for entry in &self.log {
            let bytes = entry.canonical.as_bytes();
            hasher.update(&length_prefix(bytes.len()));
            hasher.update(bytes);
        }
        let mut out = [0u8; 32];
        hasher.finalize(&mut out);
        Hash32(out)
    }
}

/// Big-endian `u64` length prefix of one canonical encoding.
fn length_prefix(len: usize) -> [u8; 8] {
    u64::try_from(len).unwrap_or(u64::MAX).to_be_bytes()
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("messages", &self.log.len())
            .field(
                "checks",
                &self.checks.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use custody_codec::fixtures::{custody_codec, fill, quote, transfer};

    fn t(ms: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap() + Duration::milliseconds(ms)
    }

    fn session() -> Session {
        Session::new(SessionKey::new("ALICE", "BOB"), custody_codec())
    }

    #[test]
    fn admits_in_order() {
        let mut s = session();
        assert_eq!(s.admit(quote("ALICE", "BOB", 1, &t(0))).unwrap(), 0);
        assert_eq!(s.admit(quote("ALICE", "BOB", 2, &t(1))).unwrap(), 1);
        assert_eq!(s.admit(fill("ALICE", "BOB", 3, &t(2))).unwrap(), 2);
        assert_eq!(s.admit(transfer("BOB", "ALICE", 1, &t(3))).unwrap(), 3);
        assert_eq!(s.len(), 4);
    }

    #[test]
    fn repeated_or_skipped_sequence_rejected() {
        let mut s = session();
        s.admit(quote("ALICE", "BOB", 1, &t(0))).unwrap();
        s.admit(quote("ALICE", "BOB", 2, &t(1))).unwrap();
        let err = s.admit(quote("ALICE", "BOB", 2, &t(2))).unwrap_err();
        assert!(matches!(
            err,
            CustodyError::SequenceViolation {
                expected: 3,
                actual: 2,
                ..
            }
        ));
        let err = s.admit(quote("ALICE", "BOB", 4, &t(3))).unwrap_err();
        assert!(err.is_protocol_violation());
        assert_eq!(s.len(), 2);
        // The rejected messages left no trace: 3 is still next.
        s.admit(quote("ALICE", "BOB", 3, &t(4))).unwrap();
    }

    #[test]
    fn sending_time_is_global_across_parties() {
        let mut s = session();
        s.admit(quote("ALICE", "BOB", 1, &t(10))).unwrap();
        let err = s.admit(quote("BOB", "ALICE", 1, &t(10))).unwrap_err();
        assert!(matches!(err, CustodyError::NonMonotonicSendingTime { .. }));
        let err = s.admit(quote("BOB", "ALICE", 1, &t(5))).unwrap_err();
        assert!(matches!(err, CustodyError::NonMonotonicSendingTime { .. }));
        // The time rejection did not consume BOB's sequence number.
        s.admit(quote("BOB", "ALICE", 1, &t(11))).unwrap();
    }

    #[test]
    fn invalid_or_misrouted_messages_rejected() {
        let mut s = session();
        let mut bad = quote("ALICE", "BOB", 1, &t(0));
        bad.remove("Symbol");
        assert!(matches!(
            s.admit(bad),
            Err(CustodyError::MissingRequiredField { .. })
        ));
        assert!(matches!(
            s.admit(quote("ALICE", "CAROL", 1, &t(0))),
            Err(CustodyError::WrongSession { .. })
        ));
        assert!(s.is_empty());
    }

    #[test]
    fn hash_tracks_log() {
        let mut a = session();
        let mut b = session();
        assert_eq!(a.session_hash(), b.session_hash());

        let m1 = quote("ALICE", "BOB", 1, &t(0));
        let m2 = transfer("BOB", "ALICE", 1, &t(1));
        a.admit(m1.clone()).unwrap();
        a.admit(m2.clone()).unwrap();
        b.admit(m1).unwrap();
        assert_ne!(a.session_hash(), b.session_hash());
        b.admit(m2).unwrap();
        assert_eq!(a.session_hash(), b.session_hash());

        // A rejected message does not move the hash.
        let before = a.session_hash();
        let _ = a.admit(quote("ALICE", "BOB", 9, &t(2)));
        assert_eq!(a.session_hash(), before);
    }

    #[test]
    fn hash_is_keccak_over_length_prefixed_log() {
        assert_eq!(length_prefix(0), [0; 8]);
        assert_eq!(length_prefix(0x0102), [0, 0, 0, 0, 0, 0, 1, 2]);

        let mut s = session();
        s.admit(quote("ALICE", "BOB", 1, &t(0))).unwrap();
        s.admit(transfer("BOB", "ALICE", 1, &t(1))).unwrap();

        let mut hasher = Keccak::v256();
        for entry in s.log() {
            let len = u64::try_from(entry.canonical.len()).unwrap();
            hasher.update(&len.to_be_bytes());
            hasher.update(entry.canonical.as_bytes());
        }
        let mut expected = [0u8; 32];
        hasher.finalize(&mut expected);
        assert_eq!(s.session_hash(), Hash32(expected));
    }

    #[test]
    fn canonical_encoding_uses_pipe() {
        let mut s = session();
        s.admit(quote("ALICE", "BOB", 1, &t(0))).unwrap();
        let canonical = &s.log()[0].canonical;
        assert!(canonical.starts_with("8=CUSTODY.1.0|35=S|34=1|49=ALICE|56=BOB|"));
        assert!(!canonical.contains('\x01'));
    }
}

//! Concurrent map of open sessions.
//!
//! Messages are routed by `{SenderCompID, TargetCompID}`. Admission runs
//! while holding the session's map entry, so validate-then-append is atomic
//! per session while different sessions proceed in parallel.

use custody_codec::{Codec, WireMessage};
use custody_types::{
    CustodyError, Hash32, Result, SessionKey,
    constants::{FIELD_SENDER_COMP_ID, FIELD_TARGET_COMP_ID},
};
use dashmap::DashMap;

use crate::session::Session;

/// All sessions of one custody node.
#[derive(Debug)]
pub struct SessionRegistry {
    codec: Codec,
    sessions: DashMap<SessionKey, Session>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(codec: Codec) -> Self {
        Self {
            codec,
            sessions: DashMap::new(),
        }
    }

    /// Session key a message routes to.
    pub fn route(message: &WireMessage) -> Result<SessionKey> {
        let field = |name: &str| {
            message
                .scalar(name)
                .ok_or_else(|| CustodyError::SessionFieldInvalid {
                    field: name.to_string(),
                })
        };
        Ok(SessionKey::new(
            field(FIELD_SENDER_COMP_ID)?,
            field(FIELD_TARGET_COMP_ID)?,
        ))
    }

    /// Admit `message` into its session, opening the session on first contact.
    pub fn admit(&self, message: WireMessage) -> Result<(SessionKey, usize)> {
        let key = Self::route(&message)?;
        let mut session = self.sessions.entry(key.clone()).or_insert_with(|| {
            tracing::info!(session = %key, "Session opened");
            Session::new(key.clone(), self.codec.clone())
        });
        let admitted = session.admit(message);
        drop(session);
        match admitted {
            Ok(index) => Ok((key, index)),
            Err(err) => {
                // Don't keep a session opened by a message that was refused.
                self.sessions.remove_if(&key, |_, s| s.is_empty());
                Err(err)
            }
        }
    }

    #[must_use]
    pub fn session_hash(&self, key: &SessionKey) -> Option<Hash32> {
        self.sessions.get(key).map(|s| s.session_hash())
    }

    #[must_use]
    pub fn session_len(&self, key: &SessionKey) -> Option<usize> {
        self.sessions.get(key).map(|s| s.len())
    }

    /// Remove and return a session.
    pub fn close(&self, key: &SessionKey) -> Option<Session> {
        let closed = self.sessions.remove(key).map(|(_, s)| s);
        if closed.is_some() {
            tracing::info!(session = %key, "Session closed");
        }
        closed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

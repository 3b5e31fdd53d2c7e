//! In-memory message tree.
//!
//! A [`WireMessage`] maps field names to either a scalar string or an ordered
//! sequence of sub-messages (one per repeating-group item). It is only
//! meaningful relative to a [`TagDictionary`](crate::TagDictionary).

use std::collections::BTreeMap;

use custody_types::constants::{FIELD_BEGIN_STRING, FIELD_MSG_TYPE};
use serde::{Deserialize, Serialize};

/// A field value: scalar text or repeating-group items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireValue {
    Scalar(String),
    Group(Vec<WireMessage>),
}

impl WireValue {
    #[must_use]
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            Self::Group(_) => None,
        }
    }

    #[must_use]
    pub fn as_group(&self) -> Option<&[WireMessage]> {
        match self {
            Self::Group(items) => Some(items),
            Self::Scalar(_) => None,
        }
    }
}

impl From<&str> for WireValue {
    fn from(s: &str) -> Self {
        Self::Scalar(s.to_string())
    }
}

impl From<String> for WireValue {
    fn from(s: String) -> Self {
        Self::Scalar(s)
    }
}

impl From<Vec<WireMessage>> for WireValue {
    fn from(items: Vec<WireMessage>) -> Self {
        Self::Group(items)
    }
}

/// A message (or group item) keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WireMessage {
    fields: BTreeMap<String, WireValue>,
}

impl WireMessage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a top-level message with its two header fields.
    #[must_use]
    pub fn with_header(begin_string: &str, msg_type: &str) -> Self {
        Self::new()
            .with(FIELD_BEGIN_STRING, begin_string)
            .with(FIELD_MSG_TYPE, msg_type)
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<WireValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a field, returning the previous value.
    pub fn insert(&mut self, name: &str, value: impl Into<WireValue>) -> Option<WireValue> {
        self.fields.insert(name.to_string(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<WireValue> {
        self.fields.remove(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&WireValue> {
        self.fields.get(name)
    }

    #[must_use]
    pub fn scalar(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(WireValue::as_scalar)
    }

    #[must_use]
    pub fn group(&self, name: &str) -> Option<&[WireMessage]> {
        self.get(name).and_then(WireValue::as_group)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    #[must_use]
    pub fn begin_string(&self) -> Option<&str> {
        self.scalar(FIELD_BEGIN_STRING)
    }

    #[must_use]
    pub fn msg_type(&self) -> Option<&str> {
        self.scalar(FIELD_MSG_TYPE)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &WireValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

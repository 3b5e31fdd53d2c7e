//! Tag dictionary: which tags exist, what they are called, how they are
//! typed, and which tags each message type carries in which order.
//!
//! A dictionary is immutable once built. Construction checks it is
//! self-consistent so the codec never has to:
//! - every tag and every name is declared once
//! - every group has at least one member and only references declared tags
//! - no group contains itself, directly or through a nested group
//! - every message type references only declared tags, each at most once
//!
//! The header tags `BeginString` (8) and `MsgType` (35) are implicit and may
//! not be declared or referenced.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use custody_types::{
    CustodyError, Result,
    constants::{FIELD_BEGIN_STRING, FIELD_MSG_TYPE, TAG_BEGIN_STRING, TAG_MSG_TYPE},
};
use serde::{Deserialize, Serialize};

/// Scalar field value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Int,
    Decimal,
    /// `Y` or `N`.
    Boolean,
    /// `YYYYMMDD-HH:MM:SS[.sss]`, UTC.
    UtcTimestamp,
}

impl FieldType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::UtcTimestamp => "utc_timestamp",
        }
    }
}

/// A scalar tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub tag: u32,
    pub name: String,
    pub field_type: FieldType,
}

/// A repeating group, keyed by its NumInGroup tag.
///
/// Every item carries every member, in `members` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDef {
    pub count_tag: u32,
    pub name: String,
    pub members: Vec<u32>,
}

impl GroupDef {
    /// Tags consumed per item (a nested group counts as one).
    #[must_use]
    pub fn tags_per_item(&self) -> usize {
        self.members.len()
    }
}

/// A dictionary entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagDef {
    Field(FieldDef),
    Group(GroupDef),
}

impl TagDef {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Field(f) => &f.name,
            Self::Group(g) => &g.name,
        }
    }

    #[must_use]
    pub fn tag(&self) -> u32 {
        match self {
            Self::Field(f) => f.tag,
            Self::Group(g) => g.count_tag,
        }
    }
}

/// One top-level tag of a message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTag {
    pub tag: u32,
    #[serde(default)]
    pub required: bool,
}

/// A message type's ordered tag list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDef {
    pub msg_type: String,
    pub name: String,
    pub tags: Vec<MessageTag>,
}

impl MessageDef {
    #[must_use]
    pub fn declares(&self, tag: u32) -> bool {
        self.tags.iter().any(|t| t.tag == tag)
    }
}

// ---------------------------------------------------------------------------
// TagDictionary
// ---------------------------------------------------------------------------

/// Immutable, validated tag dictionary.
#[derive(Debug, Clone)]
pub struct TagDictionary {
    tags: BTreeMap<u32, TagDef>,
    names: HashMap<String, u32>,
    messages: BTreeMap<String, MessageDef>,
}

impl TagDictionary {
    #[must_use]
    pub fn builder() -> TagDictionaryBuilder {
        TagDictionaryBuilder::default()
    }

    #[must_use]
    pub fn tag(&self, tag: u32) -> Option<&TagDef> {
        self.tags.get(&tag)
    }

    #[must_use]
    pub fn tag_by_name(&self, name: &str) -> Option<&TagDef> {
        self.names.get(name).and_then(|t| self.tags.get(t))
    }

    #[must_use]
    pub fn message(&self, msg_type: &str) -> Option<&MessageDef> {
        self.messages.get(msg_type)
    }

    pub fn message_types(&self) -> impl Iterator<Item = &str> {
        self.messages.keys().map(String::as_str)
    }

    /// Resolve `msg_type` or fail with [`CustodyError::UnknownMsgType`].
    pub fn require_message(&self, msg_type: &str) -> Result<&MessageDef> {
        self.message(msg_type)
            .ok_or_else(|| CustodyError::UnknownMsgType(msg_type.to_string()))
    }

    /// Resolve a tag that construction proved declared.
    pub(crate) fn declared(&self, tag: u32) -> Result<&TagDef> {
        self.tag(tag)
            .ok_or_else(|| CustodyError::Internal(format!("tag {tag} vanished from dictionary")))
    }

    /// Load a dictionary from its JSON form.
    ///
    /// ```json
    /// {
    ///   "fields":   [{"tag": 55, "name": "Symbol", "type": "string"}],
    ///   "groups":   [{"count_tag": 555, "name": "LegGroup", "members": [55]}],
    ///   "messages": [{"msg_type": "D", "name": "NewOrder",
    ///                 "tags": [{"tag": 555, "required": true}]}]
    /// }
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: DictionaryDocument = serde_json::from_str(json)?;
        let mut builder = Self::builder();
        for f in doc.fields {
            builder = builder.field(f.tag, &f.name, f.field_type);
        }
        for g in doc.groups {
            builder = builder.group(g.count_tag, &g.name, &g.members);
        }
        for m in doc.messages {
            builder = builder.message(&m.msg_type, &m.name, &m.tags);
        }
        builder.build()
    }
}

#[derive(Deserialize)]
struct DictionaryDocument {
    #[serde(default)]
    fields: Vec<FieldEntry>,
    #[serde(default)]
    groups: Vec<GroupEntry>,
    #[serde(default)]
    messages: Vec<MessageEntry>,
}

#[derive(Deserialize)]
struct FieldEntry {
    tag: u32,
    name: String,
    #[serde(rename = "type")]
    field_type: FieldType,
}

#[derive(Deserialize)]
struct GroupEntry {
    count_tag: u32,
    name: String,
    members: Vec<u32>,
}

#[derive(Deserialize)]
struct MessageEntry {
    msg_type: String,
    name: String,
    tags: Vec<MessageTag>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects declarations; [`build`](Self::build) validates them all at once.
#[derive(Debug, Default)]
pub struct TagDictionaryBuilder {
    defs: Vec<TagDef>,
    messages: Vec<MessageDef>,
}

/// Shorthand for a required top-level tag.
#[must_use]
pub fn required(tag: u32) -> MessageTag {
    MessageTag {
        tag,
        required: true,
    }
}

/// Shorthand for an optional top-level tag.
#[must_use]
pub fn optional(tag: u32) -> MessageTag {
    MessageTag {
        tag,
        required: false,
    }
}

fn invalid(reason: impl Into<String>) -> CustodyError {
    CustodyError::InvalidDictionary {
        reason: reason.into(),
    }
}

impl TagDictionaryBuilder {
    #[must_use]
    pub fn field(mut self, tag: u32, name: &str, field_type: FieldType) -> Self {
        self.defs.push(TagDef::Field(FieldDef {
            tag,
            name: name.to_string(),
            field_type,
        }));
        self
    }

    #[must_use]
    pub fn group(mut self, count_tag: u32, name: &str, members: &[u32]) -> Self {
        self.defs.push(TagDef::Group(GroupDef {
            count_tag,
            name: name.to_string(),
            members: members.to_vec(),
        }));
        self
    }

    #[must_use]
    pub fn message(mut self, msg_type: &str, name: &str, tags: &[MessageTag]) -> Self {
        self.messages.push(MessageDef {
            msg_type: msg_type.to_string(),
            name: name.to_string(),
            tags: tags.to_vec(),
        });
        self
    }

    /// Validate and freeze.
    pub fn build(self) -> Result<TagDictionary> {
        let mut tags = BTreeMap::new();
        let mut names = HashMap::new();

        let header = [
            TagDef::Field(FieldDef {
                tag: TAG_BEGIN_STRING,
                name: FIELD_BEGIN_STRING.to_string(),
                field_type: FieldType::String,
            }),
            TagDef::Field(FieldDef {
                tag: TAG_MSG_TYPE,
                name: FIELD_MSG_TYPE.to_string(),
                field_type: FieldType::String,
            }),
        ];
        for def in header.into_iter().chain(self.defs) {
            if def.name().is_empty() {
                return Err(invalid(format!("tag {} has an empty name", def.tag())));
            }
            if tags.contains_key(&def.tag()) {
                return Err(invalid(format!("tag {} declared twice", def.tag())));
            }
            if names.insert(def.name().to_string(), def.tag()).is_some() {
                return Err(invalid(format!("name {} declared twice", def.name())));
            }
            tags.insert(def.tag(), def);
        }

        for def in tags.values() {
            let TagDef::Group(group) = def else { continue };
            if group.members.is_empty() {
                return Err(invalid(format!("group {} has no members", group.name)));
            }
            check_tag_list(&tags, &group.name, group.members.iter().copied())?;
            check_acyclic(&tags, group)?;
        }

        let mut messages = BTreeMap::new();
        for message in self.messages {
            if message.msg_type.is_empty() {
                return Err(invalid(format!("message {} has an empty MsgType", message.name)));
            }
            check_tag_list(&tags, &message.name, message.tags.iter().map(|t| t.tag))?;
            if messages.contains_key(&message.msg_type) {
                return Err(invalid(format!("MsgType {} declared twice", message.msg_type)));
            }
            messages.insert(message.msg_type.clone(), message);
        }

        tracing::debug!(
            tags = tags.len(),
            messages = messages.len(),
            "Tag dictionary built"
        );

        Ok(TagDictionary {
            tags,
            names,
            messages,
        })
    }
}

fn check_tag_list(
    tags: &BTreeMap<u32, TagDef>,
    owner: &str,
    list: impl Iterator<Item = u32>,
) -> Result<()> {
    let mut seen = BTreeSet::new();
    for tag in list {
        if tag == TAG_BEGIN_STRING || tag == TAG_MSG_TYPE {
            return Err(invalid(format!("{owner} references header tag {tag}")));
        }
        if !tags.contains_key(&tag) {
            return Err(invalid(format!("{owner} references undeclared tag {tag}")));
        }
        if !seen.insert(tag) {
            return Err(invalid(format!("{owner} lists tag {tag} twice")));
        }
    }
    Ok(())
}

/// Walk nested groups with an explicit stack and reject self-containment.
fn check_acyclic(tags: &BTreeMap<u32, TagDef>, root: &GroupDef) -> Result<()> {
    let mut stack: Vec<u32> = root.members.clone();
    let mut visited = BTreeSet::new();
    while let Some(tag) = stack.pop() {
        if tag == root.count_tag {
            return Err(invalid(format!("group {} contains itself", root.name)));
        }
        if !visited.insert(tag) {
            continue;
        }
        if let Some(TagDef::Group(nested)) = tags.get(&tag) {
            stack.extend(nested.members.iter().copied());
        }
    }
    Ok(())
}

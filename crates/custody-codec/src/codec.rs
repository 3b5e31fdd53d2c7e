//! Encoder and decoder.
//!
//! ## Wire format
//!
//! ```text
//! 8=<BeginString> SEP 35=<MsgType> SEP tag=value SEP tag=value ...
//! ```
//!
//! A repeating group is its NumInGroup tag followed inline by
//! `count × tags_per_item` tags, with no item boundary marker. Item
//! boundaries are recovered from the dictionary's per-item template.
//!
//! ## Decode frame stack
//!
//! Decoding is one left-to-right scan. Each open group is a [`Frame`]
//! holding the tags left in the current item and the items left in the
//! group. A scalar consumes one tag of the innermost frame; when an item
//! fills up the frame moves to the next item, and when the last item fills
//! up the frame pops and its group counts as one consumed tag of the parent.
//! Several nested groups can close on the same token.

use std::sync::Arc;

use custody_types::{
    CodecConfig, CustodyError, Result,
    constants::{
        FIELD_BEGIN_STRING, FIELD_MSG_TYPE, MAX_GROUP_COUNT, TAG_BEGIN_STRING, TAG_MSG_TYPE,
    },
};

use crate::{
    dictionary::{GroupDef, MessageDef, TagDef, TagDictionary},
    message::{WireMessage, WireValue},
    validate::validate_message,
};

/// Dictionary-driven codec.
#[derive(Debug, Clone)]
pub struct Codec {
    dictionary: Arc<TagDictionary>,
    config: CodecConfig,
}

impl Codec {
    #[must_use]
    pub fn new(dictionary: Arc<TagDictionary>, config: CodecConfig) -> Self {
        Self { dictionary, config }
    }

    #[must_use]
    pub fn dictionary(&self) -> &TagDictionary {
        &self.dictionary
    }

    #[must_use]
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Check `message` against the dictionary without encoding it.
    pub fn validate(&self, message: &WireMessage) -> Result<()> {
        validate_message(
            &self.dictionary,
            &self.config.begin_string,
            self.config.separator,
            message,
        )
        .map(|_| ())
    }

    /// Encode with the configured separator.
    pub fn encode(&self, message: &WireMessage) -> Result<String> {
        self.encode_with_separator(message, self.config.separator)
    }

    /// Encode with an explicit separator. Invalid messages are never encoded.
    pub fn encode_with_separator(&self, message: &WireMessage, separator: char) -> Result<String> {
        let def = validate_message(
            &self.dictionary,
            &self.config.begin_string,
            separator,
            message,
        )?;

        let mut tokens = vec![
            format!("{TAG_BEGIN_STRING}={}", self.config.begin_string),
            format!("{TAG_MSG_TYPE}={}", def.msg_type),
        ];
        for tag in &def.tags {
            match self.dictionary.declared(tag.tag)? {
                TagDef::Field(field) => {
                    if let Some(value) = message.scalar(&field.name) {
                        tokens.push(format!("{}={value}", field.tag));
                    }
                }
                TagDef::Group(group) => {
                    let items = message.group(&group.name).unwrap_or_default();
                    if tag.required || !items.is_empty() {
                        self.encode_group(group, items, &mut tokens)?;
                    }
                }
            }
        }

        let mut out = String::new();
        for (i, token) in tokens.iter().enumerate() {
            if i > 0 {
                out.push(separator);
            }
            out.push_str(token);
        }
        tracing::trace!(msg_type = %def.msg_type, tokens = tokens.len(), "Encoded message");
        Ok(out)
    }

    /// Count tag then each item's template members, depth first.
    fn encode_group(
        &self,
        group: &GroupDef,
        items: &[WireMessage],
        tokens: &mut Vec<String>,
    ) -> Result<()> {
        tokens.push(format!("{}={}", group.count_tag, items.len()));
        for item in items {
            for member in &group.members {
                match self.dictionary.declared(*member)? {
                    TagDef::Field(field) => {
                        let value = item.scalar(&field.name).ok_or_else(|| {
                            CustodyError::MissingRequiredField {
                                field: format!("{}.{}", group.name, field.name),
                            }
                        })?;
                        tokens.push(format!("{}={value}", field.tag));
                    }
                    TagDef::Group(nested) => {
                        // Nested groups are always emitted, even with count 0.
                        let nested_items = item.group(&nested.name).unwrap_or_default();
                        self.encode_group(nested, nested_items, tokens)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Decode one message with the configured separator.
    ///
    /// A single trailing separator is tolerated. The result is validated
    /// against the dictionary before it is returned.
    pub fn decode(&self, input: &str) -> Result<WireMessage> {
        let separator = self.config.separator;
        let body = input.strip_suffix(separator).unwrap_or(input);
        let mut tokens = body.split(separator).map(parse_token);

        let (tag, begin_string) = tokens
            .next()
            .transpose()?
            .ok_or_else(|| missing(FIELD_BEGIN_STRING))?;
        if tag != TAG_BEGIN_STRING {
            return Err(missing(FIELD_BEGIN_STRING));
        }
        if begin_string != self.config.begin_string {
            return Err(CustodyError::BeginStringMismatch {
                expected: self.config.begin_string.clone(),
                actual: begin_string.to_string(),
            });
        }
        let (tag, msg_type) = tokens
            .next()
            .transpose()?
            .ok_or_else(|| missing(FIELD_MSG_TYPE))?;
        if tag != TAG_MSG_TYPE {
            return Err(missing(FIELD_MSG_TYPE));
        }
        let def = self.dictionary.require_message(msg_type)?;

        let mut root = WireMessage::with_header(begin_string, msg_type);
        let mut stack: Vec<Frame<'_>> = Vec::new();

        for token in tokens {
            let (tag, value) = token?;
            self.decode_token(def, tag, value, &mut stack, &mut root)?;
        }

        if let Some(open) = stack.last() {
            return Err(CustodyError::TruncatedGroup {
                group: open.group.name.clone(),
            });
        }

        validate_message(&self.dictionary, &self.config.begin_string, separator, &root)?;
        tracing::trace!(msg_type = %def.msg_type, "Decoded message");
        Ok(root)
    }

    fn decode_token<'d>(
        &'d self,
        def: &MessageDef,
        tag: u32,
        value: &str,
        stack: &mut Vec<Frame<'d>>,
        root: &mut WireMessage,
    ) -> Result<()> {
        let at_root = stack.is_empty();
        let allowed = match stack.last() {
            Some(frame) => frame.group.members.contains(&tag),
            None => def.declares(tag),
        };
        if !allowed {
            return Err(CustodyError::UnknownField {
                field: self
                    .dictionary
                    .tag(tag)
                    .map_or_else(|| tag.to_string(), |d| d.name().to_string()),
            });
        }

        let tag_def = self.dictionary.declared(tag)?;
        let name = tag_def.name();
        let target = current_item(stack, root);
        if target.contains(name) {
            return Err(CustodyError::DuplicateField {
                field: name.to_string(),
            });
        }

        match tag_def {
            TagDef::Field(_) => {
                target.insert(name, value);
                consume_tag(stack, root);
            }
            TagDef::Group(group) => {
                let count = parse_count(group, value)?;
                if count > 0 {
                    stack.push(Frame::open(group, count));
                    return Ok(());
                }
                let required = def.tags.iter().any(|t| t.tag == tag && t.required);
                if at_root && !required {
                    // An optional empty top-level group is never materialized.
                    return Ok(());
                }
                target.insert(name, WireValue::Group(Vec::new()));
                consume_tag(stack, root);
            }
        }
        Ok(())
    }
}

/// One open repeating group.
struct Frame<'d> {
    group: &'d GroupDef,
    items: Vec<WireMessage>,
    current: WireMessage,
    tags_remaining: usize,
    items_remaining: usize,
}

impl<'d> Frame<'d> {
    fn open(group: &'d GroupDef, count: usize) -> Self {
        Self {
            group,
            items: Vec::with_capacity(count),
            current: WireMessage::new(),
            tags_remaining: group.tags_per_item(),
            items_remaining: count,
        }
    }
}

fn current_item<'a>(stack: &'a mut [Frame<'_>], root: &'a mut WireMessage) -> &'a mut WireMessage {
    match stack.last_mut() {
        Some(frame) => &mut frame.current,
        None => root,
    }
}

/// One tag of the innermost frame was consumed; close items and groups as they fill.
fn consume_tag(stack: &mut Vec<Frame<'_>>, root: &mut WireMessage) {
    while let Some(top) = stack.last_mut() {
        top.tags_remaining -= 1;
        if top.tags_remaining > 0 {
            return;
        }
        let item = std::mem::take(&mut top.current);
        top.items.push(item);
        top.items_remaining -= 1;
        if top.items_remaining > 0 {
            top.tags_remaining = top.group.tags_per_item();
            return;
        }
        let Some(done) = stack.pop() else { return };
        current_item(stack, root).insert(&done.group.name, WireValue::Group(done.items));
    }
}

fn missing(field: &str) -> CustodyError {
    CustodyError::MissingRequiredField {
        field: field.to_string(),
    }
}

fn parse_token(token: &str) -> Result<(u32, &str)> {
    let malformed = || CustodyError::MalformedToken {
        token: token.to_string(),
    };
    let (tag, value) = token.split_once('=').ok_or_else(malformed)?;
    if tag.is_empty() || !tag.bytes().all(|b| b.is_ascii_digit()) || value.is_empty() {
        return Err(malformed());
    }
    let tag = tag.parse::<u32>().map_err(|_| malformed())?;
    Ok((tag, value))
}

fn parse_count(group: &GroupDef, value: &str) -> Result<usize> {
    let malformed = || CustodyError::MalformedGroupCount {
        group: group.name.clone(),
        value: value.to_string(),
    };
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let count = value.parse::<usize>().map_err(|_| malformed())?;
    if count > MAX_GROUP_COUNT {
        return Err(malformed());
    }
    Ok(count)
}

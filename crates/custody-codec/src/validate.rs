//! Dictionary validation of message trees.
//!
//! A message is valid iff:
//! - `BeginString` matches the configured version
//! - `MsgType` is declared in the dictionary
//! - every required top-level tag is present
//! - an optional top-level group, when present, has at least one item
//! - every group item carries exactly its template members, recursively
//! - no field exists outside the declared tag set of its level
//! - every scalar parses as its declared [`FieldType`]

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use custody_types::{
    CustodyError, Result,
    constants::{FIELD_BEGIN_STRING, FIELD_MSG_TYPE, MAX_GROUP_COUNT, UTC_TIMESTAMP_FORMAT},
};
use rust_decimal::Decimal;

use crate::{
    dictionary::{FieldDef, FieldType, GroupDef, MessageDef, TagDef, TagDictionary},
    message::{WireMessage, WireValue},
};

/// Parse a `YYYYMMDD-HH:MM:SS[.sss]` UTC timestamp.
#[must_use]
pub fn parse_utc_timestamp(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, UTC_TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y%m%d-%H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Format a timestamp the way `SendingTime` carries it (millisecond precision).
#[must_use]
pub fn format_utc_timestamp(at: &DateTime<Utc>) -> String {
    at.format(UTC_TIMESTAMP_FORMAT).to_string()
}

fn bad_value(field: &str, value: &str, expected: FieldType) -> CustodyError {
    CustodyError::InvalidFieldValue {
        field: field.to_string(),
        value: value.to_string(),
        expected: expected.as_str().to_string(),
    }
}

pub(crate) fn check_scalar(field: &FieldDef, value: &str, separator: char) -> Result<()> {
    if value.is_empty() || value.contains(separator) || value.chars().any(char::is_control) {
        return Err(bad_value(&field.name, value, field.field_type));
    }
    let ok = match field.field_type {
        FieldType::String => true,
        FieldType::Int => value.parse::<i64>().is_ok(),
        FieldType::Decimal => Decimal::from_str(value).is_ok(),
        FieldType::Boolean => matches!(value, "Y" | "N"),
        FieldType::UtcTimestamp => parse_utc_timestamp(value).is_some(),
    };
    if ok {
        Ok(())
    } else {
        Err(bad_value(&field.name, value, field.field_type))
    }
}

/// Validate a full message and return its definition.
pub(crate) fn validate_message<'d>(
    dictionary: &'d TagDictionary,
    begin_string: &str,
    separator: char,
    message: &WireMessage,
) -> Result<&'d MessageDef> {
    let actual = message
        .begin_string()
        .ok_or_else(|| CustodyError::MissingRequiredField {
            field: FIELD_BEGIN_STRING.to_string(),
        })?;
    if actual != begin_string {
        return Err(CustodyError::BeginStringMismatch {
            expected: begin_string.to_string(),
            actual: actual.to_string(),
        });
    }
    let msg_type = message
        .msg_type()
        .ok_or_else(|| CustodyError::MissingRequiredField {
            field: FIELD_MSG_TYPE.to_string(),
        })?;
    let def = dictionary.require_message(msg_type)?;

    for (name, value) in message.iter() {
        if name == FIELD_BEGIN_STRING || name == FIELD_MSG_TYPE {
            continue;
        }
        let tag_def = dictionary
            .tag_by_name(name)
            .filter(|d| def.declares(d.tag()))
            .ok_or_else(|| CustodyError::UnknownField {
                field: name.to_string(),
            })?;
        // Encode omits it and decode never materializes it.
        if matches!(value, WireValue::Group(items) if items.is_empty())
            && !def.tags.iter().any(|t| t.tag == tag_def.tag() && t.required)
        {
            return Err(CustodyError::MalformedGroupCount {
                group: name.to_string(),
                value: "0".to_string(),
            });
        }
        check_value(dictionary, tag_def, value, separator)?;
    }

    for tag in def.tags.iter().filter(|t| t.required) {
        let name = dictionary.declared(tag.tag)?.name();
        if !message.contains(name) {
            return Err(CustodyError::MissingRequiredField {
                field: name.to_string(),
            });
        }
    }
    Ok(def)
}

fn check_value(
    dictionary: &TagDictionary,
    def: &TagDef,
    value: &WireValue,
    separator: char,
) -> Result<()> {
    match (def, value) {
        (TagDef::Field(field), WireValue::Scalar(s)) => check_scalar(field, s, separator),
        (TagDef::Group(group), WireValue::Group(items)) => {
            if items.len() > MAX_GROUP_COUNT {
                return Err(CustodyError::MalformedGroupCount {
                    group: group.name.clone(),
                    value: items.len().to_string(),
                });
            }
            items
                .iter()
                .try_for_each(|item| check_item(dictionary, group, item, separator))
        }
        _ => Err(CustodyError::FieldShapeMismatch {
            field: def.name().to_string(),
        }),
    }
}

fn check_item(
    dictionary: &TagDictionary,
    group: &GroupDef,
    item: &WireMessage,
    separator: char,
) -> Result<()> {
    for (name, value) in item.iter() {
        let def = dictionary
            .tag_by_name(name)
            .filter(|d| group.members.contains(&d.tag()))
            .ok_or_else(|| CustodyError::UnknownField {
                field: format!("{}.{name}", group.name),
            })?;
        check_value(dictionary, def, value, separator)?;
    }
    for member in &group.members {
        let name = dictionary.declared(*member)?.name();
        if !item.contains(name) {
            return Err(CustodyError::MissingRequiredField {
                field: format!("{}.{name}", group.name),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn field(field_type: FieldType) -> FieldDef {
        FieldDef {
            tag: 1,
            name: "F".into(),
            field_type,
        }
    }

    #[test]
    fn scalar_types() {
        let sep = '\x01';
        assert!(check_scalar(&field(FieldType::Int), "-42", sep).is_ok());
        assert!(check_scalar(&field(FieldType::Int), "4.2", sep).is_err());
        assert!(check_scalar(&field(FieldType::Decimal), "4.25", sep).is_ok());
        assert!(check_scalar(&field(FieldType::Decimal), "four", sep).is_err());
        assert!(check_scalar(&field(FieldType::Boolean), "Y", sep).is_ok());
        assert!(check_scalar(&field(FieldType::Boolean), "true", sep).is_err());
        assert!(check_scalar(&field(FieldType::UtcTimestamp), "20240102-03:04:05.678", sep).is_ok());
        assert!(check_scalar(&field(FieldType::UtcTimestamp), "20240102-03:04:05", sep).is_ok());
        assert!(check_scalar(&field(FieldType::UtcTimestamp), "2024-01-02", sep).is_err());
    }

    #[test]
    fn strings_reject_empty_and_separator() {
        assert!(check_scalar(&field(FieldType::String), "", '|').is_err());
        assert!(check_scalar(&field(FieldType::String), "a|b", '|').is_err());
        assert!(check_scalar(&field(FieldType::String), "a=b", '|').is_ok());
    }

    #[test]
    fn timestamp_format_round_trip() {
        let at = Utc
            .with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
            .unwrap()
            .with_nanosecond(678_000_000)
            .unwrap();
        let text = format_utc_timestamp(&at);
        assert_eq!(text, "20240102-03:04:05.678");
        assert_eq!(parse_utc_timestamp(&text), Some(at));
    }
}

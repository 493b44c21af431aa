//! Per-field syntactic validation.
//!
//! Validation is pure: it never touches storage and never mutates the tag.
//! Every value offered through [`crate::Tag::set`] passes through
//! [`validate`] before it is accepted.

use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::error::{TagError, TagResult};
use crate::field::{FieldValue, ItemId, TagField};

/// Pattern a tag key must match.
pub const KEY_PATTERN: &str = r"^[23456789ABCDEFGHIJKMNPQRSTUVWXTZ]{8}$";

/// Pattern a `dateAdded`/`dateModified` value must match.
pub const TIMESTAMP_PATTERN: &str =
    r"^[0-9]{4}-[0-9]{2}-[0-9]{2} ([0-1][0-9]|2[0-3]):([0-5][0-9]):([0-5][0-9])$";

/// chrono format matching [`TIMESTAMP_PATTERN`].
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn key_regex() -> &'static Regex {
    static KEY_REGEX: OnceLock<Regex> = OnceLock::new();
    KEY_REGEX.get_or_init(|| Regex::new(KEY_PATTERN).expect("key pattern is valid"))
}

fn timestamp_regex() -> &'static Regex {
    static TIMESTAMP_REGEX: OnceLock<Regex> = OnceLock::new();
    TIMESTAMP_REGEX.get_or_init(|| Regex::new(TIMESTAMP_PATTERN).expect("timestamp pattern is valid"))
}

/// Check whether `key` is a well-formed tag key.
pub fn is_valid_key(key: &str) -> bool {
    key_regex().is_match(key)
}

/// Parse a `YYYY-MM-DD HH:MM:SS` timestamp.
///
/// The pattern is checked first so that formats chrono would otherwise
/// accept (single-digit fields, `T` separators) are still rejected.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    if !timestamp_regex().is_match(value) {
        return None;
    }
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).ok()
}

/// Format a timestamp the way it is stored and serialized.
pub fn format_timestamp(value: &NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

/// Validate a value by field name.
pub fn validate_named(field: &str, value: &FieldValue) -> TagResult<TagField> {
    let field: TagField = field.parse()?;
    validate(field, value)?;
    Ok(field)
}

/// Validate `value` against the syntactic rule for `field`.
pub fn validate(field: TagField, value: &FieldValue) -> TagResult<()> {
    let ok = match (field, value) {
        (TagField::Id | TagField::LibraryId | TagField::TagDataId, FieldValue::Int(v)) => *v > 0,
        (TagField::Type, FieldValue::Int(v)) => (0..=i64::from(i16::MAX)).contains(v),
        (TagField::Key, FieldValue::Text(v)) => is_valid_key(v),
        (TagField::Name, FieldValue::Text(_)) => true,
        (TagField::DateAdded | TagField::DateModified, FieldValue::Text(v)) => {
            parse_timestamp(v).is_some()
        }
        (TagField::LinkedItems, FieldValue::Items(ids)) => return validate_item_ids(ids),
        _ => false,
    };

    if ok {
        Ok(())
    } else {
        Err(TagError::invalid(field, value))
    }
}

/// Validate a linked item id list.
pub fn validate_item_ids(ids: &[ItemId]) -> TagResult<()> {
    if ids.iter().all(|id| *id > 0) {
        Ok(())
    } else {
        Err(TagError::invalid(TagField::LinkedItems, FieldValue::Items(ids.to_vec())))
    }
}

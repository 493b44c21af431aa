//! Library-scoped tag keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TagError;
use crate::field::TagField;
use crate::validate::is_valid_key;

/// Characters a generated key is drawn from.
///
/// Visually ambiguous characters (`0`, `1`, `L`, `O`) and `Y` are excluded,
/// so every generated key also satisfies [`crate::validate::KEY_PATTERN`].
pub const KEY_ALPHABET: [char; 31] = [
    '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K',
    'M', 'N', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Z',
];

/// Length of every tag key.
pub const KEY_LENGTH: usize = 8;

/// An 8-character key, unique within a library.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagKey(String);

impl TagKey {
    /// Parse and validate a key.
    pub fn parse(value: &str) -> Result<Self, TagError> {
        if is_valid_key(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(TagError::invalid(TagField::Key, value))
        }
    }

    /// Generate a fresh random key.
    pub fn generate() -> Self {
        Self(nanoid::nanoid!(KEY_LENGTH, &KEY_ALPHABET))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TagKey {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TagKey {
    type Error = TagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TagKey> for String {
    fn from(key: TagKey) -> Self {
        key.0
    }
}

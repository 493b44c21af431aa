//! Field identifiers and values for tag mutation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TagError;

/// Server-assigned tag identifier.
pub type TagId = i64;

/// Owning library (scope) identifier.
pub type LibraryId = i64;

/// Identifier of an item that can carry tags.
pub type ItemId = i64;

/// Identifier of a deduplicated name+type content row.
pub type TagDataId = i64;

/// Small integer classifier for tags (0 = user tag).
pub type TagType = i16;

/// Every field a tag knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TagField {
    #[serde(rename = "id")]
    Id,
    #[serde(rename = "libraryID")]
    LibraryId,
    #[serde(rename = "key")]
    Key,
    #[serde(rename = "name")]
    Name,
    #[serde(rename = "type")]
    Type,
    #[serde(rename = "dateAdded")]
    DateAdded,
    #[serde(rename = "dateModified")]
    DateModified,
    #[serde(rename = "tagDataID")]
    TagDataId,
    #[serde(rename = "linkedItems")]
    LinkedItems,
}

impl TagField {
    pub const ALL: [TagField; 9] = [
        Self::Id,
        Self::LibraryId,
        Self::Key,
        Self::Name,
        Self::Type,
        Self::DateAdded,
        Self::DateModified,
        Self::TagDataId,
        Self::LinkedItems,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::LibraryId => "libraryID",
            Self::Key => "key",
            Self::Name => "name",
            Self::Type => "type",
            Self::DateAdded => "dateAdded",
            Self::DateModified => "dateModified",
            Self::TagDataId => "tagDataID",
            Self::LinkedItems => "linkedItems",
        }
    }

    /// Identity fields are frozen once the tag leaves the unloaded state.
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Id | Self::LibraryId | Self::Key)
    }
}

impl fmt::Display for TagField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagField {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| TagError::UnknownField(s.to_string()))
    }
}

/// A value offered for a field through the generic setter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Int(i64),
    Text(String),
    Items(Vec<ItemId>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Items(ids) => {
                let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", ids.join(", "))
            }
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i16> for FieldValue {
    fn from(v: i16) -> Self {
        Self::Int(v.into())
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<ItemId>> for FieldValue {
    fn from(v: Vec<ItemId>) -> Self {
        Self::Items(v)
    }
}

//! Neutral record projection of a tag.
//!
//! Presentation layers (feeds, sync documents) build on [`TagRecord`]; the
//! change tracker stores one as the pre-mutation baseline.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::TagResult;
use crate::field::{ItemId, LibraryId, TagId, TagType};
use crate::key::TagKey;
use crate::tag::Tag;
use crate::validate::format_timestamp;

/// Identity part of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagIdentity {
    #[serde(rename = "tagID")]
    pub id: Option<TagId>,
    #[serde(rename = "libraryID")]
    pub library_id: Option<LibraryId>,
    pub key: Option<TagKey>,
}

/// Serialized projection of a tag's scalar fields and linked item ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagRecord {
    pub identity: TagIdentity,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub tag_type: TagType,
    pub date_added: Option<String>,
    pub date_modified: Option<String>,
    #[serde(rename = "linkedItemIDs")]
    pub linked_item_ids: Vec<ItemId>,
}

impl TagRecord {
    /// Linked item ids as a set.
    pub fn linked_item_set(&self) -> BTreeSet<ItemId> {
        self.linked_item_ids.iter().copied().collect()
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

impl Tag {
    /// Project the tag into a [`TagRecord`], loading fields and linked items
    /// first if necessary.
    pub async fn to_record(&mut self) -> TagResult<TagRecord> {
        self.ensure_loaded().await?;
        self.ensure_relations_loaded().await?;

        Ok(TagRecord {
            identity: TagIdentity {
                id: self.data.id,
                library_id: self.data.library_id,
                key: self.data.key.clone(),
            },
            name: self.data.name.clone(),
            tag_type: self.data.tag_type,
            date_added: self.data.date_added.as_ref().map(format_timestamp),
            date_modified: self.data.date_modified.as_ref().map(format_timestamp),
            linked_item_ids: self.linked.iter().copied().collect(),
        })
    }
}

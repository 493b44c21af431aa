//! Storage collaborators for tags.
//!
//! The lifecycle code never talks to a database directly. It reads through
//! [`TagStorage`], writes through a [`TagTransaction`] and resolves linked
//! items through an [`ItemRepository`]. `tagstore-db` implements these for
//! PostgreSQL; [`crate::memory`] implements them in memory.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TagResult;
use crate::field::{ItemId, LibraryId, TagDataId, TagId, TagType};
use crate::key::TagKey;

/// A tag row joined with its content row, as read from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRow {
    pub id: TagId,
    pub library_id: LibraryId,
    pub key: TagKey,
    pub tag_data_id: TagDataId,
    pub name: String,
    pub tag_type: TagType,
    pub date_added: NaiveDateTime,
    pub date_modified: NaiveDateTime,
}

/// Values written by an upsert of the tag row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagWrite {
    pub id: TagId,
    pub library_id: LibraryId,
    pub key: TagKey,
    pub tag_data_id: TagDataId,
    pub tag_type: TagType,
    pub date_added: NaiveDateTime,
    pub date_modified: NaiveDateTime,
    /// Transaction timestamp, second precision.
    pub server_date_modified: NaiveDateTime,
    /// Millisecond part of the transaction timestamp.
    pub server_date_modified_ms: i16,
}

/// An item that tags can be linked to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub library_id: LibraryId,
    pub key: String,
}

/// Read access to tags and the transaction factory.
#[async_trait]
pub trait TagStorage: Send + Sync {
    /// Get a tag by id.
    async fn load_by_id(&self, id: TagId) -> TagResult<Option<TagRow>>;

    /// Get a tag by library and key.
    async fn load_by_key(&self, library_id: LibraryId, key: &TagKey) -> TagResult<Option<TagRow>>;

    /// Check whether a tag row exists.
    async fn exists(&self, id: TagId) -> TagResult<bool>;

    /// Ids of all items currently linked to a tag.
    async fn linked_item_ids(&self, id: TagId) -> TagResult<Vec<ItemId>>;

    /// Start a transaction.
    async fn begin(&self) -> TagResult<Box<dyn TagTransaction>>;
}

/// Writes performed atomically by a save.
///
/// Dropping a transaction without calling [`TagTransaction::commit`] must
/// discard every write made through it.
#[async_trait]
pub trait TagTransaction: Send {
    /// Timestamp shared by every write in this transaction.
    fn timestamp(&self) -> DateTime<Utc>;

    /// Allocate the next tag id from the monotonic sequence.
    async fn allocate_tag_id(&mut self) -> TagResult<TagId>;

    /// Resolve the content row for `(name, tag_type)`, creating it if absent.
    async fn resolve_tag_data(&mut self, name: &str, tag_type: TagType) -> TagResult<TagDataId>;

    /// Insert the tag row, or overwrite it if the id already exists.
    ///
    /// Returns the id of the written row, or `None` if storage did not
    /// report one.
    async fn upsert_tag(&mut self, tag: &TagWrite) -> TagResult<Option<TagId>>;

    /// Ids of items linked to a tag, as seen inside this transaction.
    async fn linked_item_ids(&mut self, id: TagId) -> TagResult<Vec<ItemId>>;

    /// Delete junction rows. Returns the number of rows removed.
    async fn unlink_items(&mut self, id: TagId, item_ids: &[ItemId]) -> TagResult<u64>;

    /// Insert junction rows with a single statement. Returns rows inserted.
    async fn link_items(&mut self, id: TagId, item_ids: &[ItemId]) -> TagResult<u64>;

    async fn commit(self: Box<Self>) -> TagResult<()>;

    async fn rollback(self: Box<Self>) -> TagResult<()>;
}

/// Resolves item ids into full items.
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Get items by id. Ids with no matching item are skipped.
    async fn get(&self, ids: &[ItemId]) -> TagResult<Vec<Item>>;
}

//! Collaborators shared by every tag instance.

use std::sync::Arc;

use crate::cache::KeyCache;
use crate::config::TagConfig;
use crate::error::{TagError, TagResult};
use crate::field::{LibraryId, TagField, TagId};
use crate::key::TagKey;
use crate::storage::{ItemRepository, TagStorage};
use crate::tag::Tag;

/// Storage, item lookup, key cache and configuration for tags.
///
/// Cheap to clone; every tag keeps its own handle.
#[derive(Clone)]
pub struct TagContext {
    storage: Arc<dyn TagStorage>,
    items: Arc<dyn ItemRepository>,
    keys: KeyCache,
    config: TagConfig,
}

impl TagContext {
    pub fn new(storage: Arc<dyn TagStorage>, items: Arc<dyn ItemRepository>) -> Self {
        Self {
            storage,
            items,
            keys: KeyCache::new(),
            config: TagConfig::default(),
        }
    }

    pub fn with_config(mut self, config: TagConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing key cache.
    pub fn with_key_cache(mut self, keys: KeyCache) -> Self {
        self.keys = keys;
        self
    }

    pub fn storage(&self) -> &dyn TagStorage {
        self.storage.as_ref()
    }

    pub fn items(&self) -> &dyn ItemRepository {
        self.items.as_ref()
    }

    pub fn key_cache(&self) -> &KeyCache {
        &self.keys
    }

    pub fn config(&self) -> &TagConfig {
        &self.config
    }

    /// A new, unsaved tag.
    pub fn new_tag(&self) -> Tag {
        Tag::new(self.clone())
    }

    /// An unloaded tag identified by id. Nothing is read until a field is.
    pub fn tag_by_id(&self, id: TagId) -> TagResult<Tag> {
        let mut tag = self.new_tag();
        tag.set_id(id)?;
        Ok(tag)
    }

    /// An unloaded tag identified by library and key.
    pub fn tag_by_key(&self, library_id: LibraryId, key: &str) -> TagResult<Tag> {
        let key = TagKey::parse(key)?;
        let mut tag = self.new_tag();
        tag.set_library_id(library_id)?;
        tag.set_key(key.as_str())?;
        Ok(tag)
    }

    /// Look up a tag id by library and key, consulting the key cache first.
    pub async fn lookup_id(&self, library_id: LibraryId, key: &TagKey) -> TagResult<Option<TagId>> {
        if library_id <= 0 {
            return Err(TagError::invalid(TagField::LibraryId, library_id));
        }
        if let Some(id) = self.keys.get(library_id, key) {
            return Ok(Some(id));
        }

        let row = self.storage.load_by_key(library_id, key).await?;
        Ok(row.map(|row| row.id))
    }
}

impl std::fmt::Debug for TagContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagContext")
            .field("keys", &self.keys.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

//! Library/key → tag id lookups shared between tag instances.

use std::sync::Arc;

use dashmap::DashMap;

use crate::field::{LibraryId, TagId};
use crate::key::TagKey;

/// Maps `(library_id, key)` to a tag id.
///
/// Entries are added when a new tag is committed and never expire: a tag's
/// key and library cannot change once it has been stored. Clones share the
/// same underlying map.
#[derive(Debug, Clone, Default)]
pub struct KeyCache {
    entries: Arc<DashMap<(LibraryId, TagKey), TagId>>,
}

impl KeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, library_id: LibraryId, key: &TagKey) -> Option<TagId> {
        self.entries
            .get(&(library_id, key.clone()))
            .map(|entry| *entry.value())
    }

    pub fn insert(&self, library_id: LibraryId, key: TagKey, id: TagId) {
        self.entries.insert((library_id, key), id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

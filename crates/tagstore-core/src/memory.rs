//! In-memory storage backends (for testing and development).
//!
//! [`MemoryTagStorage`] keeps the same tables as the PostgreSQL backend
//! (tags, tag data, item links) behind a `tokio` lock. A transaction reads
//! and writes a private copy of the state and logs its writes; commit
//! replays the log onto the current shared state, so concurrent commits to
//! other rows are kept. Ids come straight from the shared counters, like a
//! sequence, and are not reused after a rollback. Reads are counted and
//! failures can be injected at every transaction step.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::{Mutex, RwLock as SyncRwLock};
use tokio::sync::RwLock;

use crate::error::{TagError, TagResult};
use crate::field::{ItemId, LibraryId, TagDataId, TagId, TagType};
use crate::key::TagKey;
use crate::storage::{Item, ItemRepository, TagRow, TagStorage, TagTransaction, TagWrite};

/// A step at which [`MemoryTagStorage`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Begin,
    AllocateId,
    ResolveTagData,
    Upsert,
    /// The upsert succeeds but reports no id.
    MissingInsertId,
    Unlink,
    Link,
    Commit,
}

#[derive(Debug, Clone)]
struct StoredTag {
    library_id: LibraryId,
    key: TagKey,
    tag_data_id: TagDataId,
    tag_type: TagType,
    date_added: NaiveDateTime,
    date_modified: NaiveDateTime,
    server_date_modified: NaiveDateTime,
    server_date_modified_ms: i16,
}

/// A write made inside a [`MemoryTransaction`], replayed on commit.
#[derive(Debug, Clone)]
enum PendingWrite {
    TagData {
        id: TagDataId,
        name: String,
        tag_type: TagType,
    },
    Tag {
        id: TagId,
        tag: StoredTag,
    },
    Link {
        tag_id: TagId,
        item_id: ItemId,
    },
    Unlink {
        tag_id: TagId,
        item_id: ItemId,
    },
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tags: BTreeMap<TagId, StoredTag>,
    tag_data: BTreeMap<TagDataId, (String, TagType)>,
    links: BTreeSet<(TagId, ItemId)>,
    last_tag_id: TagId,
    last_tag_data_id: TagDataId,
}

impl MemoryState {
    fn row(&self, id: TagId) -> Option<TagRow> {
        let tag = self.tags.get(&id)?;
        // A tag without its content row reads as missing.
        let (name, _) = self.tag_data.get(&tag.tag_data_id)?;
        Some(TagRow {
            id,
            library_id: tag.library_id,
            key: tag.key.clone(),
            tag_data_id: tag.tag_data_id,
            name: name.clone(),
            tag_type: tag.tag_type,
            date_added: tag.date_added,
            date_modified: tag.date_modified,
        })
    }

    fn id_for_key(&self, library_id: LibraryId, key: &TagKey) -> Option<TagId> {
        self.tags
            .iter()
            .find(|(_, tag)| tag.library_id == library_id && &tag.key == key)
            .map(|(id, _)| *id)
    }

    fn linked(&self, id: TagId) -> Vec<ItemId> {
        self.links
            .range((id, ItemId::MIN)..=(id, ItemId::MAX))
            .map(|(_, item)| *item)
            .collect()
    }

    fn find_tag_data(&self, name: &str, tag_type: TagType) -> Option<TagDataId> {
        self.tag_data
            .iter()
            .find(|(_, (n, t))| n == name && *t == tag_type)
            .map(|(id, _)| *id)
    }

    fn resolve_tag_data(&mut self, name: &str, tag_type: TagType) -> TagDataId {
        if let Some(id) = self.find_tag_data(name, tag_type) {
            return id;
        }
        self.last_tag_data_id += 1;
        self.tag_data
            .insert(self.last_tag_data_id, (name.to_string(), tag_type));
        self.last_tag_data_id
    }

    fn upsert_tag(&mut self, id: TagId, tag: StoredTag) -> TagResult<()> {
        if let Some(other) = self.id_for_key(tag.library_id, &tag.key) {
            if other != id {
                return Err(TagError::Storage(format!(
                    "Duplicate key: library {} already has tag key {}",
                    tag.library_id, tag.key
                )));
            }
        }
        self.tags.insert(id, tag);
        self.last_tag_id = self.last_tag_id.max(id);
        Ok(())
    }

    fn link(&mut self, tag_id: TagId, item_id: ItemId) -> TagResult<()> {
        if !self.links.insert((tag_id, item_id)) {
            return Err(TagError::Storage(format!(
                "Duplicate key: item {item_id} already linked to tag {tag_id}"
            )));
        }
        Ok(())
    }

    /// Replay a transaction's writes. Content rows created concurrently
    /// under the same name and type are reused.
    fn apply(&mut self, writes: &[PendingWrite]) -> TagResult<()> {
        let mut tag_data_ids: BTreeMap<TagDataId, TagDataId> = BTreeMap::new();

        for write in writes {
            match write {
                PendingWrite::TagData { id, name, tag_type } => {
                    let resolved = match self.find_tag_data(name, *tag_type) {
                        Some(existing) => existing,
                        None => {
                            self.tag_data.insert(*id, (name.clone(), *tag_type));
                            self.last_tag_data_id = self.last_tag_data_id.max(*id);
                            *id
                        }
                    };
                    tag_data_ids.insert(*id, resolved);
                }
                PendingWrite::Tag { id, tag } => {
                    let mut tag = tag.clone();
                    if let Some(resolved) = tag_data_ids.get(&tag.tag_data_id) {
                        tag.tag_data_id = *resolved;
                    }
                    self.upsert_tag(*id, tag)?;
                }
                PendingWrite::Link { tag_id, item_id } => self.link(*tag_id, *item_id)?,
                PendingWrite::Unlink { tag_id, item_id } => {
                    self.links.remove(&(*tag_id, *item_id));
                }
            }
        }
        Ok(())
    }
}

/// Counters for storage calls.
#[derive(Debug, Default)]
pub struct MemoryStats {
    loads: AtomicUsize,
    relation_reads: AtomicUsize,
    existence_checks: AtomicUsize,
    link_statements: AtomicUsize,
    unlink_statements: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

impl MemoryStats {
    /// Tag reads by id or key.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Linked item reads, both outside and inside transactions.
    pub fn relation_reads(&self) -> usize {
        self.relation_reads.load(Ordering::SeqCst)
    }

    pub fn existence_checks(&self) -> usize {
        self.existence_checks.load(Ordering::SeqCst)
    }

    /// Junction insert statements.
    pub fn link_statements(&self) -> usize {
        self.link_statements.load(Ordering::SeqCst)
    }

    pub fn unlink_statements(&self) -> usize {
        self.unlink_statements.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory tag storage.
#[derive(Clone, Default)]
pub struct MemoryTagStorage {
    state: Arc<RwLock<MemoryState>>,
    stats: Arc<MemoryStats>,
    fail: Arc<Mutex<Option<FailPoint>>>,
}

impl MemoryTagStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &MemoryStats {
        &self.stats
    }

    /// Fail the next time `point` is reached, and every time after, until
    /// [`MemoryTagStorage::clear_failure`].
    pub fn fail_at(&self, point: FailPoint) {
        *self.fail.lock() = Some(point);
    }

    pub fn clear_failure(&self) {
        *self.fail.lock() = None;
    }

    /// Insert a tag directly, bypassing the lifecycle code.
    pub async fn seed_tag(
        &self,
        library_id: LibraryId,
        key: &str,
        name: &str,
        tag_type: TagType,
        linked: &[ItemId],
    ) -> TagResult<TagId> {
        let key = TagKey::parse(key)?;
        let stamp = Utc::now().naive_utc();
        let mut state = self.state.write().await;

        state.last_tag_id += 1;
        let id = state.last_tag_id;
        let tag_data_id = state.resolve_tag_data(name, tag_type);
        state.tags.insert(
            id,
            StoredTag {
                library_id,
                key,
                tag_data_id,
                tag_type,
                date_added: stamp,
                date_modified: stamp,
                server_date_modified: stamp,
                server_date_modified_ms: 0,
            },
        );
        state.links.extend(linked.iter().map(|item| (id, *item)));
        Ok(id)
    }

    /// Link items to a tag outside any tag instance, as a concurrent writer
    /// would.
    pub async fn link_directly(&self, id: TagId, items: &[ItemId]) {
        let mut state = self.state.write().await;
        state.links.extend(items.iter().map(|item| (id, *item)));
    }

    /// Unlink items from a tag outside any tag instance.
    pub async fn unlink_directly(&self, id: TagId, items: &[ItemId]) {
        let mut state = self.state.write().await;
        for item in items {
            state.links.remove(&(id, *item));
        }
    }

    /// Delete a content row, leaving tags that reference it dangling.
    pub async fn remove_tag_data(&self, tag_data_id: TagDataId) {
        self.state.write().await.tag_data.remove(&tag_data_id);
    }

    /// Stored links for a tag, without touching the counters.
    pub async fn stored_links(&self, id: TagId) -> BTreeSet<ItemId> {
        self.state.read().await.linked(id).into_iter().collect()
    }

    /// Stored row for a tag, without touching the counters.
    pub async fn stored_tag(&self, id: TagId) -> Option<TagRow> {
        self.state.read().await.row(id)
    }

    /// Server modification time of a stored tag.
    pub async fn server_date_modified(&self, id: TagId) -> Option<(NaiveDateTime, i16)> {
        self.state
            .read()
            .await
            .tags
            .get(&id)
            .map(|tag| (tag.server_date_modified, tag.server_date_modified_ms))
    }

    pub async fn tag_count(&self) -> usize {
        self.state.read().await.tags.len()
    }

    pub async fn tag_data_count(&self) -> usize {
        self.state.read().await.tag_data.len()
    }

    fn check(fail: &Mutex<Option<FailPoint>>, point: FailPoint) -> TagResult<()> {
        if *fail.lock() == Some(point) {
            return Err(TagError::Storage(format!("injected failure at {point:?}")));
        }
        Ok(())
    }
}

#[async_trait]
impl TagStorage for MemoryTagStorage {
    async fn load_by_id(&self, id: TagId) -> TagResult<Option<TagRow>> {
        MemoryStats::bump(&self.stats.loads);
        Ok(self.state.read().await.row(id))
    }

    async fn load_by_key(&self, library_id: LibraryId, key: &TagKey) -> TagResult<Option<TagRow>> {
        MemoryStats::bump(&self.stats.loads);
        let state = self.state.read().await;
        Ok(state
            .id_for_key(library_id, key)
            .and_then(|id| state.row(id)))
    }

    async fn exists(&self, id: TagId) -> TagResult<bool> {
        MemoryStats::bump(&self.stats.existence_checks);
        Ok(self.state.read().await.tags.contains_key(&id))
    }

    async fn linked_item_ids(&self, id: TagId) -> TagResult<Vec<ItemId>> {
        MemoryStats::bump(&self.stats.relation_reads);
        Ok(self.state.read().await.linked(id))
    }

    async fn begin(&self) -> TagResult<Box<dyn TagTransaction>> {
        Self::check(&self.fail, FailPoint::Begin)?;
        let working = self.state.read().await.clone();
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.state),
            working,
            writes: Vec::new(),
            stats: Arc::clone(&self.stats),
            fail: Arc::clone(&self.fail),
            timestamp: Utc::now(),
        }))
    }
}

/// A transaction over a private copy of [`MemoryTagStorage`] state.
pub struct MemoryTransaction {
    shared: Arc<RwLock<MemoryState>>,
    working: MemoryState,
    writes: Vec<PendingWrite>,
    stats: Arc<MemoryStats>,
    fail: Arc<Mutex<Option<FailPoint>>>,
    timestamp: DateTime<Utc>,
}

impl MemoryTransaction {
    fn check(&self, point: FailPoint) -> TagResult<()> {
        MemoryTagStorage::check(&self.fail, point)
    }
}

#[async_trait]
impl TagTransaction for MemoryTransaction {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    async fn allocate_tag_id(&mut self) -> TagResult<TagId> {
        self.check(FailPoint::AllocateId)?;
        let id = {
            let mut shared = self.shared.write().await;
            shared.last_tag_id += 1;
            shared.last_tag_id
        };
        self.working.last_tag_id = self.working.last_tag_id.max(id);
        Ok(id)
    }

    async fn resolve_tag_data(&mut self, name: &str, tag_type: TagType) -> TagResult<TagDataId> {
        self.check(FailPoint::ResolveTagData)?;
        if let Some(id) = self.working.find_tag_data(name, tag_type) {
            return Ok(id);
        }

        let id = {
            let mut shared = self.shared.write().await;
            shared.last_tag_data_id += 1;
            shared.last_tag_data_id
        };
        self.working.tag_data.insert(id, (name.to_string(), tag_type));
        self.working.last_tag_data_id = self.working.last_tag_data_id.max(id);
        self.writes.push(PendingWrite::TagData {
            id,
            name: name.to_string(),
            tag_type,
        });
        Ok(id)
    }

    async fn upsert_tag(&mut self, tag: &TagWrite) -> TagResult<Option<TagId>> {
        self.check(FailPoint::Upsert)?;

        let stored = StoredTag {
            library_id: tag.library_id,
            key: tag.key.clone(),
            tag_data_id: tag.tag_data_id,
            tag_type: tag.tag_type,
            date_added: tag.date_added,
            date_modified: tag.date_modified,
            server_date_modified: tag.server_date_modified,
            server_date_modified_ms: tag.server_date_modified_ms,
        };
        self.working.upsert_tag(tag.id, stored.clone())?;
        self.writes.push(PendingWrite::Tag {
            id: tag.id,
            tag: stored,
        });

        if self.check(FailPoint::MissingInsertId).is_err() {
            return Ok(None);
        }
        Ok(Some(tag.id))
    }

    async fn linked_item_ids(&mut self, id: TagId) -> TagResult<Vec<ItemId>> {
        MemoryStats::bump(&self.stats.relation_reads);
        Ok(self.working.linked(id))
    }

    async fn unlink_items(&mut self, id: TagId, item_ids: &[ItemId]) -> TagResult<u64> {
        self.check(FailPoint::Unlink)?;
        MemoryStats::bump(&self.stats.unlink_statements);
        let mut removed = 0;
        for item in item_ids {
            if self.working.links.remove(&(id, *item)) {
                self.writes.push(PendingWrite::Unlink {
                    tag_id: id,
                    item_id: *item,
                });
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn link_items(&mut self, id: TagId, item_ids: &[ItemId]) -> TagResult<u64> {
        self.check(FailPoint::Link)?;
        MemoryStats::bump(&self.stats.link_statements);
        let mut inserted = 0;
        for item in item_ids {
            self.working.link(id, *item)?;
            self.writes.push(PendingWrite::Link {
                tag_id: id,
                item_id: *item,
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn commit(self: Box<Self>) -> TagResult<()> {
        self.check(FailPoint::Commit)?;
        let this = *self;

        let mut shared = this.shared.write().await;
        let mut next = shared.clone();
        next.apply(&this.writes)?;
        *shared = next;
        drop(shared);

        MemoryStats::bump(&this.stats.commits);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> TagResult<()> {
        MemoryStats::bump(&self.stats.rollbacks);
        Ok(())
    }
}

/// In-memory item repository.
#[derive(Clone, Default)]
pub struct MemoryItemRepository {
    items: Arc<SyncRwLock<BTreeMap<ItemId, Item>>>,
}

impl MemoryItemRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, item: Item) {
        self.items.write().insert(item.id, item);
    }
}

#[async_trait]
impl ItemRepository for MemoryItemRepository {
    async fn get(&self, ids: &[ItemId]) -> TagResult<Vec<Item>> {
        let items = self.items.read();
        Ok(ids.iter().filter_map(|id| items.get(id).cloned()).collect())
    }
}

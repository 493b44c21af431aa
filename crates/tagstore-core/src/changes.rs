//! Dirty-field tracking and the pre-mutation baseline.

use std::collections::BTreeSet;

use crate::error::TagResult;
use crate::field::{ItemId, TagField};
use crate::record::TagRecord;
use crate::tag::Tag;

/// Fields mutated since load, plus the snapshot taken before the first of
/// them was applied.
#[derive(Debug, Clone, Default)]
pub struct ChangeTracker {
    changed: BTreeSet<TagField>,
    previous: Option<TagRecord>,
    exists: Option<bool>,
}

impl ChangeTracker {
    pub fn is_changed(&self, field: TagField) -> bool {
        self.changed.contains(&field)
    }

    pub fn has_any_change(&self) -> bool {
        !self.changed.is_empty()
    }

    pub fn changed_fields(&self) -> impl Iterator<Item = TagField> + '_ {
        self.changed.iter().copied()
    }

    /// The baseline captured before the first mutation, if any.
    pub fn previous(&self) -> Option<&TagRecord> {
        self.previous.as_ref()
    }

    pub fn previous_linked_items(&self) -> Option<&[ItemId]> {
        self.previous.as_ref().map(|record| record.linked_item_ids.as_slice())
    }

    /// Whether the next recorded change is the first of this epoch and no
    /// baseline exists yet.
    pub(crate) fn wants_baseline(&self) -> bool {
        self.changed.is_empty() && self.previous.is_none()
    }

    /// Store the baseline. Only the first capture is kept.
    pub(crate) fn capture_baseline(&mut self, record: TagRecord) -> bool {
        if self.previous.is_some() {
            return false;
        }
        self.previous = Some(record);
        true
    }

    pub(crate) fn record(&mut self, field: TagField) {
        self.changed.insert(field);
    }

    pub(crate) fn known_existence(&self) -> Option<bool> {
        self.exists
    }

    pub(crate) fn set_existence(&mut self, exists: bool) {
        self.exists = Some(exists);
    }

    /// Start a new epoch after a commit: nothing is dirty, the baseline is
    /// gone and the tag is known to be stored.
    pub(crate) fn reset_epoch(&mut self) {
        self.changed.clear();
        self.previous = None;
        self.exists = Some(true);
    }
}

impl Tag {
    /// Whether the tag's row exists in storage.
    ///
    /// A tag known only by key is loaded first to resolve its id. A tag
    /// without an id does not exist. Otherwise storage is asked once and the
    /// answer is kept for the life of this instance.
    pub async fn exists(&mut self) -> TagResult<bool> {
        if let Some(known) = self.changes.known_existence() {
            return Ok(known);
        }
        if self.data.id.is_none() && self.data.key.is_some() {
            self.ensure_loaded().await?;
        }
        let Some(id) = self.data.id else {
            return Ok(false);
        };

        let exists = self.ctx.storage().exists(id).await?;
        self.changes.set_existence(exists);
        Ok(exists)
    }

    /// Record a mutation of `field`. Must run before the new value is
    /// assigned so the baseline reflects the stored state.
    pub(crate) async fn mark_changed(&mut self, field: TagField) -> TagResult<()> {
        if self.changes.wants_baseline() && self.exists().await? {
            let baseline = self.to_record().await?;
            self.changes.capture_baseline(baseline);
        }
        self.changes.record(field);
        Ok(())
    }

    pub fn changes(&self) -> &ChangeTracker {
        &self.changes
    }

    pub fn is_changed(&self, field: TagField) -> bool {
        self.changes.is_changed(field)
    }

    pub fn has_changes(&self) -> bool {
        self.changes.has_any_change()
    }
}

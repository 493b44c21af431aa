//! Transactional save of a tag and its linked items.

use chrono::{NaiveDateTime, SubsecRound, Timelike};
use tracing::{debug, warn};

use crate::error::{TagError, TagResult};
use crate::field::{LibraryId, TagDataId, TagField, TagId};
use crate::key::TagKey;
use crate::reconcile::{apply_delta, relation_delta, SyncMode};
use crate::storage::{TagTransaction, TagWrite};
use crate::tag::Tag;

/// Result of [`Tag::save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The tag was written; carries its id.
    Saved(TagId),
    /// Nothing was dirty, nothing was written.
    NoChanges,
}

impl SaveOutcome {
    pub fn id(&self) -> Option<TagId> {
        match self {
            Self::Saved(id) => Some(*id),
            Self::NoChanges => None,
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved(_))
    }
}

/// Values fixed by a committed transaction.
struct Written {
    id: TagId,
    key: TagKey,
    tag_data_id: TagDataId,
    timestamp: NaiveDateTime,
    is_new: bool,
}

impl Tag {
    /// Save with [`SyncMode::Partial`].
    pub async fn save(&mut self) -> TagResult<SaveOutcome> {
        self.save_with(SyncMode::Partial).await
    }

    /// Save all changes in one transaction.
    ///
    /// On failure the transaction is rolled back and the tag is left exactly
    /// as it was before the call.
    pub async fn save_with(&mut self, mode: SyncMode) -> TagResult<SaveOutcome> {
        let library_id = self.data.library_id.ok_or(TagError::NotSavable)?;

        if !self.changes.has_any_change() {
            debug!(tag_id = ?self.data.id, "Tag has not changed");
            return Ok(SaveOutcome::NoChanges);
        }

        let sync_relations = mode == SyncMode::Full || self.changes.is_changed(TagField::LinkedItems);
        if sync_relations {
            self.ensure_relations_loaded().await?;
        }

        let mut tx = self.ctx.storage().begin().await?;
        let written = match self.write(tx.as_mut(), library_id, mode, sync_relations).await {
            Ok(written) => written,
            Err(e) => {
                warn!(tag_id = ?self.data.id, error = %e, "Rolling back tag save");
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Rollback failed");
                }
                return Err(e);
            }
        };
        tx.commit().await?;

        let id = written.id;
        self.finish_save(library_id, written);
        Ok(SaveOutcome::Saved(id))
    }

    async fn write(
        &self,
        tx: &mut dyn TagTransaction,
        library_id: LibraryId,
        mode: SyncMode,
        sync_relations: bool,
    ) -> TagResult<Written> {
        let name = self
            .data
            .name
            .clone()
            .ok_or_else(|| TagError::invalid(TagField::Name, ""))?;

        let is_new = self.data.id.is_none();
        let tag_id = match self.data.id {
            Some(id) => id,
            None => tx.allocate_tag_id().await?,
        };
        debug!(tag_id, library_id, "Saving tag");

        let key = self.data.key.clone().unwrap_or_else(TagKey::generate);
        let tag_data_id = tx.resolve_tag_data(&name, self.data.tag_type).await?;

        let now = tx.timestamp();
        let timestamp = now.naive_utc().trunc_subsecs(0);
        let millis = (now.nanosecond() / 1_000_000).min(999) as i16;

        let row = TagWrite {
            id: tag_id,
            library_id,
            key: key.clone(),
            tag_data_id,
            tag_type: self.data.tag_type,
            date_added: self.data.date_added.unwrap_or(timestamp),
            date_modified: self.data.date_modified.unwrap_or(timestamp),
            server_date_modified: timestamp,
            server_date_modified_ms: millis,
        };

        let written_id = tx.upsert_tag(&row).await?;
        let tag_id = if is_new {
            written_id.ok_or(TagError::IdentifierUnavailable)?
        } else {
            tag_id
        };

        if sync_relations {
            let delta = relation_delta(
                tx,
                tag_id,
                mode,
                &self.linked,
                self.changes.previous_linked_items(),
            )
            .await?;
            apply_delta(tx, tag_id, &delta, self.ctx.config().link_batch_size).await?;
        }

        Ok(Written {
            id: tag_id,
            key,
            tag_data_id,
            timestamp,
            is_new,
        })
    }

    fn finish_save(&mut self, library_id: LibraryId, written: Written) {
        if written.is_new {
            self.ctx
                .key_cache()
                .insert(library_id, written.key.clone(), written.id);
        }

        self.data.id = Some(written.id);
        self.data.key = Some(written.key);
        self.data.tag_data_id = Some(written.tag_data_id);
        self.data.date_added.get_or_insert(written.timestamp);
        self.data.date_modified.get_or_insert(written.timestamp);
        self.state.loaded = true;
        if written.is_new {
            // Nothing was stored before this commit, so memory is complete.
            self.state.relations_loaded = true;
        }
        self.changes.reset_epoch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_outcome() {
        assert_eq!(SaveOutcome::Saved(4).id(), Some(4));
        assert!(SaveOutcome::Saved(4).is_saved());
        assert_eq!(SaveOutcome::NoChanges.id(), None);
        assert!(!SaveOutcome::NoChanges.is_saved());
    }
}

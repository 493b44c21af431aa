//! Relation reconciliation between a tag and its linked items.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TagResult;
use crate::field::{ItemId, TagId};
use crate::storage::TagTransaction;

/// Which state linked items are diffed against when saving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Diff against the snapshot taken before the first mutation.
    #[default]
    Partial,
    /// Re-read the stored links inside the save transaction and diff
    /// against those. Repairs drift left by concurrent writers.
    Full,
}

/// Junction rows to delete and insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationDelta {
    pub to_add: BTreeSet<ItemId>,
    pub to_remove: BTreeSet<ItemId>,
}

impl RelationDelta {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// The membership obtained by applying this delta to `baseline`.
    pub fn apply_to(&self, baseline: &BTreeSet<ItemId>) -> BTreeSet<ItemId> {
        baseline
            .difference(&self.to_remove)
            .chain(self.to_add.iter())
            .copied()
            .collect()
    }
}

/// Compute the minimal delta turning `baseline` into `current`.
pub fn reconcile(current: &BTreeSet<ItemId>, baseline: &BTreeSet<ItemId>) -> RelationDelta {
    RelationDelta {
        to_add: current.difference(baseline).copied().collect(),
        to_remove: baseline.difference(current).copied().collect(),
    }
}

/// Compute the delta for `mode`.
///
/// In [`SyncMode::Full`] the baseline is read through `tx`; in
/// [`SyncMode::Partial`] it is the snapshot, and a missing snapshot means
/// every current member is new.
pub async fn relation_delta(
    tx: &mut dyn TagTransaction,
    tag_id: TagId,
    mode: SyncMode,
    current: &BTreeSet<ItemId>,
    snapshot: Option<&[ItemId]>,
) -> TagResult<RelationDelta> {
    let baseline: BTreeSet<ItemId> = match mode {
        SyncMode::Full => tx.linked_item_ids(tag_id).await?.into_iter().collect(),
        SyncMode::Partial => snapshot.unwrap_or_default().iter().copied().collect(),
    };
    Ok(reconcile(current, &baseline))
}

/// Write `delta` through `tx`, inserting at most `batch_size` rows per
/// statement.
pub async fn apply_delta(
    tx: &mut dyn TagTransaction,
    tag_id: TagId,
    delta: &RelationDelta,
    batch_size: usize,
) -> TagResult<()> {
    if !delta.to_remove.is_empty() {
        let removed: Vec<ItemId> = delta.to_remove.iter().copied().collect();
        tx.unlink_items(tag_id, &removed).await?;
    }

    if !delta.to_add.is_empty() {
        let added: Vec<ItemId> = delta.to_add.iter().copied().collect();
        for chunk in added.chunks(batch_size.max(1)) {
            tx.link_items(tag_id, chunk).await?;
        }
    }

    debug!(
        tag_id,
        added = delta.to_add.len(),
        removed = delta.to_remove.len(),
        "Applied linked item changes"
    );
    Ok(())
}

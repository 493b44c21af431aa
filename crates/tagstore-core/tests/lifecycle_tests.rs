//! Integration tests for the tag lifecycle.
//!
//! These tests drive tags end-to-end against the in-memory backend: lazy
//! loading, change tracking, partial and full relation sync, batching,
//! rollback and the key cache.

use std::collections::BTreeSet;
use std::sync::Arc;

use tagstore_core::validate::is_valid_key;
use tagstore_core::{
    FailPoint, FieldValue, Item, ItemId, MemoryItemRepository, MemoryTagStorage, SaveOutcome,
    SyncMode, TagConfig, TagContext, TagError, TagField,
};

// ============================================================================
// Helper functions
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Harness {
    ctx: TagContext,
    storage: MemoryTagStorage,
    items: MemoryItemRepository,
}

fn harness() -> Harness {
    harness_with(TagConfig::default())
}

fn harness_with(config: TagConfig) -> Harness {
    init_tracing();
    let storage = MemoryTagStorage::new();
    let items = MemoryItemRepository::new();
    let ctx = TagContext::new(Arc::new(storage.clone()), Arc::new(items.clone())).with_config(config);
    Harness {
        ctx,
        storage,
        items,
    }
}

fn set(ids: &[ItemId]) -> BTreeSet<ItemId> {
    ids.iter().copied().collect()
}

// ============================================================================
// Saving new tags
// ============================================================================

#[tokio::test]
async fn test_new_tag_scenario() -> anyhow::Result<()> {
    let h = harness();

    let mut tag = h.ctx.new_tag();
    tag.set_library_id(1)?;
    tag.set_name("foo").await?;
    tag.set_linked_items([101, 102]).await?;

    let outcome = tag.save().await?;
    let id = outcome.id().expect("tag should be saved");
    assert!(id > 0);

    let key = tag.key().await?.cloned().expect("key should be generated");
    assert!(is_valid_key(key.as_str()));
    assert_eq!(tag.linked_item_ids().await?, set(&[101, 102]));

    // A fresh instance sees the same state.
    let mut reloaded = h.ctx.tag_by_id(id)?;
    assert_eq!(reloaded.name().await?, Some("foo"));
    assert_eq!(reloaded.key().await?, Some(&key));
    assert_eq!(reloaded.linked_item_ids().await?, set(&[101, 102]));
    Ok(())
}

#[tokio::test]
async fn test_new_tag_dates_default_to_transaction_time() -> anyhow::Result<()> {
    let h = harness();

    let mut tag = h.ctx.new_tag();
    tag.set_library_id(1)?;
    tag.set_name("dated").await?;
    let id = tag.save().await?.id().unwrap();

    let stored = h.storage.stored_tag(id).await.unwrap();
    let (server_modified, millis) = h.storage.server_date_modified(id).await.unwrap();
    assert_eq!(stored.date_added, server_modified);
    assert_eq!(stored.date_modified, server_modified);
    assert!((0..1000).contains(&millis));

    assert_eq!(tag.date_added().await?, Some(server_modified));
    Ok(())
}

#[tokio::test]
async fn test_explicit_dates_are_kept() -> anyhow::Result<()> {
    let h = harness();

    let mut tag = h.ctx.new_tag();
    tag.set_library_id(1)?;
    tag.set_name("old").await?;
    tag.set(TagField::DateAdded, "2010-05-01 12:00:00").await?;
    tag.set_by_name("dateModified", "2011-05-01 12:00:00").await?;
    let id = tag.save().await?.id().unwrap();

    let record = h.ctx.tag_by_id(id)?.to_record().await?;
    assert_eq!(record.date_added.as_deref(), Some("2010-05-01 12:00:00"));
    assert_eq!(record.date_modified.as_deref(), Some("2011-05-01 12:00:00"));
    Ok(())
}

#[tokio::test]
async fn test_identical_names_share_content_row() -> anyhow::Result<()> {
    let h = harness();

    let mut first = h.ctx.new_tag();
    first.set_library_id(1)?;
    first.set_name("shared").await?;
    first.save().await?;

    let mut second = h.ctx.new_tag();
    second.set_library_id(2)?;
    second.set_name("shared").await?;
    second.save().await?;

    assert_eq!(first.tag_data_id().await?, second.tag_data_id().await?);
    assert_eq!(h.storage.tag_data_count().await, 1);
    Ok(())
}

// ============================================================================
// No-op saves and soft outcomes
// ============================================================================

#[tokio::test]
async fn test_second_save_is_noop() -> anyhow::Result<()> {
    let h = harness();

    let mut tag = h.ctx.new_tag();
    tag.set_library_id(1)?;
    tag.set_name("foo").await?;
    let id = tag.save().await?.id().unwrap();

    let before = h.storage.stored_tag(id).await.unwrap();
    let server_before = h.storage.server_date_modified(id).await;

    assert_eq!(tag.save().await?, SaveOutcome::NoChanges);
    assert_eq!(tag.save_with(SyncMode::Full).await?, SaveOutcome::NoChanges);

    let after = h.storage.stored_tag(id).await.unwrap();
    assert_eq!(after.date_modified, before.date_modified);
    assert_eq!(h.storage.server_date_modified(id).await, server_before);
    assert_eq!(h.storage.stats().commits(), 1);
    Ok(())
}

#[tokio::test]
async fn test_setting_same_value_is_not_a_change() -> anyhow::Result<()> {
    let h = harness();
    let id = h.storage.seed_tag(1, "ABCDEFGH", "foo", 0, &[1, 2]).await?;

    let mut tag = h.ctx.tag_by_id(id)?;
    assert!(!tag.set_name("foo").await?);
    assert!(!tag.set_type(0).await?);
    assert!(!tag.set_linked_items([2, 1, 2]).await?);

    assert!(!tag.has_changes());
    assert_eq!(tag.save().await?, SaveOutcome::NoChanges);
    Ok(())
}

#[tokio::test]
async fn test_save_without_library_is_not_savable() -> anyhow::Result<()> {
    let h = harness();

    let mut tag = h.ctx.new_tag();
    tag.set_name("orphan").await?;

    assert_eq!(tag.save().await.unwrap_err(), TagError::NotSavable);
    assert_eq!(h.storage.tag_count().await, 0);
    Ok(())
}

// ============================================================================
// Relation sync
// ============================================================================

#[tokio::test]
async fn test_partial_sync_with_snapshot() -> anyhow::Result<()> {
    let h = harness();
    let id = h.storage.seed_tag(1, "ABCDEFGH", "foo", 0, &[101, 102]).await?;

    let mut tag = h.ctx.tag_by_id(id)?;
    assert!(tag.set_linked_items([102, 103]).await?);
    assert_eq!(tag.changes().previous_linked_items(), Some(&[101, 102][..]));

    tag.save().await?;

    assert_eq!(h.storage.stored_links(id).await, set(&[102, 103]));
    assert_eq!(h.storage.stats().unlink_statements(), 1);
    assert_eq!(h.storage.stats().link_statements(), 1);
    Ok(())
}

#[tokio::test]
async fn test_partial_sync_without_snapshot_adds_everything() -> anyhow::Result<()> {
    let h = harness();

    let mut tag = h.ctx.new_tag();
    tag.set_library_id(1)?;
    tag.set_linked_items([102, 103]).await?;
    tag.set_name("fresh").await?;
    assert!(tag.changes().previous().is_none());

    let id = tag.save().await?.id().unwrap();

    assert_eq!(h.storage.stored_links(id).await, set(&[102, 103]));
    assert_eq!(h.storage.stats().unlink_statements(), 0);
    Ok(())
}

#[tokio::test]
async fn test_tag_missing_from_storage_takes_no_snapshot() -> anyhow::Result<()> {
    let h = harness();

    let mut tag = h.ctx.new_tag();
    tag.set_id(500)?;
    tag.set_library_id(1)?;
    tag.set_linked_items([102, 103]).await?;
    tag.set_name("late").await?;

    assert!(tag.changes().previous().is_none());
    assert_eq!(tag.save().await?, SaveOutcome::Saved(500));
    assert_eq!(h.storage.stored_links(500).await, set(&[102, 103]));
    Ok(())
}

#[tokio::test]
async fn test_full_sync_repairs_concurrent_drift() -> anyhow::Result<()> {
    let h = harness();
    let id = h.storage.seed_tag(1, "ABCDEFGH", "foo", 0, &[101]).await?;

    let mut tag = h.ctx.tag_by_id(id)?;
    tag.set_linked_items([101, 102]).await?;

    // Another writer links 104 between load and save.
    h.storage.link_directly(id, &[104]).await;
    assert_eq!(h.storage.stored_links(id).await, set(&[101, 104]));

    tag.save_with(SyncMode::Full).await?;

    assert_eq!(h.storage.stored_links(id).await, set(&[101, 102]));
    Ok(())
}

#[tokio::test]
async fn test_partial_sync_keeps_concurrent_drift() -> anyhow::Result<()> {
    let h = harness();
    let id = h.storage.seed_tag(1, "ABCDEFGH", "foo", 0, &[101]).await?;

    let mut tag = h.ctx.tag_by_id(id)?;
    tag.set_linked_items([101, 102]).await?;
    h.storage.link_directly(id, &[104]).await;

    tag.save().await?;

    assert_eq!(h.storage.stored_links(id).await, set(&[101, 102, 104]));
    Ok(())
}

#[tokio::test]
async fn test_full_sync_runs_without_relation_changes() -> anyhow::Result<()> {
    let h = harness();
    let id = h.storage.seed_tag(1, "ABCDEFGH", "foo", 0, &[101]).await?;

    let mut tag = h.ctx.tag_by_id(id)?;
    tag.linked_item_ids().await?;
    h.storage.link_directly(id, &[104]).await;
    tag.set_name("renamed").await?;

    tag.save_with(SyncMode::Full).await?;

    assert_eq!(h.storage.stored_links(id).await, set(&[101]));
    assert_eq!(h.storage.stored_tag(id).await.unwrap().name, "renamed");
    Ok(())
}

#[tokio::test]
async fn test_each_save_diffs_against_fresh_baseline() -> anyhow::Result<()> {
    let h = harness();

    let mut tag = h.ctx.new_tag();
    tag.set_library_id(1)?;
    tag.set_name("epochs").await?;
    tag.set_linked_items([1, 2]).await?;
    let id = tag.save().await?.id().unwrap();

    tag.set_linked_items([2, 3]).await?;
    assert_eq!(tag.changes().previous_linked_items(), Some(&[1, 2][..]));
    tag.save().await?;
    assert_eq!(h.storage.stored_links(id).await, set(&[2, 3]));

    tag.set_linked_items([3]).await?;
    tag.save().await?;
    assert_eq!(h.storage.stored_links(id).await, set(&[3]));
    Ok(())
}

#[tokio::test]
async fn test_large_sets_are_inserted_in_batches() -> anyhow::Result<()> {
    let h = harness();

    let mut tag = h.ctx.new_tag();
    tag.set_library_id(1)?;
    tag.set_name("bulk").await?;
    tag.set_linked_items(1..=120).await?;
    let id = tag.save().await?.id().unwrap();

    assert_eq!(h.storage.stats().link_statements(), 3);
    assert_eq!(h.storage.stored_links(id).await.len(), 120);
    Ok(())
}

#[tokio::test]
async fn test_batch_size_is_configurable() -> anyhow::Result<()> {
    let h = harness_with(TagConfig::default().with_link_batch_size(10));

    let mut tag = h.ctx.new_tag();
    tag.set_library_id(1)?;
    tag.set_name("bulk").await?;
    tag.set_linked_items(1..=25).await?;
    tag.save().await?;

    assert_eq!(h.storage.stats().link_statements(), 3);
    Ok(())
}

// ============================================================================
// Change tracking
// ============================================================================

#[tokio::test]
async fn test_snapshot_taken_before_first_mutation() -> anyhow::Result<()> {
    let h = harness();
    let id = h.storage.seed_tag(1, "ABCDEFGH", "before", 0, &[5]).await?;

    let mut tag = h.ctx.tag_by_id(id)?;
    tag.set_name("after").await?;
    tag.set_linked_items([6]).await?;

    let previous = tag.changes().previous().expect("snapshot should be captured");
    assert_eq!(previous.name.as_deref(), Some("before"));
    assert_eq!(previous.linked_item_ids, vec![5]);
    assert!(tag.is_changed(TagField::Name));
    assert!(tag.is_changed(TagField::LinkedItems));
    assert!(!tag.is_changed(TagField::Type));
    assert_eq!(h.storage.stats().existence_checks(), 1);
    Ok(())
}

#[tokio::test]
async fn test_snapshot_for_tag_addressed_by_key() -> anyhow::Result<()> {
    let h = harness();
    let id = h.storage.seed_tag(1, "ABCDEFGH", "before", 0, &[5]).await?;

    let mut tag = h.ctx.tag_by_key(1, "ABCDEFGH")?;
    assert!(tag.exists().await?);
    tag.set_linked_items([6]).await?;

    let previous = tag.changes().previous().expect("snapshot should be captured");
    assert_eq!(previous.identity.id, Some(id));
    assert_eq!(previous.linked_item_ids, vec![5]);

    tag.save().await?;
    assert_eq!(h.storage.stored_links(id).await, set(&[6]));
    Ok(())
}

// ============================================================================
// Identity and validation
// ============================================================================

#[tokio::test]
async fn test_identity_is_frozen_after_load() -> anyhow::Result<()> {
    let h = harness();
    let id = h.storage.seed_tag(1, "ABCDEFGH", "foo", 0, &[]).await?;

    let mut tag = h.ctx.new_tag();
    tag.set_id(id)?;
    tag.set_library_id(1)?;
    tag.name().await?;

    assert_eq!(tag.set_id(id + 1).unwrap_err(), TagError::ImmutableFieldMutation(TagField::Id));
    assert_eq!(
        tag.set_library_id(2).unwrap_err(),
        TagError::ImmutableFieldMutation(TagField::LibraryId)
    );
    assert_eq!(
        tag.set(TagField::Key, "ZZZZZZZZ").await.unwrap_err(),
        TagError::ImmutableFieldMutation(TagField::Key)
    );
    Ok(())
}

#[tokio::test]
async fn test_key_validation() -> anyhow::Result<()> {
    let h = harness();

    let mut tag = h.ctx.new_tag();
    assert!(tag.set_key("ABCDEFGH").is_ok());

    for bad in ["abcdefgh", "ABCDEFG1"] {
        let mut tag = h.ctx.new_tag();
        let err = tag.set_key(bad).unwrap_err();
        assert!(matches!(err, TagError::InvalidValue { field: TagField::Key, .. }), "{bad}");
    }
    assert!(h.ctx.tag_by_key(1, "abcdefgh").is_err());
    Ok(())
}

#[tokio::test]
async fn test_generic_setter_dispatch() -> anyhow::Result<()> {
    let h = harness();
    let mut tag = h.ctx.new_tag();
    assert!(tag.set_by_name("libraryID", 3i64).await?);

    assert_eq!(
        tag.set_by_name("colour", "red").await.unwrap_err(),
        TagError::UnknownField("colour".to_string())
    );
    assert_eq!(
        tag.set_by_name("tagDataID", 5i64).await.unwrap_err(),
        TagError::ImmutableFieldMutation(TagField::TagDataId)
    );
    assert!(tag.set_by_name("type", "one").await.unwrap_err().is_validation());
    assert!(tag.set_by_name("dateAdded", "yesterday").await.unwrap_err().is_validation());
    assert!(tag.set(TagField::LinkedItems, "1,2").await.unwrap_err().is_validation());

    assert!(tag.set_by_name("name", "dispatched").await?);
    assert!(tag.set(TagField::LinkedItems, FieldValue::Items(vec![9])).await?);
    assert!(tag.save().await?.is_saved());
    Ok(())
}

#[tokio::test]
async fn test_invalid_linked_item_ids() -> anyhow::Result<()> {
    let h = harness();
    let mut tag = h.ctx.new_tag();

    let err = tag.set_linked_items([1, -4]).await.unwrap_err();
    assert!(matches!(err, TagError::InvalidValue { field: TagField::LinkedItems, .. }));
    assert!(!tag.has_changes());
    Ok(())
}

// ============================================================================
// Rollback
// ============================================================================

#[tokio::test]
async fn test_failed_save_rolls_back_and_can_retry() -> anyhow::Result<()> {
    let h = harness();

    let mut tag = h.ctx.new_tag();
    tag.set_library_id(1)?;
    tag.set_name("fragile").await?;
    tag.set_linked_items([1, 2]).await?;

    h.storage.fail_at(FailPoint::Link);
    let err = tag.save().await.unwrap_err();
    assert!(err.is_storage());

    assert_eq!(h.storage.tag_count().await, 0);
    assert_eq!(h.storage.stats().rollbacks(), 1);
    assert!(tag.has_changes());
    assert_eq!(tag.id().await?, None);
    assert_eq!(tag.key().await?, None);
    assert!(h.ctx.key_cache().is_empty());

    h.storage.clear_failure();
    let id = tag.save().await?.id().unwrap();
    assert_eq!(h.storage.stored_links(id).await, set(&[1, 2]));
    Ok(())
}

#[tokio::test]
async fn test_failed_update_leaves_storage_untouched() -> anyhow::Result<()> {
    let h = harness();
    let id = h.storage.seed_tag(1, "ABCDEFGH", "foo", 0, &[1, 2]).await?;

    let mut tag = h.ctx.tag_by_id(id)?;
    tag.set_name("bar").await?;
    tag.set_linked_items([3]).await?;

    h.storage.fail_at(FailPoint::Unlink);
    assert!(tag.save().await.is_err());

    assert_eq!(h.storage.stored_tag(id).await.unwrap().name, "foo");
    assert_eq!(h.storage.stored_links(id).await, set(&[1, 2]));
    assert_eq!(tag.name().await?, Some("bar"));
    assert_eq!(tag.changes().previous_linked_items(), Some(&[1, 2][..]));
    Ok(())
}

#[tokio::test]
async fn test_failed_commit_is_reported() -> anyhow::Result<()> {
    let h = harness();

    let mut tag = h.ctx.new_tag();
    tag.set_library_id(1)?;
    tag.set_name("commit").await?;

    h.storage.fail_at(FailPoint::Commit);
    assert!(tag.save().await.unwrap_err().is_storage());
    assert_eq!(h.storage.tag_count().await, 0);
    assert!(tag.has_changes());
    Ok(())
}

#[tokio::test]
async fn test_missing_insert_id() -> anyhow::Result<()> {
    let h = harness();

    let mut tag = h.ctx.new_tag();
    tag.set_library_id(1)?;
    tag.set_name("ghost").await?;

    h.storage.fail_at(FailPoint::MissingInsertId);
    assert_eq!(tag.save().await.unwrap_err(), TagError::IdentifierUnavailable);
    assert_eq!(h.storage.tag_count().await, 0);
    Ok(())
}

// ============================================================================
// Key cache, records and items
// ============================================================================

#[tokio::test]
async fn test_new_tag_registers_key() -> anyhow::Result<()> {
    let h = harness();

    let mut tag = h.ctx.new_tag();
    tag.set_library_id(7)?;
    tag.set_name("cached").await?;
    let id = tag.save().await?.id().unwrap();
    let key = tag.key().await?.cloned().unwrap();

    assert_eq!(h.ctx.key_cache().get(7, &key), Some(id));
    assert_eq!(h.ctx.lookup_id(7, &key).await?, Some(id));

    let mut by_key = h.ctx.tag_by_key(7, key.as_str())?;
    assert_eq!(by_key.id().await?, Some(id));
    Ok(())
}

#[tokio::test]
async fn test_record_roundtrip_matches_linked_ids() -> anyhow::Result<()> {
    let h = harness();
    let id = h.storage.seed_tag(1, "ABCDEFGH", "foo", 1, &[3, 1, 2]).await?;

    let mut tag = h.ctx.tag_by_id(id)?;
    let record = tag.to_record().await?;
    assert_eq!(record.identity.id, Some(id));
    assert_eq!(record.tag_type, 1);

    let json = serde_json::to_string(&record)?;
    let parsed: tagstore_core::TagRecord = serde_json::from_str(&json)?;
    assert_eq!(parsed.linked_item_set(), tag.linked_item_ids().await?);
    Ok(())
}

#[tokio::test]
async fn test_linked_items_resolve_through_repository() -> anyhow::Result<()> {
    let h = harness();
    for id in [1, 2] {
        h.items.insert(Item {
            id,
            library_id: 1,
            key: format!("ITEM000{id}"),
        });
    }
    let tag_id = h.storage.seed_tag(1, "ABCDEFGH", "foo", 0, &[1, 2, 3]).await?;

    let mut tag = h.ctx.tag_by_id(tag_id)?;
    let items = tag.linked_items().await?;

    assert_eq!(items.iter().map(|item| item.id).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(tag.linked_item_ids().await?.len(), 3);
    Ok(())
}

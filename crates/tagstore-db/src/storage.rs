//! DB-backed implementations of the tagstore-core storage traits.
//!
//! Reads go through the repositories. A save runs inside one
//! [`DbTagTransaction`]; dropping it without commit rolls everything back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use tagstore_core::storage::{ItemRepository as ItemSource, TagStorage, TagTransaction};
use tagstore_core::{
    Item, ItemId, LibraryId, TagDataId, TagId, TagKey, TagResult, TagRow, TagType, TagWrite,
};

use crate::error::DbError;
use crate::repositories::{insert_links_sql, ItemRepository, TagRepository};

fn to_row(entity: Option<crate::entities::TagEntity>) -> TagResult<Option<TagRow>> {
    Ok(entity.map(TagRow::try_from).transpose()?)
}

// =============================================================================
// Reads
// =============================================================================

/// PostgreSQL tag storage.
#[derive(Clone)]
pub struct DbTagStorage {
    pool: PgPool,
    tags: TagRepository,
}

impl DbTagStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            tags: TagRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl TagStorage for DbTagStorage {
    async fn load_by_id(&self, id: TagId) -> TagResult<Option<TagRow>> {
        to_row(self.tags.find_by_id(id).await?)
    }

    async fn load_by_key(&self, library_id: LibraryId, key: &TagKey) -> TagResult<Option<TagRow>> {
        to_row(self.tags.find_by_key(library_id, key.as_str()).await?)
    }

    async fn exists(&self, id: TagId) -> TagResult<bool> {
        Ok(self.tags.exists(id).await?)
    }

    async fn linked_item_ids(&self, id: TagId) -> TagResult<Vec<ItemId>> {
        Ok(self.tags.linked_item_ids(id).await?)
    }

    async fn begin(&self) -> TagResult<Box<dyn TagTransaction>> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        // now() is fixed for the whole transaction.
        let timestamp = sqlx::query_scalar::<_, DateTime<Utc>>("SELECT now()")
            .fetch_one(&mut *tx)
            .await
            .map_err(DbError::from)?;

        Ok(Box::new(DbTagTransaction { tx, timestamp }))
    }
}

// =============================================================================
// Writes
// =============================================================================

/// A save in progress.
pub struct DbTagTransaction {
    tx: Transaction<'static, Postgres>,
    timestamp: DateTime<Utc>,
}

#[async_trait]
impl TagTransaction for DbTagTransaction {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    async fn allocate_tag_id(&mut self) -> TagResult<TagId> {
        let id = sqlx::query_scalar::<_, i64>("SELECT nextval('tags_tag_id_seq')")
            .fetch_one(&mut *self.tx)
            .await
            .map_err(DbError::from)?;

        Ok(id)
    }

    async fn resolve_tag_data(&mut self, name: &str, tag_type: TagType) -> TagResult<TagDataId> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO tag_data (name, type)
            VALUES ($1, $2)
            ON CONFLICT (name, type) DO UPDATE SET name = EXCLUDED.name
            RETURNING tag_data_id
            "#,
        )
        .bind(name)
        .bind(tag_type)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(DbError::from)?;

        Ok(id)
    }

    async fn upsert_tag(&mut self, tag: &TagWrite) -> TagResult<Option<TagId>> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO tags (
                tag_id, library_id, key, tag_data_id, type,
                date_added, date_modified, server_date_modified, server_date_modified_ms
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (tag_id) DO UPDATE SET
                library_id = EXCLUDED.library_id,
                key = EXCLUDED.key,
                tag_data_id = EXCLUDED.tag_data_id,
                type = EXCLUDED.type,
                date_added = EXCLUDED.date_added,
                date_modified = EXCLUDED.date_modified,
                server_date_modified = EXCLUDED.server_date_modified,
                server_date_modified_ms = EXCLUDED.server_date_modified_ms
            RETURNING tag_id
            "#,
        )
        .bind(tag.id)
        .bind(tag.library_id)
        .bind(tag.key.as_str())
        .bind(tag.tag_data_id)
        .bind(tag.tag_type)
        .bind(tag.date_added)
        .bind(tag.date_modified)
        .bind(tag.server_date_modified)
        .bind(tag.server_date_modified_ms)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(DbError::from)?;

        Ok(id)
    }

    async fn linked_item_ids(&mut self, id: TagId) -> TagResult<Vec<ItemId>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT item_id FROM item_tags WHERE tag_id = $1 ORDER BY item_id",
        )
        .bind(id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(DbError::from)?;

        Ok(ids)
    }

    async fn unlink_items(&mut self, id: TagId, item_ids: &[ItemId]) -> TagResult<u64> {
        let result = sqlx::query("DELETE FROM item_tags WHERE tag_id = $1 AND item_id = ANY($2)")
            .bind(id)
            .bind(item_ids)
            .execute(&mut *self.tx)
            .await
            .map_err(DbError::from)?;

        Ok(result.rows_affected())
    }

    async fn link_items(&mut self, id: TagId, item_ids: &[ItemId]) -> TagResult<u64> {
        if item_ids.is_empty() {
            return Ok(0);
        }

        let sql = insert_links_sql(item_ids.len());
        let mut query = sqlx::query(&sql).bind(id);
        for item_id in item_ids {
            query = query.bind(*item_id);
        }
        let result = query
            .execute(&mut *self.tx)
            .await
            .map_err(DbError::from)?;

        debug!(tag_id = id, rows = result.rows_affected(), "Linked items");
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> TagResult<()> {
        let this = *self;
        this.tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> TagResult<()> {
        let this = *self;
        this.tx.rollback().await.map_err(DbError::from)?;
        Ok(())
    }
}

// =============================================================================
// Items
// =============================================================================

/// PostgreSQL item lookups.
#[derive(Clone)]
pub struct DbItemRepository {
    items: ItemRepository,
}

impl DbItemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            items: ItemRepository::new(pool),
        }
    }
}

#[async_trait]
impl ItemSource for DbItemRepository {
    async fn get(&self, ids: &[ItemId]) -> TagResult<Vec<Item>> {
        let items = self.items.find_by_ids(ids).await?;
        Ok(items.into_iter().map(Item::from).collect())
    }
}

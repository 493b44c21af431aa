//! Item repository - lookups of linked items.

use sqlx::PgPool;

use crate::entities::ItemEntity;
use crate::error::DbError;

#[derive(Clone)]
pub struct ItemRepository {
    pool: PgPool,
}

impl ItemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get items by id. Unknown ids are skipped.
    pub async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<ItemEntity>, DbError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let items = sqlx::query_as::<_, ItemEntity>(
            "SELECT item_id, library_id, key FROM items WHERE item_id = ANY($1) ORDER BY item_id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Insert an item, or update its key if it exists.
    pub async fn upsert(&self, item: &ItemEntity) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO items (item_id, library_id, key)
            VALUES ($1, $2, $3)
            ON CONFLICT (item_id) DO UPDATE
            SET library_id = EXCLUDED.library_id, key = EXCLUDED.key
            "#,
        )
        .bind(item.item_id)
        .bind(item.library_id)
        .bind(&item.key)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

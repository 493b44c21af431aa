//! Tag repository - reads of tags and their links.

use sqlx::PgPool;

use crate::entities::TagEntity;
use crate::error::DbError;

/// Columns selected for a [`TagEntity`].
const TAG_COLUMNS: &str = "t.tag_id, t.library_id, t.key, t.tag_data_id, d.name, \
     t.type AS tag_type, t.date_added, t.date_modified";

/// Repository for tag reads outside a transaction.
#[derive(Clone)]
pub struct TagRepository {
    pool: PgPool,
}

impl TagRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a tag by ID. A tag whose `tag_data` row is gone is not returned.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<TagEntity>, DbError> {
        let sql = format!(
            "SELECT {TAG_COLUMNS} FROM tags t \
             JOIN tag_data d ON d.tag_data_id = t.tag_data_id \
             WHERE t.tag_id = $1"
        );
        let tag = sqlx::query_as::<_, TagEntity>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(tag)
    }

    /// Get a tag by library and key.
    pub async fn find_by_key(&self, library_id: i64, key: &str) -> Result<Option<TagEntity>, DbError> {
        let sql = format!(
            "SELECT {TAG_COLUMNS} FROM tags t \
             JOIN tag_data d ON d.tag_data_id = t.tag_data_id \
             WHERE t.library_id = $1 AND t.key = $2"
        );
        let tag = sqlx::query_as::<_, TagEntity>(&sql)
            .bind(library_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(tag)
    }

    /// Check whether a `tags` row exists.
    pub async fn exists(&self, id: i64) -> Result<bool, DbError> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM tags WHERE tag_id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }

    /// Get the ids of items linked to a tag.
    pub async fn linked_item_ids(&self, id: i64) -> Result<Vec<i64>, DbError> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT item_id FROM item_tags WHERE tag_id = $1 ORDER BY item_id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

/// Multi-row insert into `item_tags` for `count` items.
///
/// `$1` is the tag id; `$2..` are the item ids.
pub fn insert_links_sql(count: usize) -> String {
    let rows: Vec<String> = (0..count).map(|i| format!("($1, ${})", i + 2)).collect();
    format!("INSERT INTO item_tags (tag_id, item_id) VALUES {}", rows.join(", "))
}

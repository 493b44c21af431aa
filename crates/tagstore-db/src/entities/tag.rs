//! Tag entity: a `tags` row joined with its `tag_data` row.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use tagstore_core::{TagKey, TagRow};

use crate::error::DbError;

/// TagEntity - a tag with its name resolved.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TagEntity {
    /// Primary key, allocated from `tags_tag_id_seq`.
    pub tag_id: i64,

    pub library_id: i64,

    /// Eight-character key, unique per library.
    pub key: String,

    pub tag_data_id: i64,

    /// Name from `tag_data`.
    pub name: String,

    pub tag_type: i16,

    pub date_added: NaiveDateTime,
    pub date_modified: NaiveDateTime,
}

impl TryFrom<TagEntity> for TagRow {
    type Error = DbError;

    fn try_from(entity: TagEntity) -> Result<Self, Self::Error> {
        let key = TagKey::parse(&entity.key).map_err(|e| {
            DbError::InvalidData(format!("tag {}: {e}", entity.tag_id))
        })?;

        Ok(TagRow {
            id: entity.tag_id,
            library_id: entity.library_id,
            key,
            tag_data_id: entity.tag_data_id,
            name: entity.name,
            tag_type: entity.tag_type,
            date_added: entity.date_added,
            date_modified: entity.date_modified,
        })
    }
}

//! Item entity - the targets of tag links.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use tagstore_core::Item;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ItemEntity {
    pub item_id: i64,
    pub library_id: i64,
    pub key: String,
}

impl From<ItemEntity> for Item {
    fn from(entity: ItemEntity) -> Self {
        Item {
            id: entity.item_id,
            library_id: entity.library_id,
            key: entity.key,
        }
    }
}

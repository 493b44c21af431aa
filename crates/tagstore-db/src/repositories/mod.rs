//! Repository implementations for database operations.

pub mod item;
pub mod tag;

pub use item::*;
pub use tag::*;

use std::sync::Arc;

use sqlx::PgPool;
use tagstore_core::{TagConfig, TagContext};

use crate::error::DbError;
use crate::storage::{DbItemRepository, DbTagStorage};

/// Database context containing all repositories.
#[derive(Clone)]
pub struct DbContext {
    pub pool: PgPool,
    pub tags: TagRepository,
    pub items: ItemRepository,
}

impl DbContext {
    /// Create a new database context from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            tags: TagRepository::new(pool.clone()),
            items: ItemRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create the tag tables if missing.
    pub async fn migrate(&self) -> Result<(), DbError> {
        crate::schema::migrate(&self.pool).await
    }

    /// A [`TagContext`] whose tags load from and save to this database.
    pub fn tag_context(&self, config: TagConfig) -> TagContext {
        TagContext::new(
            Arc::new(DbTagStorage::new(self.pool.clone())),
            Arc::new(DbItemRepository::new(self.pool.clone())),
        )
        .with_config(config)
    }
}

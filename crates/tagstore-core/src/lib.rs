//! # tagstore-core
//!
//! Lifecycle of library-scoped tags: lazy loading, validated mutation with
//! dirty-field tracking, reconciliation of the tag ↔ item relation and
//! all-or-nothing saves.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tagstore_core::{MemoryItemRepository, MemoryTagStorage, TagContext};
//!
//! # async fn run() -> Result<(), tagstore_core::TagError> {
//! let ctx = TagContext::new(
//!     Arc::new(MemoryTagStorage::new()),
//!     Arc::new(MemoryItemRepository::new()),
//! );
//!
//! let mut tag = ctx.new_tag();
//! tag.set_library_id(1)?;
//! tag.set_name("foo").await?;
//! tag.set_linked_items([101, 102]).await?;
//! let id = tag.save().await?.id();
//! # let _ = id;
//! # Ok(())
//! # }
//! ```
//!
//! Storage is reached only through the traits in [`storage`]; the
//! `tagstore-db` crate implements them for PostgreSQL and [`memory`]
//! implements them in memory.

pub mod cache;
pub mod changes;
pub mod config;
pub mod context;
pub mod error;
pub mod field;
pub mod key;
mod loader;
pub mod memory;
pub mod persist;
pub mod reconcile;
pub mod record;
pub mod storage;
pub mod tag;
pub mod validate;

pub use cache::KeyCache;
pub use changes::ChangeTracker;
pub use config::{TagConfig, DEFAULT_LINK_BATCH_SIZE};
pub use context::TagContext;
pub use error::*;
pub use field::{FieldValue, ItemId, LibraryId, TagDataId, TagField, TagId, TagType};
pub use key::TagKey;
pub use memory::{FailPoint, MemoryItemRepository, MemoryStats, MemoryTagStorage};
pub use persist::SaveOutcome;
pub use reconcile::{reconcile, RelationDelta, SyncMode};
pub use record::{TagIdentity, TagRecord};
pub use storage::{Item, ItemRepository, TagRow, TagStorage, TagTransaction, TagWrite};
pub use tag::Tag;

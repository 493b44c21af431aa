//! The tag entity.
//!
//! A [`Tag`] starts either empty (new) or holding only identity fields
//! (unloaded). Reading or mutating any other field loads it first; linked
//! items are loaded separately on first use. Mutations are validated,
//! recorded in the [`ChangeTracker`](crate::ChangeTracker) and written by
//! [`Tag::save`].

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::changes::ChangeTracker;
use crate::context::TagContext;
use crate::error::{TagError, TagResult};
use crate::field::{FieldValue, ItemId, LibraryId, TagDataId, TagField, TagId, TagType};
use crate::key::TagKey;
use crate::storage::{Item, TagRow};
use crate::validate::{parse_timestamp, validate, validate_item_ids};

/// Scalar fields as last loaded or assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TagData {
    pub id: Option<TagId>,
    pub library_id: Option<LibraryId>,
    pub key: Option<TagKey>,
    pub tag_data_id: Option<TagDataId>,
    pub name: Option<String>,
    pub tag_type: TagType,
    pub date_added: Option<NaiveDateTime>,
    pub date_modified: Option<NaiveDateTime>,
}

impl TagData {
    pub fn has_identity(&self) -> bool {
        self.id.is_some() || self.key.is_some()
    }

    pub fn apply_row(&mut self, row: TagRow) {
        self.id = Some(row.id);
        self.library_id = Some(row.library_id);
        self.key = Some(row.key);
        self.tag_data_id = Some(row.tag_data_id);
        self.name = Some(row.name);
        self.tag_type = row.tag_type;
        self.date_added = Some(row.date_added);
        self.date_modified = Some(row.date_modified);
    }
}

/// Load progress of a tag instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct LoadState {
    pub loaded: bool,
    pub relations_loaded: bool,
}

/// A tag and its linked items.
pub struct Tag {
    pub(crate) ctx: TagContext,
    pub(crate) data: TagData,
    pub(crate) state: LoadState,
    pub(crate) linked: BTreeSet<ItemId>,
    pub(crate) changes: ChangeTracker,
}

impl Tag {
    pub(crate) fn new(ctx: TagContext) -> Self {
        Self {
            ctx,
            data: TagData::default(),
            state: LoadState::default(),
            linked: BTreeSet::new(),
            changes: ChangeTracker::default(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub async fn id(&mut self) -> TagResult<Option<TagId>> {
        self.ensure_loaded().await?;
        Ok(self.data.id)
    }

    pub async fn library_id(&mut self) -> TagResult<Option<LibraryId>> {
        self.ensure_loaded().await?;
        Ok(self.data.library_id)
    }

    pub async fn key(&mut self) -> TagResult<Option<&TagKey>> {
        self.ensure_loaded().await?;
        Ok(self.data.key.as_ref())
    }

    pub async fn name(&mut self) -> TagResult<Option<&str>> {
        self.ensure_loaded().await?;
        Ok(self.data.name.as_deref())
    }

    pub async fn tag_type(&mut self) -> TagResult<TagType> {
        self.ensure_loaded().await?;
        Ok(self.data.tag_type)
    }

    pub async fn tag_data_id(&mut self) -> TagResult<Option<TagDataId>> {
        self.ensure_loaded().await?;
        Ok(self.data.tag_data_id)
    }

    pub async fn date_added(&mut self) -> TagResult<Option<NaiveDateTime>> {
        self.ensure_loaded().await?;
        Ok(self.data.date_added)
    }

    pub async fn date_modified(&mut self) -> TagResult<Option<NaiveDateTime>> {
        self.ensure_loaded().await?;
        Ok(self.data.date_modified)
    }

    /// Ids of linked items.
    pub async fn linked_item_ids(&mut self) -> TagResult<BTreeSet<ItemId>> {
        self.ensure_relations_loaded().await?;
        Ok(self.linked.clone())
    }

    /// Linked items resolved through the item repository.
    pub async fn linked_items(&mut self) -> TagResult<Vec<Item>> {
        self.ensure_relations_loaded().await?;
        if self.linked.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<ItemId> = self.linked.iter().copied().collect();
        self.ctx.items().get(&ids).await
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Set a field by name.
    pub async fn set_by_name(&mut self, field: &str, value: impl Into<FieldValue>) -> TagResult<bool> {
        let field: TagField = field.parse()?;
        self.set(field, value).await
    }

    /// Set a field. Returns `false` if the value was already current.
    pub async fn set(&mut self, field: TagField, value: impl Into<FieldValue>) -> TagResult<bool> {
        let value = value.into();
        match field {
            TagField::Id | TagField::LibraryId | TagField::Key => self.set_identity(field, value),
            TagField::TagDataId => Err(TagError::ImmutableFieldMutation(field)),
            TagField::LinkedItems => match value {
                FieldValue::Items(ids) => self.set_linked_items(ids).await,
                other => Err(TagError::invalid(field, other)),
            },
            TagField::Name | TagField::Type | TagField::DateAdded | TagField::DateModified => {
                self.set_content(field, value).await
            }
        }
    }

    pub fn set_id(&mut self, id: TagId) -> TagResult<bool> {
        self.set_identity(TagField::Id, FieldValue::Int(id))
    }

    pub fn set_library_id(&mut self, library_id: LibraryId) -> TagResult<bool> {
        self.set_identity(TagField::LibraryId, FieldValue::Int(library_id))
    }

    pub fn set_key(&mut self, key: &str) -> TagResult<bool> {
        self.set_identity(TagField::Key, FieldValue::from(key))
    }

    pub async fn set_name(&mut self, name: &str) -> TagResult<bool> {
        self.set_content(TagField::Name, FieldValue::from(name)).await
    }

    pub async fn set_type(&mut self, tag_type: TagType) -> TagResult<bool> {
        self.set_content(TagField::Type, FieldValue::from(tag_type)).await
    }

    /// Replace the linked item set.
    ///
    /// Returns `false` without marking anything dirty if the membership is
    /// unchanged.
    pub async fn set_linked_items<I>(&mut self, item_ids: I) -> TagResult<bool>
    where
        I: IntoIterator<Item = ItemId>,
    {
        let item_ids: Vec<ItemId> = item_ids.into_iter().collect();
        validate_item_ids(&item_ids)?;

        self.ensure_relations_loaded().await?;

        let desired: BTreeSet<ItemId> = item_ids.into_iter().collect();
        if desired == self.linked {
            debug!(tag_id = ?self.data.id, "Linked items not changed");
            return Ok(false);
        }

        self.mark_changed(TagField::LinkedItems).await?;
        self.linked = desired;
        Ok(true)
    }

    fn set_identity(&mut self, field: TagField, value: FieldValue) -> TagResult<bool> {
        if self.state.loaded {
            return Err(TagError::ImmutableFieldMutation(field));
        }
        // Relations materialized as empty for a new tag would go stale.
        if field != TagField::LibraryId && self.state.relations_loaded {
            return Err(TagError::ImmutableFieldMutation(field));
        }
        validate(field, &value)?;

        match (field, value) {
            (TagField::Id, FieldValue::Int(id)) => self.data.id = Some(id),
            (TagField::LibraryId, FieldValue::Int(library_id)) => {
                self.data.library_id = Some(library_id)
            }
            (TagField::Key, FieldValue::Text(key)) => self.data.key = Some(TagKey::parse(&key)?),
            (field, value) => return Err(TagError::invalid(field, value)),
        }
        Ok(true)
    }

    async fn set_content(&mut self, field: TagField, value: FieldValue) -> TagResult<bool> {
        self.ensure_loaded().await?;
        validate(field, &value)?;

        match (field, value) {
            (TagField::Name, FieldValue::Text(name)) => {
                if self.data.name.as_deref() == Some(name.as_str()) {
                    return Ok(false);
                }
                self.mark_changed(field).await?;
                self.data.name = Some(name);
            }
            (TagField::Type, FieldValue::Int(raw)) => {
                let tag_type =
                    TagType::try_from(raw).map_err(|_| TagError::invalid(field, raw))?;
                if self.data.tag_type == tag_type {
                    return Ok(false);
                }
                self.mark_changed(field).await?;
                self.data.tag_type = tag_type;
            }
            (TagField::DateAdded | TagField::DateModified, FieldValue::Text(text)) => {
                let parsed = parse_timestamp(&text).ok_or_else(|| TagError::invalid(field, &text))?;
                let current = match field {
                    TagField::DateAdded => self.data.date_added,
                    _ => self.data.date_modified,
                };
                if current == Some(parsed) {
                    return Ok(false);
                }
                self.mark_changed(field).await?;
                match field {
                    TagField::DateAdded => self.data.date_added = Some(parsed),
                    _ => self.data.date_modified = Some(parsed),
                }
            }
            (field, value) => return Err(TagError::invalid(field, value)),
        }
        Ok(true)
    }
}

impl std::fmt::Debug for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tag")
            .field("id", &self.data.id)
            .field("library_id", &self.data.library_id)
            .field("key", &self.data.key)
            .field("name", &self.data.name)
            .field("loaded", &self.state.loaded)
            .field("relations_loaded", &self.state.relations_loaded)
            .field("linked", &self.linked.len())
            .finish()
    }
}

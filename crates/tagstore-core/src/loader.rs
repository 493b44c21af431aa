//! Lazy materialization of tag fields and linked items.

use tracing::debug;

use crate::error::{TagError, TagResult};
use crate::tag::Tag;

impl Tag {
    /// Whether scalar fields have been loaded (or the tag is new).
    pub fn is_loaded(&self) -> bool {
        self.state.loaded
    }

    /// Whether linked items have been materialized.
    pub fn relations_loaded(&self) -> bool {
        self.state.relations_loaded
    }

    /// Load scalar fields once.
    ///
    /// A tag with neither id nor key is new and becomes loaded without a
    /// read. A tag whose row is missing is still loaded, with empty fields.
    pub async fn ensure_loaded(&mut self) -> TagResult<()> {
        if self.state.loaded {
            return Ok(());
        }
        if !self.data.has_identity() {
            self.state.loaded = true;
            return Ok(());
        }
        self.load().await
    }

    /// Load linked item ids once.
    pub async fn ensure_relations_loaded(&mut self) -> TagResult<()> {
        if self.state.relations_loaded {
            return Ok(());
        }
        if !self.data.has_identity() {
            self.state.relations_loaded = true;
            return Ok(());
        }

        self.ensure_loaded().await?;

        if let Some(id) = self.data.id {
            debug!(tag_id = id, "Loading linked items for tag");
            self.linked = self
                .ctx
                .storage()
                .linked_item_ids(id)
                .await?
                .into_iter()
                .collect();
        }
        self.state.relations_loaded = true;
        Ok(())
    }

    async fn load(&mut self) -> TagResult<()> {
        let row = match (self.data.id, self.data.library_id, self.data.key.as_ref()) {
            (Some(id), _, _) => {
                debug!(tag_id = id, "Loading data for tag");
                self.ctx.storage().load_by_id(id).await?
            }
            (None, Some(library_id), Some(key)) => {
                debug!(library_id, key = %key, "Loading data for tag");
                match self.ctx.key_cache().get(library_id, key) {
                    Some(id) => self.ctx.storage().load_by_id(id).await?,
                    None => self.ctx.storage().load_by_key(library_id, key).await?,
                }
            }
            _ => return Err(TagError::MissingIdentity),
        };

        self.state.loaded = true;

        match row {
            Some(row) => self.data.apply_row(row),
            None => debug!(tag_id = ?self.data.id, "Tag not found"),
        }
        Ok(())
    }
}

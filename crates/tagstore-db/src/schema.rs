//! Schema bootstrap.
//!
//! Every statement is idempotent, so `migrate` can run on each start. The
//! statements are executed one at a time since a prepared statement may
//! only hold one command.

use sqlx::PgPool;
use tracing::info;

use crate::error::DbError;

/// DDL for the tag tables, in dependency order.
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS items (
        item_id     BIGINT PRIMARY KEY,
        library_id  BIGINT NOT NULL,
        key         TEXT NOT NULL,
        UNIQUE (library_id, key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tag_data (
        tag_data_id  BIGSERIAL PRIMARY KEY,
        name         TEXT NOT NULL,
        type         SMALLINT NOT NULL DEFAULT 0,
        UNIQUE (name, type)
    )
    "#,
    "CREATE SEQUENCE IF NOT EXISTS tags_tag_id_seq",
    r#"
    CREATE TABLE IF NOT EXISTS tags (
        tag_id                   BIGINT PRIMARY KEY DEFAULT nextval('tags_tag_id_seq'),
        library_id               BIGINT NOT NULL,
        key                      TEXT NOT NULL,
        tag_data_id              BIGINT NOT NULL,
        type                     SMALLINT NOT NULL DEFAULT 0,
        date_added               TIMESTAMP NOT NULL,
        date_modified            TIMESTAMP NOT NULL,
        server_date_modified     TIMESTAMP NOT NULL,
        server_date_modified_ms  SMALLINT NOT NULL DEFAULT 0,
        UNIQUE (library_id, key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS item_tags (
        tag_id   BIGINT NOT NULL REFERENCES tags(tag_id) ON DELETE CASCADE,
        item_id  BIGINT NOT NULL,
        PRIMARY KEY (tag_id, item_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tags_tag_data ON tags(tag_data_id)",
    "CREATE INDEX IF NOT EXISTS idx_item_tags_item ON item_tags(item_id)",
];

/// Create the tag tables if they don't exist.
pub async fn migrate(pool: &PgPool) -> Result<(), DbError> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| DbError::MigrationError(e.to_string()))?;
    }

    info!(statements = SCHEMA.len(), "Tag schema ready");
    Ok(())
}

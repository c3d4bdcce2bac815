//! Meta registry: a singleton record of admin-curated settings.
//!
//! The only setting today is the public-keyword allowlist. The record exists
//! zero or one times; the registry is "initialised" iff it exists.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{Error, Result};
use crate::ident::Id;

#[derive(Clone)]
pub struct MetaRegistry {
    pool: SqlitePool,
}

impl MetaRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Replace the public-keyword allowlist (replace, not merge), creating
    /// the singleton record if needed. Returns the stored list.
    pub async fn set_public_keyword_ids(&self, ids: &[Id]) -> Result<Vec<Id>> {
        let json = serde_json::to_string(ids)?;

        sqlx::query(
            r#"
            INSERT INTO meta (id, keywords_public_ids) VALUES (1, ?)
            ON CONFLICT(id) DO UPDATE SET keywords_public_ids = excluded.keywords_public_ids
            "#,
        )
        .bind(&json)
        .execute(&self.pool)
        .await?;

        debug!(count = ids.len(), "public keyword allowlist replaced");
        Ok(ids.to_vec())
    }

    /// Read the public-keyword allowlist.
    ///
    /// Fails with [`Error::MetaUninitialized`] when the record does not
    /// exist; call [`MetaRegistry::is_meta_initialised`] first or handle the
    /// failure.
    pub async fn get_public_keyword_ids(&self) -> Result<Vec<Id>> {
        let json: Option<String> =
            sqlx::query_scalar("SELECT keywords_public_ids FROM meta WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;

        let json = json.ok_or(Error::MetaUninitialized)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Existence check only.
    pub async fn is_meta_initialised(&self) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }
}

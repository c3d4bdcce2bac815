//! Keyword registry.
//!
//! Owns the keyword entity and its many-to-many relationships to users and
//! indexes. Keywords are never hard-deleted: removing the last membership
//! flips the derived `deleted` flag instead (reference-counted soft delete).
//!
//! Membership mutations are single atomic statements (`INSERT OR IGNORE` /
//! `DELETE`), never read-modify-write, so concurrent joins cannot lose
//! updates. The one exception is the deleted-flag recomputation, an explicit
//! read-then-write that is eventually consistent: a transient stale value is
//! corrected by the next membership mutation of the same keyword.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::{Error, Result};
use crate::ident::{Id, IntoId};
use crate::meta::MetaRegistry;
use crate::models::{Keyword, KeywordSummary, SUPPORTED_LANGUAGES};

pub struct KeywordRegistry {
    pool: SqlitePool,
    meta: MetaRegistry,
}

impl KeywordRegistry {
    pub fn new(pool: SqlitePool, meta: MetaRegistry) -> Self {
        Self { pool, meta }
    }

    /// Add a keyword for a user, creating it on first use.
    ///
    /// If a keyword with the same `(keyword_string, language)` already
    /// exists, the user joins its membership set (idempotently); otherwise a
    /// new keyword is created with that user as sole member. Either way the
    /// deleted flag is recomputed afterwards.
    pub async fn add_keyword(
        &self,
        keyword_string: &str,
        language: &str,
        username: &str,
    ) -> Result<Keyword> {
        if !SUPPORTED_LANGUAGES.contains(&language) {
            return Err(Error::UnsupportedLanguage(language.to_string()));
        }

        let existing: Option<String> =
            sqlx::query_scalar("SELECT id FROM keywords WHERE keyword_string = ? AND language = ?")
                .bind(keyword_string)
                .bind(language)
                .fetch_optional(&self.pool)
                .await?;

        let id = match existing {
            Some(raw) => Id::parse(&raw)?,
            None => {
                let id = Id::new();
                sqlx::query(
                    "INSERT INTO keywords (id, keyword_string, language, deleted) VALUES (?, ?, ?, 0)",
                )
                .bind(id.to_string())
                .bind(keyword_string)
                .bind(language)
                .execute(&self.pool)
                .await?;
                id
            }
        };

        sqlx::query("INSERT OR IGNORE INTO keyword_users (keyword_id, username) VALUES (?, ?)")
            .bind(id.to_string())
            .bind(username)
            .execute(&self.pool)
            .await?;

        self.set_deleted_flag(id).await?;
        debug!(%id, keyword_string, language, username, "keyword added");

        self.get_keyword_by_id(id, None)
            .await?
            .ok_or_else(|| Error::NotFound(format!("keyword {id}")))
    }

    /// Exact `(keyword_string, language)` lookup; with `username`, membership
    /// is additionally required.
    pub async fn get_keyword(
        &self,
        keyword_string: &str,
        language: &str,
        username: Option<&str>,
    ) -> Result<Option<Keyword>> {
        let row = match username {
            Some(user) => {
                sqlx::query(
                    r#"
                    SELECT k.id, k.keyword_string, k.language, k.deleted
                    FROM keywords k
                    WHERE k.keyword_string = ? AND k.language = ?
                      AND EXISTS (
                          SELECT 1 FROM keyword_users u
                          WHERE u.keyword_id = k.id AND u.username = ?
                      )
                    "#,
                )
                .bind(keyword_string)
                .bind(language)
                .bind(user)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, keyword_string, language, deleted FROM keywords \
                     WHERE keyword_string = ? AND language = ?",
                )
                .bind(keyword_string)
                .bind(language)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    /// Lookup by id, with the same optional membership filter as
    /// [`KeywordRegistry::get_keyword`].
    pub async fn get_keyword_by_id(
        &self,
        id: impl IntoId,
        username: Option<&str>,
    ) -> Result<Option<Keyword>> {
        let id = id.into_id()?;

        let row = match username {
            Some(user) => {
                sqlx::query(
                    r#"
                    SELECT k.id, k.keyword_string, k.language, k.deleted
                    FROM keywords k
                    WHERE k.id = ?
                      AND EXISTS (
                          SELECT 1 FROM keyword_users u
                          WHERE u.keyword_id = k.id AND u.username = ?
                      )
                    "#,
                )
                .bind(id.to_string())
                .bind(user)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT id, keyword_string, language, deleted FROM keywords WHERE id = ?")
                    .bind(id.to_string())
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    /// All keywords a user belongs to, projected to their identifying fields.
    pub async fn get_keywords_for_user(&self, username: &str) -> Result<Vec<KeywordSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT k.id, k.keyword_string, k.language
            FROM keywords k
            JOIN keyword_users u ON u.keyword_id = k.id
            WHERE u.username = ?
            ORDER BY k.keyword_string, k.language
            "#,
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(KeywordSummary {
                    id: Id::parse(row.get("id"))?,
                    keyword_string: row.get("keyword_string"),
                    language: row.get("language"),
                })
            })
            .collect()
    }

    /// Remove a user from a keyword's membership set.
    ///
    /// Returns the number of modified membership rows (0 when the user was
    /// not a member). The deleted flag is recomputed regardless.
    pub async fn delete_keyword(&self, id: impl IntoId, username: &str) -> Result<u64> {
        let id = id.into_id()?;

        let result = sqlx::query("DELETE FROM keyword_users WHERE keyword_id = ? AND username = ?")
            .bind(id.to_string())
            .bind(username)
            .execute(&self.pool)
            .await?;

        self.set_deleted_flag(id).await?;
        debug!(%id, username, modified = result.rows_affected(), "keyword membership removed");

        Ok(result.rows_affected())
    }

    /// Idempotently link an index to a keyword. No-op returning `None` when
    /// the keyword does not exist.
    pub async fn add_index_to_keyword(
        &self,
        keyword_id: impl IntoId,
        index_id: impl IntoId,
    ) -> Result<Option<Keyword>> {
        let keyword_id = keyword_id.into_id()?;
        let index_id = index_id.into_id()?;

        if !self.keyword_exists(keyword_id).await? {
            return Ok(None);
        }

        sqlx::query("INSERT OR IGNORE INTO keyword_indexes (keyword_id, index_id) VALUES (?, ?)")
            .bind(keyword_id.to_string())
            .bind(index_id.to_string())
            .execute(&self.pool)
            .await?;

        // An index reference can revive an emptied keyword
        self.set_deleted_flag(keyword_id).await?;
        debug!(keyword = %keyword_id, index = %index_id, "index linked to keyword");

        self.get_keyword_by_id(keyword_id, None).await
    }

    /// Idempotently unlink an index from a keyword. No-op returning `None`
    /// when the keyword does not exist.
    pub async fn delete_index_from_keyword(
        &self,
        keyword_id: impl IntoId,
        index_id: impl IntoId,
    ) -> Result<Option<Keyword>> {
        let keyword_id = keyword_id.into_id()?;
        let index_id = index_id.into_id()?;

        if !self.keyword_exists(keyword_id).await? {
            return Ok(None);
        }

        sqlx::query("DELETE FROM keyword_indexes WHERE keyword_id = ? AND index_id = ?")
            .bind(keyword_id.to_string())
            .bind(index_id.to_string())
            .execute(&self.pool)
            .await?;

        self.set_deleted_flag(keyword_id).await?;
        debug!(keyword = %keyword_id, index = %index_id, "index unlinked from keyword");

        self.get_keyword_by_id(keyword_id, None).await
    }

    /// All keywords linked to an index.
    pub async fn get_keywords_by_index(&self, index_id: impl IntoId) -> Result<Vec<Keyword>> {
        let index_id = index_id.into_id()?;

        let rows = sqlx::query(
            r#"
            SELECT k.id, k.keyword_string, k.language, k.deleted
            FROM keywords k
            JOIN keyword_indexes ki ON ki.keyword_id = k.id
            WHERE ki.index_id = ?
            ORDER BY k.keyword_string, k.language
            "#,
        )
        .bind(index_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut keywords = Vec::with_capacity(rows.len());
        for row in rows {
            keywords.push(self.hydrate(row).await?);
        }
        Ok(keywords)
    }

    /// Resolve the public-keyword allowlist to keywords.
    ///
    /// Allowlisted ids that no longer resolve are silently dropped; an
    /// uninitialised meta registry yields an empty list, not an error.
    pub async fn get_public_keywords(&self) -> Result<Vec<Keyword>> {
        let ids = match self.meta.get_public_keyword_ids().await {
            Ok(ids) => ids,
            Err(Error::MetaUninitialized) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut keywords = Vec::new();
        for id in ids {
            if let Some(keyword) = self.get_keyword_by_id(id, None).await? {
                keywords.push(keyword);
            }
        }
        Ok(keywords)
    }

    /// Keyset-paged bulk scan, for reprocessing jobs that would otherwise
    /// hold a long-lived cursor. Pass the last id of the previous page (or
    /// `None` to start) and iterate until fewer than `batch_size` rows come
    /// back.
    pub async fn keyword_batch(&self, after: Option<Id>, batch_size: i64) -> Result<Vec<Keyword>> {
        let after = after.map(|id| id.to_string()).unwrap_or_default();

        let rows = sqlx::query(
            "SELECT id, keyword_string, language, deleted FROM keywords \
             WHERE id > ? ORDER BY id LIMIT ?",
        )
        .bind(after)
        .bind(batch_size)
        .fetch_all(&self.pool)
        .await?;

        let mut keywords = Vec::with_capacity(rows.len());
        for row in rows {
            keywords.push(self.hydrate(row).await?);
        }
        Ok(keywords)
    }

    /// Recompute and persist the derived deleted flag: a keyword is deleted
    /// iff both its user set and its index set are empty. Read-then-write;
    /// see the module docs for the consistency contract.
    async fn set_deleted_flag(&self, id: Id) -> Result<()> {
        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM keyword_users WHERE keyword_id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        let indexes: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM keyword_indexes WHERE keyword_id = ?")
                .bind(id.to_string())
                .fetch_one(&self.pool)
                .await?;

        let deleted = users == 0 && indexes == 0;

        sqlx::query("UPDATE keywords SET deleted = ? WHERE id = ?")
            .bind(deleted)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn keyword_exists(&self, id: Id) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM keywords WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Attach the membership sets to a base keyword row.
    async fn hydrate(&self, row: SqliteRow) -> Result<Keyword> {
        let id = Id::parse(row.get("id"))?;

        let users: Vec<String> =
            sqlx::query_scalar("SELECT username FROM keyword_users WHERE keyword_id = ? ORDER BY username")
                .bind(id.to_string())
                .fetch_all(&self.pool)
                .await?;

        let index_ids: Vec<String> =
            sqlx::query_scalar("SELECT index_id FROM keyword_indexes WHERE keyword_id = ? ORDER BY index_id")
                .bind(id.to_string())
                .fetch_all(&self.pool)
                .await?;
        let indexes = index_ids
            .iter()
            .map(|raw| Id::parse(raw))
            .collect::<Result<Vec<_>>>()?;

        Ok(Keyword {
            id,
            keyword_string: row.get("keyword_string"),
            language: row.get("language"),
            users,
            indexes,
            deleted: row.get("deleted"),
        })
    }
}

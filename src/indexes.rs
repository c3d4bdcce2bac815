//! Index registry.
//!
//! Indexes are named, typed baskets of keywords, designed after stock market
//! indexes. They follow the keyword registry's reference-counted soft-delete
//! discipline, keyed on users only: joining an index sets `deleted = false`
//! directly, since growing membership implies liveness.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::{Error, Result};
use crate::ident::{Id, IntoId};
use crate::models::{Index, IndexType};

pub struct IndexRegistry {
    pool: SqlitePool,
}

impl IndexRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an index or join an existing one by its unique name.
    pub async fn add_index(
        &self,
        name: &str,
        index_type: IndexType,
        username: &str,
    ) -> Result<Index> {
        let existing: Option<String> = sqlx::query_scalar("SELECT id FROM indexes WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        let id = match existing {
            Some(raw) => {
                let id = Id::parse(&raw)?;
                sqlx::query("UPDATE indexes SET deleted = 0 WHERE id = ?")
                    .bind(id.to_string())
                    .execute(&self.pool)
                    .await?;
                id
            }
            None => {
                let id = Id::new();
                sqlx::query(
                    "INSERT INTO indexes (id, name, index_type, deleted) VALUES (?, ?, ?, 0)",
                )
                .bind(id.to_string())
                .bind(name)
                .bind(index_type.as_str())
                .execute(&self.pool)
                .await?;
                id
            }
        };

        sqlx::query("INSERT OR IGNORE INTO index_users (index_id, username) VALUES (?, ?)")
            .bind(id.to_string())
            .bind(username)
            .execute(&self.pool)
            .await?;

        debug!(%id, name, index_type = %index_type, username, "index joined");

        self.get_index(name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("index {name:?}")))
    }

    /// Lookup by unique name.
    pub async fn get_index(&self, name: &str) -> Result<Option<Index>> {
        let row = sqlx::query("SELECT id, name, index_type, deleted FROM indexes WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    /// Lookup by id.
    pub async fn get_index_by_id(&self, id: impl IntoId) -> Result<Option<Index>> {
        let id = id.into_id()?;

        let row = sqlx::query("SELECT id, name, index_type, deleted FROM indexes WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    /// All indexes of one type a user belongs to.
    pub async fn get_indexes_by_type(
        &self,
        index_type: IndexType,
        username: &str,
    ) -> Result<Vec<Index>> {
        let rows = sqlx::query(
            r#"
            SELECT i.id, i.name, i.index_type, i.deleted
            FROM indexes i
            JOIN index_users u ON u.index_id = i.id
            WHERE i.index_type = ? AND u.username = ?
            ORDER BY i.name
            "#,
        )
        .bind(index_type.as_str())
        .bind(username)
        .fetch_all(&self.pool)
        .await?;

        let mut indexes = Vec::with_capacity(rows.len());
        for row in rows {
            indexes.push(self.hydrate(row).await?);
        }
        Ok(indexes)
    }

    /// Every index a user belongs to.
    pub async fn get_indexes(&self, username: &str) -> Result<Vec<Index>> {
        let rows = sqlx::query(
            r#"
            SELECT i.id, i.name, i.index_type, i.deleted
            FROM indexes i
            JOIN index_users u ON u.index_id = i.id
            WHERE u.username = ?
            ORDER BY i.name
            "#,
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;

        let mut indexes = Vec::with_capacity(rows.len());
        for row in rows {
            indexes.push(self.hydrate(row).await?);
        }
        Ok(indexes)
    }

    async fn hydrate(&self, row: SqliteRow) -> Result<Index> {
        let id = Id::parse(row.get("id"))?;

        let users: Vec<String> =
            sqlx::query_scalar("SELECT username FROM index_users WHERE index_id = ? ORDER BY username")
                .bind(id.to_string())
                .fetch_all(&self.pool)
                .await?;

        let index_type: String = row.get("index_type");

        Ok(Index {
            id,
            name: row.get("name"),
            index_type: index_type.parse()?,
            users,
            deleted: row.get("deleted"),
        })
    }
}

//! User registry.
//!
//! Persists user records only. Password hashing and verification belong to
//! the auth flows outside the engine; callers supply the hash.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::Result;
use crate::ident::Id;
use crate::models::User;

pub struct UserRegistry {
    pool: SqlitePool,
}

impl UserRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new user. The unique-username constraint propagates as a
    /// database error on duplicates.
    pub async fn add_user(&self, username: &str, password_hash: &str) -> Result<User> {
        let user = User {
            id: Id::new(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now().timestamp(),
        };

        sqlx::query("INSERT INTO users (id, username, password_hash, created_at) VALUES (?, ?, ?, ?)")
            .bind(user.id.to_string())
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(user.created_at)
            .execute(&self.pool)
            .await?;

        debug!(id = %user.id, username, "user added");
        Ok(user)
    }

    /// Lookup by unique username.
    pub async fn get_user(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(User {
                id: Id::parse(row.get("id"))?,
                username: row.get("username"),
                password_hash: row.get("password_hash"),
                created_at: row.get("created_at"),
            })),
            None => Ok(None),
        }
    }
}

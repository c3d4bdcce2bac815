//! Schema migrations.
//!
//! The required shape of each stored entity is declared here as DDL; writes
//! that violate it are rejected by the store. All statements are idempotent,
//! so running the migrations repeatedly is safe.

use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::error::Result;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Apply the schema to an already-open pool.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Keywords and their membership sets
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS keywords (
            id TEXT PRIMARY KEY,
            keyword_string TEXT NOT NULL,
            language TEXT NOT NULL,
            deleted INTEGER NOT NULL DEFAULT 0,
            UNIQUE(keyword_string, language)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS keyword_users (
            keyword_id TEXT NOT NULL,
            username TEXT NOT NULL,
            UNIQUE(keyword_id, username),
            FOREIGN KEY (keyword_id) REFERENCES keywords(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS keyword_indexes (
            keyword_id TEXT NOT NULL,
            index_id TEXT NOT NULL,
            UNIQUE(keyword_id, index_id),
            FOREIGN KEY (keyword_id) REFERENCES keywords(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes (keyword baskets) and their membership set
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS indexes (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            index_type TEXT NOT NULL,
            deleted INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_users (
            index_id TEXT NOT NULL,
            username TEXT NOT NULL,
            UNIQUE(index_id, username),
            FOREIGN KEY (index_id) REFERENCES indexes(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One mentions table for all sources, discriminated by source_type.
    // No foreign key on keyword_ref: a keyword's membership may be emptied
    // while its mentions stay behind, and dangling references are tolerated.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mentions (
            id TEXT PRIMARY KEY,
            keyword_ref TEXT NOT NULL,
            source_type TEXT NOT NULL,
            text TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            score REAL,
            entities_json TEXT NOT NULL DEFAULT '[]',
            categories_json TEXT NOT NULL DEFAULT '[]',
            tweet_id INTEGER UNIQUE,
            likes INTEGER,
            retweets INTEGER,
            author TEXT,
            title TEXT,
            article_id TEXT UNIQUE,
            UNIQUE(author, title)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Singleton meta row; "initialised" iff the row exists
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            keywords_public_ids TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Query indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_mentions_keyword_ref ON mentions(keyword_ref)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_mentions_keyword_ts ON mentions(keyword_ref, timestamp)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_mentions_source_type ON mentions(source_type)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_keyword_users_username ON keyword_users(username)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_index_users_username ON index_users(username)")
        .execute(pool)
        .await?;

    Ok(())
}

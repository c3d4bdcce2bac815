//! Mention store.
//!
//! One table holds the mentions of every source (Twitter, news, New York
//! Times), discriminated by `source_type` and upserted by each source's
//! natural key, so re-crawling an item updates it instead of duplicating it.
//!
//! The ingest upsert only ever touches ingest fields. `score`, `entities`
//! and `categories` are written exclusively by the explicit scoring
//! operations, so a re-crawl can never erase annotations the NLP processor
//! already attached. Concurrent ingests of the same natural key are resolved
//! by the store's upsert atomicity.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::{Error, Result};
use crate::ident::{Id, IntoId};
use crate::models::{CategoryMention, EntityMention, Mention, MentionSource, SourceType};

const MENTION_COLUMNS: &str = "m.id, m.keyword_ref, m.source_type, m.text, m.timestamp, m.score, \
     m.entities_json, m.categories_json, m.tweet_id, m.likes, m.retweets, \
     m.author, m.title, m.article_id, k.keyword_string, k.language";

pub struct MentionStore {
    pool: SqlitePool,
}

impl MentionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert a tweet by its `tweet_id` and return the refreshed mention.
    pub async fn add_twitter(
        &self,
        keyword_id: impl IntoId,
        tweet_id: i64,
        text: &str,
        likes: i64,
        retweets: i64,
        timestamp: DateTime<Utc>,
    ) -> Result<Mention> {
        let keyword_id = keyword_id.into_id()?;

        sqlx::query(
            r#"
            INSERT INTO mentions (id, keyword_ref, source_type, text, timestamp, tweet_id, likes, retweets)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(tweet_id) DO UPDATE SET
                keyword_ref = excluded.keyword_ref,
                text = excluded.text,
                timestamp = excluded.timestamp,
                likes = excluded.likes,
                retweets = excluded.retweets
            "#,
        )
        .bind(Id::new().to_string())
        .bind(keyword_id.to_string())
        .bind(SourceType::Twitter.as_str())
        .bind(text)
        .bind(timestamp.timestamp())
        .bind(tweet_id)
        .bind(likes)
        .bind(retweets)
        .execute(&self.pool)
        .await?;

        debug!(keyword = %keyword_id, tweet_id, "twitter mention upserted");

        self.get_by_tweet_id(tweet_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("tweet {tweet_id}")))
    }

    /// Upsert a news article by its `(author, title)` composite key and
    /// return the refreshed mention.
    pub async fn add_news(
        &self,
        keyword_id: impl IntoId,
        author: &str,
        title: &str,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Mention> {
        let keyword_id = keyword_id.into_id()?;

        sqlx::query(
            r#"
            INSERT INTO mentions (id, keyword_ref, source_type, text, timestamp, author, title)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(author, title) DO UPDATE SET
                keyword_ref = excluded.keyword_ref,
                text = excluded.text,
                timestamp = excluded.timestamp
            "#,
        )
        .bind(Id::new().to_string())
        .bind(keyword_id.to_string())
        .bind(SourceType::News.as_str())
        .bind(text)
        .bind(timestamp.timestamp())
        .bind(author)
        .bind(title)
        .execute(&self.pool)
        .await?;

        debug!(keyword = %keyword_id, author, title, "news mention upserted");

        self.get_by_news_key(author, title)
            .await?
            .ok_or_else(|| Error::NotFound(format!("news article {author:?}/{title:?}")))
    }

    /// Upsert a New York Times article by its `article_id` and return the
    /// refreshed mention.
    pub async fn add_nyt(
        &self,
        keyword_id: impl IntoId,
        article_id: &str,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Mention> {
        let keyword_id = keyword_id.into_id()?;

        sqlx::query(
            r#"
            INSERT INTO mentions (id, keyword_ref, source_type, text, timestamp, article_id)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(article_id) DO UPDATE SET
                keyword_ref = excluded.keyword_ref,
                text = excluded.text,
                timestamp = excluded.timestamp
            "#,
        )
        .bind(Id::new().to_string())
        .bind(keyword_id.to_string())
        .bind(SourceType::Nyt.as_str())
        .bind(text)
        .bind(timestamp.timestamp())
        .bind(article_id)
        .execute(&self.pool)
        .await?;

        debug!(keyword = %keyword_id, article_id, "nyt mention upserted");

        self.get_by_article_id(article_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("nyt article {article_id:?}")))
    }

    /// Natural-key lookup for tweets.
    pub async fn get_by_tweet_id(&self, tweet_id: i64) -> Result<Option<Mention>> {
        let row = sqlx::query(&format!(
            "SELECT {MENTION_COLUMNS} FROM mentions m \
             LEFT JOIN keywords k ON k.id = m.keyword_ref WHERE m.tweet_id = ?"
        ))
        .bind(tweet_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| mention_from_row(&row)).transpose()
    }

    /// Natural-key lookup for news articles.
    pub async fn get_by_news_key(&self, author: &str, title: &str) -> Result<Option<Mention>> {
        let row = sqlx::query(&format!(
            "SELECT {MENTION_COLUMNS} FROM mentions m \
             LEFT JOIN keywords k ON k.id = m.keyword_ref WHERE m.author = ? AND m.title = ?"
        ))
        .bind(author)
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| mention_from_row(&row)).transpose()
    }

    /// Natural-key lookup for New York Times articles.
    pub async fn get_by_article_id(&self, article_id: &str) -> Result<Option<Mention>> {
        let row = sqlx::query(&format!(
            "SELECT {MENTION_COLUMNS} FROM mentions m \
             LEFT JOIN keywords k ON k.id = m.keyword_ref WHERE m.article_id = ?"
        ))
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| mention_from_row(&row)).transpose()
    }

    /// Lookup by id, with the parent keyword's fields joined in for
    /// denormalized display.
    pub async fn get_mention_by_id(&self, id: impl IntoId) -> Result<Option<Mention>> {
        let id = id.into_id()?;

        let row = sqlx::query(&format!(
            "SELECT {MENTION_COLUMNS} FROM mentions m \
             LEFT JOIN keywords k ON k.id = m.keyword_ref WHERE m.id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| mention_from_row(&row)).transpose()
    }

    /// All mentions that have no score yet, joined with parent keyword
    /// fields, oldest first. `None` disables the cap; the scan is one
    /// bounded query, not a held cursor.
    pub async fn get_unprocessed_mentions(&self, limit: Option<i64>) -> Result<Vec<Mention>> {
        let rows = sqlx::query(&format!(
            "SELECT {MENTION_COLUMNS} FROM mentions m \
             LEFT JOIN keywords k ON k.id = m.keyword_ref \
             WHERE m.score IS NULL ORDER BY m.timestamp LIMIT ?"
        ))
        .bind(limit.unwrap_or(-1)) // LIMIT -1 disables the cap
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(mention_from_row).collect()
    }

    /// Attach the processor's sentiment score to a mention. Returns the
    /// number of modified rows.
    pub async fn set_score(&self, id: impl IntoId, score: f64) -> Result<u64> {
        let id = id.into_id()?;

        let result = sqlx::query("UPDATE mentions SET score = ? WHERE id = ?")
            .bind(score)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        debug!(%id, score, "mention scored");
        Ok(result.rows_affected())
    }

    /// Replace a mention's entity annotations (whole-field replace).
    pub async fn set_entities(&self, id: impl IntoId, entities: &[EntityMention]) -> Result<u64> {
        let id = id.into_id()?;
        let json = serde_json::to_string(entities)?;

        let result = sqlx::query("UPDATE mentions SET entities_json = ? WHERE id = ?")
            .bind(&json)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Replace a mention's category annotations (whole-field replace).
    pub async fn set_categories(
        &self,
        id: impl IntoId,
        categories: &[CategoryMention],
    ) -> Result<u64> {
        let id = id.into_id()?;
        let json = serde_json::to_string(categories)?;

        let result = sqlx::query("UPDATE mentions SET categories_json = ? WHERE id = ?")
            .bind(&json)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Decode a joined mention row, picking the source payload by discriminant.
fn mention_from_row(row: &SqliteRow) -> Result<Mention> {
    let source_type: String = row.get("source_type");
    let source = match source_type.parse::<SourceType>()? {
        SourceType::Twitter => MentionSource::Twitter {
            tweet_id: row.try_get("tweet_id")?,
            likes: row.try_get("likes")?,
            retweets: row.try_get("retweets")?,
        },
        SourceType::News => MentionSource::News {
            author: row.try_get("author")?,
            title: row.try_get("title")?,
        },
        SourceType::Nyt => MentionSource::Nyt {
            article_id: row.try_get("article_id")?,
        },
    };

    let entities_json: String = row.get("entities_json");
    let categories_json: String = row.get("categories_json");

    Ok(Mention {
        id: Id::parse(row.get("id"))?,
        keyword_ref: Id::parse(row.get("keyword_ref"))?,
        text: row.get("text"),
        timestamp: row.get("timestamp"),
        score: row.get("score"),
        entities: serde_json::from_str(&entities_json)?,
        categories: serde_json::from_str(&categories_json)?,
        source,
        keyword_string: row.get("keyword_string"),
        language: row.get("language"),
    })
}

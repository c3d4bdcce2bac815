//! Core data models used throughout the engine.
//!
//! These types represent the keywords, indexes, mentions and annotation
//! payloads that flow through the registries and the analytics pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::ident::Id;

/// The fixed set of languages keywords may be tracked in.
///
/// Extending this set is a data-model change, not runtime configuration.
pub const SUPPORTED_LANGUAGES: [&str; 9] = ["zh", "en", "fr", "de", "it", "ja", "ko", "pt", "es"];

/// A tracked keyword with its user and index memberships.
///
/// `deleted` is a derived flag: true iff both membership sets are empty at
/// the time membership was last changed. It is recomputed and persisted on
/// every membership mutation, never authored directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyword {
    pub id: Id,
    pub keyword_string: String,
    pub language: String,
    pub users: Vec<String>,
    pub indexes: Vec<Id>,
    pub deleted: bool,
}

/// Projection of a keyword to its identifying fields, used by list queries
/// that don't need the membership sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordSummary {
    pub id: Id,
    pub keyword_string: String,
    pub language: String,
}

/// The fixed set of index types, designed after stock market indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexType {
    Company,
    Competition,
    Branch,
    Market,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::Company => "COMPANY",
            IndexType::Competition => "COMPETITION",
            IndexType::Branch => "BRANCH",
            IndexType::Market => "MARKET",
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "COMPANY" => Ok(IndexType::Company),
            "COMPETITION" => Ok(IndexType::Competition),
            "BRANCH" => Ok(IndexType::Branch),
            "MARKET" => Ok(IndexType::Market),
            other => Err(Error::UnsupportedIndexType(other.to_string())),
        }
    }
}

/// A named basket of keywords shared by a set of users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    pub id: Id,
    pub name: String,
    pub index_type: IndexType,
    pub users: Vec<String>,
    pub deleted: bool,
}

/// Discriminant for the mention source a crawler ingested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    Twitter,
    News,
    Nyt,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Twitter => "TWITTER",
            SourceType::News => "NEWS",
            SourceType::Nyt => "NYT",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "TWITTER" => Ok(SourceType::Twitter),
            "NEWS" => Ok(SourceType::News),
            "NYT" => Ok(SourceType::Nyt),
            other => Err(Error::NotFound(format!("unknown source type {other:?}"))),
        }
    }
}

/// Source-specific payload of a mention, keyed by [`SourceType`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MentionSource {
    Twitter {
        tweet_id: i64,
        likes: i64,
        retweets: i64,
    },
    News {
        author: String,
        title: String,
    },
    Nyt {
        article_id: String,
    },
}

impl MentionSource {
    pub fn source_type(&self) -> SourceType {
        match self {
            MentionSource::Twitter { .. } => SourceType::Twitter,
            MentionSource::News { .. } => SourceType::News,
            MentionSource::Nyt { .. } => SourceType::Nyt,
        }
    }
}

/// A single named-entity annotation attached to one mention.
///
/// Elements are not unique by `value` within a mention; deduplication and
/// counting happen only at aggregation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMention {
    pub value: String,
    pub count: i64,
    pub score: f64,
}

/// A single category annotation attached to one mention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMention {
    pub value: String,
    pub count: i64,
    pub confidence: f64,
}

/// A crawled mention of a keyword, unprocessed until `score` is set.
///
/// `keyword_string`/`language` are denormalized from the parent keyword when
/// a reader joins it in; they are `None` when the reference dangles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mention {
    pub id: Id,
    pub keyword_ref: Id,
    pub text: String,
    /// Epoch seconds (UTC).
    pub timestamp: i64,
    pub score: Option<f64>,
    pub entities: Vec<EntityMention>,
    pub categories: Vec<CategoryMention>,
    pub source: MentionSource,
    pub keyword_string: Option<String>,
    pub language: Option<String>,
}

/// One point of a bucketed score trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    /// Epoch seconds of the mention that opened the bucket.
    pub timestamp: i64,
    /// Mean score of the mentions accumulated into the bucket.
    pub score: f64,
    /// Number of mentions accumulated into the bucket.
    pub count: u64,
}

/// Text export row: a mention projected for training/export use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionText {
    pub text: String,
    pub score: Option<f64>,
    pub timestamp: i64,
}

/// A registered user. Immutable after creation except via auth flows, which
/// live outside the engine; the password hash is supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub password_hash: String,
    /// Epoch seconds (UTC).
    pub created_at: i64,
}

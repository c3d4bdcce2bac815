//! # Keywatch CLI
//!
//! The `keywatch` binary is the operational surface of the engine. It stands
//! in for the three external collaborators: crawlers pushing mentions
//! (`ingest`), the NLP processor writing annotations back (`process`), and
//! admin tooling curating the public allowlist (`meta`).
//!
//! ```bash
//! keywatch init
//! keywatch keyword add "acme" --language en --user alice
//! keywatch ingest twitter --keyword-id <id> --tweet-id 42 --text "acme rocks"
//! keywatch process pending --limit 10
//! keywatch analytics trend <id> --granularity 60
//! ```

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

use keywatch::config;
use keywatch::ident::Id;
use keywatch::models::{CategoryMention, EntityMention, IndexType};
use keywatch::Engine;

/// Keywatch: persistence and analytics engine for keyword monitoring.
#[derive(Parser)]
#[command(
    name = "keywatch",
    about = "Persistence and analytics engine for keyword monitoring",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/keywatch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Manage keywords and their memberships.
    Keyword {
        #[command(subcommand)]
        action: KeywordAction,
    },

    /// Manage indexes (named baskets of keywords).
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Ingest crawled mentions.
    Ingest {
        #[command(subcommand)]
        action: IngestAction,
    },

    /// NLP processor write-back: list unprocessed mentions, attach scores
    /// and annotations.
    Process {
        #[command(subcommand)]
        action: ProcessAction,
    },

    /// Trend, average, roll-up and export queries.
    Analytics {
        #[command(subcommand)]
        action: AnalyticsAction,
    },

    /// Admin-curated singleton settings.
    Meta {
        #[command(subcommand)]
        action: MetaAction,
    },

    /// Manage users.
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum KeywordAction {
    /// Add a keyword for a user, creating it on first use.
    Add {
        keyword: String,
        #[arg(long)]
        language: String,
        #[arg(long)]
        user: String,
    },
    /// Exact lookup by keyword string and language.
    Get {
        keyword: String,
        #[arg(long)]
        language: String,
        /// Require this user to be a member.
        #[arg(long)]
        user: Option<String>,
    },
    /// List the keywords a user belongs to.
    List {
        #[arg(long)]
        user: String,
    },
    /// Remove a user from a keyword's membership set.
    Delete {
        id: String,
        #[arg(long)]
        user: String,
    },
    /// Link an index to a keyword.
    Link { keyword_id: String, index_id: String },
    /// Unlink an index from a keyword.
    Unlink { keyword_id: String, index_id: String },
    /// List the keywords linked to an index.
    ByIndex { index_id: String },
    /// List the publicly visible keywords.
    Public,
}

#[derive(Subcommand)]
enum IndexAction {
    /// Create an index or join an existing one by name.
    Add {
        name: String,
        /// COMPANY, COMPETITION, BRANCH or MARKET.
        #[arg(long = "type")]
        index_type: String,
        #[arg(long)]
        user: String,
    },
    /// Lookup by unique name.
    Get { name: String },
    /// List the indexes a user belongs to, optionally filtered by type.
    List {
        #[arg(long)]
        user: String,
        #[arg(long = "type")]
        index_type: Option<String>,
    },
}

#[derive(Subcommand)]
enum IngestAction {
    /// Upsert a tweet by its tweet id.
    Twitter {
        #[arg(long)]
        keyword_id: String,
        #[arg(long)]
        tweet_id: i64,
        #[arg(long)]
        text: String,
        #[arg(long, default_value_t = 0)]
        likes: i64,
        #[arg(long, default_value_t = 0)]
        retweets: i64,
        /// RFC 3339 timestamp; defaults to now.
        #[arg(long)]
        timestamp: Option<String>,
    },
    /// Upsert a news article by (author, title).
    News {
        #[arg(long)]
        keyword_id: String,
        #[arg(long)]
        author: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        text: String,
        #[arg(long)]
        timestamp: Option<String>,
    },
    /// Upsert a New York Times article by its article id.
    Nyt {
        #[arg(long)]
        keyword_id: String,
        #[arg(long)]
        article_id: String,
        #[arg(long)]
        text: String,
        #[arg(long)]
        timestamp: Option<String>,
    },
}

#[derive(Subcommand)]
enum ProcessAction {
    /// List mentions that have no score yet.
    Pending {
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Attach a sentiment score to a mention.
    Score { mention_id: String, score: f64 },
    /// Replace a mention's entity annotations (JSON array).
    Entities { mention_id: String, entities: String },
    /// Replace a mention's category annotations (JSON array).
    Categories {
        mention_id: String,
        categories: String,
    },
}

#[derive(Subcommand)]
enum AnalyticsAction {
    /// Bucketed score trend for a keyword.
    Trend {
        keyword_id: String,
        /// Only include mentions on or after this date (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,
        /// Bucket width in minutes; defaults to the configured value.
        #[arg(long)]
        granularity: Option<i64>,
    },
    /// Mean score across all scored mentions of a keyword.
    Average { keyword_id: String },
    /// Ranked entity roll-up for a keyword.
    Entities {
        keyword_id: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Ranked category roll-up for a keyword.
    Categories {
        keyword_id: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Export all mention texts of a keyword, newest first.
    Texts { keyword_id: String },
}

#[derive(Subcommand)]
enum MetaAction {
    /// Replace the public-keyword allowlist.
    SetPublic { ids: Vec<String> },
    /// Print the public-keyword allowlist.
    GetPublic,
    /// Report whether the meta registry is initialised.
    Status,
}

#[derive(Subcommand)]
enum UserAction {
    /// Insert a new user with a precomputed password hash.
    Add {
        username: String,
        #[arg(long)]
        password_hash: String,
    },
}

fn parse_timestamp(raw: Option<&str>) -> Result<DateTime<Utc>> {
    match raw {
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

fn parse_since(raw: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")?;
    Ok(date.and_hms_opt(0, 0, 0).unwrap().and_utc())
}

fn configured_rollup_limit(cfg: &config::Config) -> Option<usize> {
    (cfg.analytics.rollup_limit > 0).then_some(cfg.analytics.rollup_limit)
}

fn print_keyword(keyword: &keywatch::models::Keyword) {
    println!(
        "{}  {} ({})  users=[{}] indexes={} deleted={}",
        keyword.id,
        keyword.keyword_string,
        keyword.language,
        keyword.users.join(", "),
        keyword.indexes.len(),
        keyword.deleted
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let engine = Engine::connect(&cfg).await?;

    match cli.command {
        Commands::Init => {
            engine.migrate().await?;
            println!("Database initialized successfully.");
        }
        Commands::Keyword { action } => match action {
            KeywordAction::Add {
                keyword,
                language,
                user,
            } => {
                let added = engine.keywords.add_keyword(&keyword, &language, &user).await?;
                print_keyword(&added);
            }
            KeywordAction::Get {
                keyword,
                language,
                user,
            } => match engine
                .keywords
                .get_keyword(&keyword, &language, user.as_deref())
                .await?
            {
                Some(found) => print_keyword(&found),
                None => println!("No keyword found."),
            },
            KeywordAction::List { user } => {
                for summary in engine.keywords.get_keywords_for_user(&user).await? {
                    println!(
                        "{}  {} ({})",
                        summary.id, summary.keyword_string, summary.language
                    );
                }
            }
            KeywordAction::Delete { id, user } => {
                let modified = engine.keywords.delete_keyword(id.as_str(), &user).await?;
                println!("modified: {modified}");
            }
            KeywordAction::Link {
                keyword_id,
                index_id,
            } => match engine
                .keywords
                .add_index_to_keyword(keyword_id.as_str(), index_id.as_str())
                .await?
            {
                Some(keyword) => print_keyword(&keyword),
                None => println!("No keyword found."),
            },
            KeywordAction::Unlink {
                keyword_id,
                index_id,
            } => match engine
                .keywords
                .delete_index_from_keyword(keyword_id.as_str(), index_id.as_str())
                .await?
            {
                Some(keyword) => print_keyword(&keyword),
                None => println!("No keyword found."),
            },
            KeywordAction::ByIndex { index_id } => {
                for keyword in engine.keywords.get_keywords_by_index(index_id.as_str()).await? {
                    print_keyword(&keyword);
                }
            }
            KeywordAction::Public => {
                for keyword in engine.keywords.get_public_keywords().await? {
                    print_keyword(&keyword);
                }
            }
        },
        Commands::Index { action } => match action {
            IndexAction::Add {
                name,
                index_type,
                user,
            } => {
                let index_type = IndexType::from_str(&index_type)?;
                let index = engine.indexes.add_index(&name, index_type, &user).await?;
                println!(
                    "{}  {} [{}] users=[{}] deleted={}",
                    index.id,
                    index.name,
                    index.index_type,
                    index.users.join(", "),
                    index.deleted
                );
            }
            IndexAction::Get { name } => match engine.indexes.get_index(&name).await? {
                Some(index) => println!(
                    "{}  {} [{}] users=[{}] deleted={}",
                    index.id,
                    index.name,
                    index.index_type,
                    index.users.join(", "),
                    index.deleted
                ),
                None => println!("No index found."),
            },
            IndexAction::List { user, index_type } => {
                let indexes = match index_type {
                    Some(raw) => {
                        let index_type = IndexType::from_str(&raw)?;
                        engine.indexes.get_indexes_by_type(index_type, &user).await?
                    }
                    None => engine.indexes.get_indexes(&user).await?,
                };
                for index in indexes {
                    println!("{}  {} [{}]", index.id, index.name, index.index_type);
                }
            }
        },
        Commands::Ingest { action } => match action {
            IngestAction::Twitter {
                keyword_id,
                tweet_id,
                text,
                likes,
                retweets,
                timestamp,
            } => {
                let ts = parse_timestamp(timestamp.as_deref())?;
                let mention = engine
                    .mentions
                    .add_twitter(keyword_id.as_str(), tweet_id, &text, likes, retweets, ts)
                    .await?;
                println!("upserted mention {}", mention.id);
            }
            IngestAction::News {
                keyword_id,
                author,
                title,
                text,
                timestamp,
            } => {
                let ts = parse_timestamp(timestamp.as_deref())?;
                let mention = engine
                    .mentions
                    .add_news(keyword_id.as_str(), &author, &title, &text, ts)
                    .await?;
                println!("upserted mention {}", mention.id);
            }
            IngestAction::Nyt {
                keyword_id,
                article_id,
                text,
                timestamp,
            } => {
                let ts = parse_timestamp(timestamp.as_deref())?;
                let mention = engine
                    .mentions
                    .add_nyt(keyword_id.as_str(), &article_id, &text, ts)
                    .await?;
                println!("upserted mention {}", mention.id);
            }
        },
        Commands::Process { action } => match action {
            ProcessAction::Pending { limit } => {
                for mention in engine.mentions.get_unprocessed_mentions(limit).await? {
                    println!(
                        "{}  [{}] {} ({}): {}",
                        mention.id,
                        mention.source.source_type(),
                        mention.keyword_string.as_deref().unwrap_or("?"),
                        mention.language.as_deref().unwrap_or("?"),
                        mention.text
                    );
                }
            }
            ProcessAction::Score { mention_id, score } => {
                let modified = engine.mentions.set_score(mention_id.as_str(), score).await?;
                println!("modified: {modified}");
            }
            ProcessAction::Entities {
                mention_id,
                entities,
            } => {
                let entities: Vec<EntityMention> = serde_json::from_str(&entities)?;
                let modified = engine
                    .mentions
                    .set_entities(mention_id.as_str(), &entities)
                    .await?;
                println!("modified: {modified}");
            }
            ProcessAction::Categories {
                mention_id,
                categories,
            } => {
                let categories: Vec<CategoryMention> = serde_json::from_str(&categories)?;
                let modified = engine
                    .mentions
                    .set_categories(mention_id.as_str(), &categories)
                    .await?;
                println!("modified: {modified}");
            }
        },
        Commands::Analytics { action } => match action {
            AnalyticsAction::Trend {
                keyword_id,
                since,
                granularity,
            } => {
                let cutoff = since.as_deref().map(parse_since).transpose()?;
                let granularity = granularity.unwrap_or(cfg.analytics.granularity_minutes);
                let trend = engine
                    .analytics
                    .get_plotting_data(keyword_id.as_str(), cutoff, granularity)
                    .await?;
                for point in trend {
                    let date = DateTime::from_timestamp(point.timestamp, 0)
                        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_default();
                    println!("{date}  score={:.4} count={}", point.score, point.count);
                }
            }
            AnalyticsAction::Average { keyword_id } => {
                match engine.analytics.get_average_score(keyword_id.as_str()).await? {
                    Some(average) => println!("{average:.4}"),
                    None => println!("No scored mentions."),
                }
            }
            AnalyticsAction::Entities { keyword_id, limit } => {
                let limit = limit.or(configured_rollup_limit(&cfg));
                for entity in engine.analytics.get_entities(keyword_id.as_str(), limit).await? {
                    println!("{}  count={} score={:.4}", entity.value, entity.count, entity.score);
                }
            }
            AnalyticsAction::Categories { keyword_id, limit } => {
                let limit = limit.or(configured_rollup_limit(&cfg));
                for category in engine
                    .analytics
                    .get_categories(keyword_id.as_str(), limit)
                    .await?
                {
                    println!(
                        "{}  count={} confidence={:.4}",
                        category.value, category.count, category.confidence
                    );
                }
            }
            AnalyticsAction::Texts { keyword_id } => {
                for row in engine.analytics.get_texts(keyword_id.as_str()).await? {
                    let score = row
                        .score
                        .map(|s| format!("{s:.4}"))
                        .unwrap_or_else(|| "-".to_string());
                    println!("{}\t{}\t{}", row.timestamp, score, row.text);
                }
            }
        },
        Commands::Meta { action } => match action {
            MetaAction::SetPublic { ids } => {
                let ids = ids
                    .iter()
                    .map(|raw| Id::parse(raw))
                    .collect::<keywatch::Result<Vec<_>>>()?;
                let stored = engine.meta.set_public_keyword_ids(&ids).await?;
                println!("public keywords: {}", stored.len());
            }
            MetaAction::GetPublic => {
                for id in engine.meta.get_public_keyword_ids().await? {
                    println!("{id}");
                }
            }
            MetaAction::Status => {
                if engine.meta.is_meta_initialised().await? {
                    println!("initialised");
                } else {
                    println!("uninitialised");
                }
            }
        },
        Commands::User { action } => match action {
            UserAction::Add {
                username,
                password_hash,
            } => {
                let user = engine.users.add_user(&username, &password_hash).await?;
                println!("{}  {}", user.id, user.username);
            }
        },
    }

    engine.close().await;
    Ok(())
}

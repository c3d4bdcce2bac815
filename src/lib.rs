//! # Keywatch
//!
//! Persistence and analytics engine for a keyword-monitoring platform.
//!
//! Users track keywords, crawlers ingest text mentions of those keywords
//! from multiple sources (tweets, news articles, long-form articles), and an
//! external NLP processor later annotates each mention with a sentiment
//! score, named entities and categories. Keywatch owns everything on top of
//! the raw records: the membership model relating keywords to users and
//! indexes (with reference-counted soft deletion), the time-windowed trend
//! pipeline over scored mentions, and the ranked entity/category roll-ups.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌───────────────┐
//! │ Crawlers │──▶│ Mention Store │──▶│   Analytics    │
//! └──────────┘   └──────┬────────┘   │ trend/roll-up │
//!                       │            └───────────────┘
//! ┌──────────┐   ┌──────▼────────┐
//! │   NLP    │──▶│    SQLite      │◀── Keyword/Index/Meta registries
//! └──────────┘   └───────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`ident`] | Canonical ids and identity resolution |
//! | [`keywords`] | Keyword registry |
//! | [`indexes`] | Index registry |
//! | [`mentions`] | Mention store |
//! | [`analytics`] | Trend and roll-up pipeline |
//! | [`meta`] | Admin-curated singleton settings |
//! | [`users`] | User registry |
//! | [`controller`] | Engine facade |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analytics;
pub mod config;
pub mod controller;
pub mod db;
pub mod error;
pub mod ident;
pub mod indexes;
pub mod keywords;
pub mod mentions;
pub mod meta;
pub mod migrate;
pub mod models;
pub mod users;

pub use controller::Engine;
pub use error::{Error, Result};
pub use ident::{Id, IntoId};

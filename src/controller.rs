//! Engine facade.
//!
//! Composes one struct per registry over a shared connection pool, via
//! explicit delegation. The engine is stateless between calls: each
//! operation runs its queries against the pool and returns; there is no
//! in-process caching or session affinity.

use sqlx::SqlitePool;

use crate::analytics::Analytics;
use crate::config::Config;
use crate::db;
use crate::error::Result;
use crate::indexes::IndexRegistry;
use crate::keywords::KeywordRegistry;
use crate::mentions::MentionStore;
use crate::meta::MetaRegistry;
use crate::migrate;
use crate::users::UserRegistry;

pub struct Engine {
    pool: SqlitePool,
    pub keywords: KeywordRegistry,
    pub indexes: IndexRegistry,
    pub mentions: MentionStore,
    pub analytics: Analytics,
    pub meta: MetaRegistry,
    pub users: UserRegistry,
}

impl Engine {
    /// Open the database configured in `config` and compose the registries.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        Ok(Self::from_pool(pool))
    }

    /// Compose the registries over an existing pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        let meta = MetaRegistry::new(pool.clone());
        Self {
            keywords: KeywordRegistry::new(pool.clone(), meta.clone()),
            indexes: IndexRegistry::new(pool.clone()),
            mentions: MentionStore::new(pool.clone()),
            analytics: Analytics::new(pool.clone()),
            users: UserRegistry::new(pool.clone()),
            meta,
            pool,
        }
    }

    /// Apply the schema migrations. Idempotent.
    pub async fn migrate(&self) -> Result<()> {
        migrate::apply_schema(&self.pool).await
    }

    /// Close the underlying pool.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

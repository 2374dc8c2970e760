//! Configuration for the marketplace process

use std::env;
use std::time::Duration;

use common::db::StoreOptions;
use common::StoreType;

/// Configuration for the marketplace process
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    /// Postgres URL; the in-memory store is used when absent
    pub database_url: Option<String>,
    /// Database connection pool size
    pub db_pool_size: u32,
    /// Apply pending migrations on startup
    pub run_migrations: bool,
    /// In-memory row lock wait before a transient error
    pub lock_timeout_ms: u64,
    /// Minutes after the meeting before ratings open; 0 opens them at the meeting time
    pub rating_delay_minutes: i64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            db_pool_size: env_or("DB_POOL_SIZE", 5),
            run_migrations: env::var("RUN_MIGRATIONS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            lock_timeout_ms: env_or("LOCK_TIMEOUT_MS", 5000),
            rating_delay_minutes: env_or("RATING_DELAY_MINUTES", 0),
        }
    }
}

impl MarketplaceConfig {
    /// Create a new configuration using environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// In-memory configuration with defaults for everything else
    pub fn in_memory() -> Self {
        Self {
            database_url: None,
            db_pool_size: 5,
            run_migrations: false,
            lock_timeout_ms: 5000,
            rating_delay_minutes: 0,
        }
    }

    pub fn store_type(&self) -> StoreType {
        match &self.database_url {
            Some(url) => StoreType::Postgres(Some(url.clone())),
            None => StoreType::InMemory,
        }
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            max_connections: self.db_pool_size,
            run_migrations: self.run_migrations,
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
        }
    }

    pub fn rating_delay(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.rating_delay_minutes.max(0))
    }
}

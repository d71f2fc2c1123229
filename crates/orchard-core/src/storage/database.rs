//! SQLite connection pool
//!
//! A [`Database`] owns the pool that repositories borrow. Opening a file
//! database creates the file and its directory when missing, and brings the
//! schema up to date unless the config says otherwise.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Connection, SqlitePool};

use crate::config::DatabaseSettings;
use crate::storage::migrations::{self, MigrationStatus};

const MEMORY_PATH: &str = ":memory:";

/// How to open a [`Database`]
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database file, or `:memory:`
    pub path: PathBuf,
    pub max_connections: u32,
    /// Run pending migrations on open
    pub auto_migrate: bool,
    /// How long a writer waits for a competing transaction
    pub busy_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: 5,
            auto_migrate: true,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl DatabaseConfig {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Private in-memory database. One connection, since each connection
    /// would otherwise see its own empty database.
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::from(MEMORY_PATH),
            max_connections: 1,
            ..Default::default()
        }
    }

    /// From the `[database]` table of the config file
    pub fn from_settings(settings: &DatabaseSettings) -> Self {
        let path = settings.path.clone().unwrap_or_else(default_database_path);
        Self::with_path(path).max_connections(settings.max_connections)
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn no_migrate(mut self) -> Self {
        self.auto_migrate = false;
        self
    }

    fn is_memory(&self) -> bool {
        self.path == Path::new(MEMORY_PATH)
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        let options = if self.is_memory() {
            SqliteConnectOptions::new().in_memory(true)
        } else {
            SqliteConnectOptions::new()
                .filename(&self.path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
        };
        options.busy_timeout(self.busy_timeout)
    }

    fn pool_options(&self) -> SqlitePoolOptions {
        let options = SqlitePoolOptions::new().max_connections(self.max_connections);
        if self.is_memory() {
            // Closing the last connection would discard the data
            options.idle_timeout(None).max_lifetime(None)
        } else {
            options
        }
    }
}

/// `<config_dir>/orchard/orchard.db`, or `orchard.db` in the working directory
/// when the platform has no config directory
pub fn default_database_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("orchard").join("orchard.db"))
        .unwrap_or_else(|| PathBuf::from("orchard.db"))
}

/// Shared handle to the connection pool
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    config: DatabaseConfig,
}

impl Database {
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        if !config.is_memory() {
            if let Some(dir) = config.path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
        }

        let pool = config
            .pool_options()
            .connect_with(config.connect_options())
            .await
            .with_context(|| format!("Failed to open database {}", config.path.display()))?;
        tracing::debug!(path = %config.path.display(), "Opened database");

        let db = Self { pool, config };
        if db.config.auto_migrate {
            db.migrate().await?;
        }
        Ok(db)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::new(DatabaseConfig::in_memory()).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub async fn migrate(&self) -> Result<()> {
        migrations::run_migrations(&self.pool)
            .await
            .context("Failed to migrate database")
    }

    pub async fn migration_status(&self) -> Result<MigrationStatus> {
        migrations::migration_status(&self.pool).await
    }

    /// Round-trip to SQLite on a pooled connection
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        conn.ping().await.context("Database did not answer")?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

//! SQLite pool setup for the gateway store.

use crate::error::{StorageError, StorageResult};
use keybus_core::StorageConfig;
use sqlx::ConnectOptions;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// How the store's database file is opened.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// SQLite file; parent directories are created on open.
    pub database_path: String,

    pub max_connections: u32,

    /// Wait for a pooled connection before giving up. A floor whose
    /// configuration cannot be read within this bound is queued for retry.
    pub acquire_timeout: Duration,

    /// Wait on a locked database file (another process writing).
    pub busy_timeout: Duration,

    pub create_if_missing: bool,

    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let storage = StorageConfig::default();
        Self {
            database_path: storage.database_path,
            max_connections: storage.max_connections,
            acquire_timeout: Duration::from_secs(10),
            busy_timeout: Duration::from_secs(5),
            create_if_missing: true,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    pub fn new(database_path: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Default::default()
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn auto_migrate(mut self, migrate: bool) -> Self {
        self.auto_migrate = migrate;
        self
    }

    fn connect_options(&self) -> StorageResult<SqliteConnectOptions> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", self.database_path))
            .map_err(|e| {
                StorageError::Configuration(format!("Invalid database path {}: {e}", self.database_path))
            })?
            .create_if_missing(self.create_if_missing)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(self.busy_timeout)
            .disable_statement_logging();
        Ok(options)
    }
}

impl From<&StorageConfig> for DatabaseConfig {
    fn from(config: &StorageConfig) -> Self {
        DatabaseConfig::new(config.database_path.clone()).max_connections(config.max_connections)
    }
}

/// Connection pool over the gateway database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the database file and bring its schema up to date.
    ///
    /// ```no_run
    /// use keybus_storage::connection::{Database, DatabaseConfig};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Database::new(DatabaseConfig::new("/var/lib/keybus/keybus.db")).await?;
    /// db.health_check().await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created, the file cannot be opened,
    /// or a migration fails.
    pub async fn new(config: DatabaseConfig) -> StorageResult<Self> {
        if let Some(parent) = Path::new(&config.database_path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Configuration(format!(
                    "Cannot create {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(config.connect_options()?)
            .await?;

        let db = Self { pool };
        if config.auto_migrate {
            db.migrate().await?;
        }

        info!(path = %config.database_path, "database opened");
        Ok(db)
    }

    /// Private in-memory database for tests and dry runs.
    pub async fn in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // The database lives only as long as its single connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Apply the migrations embedded from the workspace `migrations/`.
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

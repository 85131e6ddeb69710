//! Connection pool for the configured backend
//!
//! [`Database`] holds either a SQLite or a MySQL pool. Repositories reach the
//! concrete pool through [`crate::with_pool!`].

use anyhow::{Context, Result};
use sqlx::{
    mysql::{MySqlPool, MySqlPoolOptions},
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{DatabaseConfig, DatabaseDriver};

const SQLITE_MAX_CONNECTIONS: u32 = 20;
const MYSQL_MAX_CONNECTIONS: u32 = 30;

/// An open pool on one of the supported backends
#[derive(Debug, Clone)]
pub enum Database {
    Sqlite(SqlitePool),
    Mysql(MySqlPool),
}

/// Shared handle passed to every repository
pub type DynDatabasePool = Arc<Database>;

impl Database {
    /// Open a SQLite database from `:memory:`, a `sqlite:` URL or a file path.
    /// Parent directories of a file database are created.
    pub async fn connect_sqlite(url: &str) -> Result<Self> {
        let options = match sqlite_file(url) {
            None => SqliteConnectOptions::from_str("sqlite::memory:")?,
            Some(file) => {
                if let Some(dir) = Path::new(file).parent().filter(|d| !d.as_os_str().is_empty()) {
                    std::fs::create_dir_all(dir)
                        .with_context(|| format!("Failed to create database directory {:?}", dir))?;
                }
                SqliteConnectOptions::new()
                    .filename(file)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
            }
        }
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

        // each connection to :memory: is its own database
        let pool_options = if sqlite_file(url).is_none() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(SQLITE_MAX_CONNECTIONS)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open SQLite database {}", url))?;
        Ok(Self::Sqlite(pool))
    }

    /// Connect to MySQL; a bare `user@host/db` gets the `mysql://` scheme
    pub async fn connect_mysql(url: &str) -> Result<Self> {
        let url = if url.starts_with("mysql://") {
            url.to_string()
        } else {
            format!("mysql://{}", url)
        };
        let pool = MySqlPoolOptions::new()
            .max_connections(MYSQL_MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&url)
            .await
            .context("Failed to connect to MySQL")?;
        Ok(Self::Mysql(pool))
    }

    pub fn driver(&self) -> DatabaseDriver {
        match self {
            Self::Sqlite(_) => DatabaseDriver::Sqlite,
            Self::Mysql(_) => DatabaseDriver::Mysql,
        }
    }

    pub fn as_sqlite(&self) -> Option<&SqlitePool> {
        match self {
            Self::Sqlite(pool) => Some(pool),
            Self::Mysql(_) => None,
        }
    }

    pub fn as_mysql(&self) -> Option<&MySqlPool> {
        match self {
            Self::Mysql(pool) => Some(pool),
            Self::Sqlite(_) => None,
        }
    }

    /// Run one statement and return the affected row count
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        let affected = match self {
            Self::Sqlite(pool) => sqlx::query(sql).execute(pool).await.map(|r| r.rows_affected()),
            Self::Mysql(pool) => sqlx::query(sql).execute(pool).await.map(|r| r.rows_affected()),
        };
        affected.with_context(|| format!("Failed to execute: {}", sql))
    }

    /// Round-trip a trivial query
    pub async fn ping(&self) -> Result<()> {
        self.execute("SELECT 1").await.map(|_| ()).context("Database ping failed")
    }

    pub async fn close(&self) {
        match self {
            Self::Sqlite(pool) => pool.close().await,
            Self::Mysql(pool) => pool.close().await,
        }
    }
}

/// File path of a SQLite URL, `None` for in-memory databases
fn sqlite_file(url: &str) -> Option<&str> {
    if url == ":memory:" || url.starts_with("sqlite::memory:") {
        return None;
    }
    let path = url.trim_start_matches("sqlite://").trim_start_matches("sqlite:");
    path.split('?').next()
}

/// Open the pool selected by `database.driver`
pub async fn create_pool(config: &DatabaseConfig) -> Result<DynDatabasePool> {
    let db = match config.driver {
        DatabaseDriver::Sqlite => Database::connect_sqlite(&config.url).await?,
        DatabaseDriver::Mysql => Database::connect_mysql(&config.url).await?,
    };
    Ok(Arc::new(db))
}

/// In-memory SQLite pool for tests
pub async fn create_test_pool() -> Result<DynDatabasePool> {
    Ok(Arc::new(Database::connect_sqlite(":memory:").await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_file_parsing() {
        assert_eq!(sqlite_file(":memory:"), None);
        assert_eq!(sqlite_file("sqlite::memory:"), None);
        assert_eq!(sqlite_file("sqlite://data/app.db?mode=rwc"), Some("data/app.db"));
        assert_eq!(sqlite_file("data/unibridge.db"), Some("data/unibridge.db"));
    }

    #[tokio::test]
    async fn test_memory_pool_enforces_foreign_keys() {
        let pool = create_test_pool().await.unwrap();
        assert_eq!(pool.driver(), DatabaseDriver::Sqlite);
        assert!(pool.as_mysql().is_none());
        pool.ping().await.unwrap();

        pool.execute("CREATE TABLE plans (id TEXT PRIMARY KEY)").await.unwrap();
        pool.execute(
            "CREATE TABLE subscriptions (id TEXT PRIMARY KEY, plan_id TEXT NOT NULL REFERENCES plans(id))",
        )
        .await
        .unwrap();
        assert_eq!(pool.execute("INSERT INTO plans (id) VALUES ('asia')").await.unwrap(), 1);

        let orphan = pool
            .execute("INSERT INTO subscriptions (id, plan_id) VALUES ('s1', 'mars')")
            .await;
        assert!(orphan.is_err());
    }

    #[tokio::test]
    async fn test_file_database_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("nested").join("unibridge.db");
        let config = DatabaseConfig {
            driver: DatabaseDriver::Sqlite,
            url: path.to_string_lossy().to_string(),
        };

        let pool = create_pool(&config).await.unwrap();
        pool.ping().await.unwrap();
        assert!(path.exists());
        pool.close().await;
    }

    #[tokio::test]
    #[ignore = "Requires MySQL server"]
    async fn test_mysql_pool_ping() {
        let url = std::env::var("MYSQL_TEST_URL")
            .unwrap_or_else(|_| "mysql://root@localhost/unibridge_test".to_string());
        let pool = Database::connect_mysql(&url).await.unwrap();
        assert_eq!(pool.driver(), DatabaseDriver::Mysql);
        pool.ping().await.unwrap();
    }
}

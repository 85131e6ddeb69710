//! Database layer
//!
//! SQLite is the default backend (single-file deployment); MySQL is selected
//! through `database.driver`. Queries are written once with `?` placeholders
//! and expanded for both backends by [`with_pool!`].

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, Database, DynDatabasePool};

/// Run the same sqlx body against whichever concrete pool is configured.
///
/// ```ignore
/// with_pool!(self.pool, |pool| {
///     sqlx::query_as::<_, University>("SELECT * FROM universities WHERE id = ?")
///         .bind(id)
///         .fetch_optional(pool)
///         .await
///         .context("Failed to get university")
/// })
/// ```
#[macro_export]
macro_rules! with_pool {
    ($db:expr, |$pool:ident| $body:expr) => {
        match $db.driver() {
            $crate::config::DatabaseDriver::Sqlite => {
                let $pool = $db
                    .as_sqlite()
                    .ok_or_else(|| ::anyhow::anyhow!("SQLite pool unavailable"))?;
                $body
            }
            $crate::config::DatabaseDriver::Mysql => {
                let $pool = $db
                    .as_mysql()
                    .ok_or_else(|| ::anyhow::anyhow!("MySQL pool unavailable"))?;
                $body
            }
        }
    };
}

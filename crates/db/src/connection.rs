use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use tradedesk_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_with_config(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

/// Opens a pool with foreign keys, WAL and a bounded busy wait on every connection.
///
/// A missing database file is created.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let database_url = with_create_mode(database_url);
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(&database_url)
        .await
}

fn with_create_mode(database_url: &str) -> String {
    let file_backed = database_url.starts_with("sqlite://") && !database_url.contains(":memory:");
    if file_backed && !database_url.contains("mode=") {
        let separator = if database_url.contains('?') { '&' } else { '?' };
        return format!("{database_url}{separator}mode=rwc");
    }
    database_url.to_string()
}

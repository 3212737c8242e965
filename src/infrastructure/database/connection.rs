//! Database connection manager with pooling and migrations.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::domain::errors::AgentError;

/// SQLite pool with WAL mode enabled.
pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self, AgentError> {
        // create_if_missing covers the file but not its directory.
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            if !path.contains(":memory:") {
                let parent = std::path::Path::new(path).parent();
                if let Some(parent) = parent.filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        AgentError::StorageUnavailable(format!(
                            "cannot create database directory: {e}"
                        ))
                    })?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AgentError::StorageUnavailable(format!("Invalid database URL: {e}")))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        // In-memory databases are per-connection; pooling them would hand
        // each query a different empty database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| {
                AgentError::StorageUnavailable(format!("Failed to create connection pool: {e}"))
            })?;

        Ok(Self { pool })
    }

    /// Run migrations at startup.
    pub async fn migrate(&self) -> Result<(), AgentError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AgentError::StorageUnavailable(format!("Migration failed: {e}")))?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_and_migration() {
        let db = DatabaseConnection::new("sqlite::memory:")
            .await
            .expect("Failed to create connection");
        db.migrate().await.expect("Failed to run migrations");
        assert!(!db.pool().is_closed());
        db.close().await;
    }
}

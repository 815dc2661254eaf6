//! Connection and pool management for the foreign library database.

use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;

use crate::error::{ErrorKind, Result};

/// Schema applied to in-memory databases so tests can build fixtures.
/// Production connections open the media server's existing file and never
/// execute DDL against it.
pub(crate) static LIBRARY_SCHEMA: &str = include_str!("../schema/library.sql");
const MAX_CONNECTIONS: u32 = 5;

/// Connection pool for the media server's library database.
///
/// The library database is owned by the media server; this service is a
/// guest writer. The pool therefore refuses to create the file, runs no
/// migrations, and treats the schema as given.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    async fn new(options: SqliteConnectOptions, max: Option<u32>) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // Applies the query-based PRAGMAs to EVERY pooled connection,
            // not only the first one the pool hands back.
            .after_connect(|conn, meta| Box::pin(async move {
                Self::apply_pragmas(conn, meta).await
            }))
            .max_connections(max.unwrap_or(MAX_CONNECTIONS))
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(Self { pool })
    }

    /// Connect to the library database at the given path.
    ///
    /// The file must already exist: the schema belongs to the media server,
    /// so an absent file means a misconfigured `database_path`, not a fresh
    /// install.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            exn::bail!(ErrorKind::MissingDatabase(path.to_path_buf()));
        }
        let options = Self::base_options().filename(path).create_if_missing(false);
        Self::new(options, None).await
    }

    /// Connect to an in-memory database seeded with the library schema.
    ///
    /// Note:
    /// - In-memory databases are destroyed when the connection closes.
    /// - Not gated behind `#[cfg(test)]` so dependent crates can also use
    ///   this in their tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        // In-memory databases must be limited to one connection, otherwise
        // parallel connections see different (empty) databases.
        let db = Self::new(options, Some(1)).await?;
        sqlx::query(LIBRARY_SCHEMA).execute(db.pool()).await.or_raise(|| ErrorKind::Database)?;
        Ok(db)
    }

    /// Base connection options shared between file and in-memory databases.
    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            // The media server runs WAL; match it rather than fight it
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            // The media server writes to this file concurrently; a write
            // landing while it holds the lock should wait, not fail.
            .busy_timeout(std::time::Duration::from_millis(1500))
    }

    /// Apply additional PRAGMA settings that aren't exposed via SqliteConnectOptions.
    async fn apply_pragmas(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA cache_size = -8192;
                PRAGMA temp_store = MEMORY;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the connection pool.
    ///
    /// Waits for checked-out connections to finish their current work and be
    /// returned before closing them, so in-flight transactions complete.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

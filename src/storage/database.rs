//! Database connection and initialization.
//!
//! Provides a thread-safe wrapper around rusqlite for async operations.

use std::path::Path;
use std::sync::Arc;

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use thiserror::Error;
use tokio::sync::Mutex;

use super::schema;
use crate::engine::{fold_case, FOLD_CASE_SQL_FN};

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Blocking task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Thread-safe database connection wrapper.
///
/// Uses a Mutex to ensure only one operation accesses the connection at a time.
/// All operations are run via `spawn_blocking` to avoid blocking the async runtime.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens a database at the given path, creating it and its parent
    /// directory if necessary.
    ///
    /// Runs migrations to ensure the schema is up to date.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let conn = Connection::open(&path)?;
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            register_functions(&conn)?;
            Ok(conn)
        })
        .await
        .map_err(|e| DatabaseError::Task(e.to_string()))??;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.run_migrations().await?;

        Ok(db)
    }

    /// Opens an in-memory database for testing.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio::task::spawn_blocking(|| -> Result<Connection> {
            let conn = Connection::open_in_memory()?;
            register_functions(&conn)?;
            Ok(conn)
        })
        .await
        .map_err(|e| DatabaseError::Task(e.to_string()))??;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.run_migrations().await?;

        Ok(db)
    }

    /// Runs all schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = conn.blocking_lock();

            for migration in schema::all_migrations() {
                conn.execute_batch(migration)
                    .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Task(e.to_string()))?
    }

    /// Executes a function with access to the database connection.
    ///
    /// The function runs in a blocking task to avoid blocking the async runtime.
    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            f(&conn)
        })
        .await
        .map_err(|e| DatabaseError::Task(e.to_string()))?
    }

    /// Executes a transaction with the given function.
    ///
    /// The transaction is automatically committed on success or rolled back on error.
    pub async fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            let tx = conn.transaction()?;
            let result = f(&tx)?;
            tx.commit()?;
            Ok(result)
        })
        .await
        .map_err(|e| DatabaseError::Task(e.to_string()))?
    }
}

/// Registers the Rust functions rule queries call from SQL.
fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        FOLD_CASE_SQL_FN,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| fold_case(&t)))
        },
    )
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_creates_schema() {
        let db = Database::open_in_memory().await.unwrap();

        let tables: Vec<String> = db
            .with_conn(|conn| {
                let mut stmt = conn
                    .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
            })
            .await
            .unwrap();

        assert_eq!(tables, vec!["emails".to_string()]);
    }

    #[tokio::test]
    async fn fold_case_is_callable_from_sql() {
        let db = Database::open_in_memory().await.unwrap();

        let folded: String = db
            .with_conn(|conn| {
                let value = conn.query_row("SELECT fold_case('ÄbC Newsletter')", [], |row| {
                    row.get(0)
                })?;
                Ok(value)
            })
            .await
            .unwrap();

        assert_eq!(folded, fold_case("ÄbC Newsletter"));
        assert_eq!(folded, "äbc newsletter");
    }

    #[tokio::test]
    async fn fold_case_passes_null_through() {
        let db = Database::open_in_memory().await.unwrap();

        let folded: Option<String> = db
            .with_conn(|conn| Ok(conn.query_row("SELECT fold_case(NULL)", [], |row| row.get(0))?))
            .await
            .unwrap();

        assert_eq!(folded, None);
    }

    #[tokio::test]
    async fn transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().await.unwrap();

        let result: Result<()> = db
            .transaction(|tx| {
                tx.execute(
                    "INSERT INTO emails (id, received_at, created_at, updated_at) VALUES (?, ?, ?, ?)",
                    ["rollback", "2025-01-01T00:00:00.000000Z", "x", "x"],
                )?;
                Err(DatabaseError::InvalidRecord("intentional error".to_string()))
            })
            .await;

        assert!(result.is_err());

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM emails", [], |row| row.get(0))?)
            })
            .await
            .unwrap();

        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn database_is_clone() {
        let db1 = Database::open_in_memory().await.unwrap();
        let db2 = db1.clone();

        db1.transaction(|tx| {
            tx.execute(
                "INSERT INTO emails (id, received_at, created_at, updated_at) VALUES (?, ?, ?, ?)",
                ["shared", "2025-01-01T00:00:00.000000Z", "x", "x"],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        let count: i64 = db2
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM emails", [], |row| row.get(0))?)
            })
            .await
            .unwrap();

        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("emails.db");

        let db = Database::open(&path).await.unwrap();
        drop(db);

        assert!(path.exists());
    }
}

//! Database and credential storage.
//!
//! - SQLite mirror of fetched email, queried in bulk by rules
//! - OS keychain integration for Gmail credentials
//! - Async-safe database operations via tokio::task::spawn_blocking

mod database;
mod keychain;
pub mod queries;
mod schema;

pub use database::{Database, DatabaseError, Result};
pub use keychain::{KeychainAccess, KeychainError};

/// Combined storage layer with database and keychain access.
#[derive(Debug, Clone)]
pub struct StorageLayer {
    db: Database,
    keychain: KeychainAccess,
}

impl StorageLayer {
    /// Creates a new storage layer with the given database path.
    pub async fn new(db_path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = Database::open(db_path).await?;
        let keychain = KeychainAccess::new();

        Ok(Self { db, keychain })
    }

    /// Creates a storage layer with an in-memory database for testing.
    pub async fn in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        let keychain = KeychainAccess::with_service("io.gmail-actions.test");

        Ok(Self { db, keychain })
    }

    /// Returns a reference to the database.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Returns a reference to the keychain.
    pub fn keychain(&self) -> &KeychainAccess {
        &self.keychain
    }
}

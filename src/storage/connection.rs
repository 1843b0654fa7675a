//! Database connection management
//!
//! One process-wide handle reused across queries; every call is
//! independently parameterized by user id and carries no state between
//! invocations.

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Arc;

use super::migrations::run_migrations;
use crate::error::Result;
use crate::types::StorageConfig;

/// Storage engine wrapping SQLite
pub struct Storage {
    config: StorageConfig,
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    /// Open or create a database with the given configuration
    pub fn open(config: StorageConfig) -> Result<Self> {
        let conn = Self::create_connection(&config)?;
        run_migrations(&conn)?;

        Ok(Self {
            config,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (testing and ephemeral use)
    pub fn open_in_memory() -> Result<Self> {
        Self::open(StorageConfig {
            db_path: ":memory:".to_string(),
        })
    }

    fn create_connection(config: &StorageConfig) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = if config.db_path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(&config.db_path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open_with_flags(&config.db_path, flags)?
        };

        // case_sensitive_like: substring matching is case-sensitive for
        // non-script characters, exact for script characters
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=30000;
            PRAGMA cache_size=-64000;
            PRAGMA temp_store=MEMORY;
            PRAGMA foreign_keys=ON;
            PRAGMA case_sensitive_like=ON;
            "#,
        )?;

        Ok(conn)
    }

    /// Execute a function with the connection
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Execute a function with a transaction
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Get database path
    pub fn db_path(&self) -> &str {
        &self.config.db_path
    }
}

impl Clone for Storage {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            conn: self.conn.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let storage = Storage::open_in_memory().unwrap();
        assert_eq!(storage.db_path(), ":memory:");
    }

    #[test]
    fn test_like_is_case_sensitive() {
        let storage = Storage::open_in_memory().unwrap();
        let matched: i64 = storage
            .with_connection(|conn| {
                Ok(conn.query_row(
                    "SELECT 'MacBook' LIKE '%macbook%'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(matched, 0);
    }

    #[test]
    fn test_file_backed_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("memories.db").to_string_lossy().to_string();

        {
            let storage = Storage::open(StorageConfig {
                db_path: db_path.clone(),
            })
            .unwrap();
            storage
                .with_connection(|conn| {
                    conn.execute(
                        "INSERT INTO memories (user_id, content, content_hash)
                         VALUES ('u1', '我喜欢打篮球', 'h')",
                        [],
                    )?;
                    Ok(())
                })
                .unwrap();
        }

        let reopened = Storage::open(StorageConfig { db_path }).unwrap();
        let count: i64 = reopened
            .with_connection(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_clone_shares_connection() {
        let storage = Storage::open_in_memory().unwrap();
        let clone = storage.clone();
        storage
            .with_connection(|conn| {
                conn.execute("CREATE TABLE probe (id INTEGER)", [])?;
                Ok(())
            })
            .unwrap();
        let count: i64 = clone
            .with_connection(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM probe", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }
}

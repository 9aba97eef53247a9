pub mod error;
pub mod membership;
pub mod migrations;
pub mod models;
pub mod queries;

pub use error::ChatError;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, ChatError> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self, ChatError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T, ChatError>
    where
        F: FnOnce(&Connection) -> Result<T, ChatError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ChatError::Persistence(format!("DB lock poisoned: {}", e)))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, ChatError>
    where
        F: FnOnce(&mut Connection) -> Result<T, ChatError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| ChatError::Persistence(format!("DB lock poisoned: {}", e)))?;
        f(&mut conn)
    }
}

//! SQLite test database with rollback-scoped cursors
//!
//! Every [`Cursor`] owns a dedicated connection with an open transaction.
//! Work done through a cursor is visible only inside that transaction and is
//! rolled back when the cursor closes, which is the isolation mechanism for
//! repeatable tests.

use crate::{Error, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Handle to the suite's test database
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Open or create the test database at path and initialize its schema
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Self {
            path: path.as_ref().to_path_buf(),
        };

        let conn = db.connect()?;
        conn.execute_batch(
            r#"
            -- External-identifier lookup, written by module loaders and
            -- fixtures, read by the reference resolver.
            CREATE TABLE IF NOT EXISTS model_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                module TEXT NOT NULL,
                name TEXT NOT NULL,
                model TEXT NOT NULL,
                res_id INTEGER NOT NULL,
                UNIQUE(module, name)
            );
            CREATE INDEX IF NOT EXISTS idx_model_data_module ON model_data(module);
            "#,
        )?;

        info!("Opened test database at {:?}", db.path);
        Ok(db)
    }

    /// Database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run committed setup statements (fixture tables, seed rows).
    ///
    /// Unlike work done through a cursor, this persists across tests.
    pub fn setup(&self, sql: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    /// Acquire a fresh cursor with an open transaction
    pub fn cursor(&self) -> Result<Cursor> {
        let conn = self.connect()?;
        conn.execute_batch("BEGIN DEFERRED")?;
        debug!("Opened cursor on {:?}", self.path);
        Ok(Cursor {
            inner: Arc::new(Mutex::new(Some(conn))),
        })
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        // WAL keeps concurrent cursors from blocking each other's reads
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }
}

/// A database cursor bound to one open transaction.
///
/// The cursor is exclusively owned by the transaction scope that created it.
/// Cloning shares the same underlying connection behind a lock; the only
/// intended clone is the session-registry hand-off that routes an external
/// browser process to the same in-flight transaction.
#[derive(Clone)]
pub struct Cursor {
    inner: Arc<Mutex<Option<Connection>>>,
}

impl Cursor {
    /// Run a closure against the underlying connection.
    ///
    /// Fails with [`Error::ScopeClosed`] once the cursor has been closed.
    pub fn with<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.inner.lock();
        let conn = guard.as_ref().ok_or(Error::ScopeClosed)?;
        f(conn)
    }

    /// Execute a statement, returning the number of affected rows
    pub fn execute<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<usize> {
        self.with(|conn| Ok(conn.execute(sql, params)?))
    }

    /// Execute a batch of statements (fixtures, DDL)
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.with(|conn| Ok(conn.execute_batch(sql)?))
    }

    /// Query a single optional row
    pub fn query_row<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<Option<T>>
    where
        P: rusqlite::Params,
        F: FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        self.with(|conn| Ok(conn.query_row(sql, params, f).optional()?))
    }

    /// Whether the cursor is still usable
    pub fn is_open(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Roll back the transaction and release the connection.
    ///
    /// Idempotent: closing an already-closed cursor is a no-op. A rollback
    /// failure propagates, since it means the transaction could not be undone.
    pub fn close(&self) -> Result<()> {
        let conn = self.inner.lock().take();
        if let Some(conn) = conn {
            conn.execute_batch("ROLLBACK")?;
            debug!("Cursor rolled back and closed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("open", &self.is_open())
            .finish()
    }
}

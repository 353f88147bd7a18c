//! Transaction scoping for isolated tests
//!
//! A [`TransactionScope`] pairs a fresh cursor with an execution context
//! (actor identity plus context keys). Everything written through the cursor
//! is rolled back when the scope ends, so no test leaves persistent state.

use chrono::{DateTime, Utc};
use folio_common::{Cursor, Database, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

use crate::resolver::RefResolver;

/// Execution context a scope runs under: actor identity and locale/settings
/// keys forwarded to the record layer.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub uid: i64,
    pub context: HashMap<String, String>,
}

impl ExecutionContext {
    pub fn new(uid: i64) -> Self {
        Self {
            uid,
            context: HashMap::new(),
        }
    }
}

/// A per-test transaction scope.
///
/// At most one scope is active per test; the cursor must not be used by two
/// concurrent tests. `end` is the propagating teardown path; `Drop` only
/// covers tests that bail out early.
pub struct TransactionScope {
    cursor: Cursor,
    ctx: ExecutionContext,
    started_at: DateTime<Utc>,
    closed: bool,
}

impl TransactionScope {
    /// Begin a scope: acquire a cursor and enter the execution context
    pub fn begin(db: &Database, uid: i64) -> Result<Self> {
        let cursor = db.cursor()?;
        let started_at = Utc::now();
        debug!(uid, %started_at, "transaction scope opened");
        Ok(Self {
            cursor,
            ctx: ExecutionContext::new(uid),
            started_at,
            closed: false,
        })
    }

    /// The scope's cursor
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Actor identity the scope runs under
    pub fn uid(&self) -> i64 {
        self.ctx.uid
    }

    /// Mutable access to the context keys
    pub fn context_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.ctx.context
    }

    /// When the scope was opened
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// A reference resolver bound to this scope's transaction
    pub fn resolver(&self) -> RefResolver<'_> {
        RefResolver::new(&self.cursor)
    }

    /// End the scope: roll back all changes and release the cursor.
    ///
    /// Idempotent: a second call after a successful first is a no-op.
    /// Rollback or close failures propagate, since a leaked open cursor is a
    /// resource leak.
    pub fn end(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.cursor.close()?;
        self.closed = true;
        debug!(uid = self.ctx.uid, "transaction scope ended");
        Ok(())
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.cursor.close() {
                error!("failed to roll back leaked transaction scope: {e}");
            }
        }
    }
}

/// The per-suite variant: one scope shared by every test in a class-like
/// group, opened once and ended once after all of them ran.
#[derive(Clone)]
pub struct SharedScope {
    inner: Arc<Mutex<TransactionScope>>,
}

impl SharedScope {
    pub fn begin(db: &Database, uid: i64) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(Mutex::new(TransactionScope::begin(db, uid)?)),
        })
    }

    /// Clone of the shared cursor; all holders see the same transaction
    pub fn cursor(&self) -> Cursor {
        self.inner.lock().cursor().clone()
    }

    pub fn uid(&self) -> i64 {
        self.inner.lock().uid()
    }

    /// End the shared scope. Safe to call from any holder; later calls no-op.
    pub fn end(&self) -> Result<()> {
        self.inner.lock().end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_common::SUPERUSER_ID;

    fn temp_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db")).unwrap();
        (db, dir)
    }

    #[test]
    fn test_scope_rolls_back_on_end() {
        let (db, _dir) = temp_db();
        db.setup("CREATE TABLE invoices (id INTEGER PRIMARY KEY, total REAL)")
            .unwrap();

        let mut scope = TransactionScope::begin(&db, SUPERUSER_ID).unwrap();
        scope
            .cursor()
            .execute("INSERT INTO invoices (total) VALUES (120.5)", [])
            .unwrap();
        scope.end().unwrap();

        let mut fresh = TransactionScope::begin(&db, SUPERUSER_ID).unwrap();
        let count: Option<i64> = fresh
            .cursor()
            .query_row("SELECT COUNT(*) FROM invoices", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, Some(0));
        fresh.end().unwrap();
    }

    #[test]
    fn test_end_is_idempotent() {
        let (db, _dir) = temp_db();
        let mut scope = TransactionScope::begin(&db, SUPERUSER_ID).unwrap();
        scope.end().unwrap();
        scope.end().unwrap();
        assert!(!scope.cursor().is_open());
    }

    #[test]
    fn test_drop_closes_leaked_scope() {
        let (db, _dir) = temp_db();
        let cursor = {
            let scope = TransactionScope::begin(&db, SUPERUSER_ID).unwrap();
            scope.cursor().clone()
        };
        assert!(!cursor.is_open());
    }

    #[test]
    fn test_shared_scope_single_transaction() {
        let (db, _dir) = temp_db();
        db.setup("CREATE TABLE timesheets (id INTEGER PRIMARY KEY, hours REAL)")
            .unwrap();

        let shared = SharedScope::begin(&db, SUPERUSER_ID).unwrap();
        let a = shared.clone();
        let b = shared.clone();

        a.cursor()
            .execute("INSERT INTO timesheets (hours) VALUES (7.5)", [])
            .unwrap();
        let count: Option<i64> = b
            .cursor()
            .query_row("SELECT COUNT(*) FROM timesheets", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, Some(1));

        a.end().unwrap();
        b.end().unwrap(); // second end no-ops
    }
}

//! Process-wide session routing for HTTP-style tests
//!
//! A browser subprocess talks to the suite's web server out of process. The
//! registry maps the opaque session token carried by those requests back to
//! the test's in-flight transaction, so UI actions and the test body see the
//! same uncommitted data.
//!
//! The registry is an explicitly injected instance owned by the test-run
//! coordinator, never a module-level global.

use folio_common::{Cursor, Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Lock-guarded token → cursor map, shared between test threads and the
/// request-handling path.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<String, Cursor>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate an opaque session token
    pub fn generate_token() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Register a token for the duration of one HTTP-style test.
    ///
    /// Tokens are caller-generated random values; an existing entry means the
    /// token was reused and fails with [`Error::SessionCollision`].
    pub fn register(&self, token: &str, cursor: Cursor) -> Result<()> {
        let mut map = self.inner.lock();
        if map.contains_key(token) {
            return Err(Error::SessionCollision(token.to_string()));
        }
        map.insert(token.to_string(), cursor);
        debug!(token, "session registered");
        Ok(())
    }

    /// Remove a token at teardown.
    ///
    /// Strict policy: each token is removed exactly once, and removing an
    /// unknown token fails with [`Error::SessionUnknown`] so lifecycle bugs
    /// surface instead of passing silently.
    pub fn unregister(&self, token: &str) -> Result<()> {
        match self.inner.lock().remove(token) {
            Some(_) => {
                debug!(token, "session unregistered");
                Ok(())
            }
            None => Err(Error::SessionUnknown(token.to_string())),
        }
    }

    /// Request-path lookup: route a token to its in-flight transaction
    pub fn attach(&self, token: &str) -> Result<Cursor> {
        self.inner
            .lock()
            .get(token)
            .cloned()
            .ok_or_else(|| Error::SessionUnknown(token.to_string()))
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

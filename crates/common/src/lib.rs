//! Folio Test Harness Common Library
//!
//! Shared infrastructure for the Folio test harness: error taxonomy, harness
//! configuration, and the SQLite-backed test database with rollback-scoped
//! cursors.

pub mod config;
pub mod db;
pub mod error;

pub use config::{BrowserConfig, HarnessConfig};
pub use db::{Cursor, Database};
pub use error::{Error, Result};

/// Harness version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Actor id of the suite superuser, used as the default execution identity.
pub const SUPERUSER_ID: i64 = 1;

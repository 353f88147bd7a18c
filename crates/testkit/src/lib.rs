//! Folio Test Kit
//!
//! The session/process orchestration layer that ties a rollback-scoped
//! database transaction to a disposable browser-driven UI test.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        TestCase (case)                       │
//! │   assembles independent capabilities instead of inheriting:  │
//! ├──────────────────────────────────────────────────────────────┤
//! │  TransactionScope (scope)                                    │
//! │    └── Cursor: one connection, one transaction, rolled back  │
//! │  RefResolver (resolver)                                      │
//! │    └── "module.name" -> row id / hydrated record             │
//! │  SessionRegistry (session)                                   │
//! │    └── token -> cursor, shared with the request path         │
//! │  BrowserDriver (browser)                                     │
//! │    └── subprocess + line protocol: `ok` / `error` / log      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A test begins a transaction scope, optionally registers a session token so
//! the browser's HTTP calls land in the same transaction, drives the browser
//! subprocess to a terminal `ok`/`error`/timeout, and tears everything down
//! with the transaction rolled back.

pub mod browser;
pub mod case;
pub mod resolver;
pub mod scope;
pub mod session;

pub use browser::{BrowserDriver, BrowserOptions, PollOutcome, RunStatus};
pub use case::TestCase;
pub use folio_common::{BrowserConfig, Cursor, Database, Error, HarnessConfig, Result, SUPERUSER_ID};
pub use resolver::{ModelRecord, RefResolver};
pub use scope::{SharedScope, TransactionScope};
pub use session::SessionRegistry;

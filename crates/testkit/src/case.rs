//! Test-case assembly
//!
//! Capabilities are composed rather than inherited: every case owns a
//! transaction scope, and an HTTP-style case additionally owns a session
//! registration and a browser driver. Which capabilities a case carries is
//! decided by its constructor, not by a class hierarchy.

use folio_common::{Cursor, Database, Error, HarnessConfig, Result};
use std::path::Path;
use tracing::error;

use crate::browser::{BrowserDriver, BrowserOptions, RunStatus};
use crate::resolver::{ModelRecord, RefResolver};
use crate::scope::TransactionScope;
use crate::session::SessionRegistry;

/// A single assembled test case
pub struct TestCase {
    config: HarnessConfig,
    scope: TransactionScope,
    http: Option<HttpCapability>,
    finished: bool,
}

/// Session registration + browser driver for HTTP-style cases
struct HttpCapability {
    registry: SessionRegistry,
    token: String,
    driver: BrowserDriver,
}

impl TestCase {
    /// A plain transactional case: scope only
    pub fn transactional(db: &Database, config: &HarnessConfig) -> Result<Self> {
        let scope = TransactionScope::begin(db, config.admin_uid)?;
        Ok(Self {
            config: config.clone(),
            scope,
            http: None,
            finished: false,
        })
    }

    /// An HTTP-style case: the scope's cursor is registered under a fresh
    /// session token so the browser's requests join the same transaction.
    pub fn http(db: &Database, config: &HarnessConfig, registry: &SessionRegistry) -> Result<Self> {
        let scope = TransactionScope::begin(db, config.admin_uid)?;
        let token = SessionRegistry::generate_token();
        registry.register(&token, scope.cursor().clone())?;
        Ok(Self {
            config: config.clone(),
            scope,
            http: Some(HttpCapability {
                registry: registry.clone(),
                token,
                driver: BrowserDriver::new(config.browser.clone()),
            }),
            finished: false,
        })
    }

    pub fn scope(&self) -> &TransactionScope {
        &self.scope
    }

    pub fn cursor(&self) -> &Cursor {
        self.scope.cursor()
    }

    /// Session token, when this is an HTTP-style case
    pub fn session_token(&self) -> Option<&str> {
        self.http.as_ref().map(|h| h.token.as_str())
    }

    /// Resolve `module.name` to its row id
    pub fn ref_(&self, xid: &str) -> Result<i64> {
        RefResolver::new(self.scope.cursor()).resolve(xid)
    }

    /// Resolve `module.name` to a hydrated record
    pub fn browse_ref(&self, xid: &str) -> Result<ModelRecord> {
        RefResolver::new(self.scope.cursor()).resolve_record(xid)
    }

    /// Drive a page test through the browser bridge
    pub fn run_page(&self, url_path: &str, code: &str) -> Result<RunStatus> {
        let http = self.http_capability()?;
        let options = BrowserOptions::page(&self.config, http.token.clone(), url_path, code);
        http.driver.run_page(&options)
    }

    /// Drive a script-file test through the browser bridge
    pub fn run_script(&self, jsfile: &Path) -> Result<RunStatus> {
        let http = self.http_capability()?;
        let options = BrowserOptions::script(&self.config, http.token.clone());
        http.driver.run_script(jsfile, &options)
    }

    fn http_capability(&self) -> Result<&HttpCapability> {
        self.http.as_ref().ok_or_else(|| {
            Error::InvalidConfig("browser tests require an HTTP-style test case".to_string())
        })
    }

    /// Tear the case down: unregister the session token, then end the scope
    /// (rollback). Both steps run even when one fails; the first failure is
    /// the one reported.
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        let mut first_err = None;

        if let Some(http) = self.http.take() {
            if let Err(e) = http.registry.unregister(&http.token) {
                first_err = Some(e);
            }
        }
        if let Err(e) = self.scope.end() {
            first_err.get_or_insert(e);
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for TestCase {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some(http) = self.http.take() {
            if let Err(e) = http.registry.unregister(&http.token) {
                error!("failed to unregister leaked test session: {e}");
            }
        }
        // The scope's own Drop rolls the transaction back.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::bind_reference;

    fn temp_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db")).unwrap();
        (db, dir)
    }

    #[test]
    fn test_transactional_case_resolves_refs() {
        let (db, _dir) = temp_db();
        db.setup("CREATE TABLE account_journal (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        let config = HarnessConfig::default();

        let case = TestCase::transactional(&db, &config).unwrap();
        case.cursor()
            .execute("INSERT INTO account_journal (id, name) VALUES (3, 'Sales')", [])
            .unwrap();
        bind_reference(case.cursor(), "account", "sales_journal", "account.journal", 3).unwrap();

        assert_eq!(case.ref_("account.sales_journal").unwrap(), 3);
        let record = case.browse_ref("account.sales_journal").unwrap();
        assert_eq!(record.fields["name"], "Sales");
        assert!(case.session_token().is_none());
        case.finish().unwrap();
    }

    #[test]
    fn test_http_case_session_lifecycle() {
        let (db, _dir) = temp_db();
        let config = HarnessConfig::default();
        let registry = SessionRegistry::new();

        let case = TestCase::http(&db, &config, &registry).unwrap();
        let token = case.session_token().unwrap().to_string();

        // The request path attaches to the same in-flight transaction
        let attached = registry.attach(&token).unwrap();
        assert!(attached.is_open());

        case.finish().unwrap();
        assert!(registry.is_empty());
        assert!(!attached.is_open());
    }

    #[test]
    fn test_dropped_case_unregisters_session() {
        let (db, _dir) = temp_db();
        let config = HarnessConfig::default();
        let registry = SessionRegistry::new();

        {
            let _case = TestCase::http(&db, &config, &registry).unwrap();
            assert_eq!(registry.len(), 1);
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_browser_run_needs_http_case() {
        let (db, _dir) = temp_db();
        let config = HarnessConfig::default();

        let case = TestCase::transactional(&db, &config).unwrap();
        let err = case.run_page("/web", "console.log('ok');").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        case.finish().unwrap();
    }
}

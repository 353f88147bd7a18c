//! Harness configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Path of the test database file
    pub db_path: PathBuf,

    /// Logical database name passed to browser subprocesses
    pub db_name: String,

    /// Host the suite's web server listens on
    pub host: String,

    /// Port the suite's web server listens on
    pub port: u16,

    /// Actor id used as the default execution identity
    pub admin_uid: i64,

    /// Login used by page tests to authenticate
    pub admin_login: String,

    /// Password used by page tests to authenticate
    pub admin_password: String,

    /// Browser driver configuration
    pub browser: BrowserConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("folio-test.db"),
            db_name: "folio_test".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8069,
            admin_uid: crate::SUPERUSER_ID,
            admin_login: "admin".to_string(),
            admin_password: "admin".to_string(),
            browser: BrowserConfig::default(),
        }
    }
}

/// Browser-driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Headless browser executable; resolved via PATH when not absolute
    pub binary_path: String,

    /// Bridge script handed to every invocation, alongside the test file
    pub support_script: Option<PathBuf>,

    /// Bounded wait per poll cycle, in milliseconds
    pub poll_interval_ms: u64,

    /// Wall-clock timeout for one invocation, in seconds
    pub default_timeout_secs: u64,

    /// Page-readiness marker the bridge script waits for
    pub ready_marker: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            binary_path: "phantomjs".to_string(),
            support_script: None,
            poll_interval_ms: 500,
            default_timeout_secs: 30,
            ready_marker: "window".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Base URL of the suite's web server
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

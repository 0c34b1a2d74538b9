//! Configuration types for sheaf components.
//!
//! Values are layered: [`SyncConfig::default`] → optional TOML file
//! ([`FileConfig`]) → environment variables and CLI flags (applied by the
//! binary).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;
use crate::retry::RetryConfig;

pub const DEFAULT_CATALOG_URL: &str = "https://data.cms.gov/provider-data/api/1";
pub const DEFAULT_THEME: &str = "Hospitals";
/// Upper bound for `max_retry_attempts`.
pub const MAX_RETRY_ATTEMPTS: u32 = 100;
pub const DEFAULT_USER_AGENT: &str = concat!("sheaf/", env!("CARGO_PKG_VERSION"));

/// Everything one sync run needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub catalog_url: String,
    pub theme: String,
    pub concurrency_limit: usize,
    pub retry: RetryConfig,
    /// Upper bound for one fetch attempt.
    pub request_timeout: Duration,
    pub state_file_path: PathBuf,
    pub output_directory: PathBuf,
    pub user_agent: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            theme: DEFAULT_THEME.to_string(),
            concurrency_limit: 8,
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(120),
            state_file_path: PathBuf::from("state").join("sheaf_state.json"),
            output_directory: PathBuf::from("output"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl SyncConfig {
    /// Overlays every value present in `file`.
    pub fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.catalog_url {
            self.catalog_url = v;
        }
        if let Some(v) = file.theme {
            self.theme = v;
        }
        if let Some(v) = file.concurrency_limit {
            self.concurrency_limit = v;
        }
        if let Some(v) = file.max_retry_attempts {
            self.retry.max_retries = v;
        }
        if let Some(v) = file.retry_base_delay_ms {
            self.retry.base_delay = Duration::from_millis(v);
        }
        if let Some(v) = file.retry_max_delay_secs {
            self.retry.max_delay = Duration::from_secs(v);
        }
        if let Some(v) = file.request_timeout_secs {
            self.request_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.state_file_path {
            self.state_file_path = v;
        }
        if let Some(v) = file.output_directory {
            self.output_directory = v;
        }
        if let Some(v) = file.user_agent {
            self.user_agent = v;
        }
    }

    /// Checks ranges that the type system does not.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.concurrency_limit == 0 {
            return Err(AppError::Config(
                "concurrency_limit must be at least 1".to_string(),
            ));
        }
        if self.retry.max_retries > MAX_RETRY_ATTEMPTS {
            return Err(AppError::Config(format!(
                "max_retry_attempts must be at most {MAX_RETRY_ATTEMPTS}"
            )));
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(AppError::Config(
                "retry_base_delay must not exceed retry_max_delay".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(AppError::Config(
                "request_timeout must be greater than zero".to_string(),
            ));
        }
        if self.theme.trim().is_empty() {
            return Err(AppError::Config("theme must not be empty".to_string()));
        }
        if self.state_file_path.as_os_str().is_empty() {
            return Err(AppError::Config(
                "state_file_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// On-disk configuration. Every key is optional.
///
/// ```toml
/// theme = "Hospitals"
/// concurrency_limit = 4
/// max_retry_attempts = 5
/// request_timeout_secs = 60
/// state_file_path = "/var/lib/sheaf/state.json"
/// output_directory = "/srv/data/hospitals"
/// ```
#[derive(Debug, Default, Clone, Deserialize, PartialEq)]
pub struct FileConfig {
    pub catalog_url: Option<String>,
    pub theme: Option<String>,
    pub concurrency_limit: Option<usize>,
    pub max_retry_attempts: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub retry_max_delay_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub state_file_path: Option<PathBuf>,
    pub output_directory: Option<PathBuf>,
    pub user_agent: Option<String>,
}

/// Default location of the config file: `<config dir>/sheaf/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sheaf").join("config.toml"))
}

/// Reads a TOML config file.
///
/// A missing file yields `Ok(None)` so callers can fall back to defaults.
pub fn load_config_file(path: &Path) -> Result<Option<FileConfig>, AppError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(AppError::Config(format!(
                "cannot read {}: {}",
                path.display(),
                e
            )))
        }
    };

    toml::from_str(&content)
        .map(Some)
        .map_err(|e| AppError::Config(format!("invalid {}: {}", path.display(), e)))
}

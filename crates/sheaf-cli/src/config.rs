use clap::{Args, Parser, Subcommand};
use sheaf_core::config::{default_config_path, load_config_file, SyncConfig};
use sheaf_core::error::AppError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "sheaf")]
#[command(
    author,
    version,
    about = "Incremental sync of CMS Provider Data Catalog datasets"
)]
#[command(after_help = "Examples:
  sheaf sync
  sheaf sync --theme \"Nursing homes\" --concurrency 4
  sheaf --config ~/sheaf.toml sync --output-dir /srv/data
  sheaf status")]
pub struct Config {
    /// Path to a TOML configuration file
    #[arg(long, global = true, env = "SHEAF_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download every dataset that changed since the last run
    #[command(after_help = "Examples:
  sheaf sync                                   # Defaults: Hospitals, 8 concurrent downloads
  sheaf sync --max-retries 5 --timeout 300     # Slow or flaky network
  sheaf sync --state-file /var/lib/sheaf/state.json")]
    Sync(SyncArgs),
    /// Show what the state file records
    Status {
        /// Path to the state file
        #[arg(long, env = "SHEAF_STATE_FILE", value_name = "PATH")]
        state_file: Option<PathBuf>,
    },
}

/// Overrides for a single sync run. Unset flags keep the file or default value.
#[derive(Args, Debug, Default, Clone, PartialEq)]
pub struct SyncArgs {
    /// Catalog theme to sync
    #[arg(long, env = "SHEAF_THEME")]
    pub theme: Option<String>,

    /// Maximum number of concurrent downloads
    #[arg(short, long, env = "SHEAF_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Retries per dataset after the first attempt
    #[arg(long, env = "SHEAF_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    /// Per-attempt timeout in seconds
    #[arg(long, env = "SHEAF_TIMEOUT", value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Path to the state file
    #[arg(long, env = "SHEAF_STATE_FILE", value_name = "PATH")]
    pub state_file: Option<PathBuf>,

    /// Directory receiving the normalized CSV files
    #[arg(short, long, env = "SHEAF_OUTPUT_DIR", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Base URL of the catalog API
    #[arg(long, env = "SHEAF_CATALOG_URL", value_name = "URL")]
    pub catalog_url: Option<String>,
}

impl SyncArgs {
    /// Overlays every flag that was given.
    pub fn apply_to(&self, config: &mut SyncConfig) {
        if let Some(v) = &self.theme {
            config.theme = v.clone();
        }
        if let Some(v) = self.concurrency {
            config.concurrency_limit = v;
        }
        if let Some(v) = self.max_retries {
            config.retry.max_retries = v;
        }
        if let Some(v) = self.timeout {
            config.request_timeout = Duration::from_secs(v);
        }
        if let Some(v) = &self.state_file {
            config.state_file_path = v.clone();
        }
        if let Some(v) = &self.output_dir {
            config.output_directory = v.clone();
        }
        if let Some(v) = &self.catalog_url {
            config.catalog_url = v.clone();
        }
    }
}

/// Defaults overlaid with the config file.
///
/// An explicit `path` must exist; the default location is optional.
pub fn load_base_config(path: Option<&Path>) -> Result<SyncConfig, AppError> {
    let mut config = SyncConfig::default();

    match path {
        Some(p) => {
            let file = load_config_file(p)?.ok_or_else(|| {
                AppError::Config(format!("config file {} not found", p.display()))
            })?;
            config.apply_file(file);
        }
        None => {
            if let Some(p) = default_config_path() {
                if let Some(file) = load_config_file(&p)? {
                    debug!("Loaded configuration from {}", p.display());
                    config.apply_file(file);
                }
            }
        }
    }

    Ok(config)
}

/// Full layering for `sheaf sync`: defaults, file, then flags and env.
pub fn resolve_sync_config(path: Option<&Path>, args: &SyncArgs) -> Result<SyncConfig, AppError> {
    let mut config = load_base_config(path)?;
    args.apply_to(&mut config);
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_sync_flags() {
        let config = Config::try_parse_from([
            "sheaf",
            "sync",
            "--theme",
            "Nursing homes",
            "-c",
            "4",
            "--timeout",
            "30",
        ])
        .unwrap();

        match config.command {
            Command::Sync(args) => {
                assert_eq!(args.theme.as_deref(), Some("Nursing homes"));
                assert_eq!(args.concurrency, Some(4));
                assert_eq!(args.timeout, Some(30));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let config =
            Config::try_parse_from(["sheaf", "status", "--verbose", "--config", "x.toml"]).unwrap();
        assert!(config.verbose);
        assert_eq!(config.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(config.command, Command::Status { .. }));
    }

    #[test]
    fn test_rejects_non_numeric_concurrency() {
        assert!(Config::try_parse_from(["sheaf", "sync", "--concurrency", "many"]).is_err());
    }

    #[test]
    fn test_flags_override_file() {
        let file = write_config("theme = \"Physicians\"\nconcurrency_limit = 2\nmax_retry_attempts = 7\n");
        let args = SyncArgs {
            concurrency: Some(6),
            output_dir: Some(PathBuf::from("/srv/out")),
            ..Default::default()
        };

        let config = resolve_sync_config(Some(file.path()), &args).unwrap();
        assert_eq!(config.theme, "Physicians");
        assert_eq!(config.concurrency_limit, 6);
        assert_eq!(config.retry.max_retries, 7);
        assert_eq!(config.output_directory, PathBuf::from("/srv/out"));
        assert_eq!(config.request_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_base_config(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_max_u32_retries_rejected() {
        let config =
            Config::try_parse_from(["sheaf", "sync", "--max-retries", "4294967295"]).unwrap();
        let Command::Sync(args) = config.command else {
            panic!("expected sync");
        };
        let file = write_config("");
        let err = resolve_sync_config(Some(file.path()), &args).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let file = write_config("");
        let args = SyncArgs {
            concurrency: Some(0),
            ..Default::default()
        };
        let err = resolve_sync_config(Some(file.path()), &args).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}

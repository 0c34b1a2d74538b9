use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Coarse classification of an [`AppError`].
///
/// Used by the scheduler to decide whether to retry, by the run report to
/// label failed datasets, and by the CLI to pick an exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Catalog listing failed; the run cannot start.
    Discovery,
    /// Network or timeout failure worth retrying.
    Transient,
    /// Download failure that will not go away on retry.
    Permanent,
    /// Payload could not be decoded or parsed.
    Parse,
    /// State file could not be written.
    StateIo,
    /// Invalid configuration.
    Config,
    /// Work was abandoned because the run was cancelled.
    Cancelled,
}

impl ErrorKind {
    /// Short lowercase label for summaries and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Discovery => "discovery",
            ErrorKind::Transient => "transient",
            ErrorKind::Permanent => "permanent",
            ErrorKind::Parse => "parse",
            ErrorKind::StateIo => "state-io",
            ErrorKind::Config => "config",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application-wide error types.
///
/// Every failure in sheaf is one of these variants. Per-dataset failures
/// (download, parse, output) are recorded in the run report and never abort a
/// run; [`AppError::Discovery`] and [`AppError::StateIo`] are fatal.
///
/// # Examples
///
/// ```
/// use sheaf_core::error::{AppError, ErrorKind};
///
/// let err = AppError::HttpStatus { status: 503, url: "https://x/y.csv".into() };
/// assert_eq!(err.kind(), ErrorKind::Transient);
/// assert!(err.is_retryable());
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Catalog listing failed or returned an unusable shape.
    #[error("Catalog discovery failed: {0}")]
    Discovery(String),

    /// Network or connection error.
    ///
    /// DNS failures, refused connections, resets and truncated bodies all land
    /// here.
    #[error("Network error: {0}")]
    Network(String),

    /// A single attempt exceeded the configured request timeout.
    #[error("Request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// Server answered successfully but not with something we can ingest.
    #[error("Unexpected content: {0}")]
    UnexpectedContent(String),

    /// Payload was malformed (encoding, header row, ragged records, catalog
    /// record shape).
    #[error("Parse error: {0}")]
    Parse(String),

    /// Writing an output artifact failed.
    #[error("Failed to write output {}: {source}", path.display())]
    Output {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Persisting the sync state failed.
    #[error("Failed to write state file {}: {source}", path.display())]
    StateIo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration value missing or out of range.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The run was cancelled before this work finished.
    #[error("Cancelled")]
    Cancelled,
}

impl AppError {
    /// Classifies this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Discovery(_) => ErrorKind::Discovery,
            AppError::Network(_) | AppError::Timeout(_) => ErrorKind::Transient,
            AppError::HttpStatus { status, .. } => {
                if *status == 429 || *status >= 500 {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Permanent
                }
            }
            AppError::UnexpectedContent(_) | AppError::Output { .. } => ErrorKind::Permanent,
            AppError::Parse(_) | AppError::Serialization(_) => ErrorKind::Parse,
            AppError::StateIo { .. } => ErrorKind::StateIo,
            AppError::Config(_) => ErrorKind::Config,
            AppError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Returns true if this error is transient and worth retrying.
    ///
    /// # Examples
    ///
    /// ```
    /// use sheaf_core::error::AppError;
    ///
    /// assert!(AppError::Network("connection reset".to_string()).is_retryable());
    /// assert!(!AppError::Parse("empty payload".to_string()).is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Discovery(msg) => format!(
                "Could not list the catalog: {}\n   Check the catalog URL and your internet connection.",
                msg
            ),
            AppError::StateIo { path, source } => format!(
                "Downloads finished but the sync state could not be saved to {}: {}\n   \
                 The next run will download these datasets again.",
                path.display(),
                source
            ),
            AppError::Timeout(d) => format!(
                "Request timed out after {} seconds.\n   The server may be overloaded. Try again later.",
                d.as_secs()
            ),
            AppError::Config(msg) => format!("Invalid configuration: {}", msg),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_404_is_permanent() {
        let e = AppError::HttpStatus {
            status: 404,
            url: "x".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Permanent);
        assert!(!e.is_retryable());
    }

    #[test]
    fn test_http_429_and_5xx_are_transient() {
        for status in [429, 500, 502, 503] {
            let e = AppError::HttpStatus {
                status,
                url: "x".into(),
            };
            assert!(e.is_retryable(), "status {status} should be retryable");
        }
    }

    #[test]
    fn test_timeout_is_transient() {
        let e = AppError::Timeout(Duration::from_secs(30));
        assert_eq!(e.kind(), ErrorKind::Transient);
        assert_eq!(e.to_string(), "Request timed out after 30s");
    }

    #[test]
    fn test_parse_and_output_not_retryable() {
        assert!(!AppError::Parse("bad".into()).is_retryable());
        let e = AppError::Output {
            path: PathBuf::from("out.csv"),
            source: std::io::Error::other("disk full"),
        };
        assert_eq!(e.kind(), ErrorKind::Permanent);
    }

    #[test]
    fn test_state_io_kind_and_message() {
        let e = AppError::StateIo {
            path: PathBuf::from("state.json"),
            source: std::io::Error::other("read-only filesystem"),
        };
        assert_eq!(e.kind(), ErrorKind::StateIo);
        assert!(e.user_message().contains("could not be saved"));
    }

    #[test]
    fn test_error_from_serde() {
        let result: Result<serde_json::Value, _> = serde_json::from_str("{ invalid json }");
        let app_err: AppError = result.unwrap_err().into();
        assert_eq!(app_err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(ErrorKind::Permanent.to_string(), "permanent");
        assert_eq!(ErrorKind::StateIo.as_str(), "state-io");
    }
}

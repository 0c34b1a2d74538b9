//! Shared reqwest plumbing: client construction and error classification.

use std::time::Duration;

use reqwest::{Client, Response};
use sheaf_core::error::AppError;

/// Builds the reqwest client used for both catalog and downloads.
pub(crate) fn build_client(user_agent: &str, timeout: Duration) -> Result<Client, AppError> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Config(format!("cannot build HTTP client: {e}")))
}

/// Maps a transport error into the sheaf taxonomy.
///
/// Timeouts and connection-level problems are transient; a body that cannot
/// be decoded or a request that cannot even be built is permanent.
pub(crate) fn classify_error(e: reqwest::Error, url: &str, timeout: Duration) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(timeout)
    } else if e.is_builder() {
        AppError::UnexpectedContent(format!("cannot request {url}: {e}"))
    } else if e.is_decode() {
        AppError::UnexpectedContent(format!("undecodable body from {url}: {e}"))
    } else if e.is_connect() {
        AppError::Network(format!("Connection failed for {url}: {e}"))
    } else {
        AppError::Network(format!("{url}: {e}"))
    }
}

/// Turns a non-success status into `AppError::HttpStatus`.
///
/// 429 and 5xx classify as transient, every other status as permanent (see
/// [`AppError::kind`]).
pub(crate) fn ensure_success(resp: Response, url: &str) -> Result<Response, AppError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(AppError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }
}

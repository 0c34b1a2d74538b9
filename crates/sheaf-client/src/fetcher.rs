use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use sheaf_core::error::AppError;
use sheaf_core::ports::Fetcher;
use tracing::debug;
use url::Url;

use crate::http;

/// Downloads dataset payloads over HTTP(S).
///
/// One attempt per call; retries belong to the scheduler.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            client: http::build_client(user_agent, timeout)?,
            timeout,
        })
    }
}

/// Rejects content types that are certainly not CSV.
///
/// Portals answer with an HTML error page or a JSON envelope when a resource
/// moved; those must not be parsed as data. A missing header is accepted.
pub fn check_content_type(content_type: Option<&str>, url: &str) -> Result<(), AppError> {
    let Some(raw) = content_type else {
        return Ok(());
    };
    let mime = raw
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if mime == "text/html" || mime == "application/json" || mime.starts_with("image/") {
        return Err(AppError::UnexpectedContent(format!(
            "{url} returned {mime} instead of CSV"
        )));
    }
    Ok(())
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AppError> {
        let parsed = Url::parse(url)
            .map_err(|e| AppError::UnexpectedContent(format!("invalid download URL {url}: {e}")))?;

        let resp = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| http::classify_error(e, url, self.timeout))?;
        let resp = http::ensure_success(resp, url)?;

        check_content_type(
            resp.headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            url,
        )?;

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| http::classify_error(e, url, self.timeout))?;
        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use sheaf_core::error::AppError;
use sheaf_core::models::CatalogRecord;
use sheaf_core::ports::CatalogSource;
use sheaf_core::retry::{self, RetryAction, RetryConfig};
use tracing::{debug, warn};
use url::Url;

use crate::http;

/// Metastore path listing every dataset, relative to the API base.
const DATASET_ITEMS_PATH: &str = "metastore/schemas/dataset/items";

const CSV_MEDIA_TYPE: &str = "text/csv";

/// Dataset entry of the CMS Provider Data Catalog (DCAT-US flavoured).
///
/// Only the fields sheaf needs are typed; everything else is captured in
/// `extras`.
///
/// # Examples
///
/// ```
/// use sheaf_client::catalog::CmsDataset;
///
/// let json = r#"{
///     "identifier": "xubh-q36u",
///     "title": "Hospital General Information",
///     "modified": "2023-07-05",
///     "theme": ["Hospitals"],
///     "distribution": [{"mediaType": "text/csv", "downloadURL": "https://x/h.csv"}],
///     "keyword": ["Hospitals"]
/// }"#;
///
/// let dataset: CmsDataset = serde_json::from_str(json).unwrap();
/// assert_eq!(dataset.identifier.as_deref(), Some("xubh-q36u"));
/// assert!(dataset.has_theme("hospitals"));
/// assert!(dataset.extras.contains_key("keyword"));
/// ```
#[derive(Deserialize, Debug, Clone, Default)]
pub struct CmsDataset {
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
    /// Usually strings; anything else is ignored when filtering.
    #[serde(default)]
    pub theme: Vec<Value>,
    #[serde(default)]
    pub distribution: Vec<CmsDistribution>,
    #[serde(flatten)]
    pub extras: serde_json::Map<String, Value>,
}

/// One downloadable representation of a dataset.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct CmsDistribution {
    #[serde(rename = "mediaType", default)]
    pub media_type: Option<String>,
    #[serde(rename = "downloadURL", default)]
    pub download_url: Option<String>,
    #[serde(rename = "accessURL", default)]
    pub access_url: Option<String>,
}

impl CmsDataset {
    /// Whether any string theme equals `theme`, ignoring case and
    /// surrounding whitespace.
    pub fn has_theme(&self, theme: &str) -> bool {
        let wanted = theme.trim().to_lowercase();
        self.theme
            .iter()
            .filter_map(Value::as_str)
            .any(|t| t.trim().to_lowercase() == wanted)
    }

    /// URLs of every CSV distribution (`downloadURL`, else `accessURL`), in
    /// catalog order.
    pub fn csv_urls(&self) -> Vec<&str> {
        self.distribution
            .iter()
            .filter(|d| {
                d.media_type
                    .as_deref()
                    .is_some_and(|m| m.trim().eq_ignore_ascii_case(CSV_MEDIA_TYPE))
            })
            .filter_map(|d| {
                d.download_url
                    .as_deref()
                    .or(d.access_url.as_deref())
                    .filter(|u| !u.trim().is_empty())
            })
            .collect()
    }

    /// Converts into the loosely-typed record the engine validates.
    pub fn into_record(self) -> CatalogRecord {
        let download_urls = self.csv_urls().into_iter().map(str::to_string).collect();
        CatalogRecord {
            id: self.identifier.or(self.id),
            title: self.title,
            modified: self.modified,
            download_urls,
        }
    }
}

/// HTTP client for the CMS Provider Data Catalog metastore.
///
/// # Examples
///
/// ```no_run
/// use sheaf_client::CmsCatalogClient;
/// use sheaf_core::{CatalogSource, RetryConfig};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = CmsCatalogClient::new(
///     "https://data.cms.gov/provider-data/api/1",
///     "sheaf/0.1",
///     Duration::from_secs(30),
///     RetryConfig::default(),
/// )?;
/// let records = client.list_datasets("Hospitals").await?;
/// println!("Found {} datasets", records.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CmsCatalogClient {
    client: Client,
    base_url: Url,
    timeout: Duration,
    retry: RetryConfig,
}

impl CmsCatalogClient {
    /// Creates a client for the catalog API rooted at `base_url_str`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(
        base_url_str: &str,
        user_agent: &str,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Result<Self, AppError> {
        // Url::join replaces the last segment unless the base ends with '/'
        let normalized = format!("{}/", base_url_str.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|_| AppError::Config(format!("Invalid catalog URL: {}", base_url_str)))?;

        Ok(Self {
            client: http::build_client(user_agent, timeout)?,
            base_url,
            timeout,
            retry,
        })
    }

    fn items_url(&self) -> Result<Url, AppError> {
        self.base_url
            .join(DATASET_ITEMS_PATH)
            .map_err(|e| AppError::Config(e.to_string()))
    }

    /// Fetches the full item list as untyped JSON, retrying transient errors.
    async fn fetch_items(&self) -> Result<Vec<Value>, AppError> {
        let url = self.items_url()?;
        let url_str = url.as_str();
        let client = &self.client;
        let timeout = self.timeout;

        let body: Value = retry::retry_with_backoff(
            &self.retry,
            |e: &AppError| {
                if e.is_retryable() {
                    RetryAction::Retry
                } else {
                    RetryAction::Abort
                }
            },
            move |_| async move {
                let resp = client
                    .get(url_str)
                    .header(reqwest::header::ACCEPT, "application/json")
                    .send()
                    .await
                    .map_err(|e| http::classify_error(e, url_str, timeout))?;
                let resp = http::ensure_success(resp, url_str)?;
                resp.json::<Value>()
                    .await
                    .map_err(|e| http::classify_error(e, url_str, timeout))
            },
        )
        .await
        .map_err(|e| AppError::Discovery(e.to_string()))?;

        match body {
            Value::Array(items) => Ok(items),
            other => Err(AppError::Discovery(format!(
                "expected a JSON array of datasets, got {}",
                json_type(&other)
            ))),
        }
    }
}

/// Keeps items tagged with `theme` and converts them into records.
///
/// Items that do not deserialize at all are skipped with a warning; items
/// without a CSV distribution are skipped with a debug log.
pub fn select_records(items: Vec<Value>, theme: &str) -> Vec<CatalogRecord> {
    let mut records = Vec::new();

    for item in items {
        let dataset: CmsDataset = match serde_json::from_value(item) {
            Ok(d) => d,
            Err(e) => {
                warn!("Skipping malformed catalog item: {}", e);
                continue;
            }
        };
        if !dataset.has_theme(theme) {
            continue;
        }
        if dataset.csv_urls().is_empty() {
            debug!(
                "Skipping {}: no CSV distribution",
                dataset
                    .identifier
                    .as_deref()
                    .or(dataset.id.as_deref())
                    .unwrap_or("<unknown>")
            );
            continue;
        }
        records.push(dataset.into_record());
    }

    records
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl CatalogSource for CmsCatalogClient {
    async fn list_datasets(&self, theme: &str) -> Result<Vec<CatalogRecord>, AppError> {
        let items = self.fetch_items().await?;
        let total = items.len();
        let records = select_records(items, theme);
        debug!(
            "{} of {} catalog items match theme \"{}\"",
            records.len(),
            total,
            theme
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(base: &str) -> CmsCatalogClient {
        CmsCatalogClient::new(
            base,
            "sheaf-test",
            Duration::from_secs(5),
            RetryConfig::none(),
        )
        .unwrap()
    }

    #[test]
    fn test_new_with_valid_url() {
        let c = client("https://data.cms.gov/provider-data/api/1");
        assert_eq!(
            c.base_url.as_str(),
            "https://data.cms.gov/provider-data/api/1/"
        );
        assert_eq!(
            c.items_url().unwrap().as_str(),
            "https://data.cms.gov/provider-data/api/1/metastore/schemas/dataset/items"
        );
    }

    #[test]
    fn test_new_with_invalid_url() {
        let result = CmsCatalogClient::new(
            "not-a-valid-url",
            "sheaf-test",
            Duration::from_secs(5),
            RetryConfig::none(),
        );
        match result {
            Err(AppError::Config(msg)) => assert!(msg.contains("Invalid catalog URL")),
            _ => panic!("Expected AppError::Config"),
        }
    }

    #[test]
    fn test_select_records_filters_theme_and_csv() {
        let items = vec![
            json!({
                "identifier": "xubh-q36u",
                "title": "Hospital General Information",
                "modified": "2023-07-05",
                "theme": [" hospitals "],
                "distribution": [
                    {"mediaType": "application/json", "downloadURL": "https://x/h.json"},
                    {"mediaType": "text/csv", "downloadURL": "https://x/h.csv"}
                ]
            }),
            json!({
                "identifier": "nursing",
                "modified": "2023-07-05",
                "theme": ["Nursing homes"],
                "distribution": [{"mediaType": "text/csv", "downloadURL": "https://x/n.csv"}]
            }),
            json!({
                "identifier": "no-csv",
                "modified": "2023-07-05",
                "theme": ["Hospitals"],
                "distribution": [{"mediaType": "application/zip", "downloadURL": "https://x/z.zip"}]
            }),
            json!({
                "id": "access-only",
                "theme": ["Hospitals", {"data": "Hospitals"}],
                "distribution": [{"mediaType": "TEXT/CSV", "accessURL": "https://x/a.csv"}]
            }),
            json!("not an object"),
        ];

        let records = select_records(items, "Hospitals");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id.as_deref(), Some("xubh-q36u"));
        assert_eq!(records[0].download_urls, vec!["https://x/h.csv"]);
        assert_eq!(records[1].id.as_deref(), Some("access-only"));
        assert_eq!(records[1].download_urls, vec!["https://x/a.csv"]);
        // missing modified is left for the engine to reject
        assert!(records[1].modified.is_none());
    }

    #[test]
    fn test_select_records_keeps_every_csv_distribution() {
        let items = vec![json!({
            "identifier": "77hc-ibv8",
            "modified": "2024-01-10",
            "theme": ["Hospitals"],
            "distribution": [
                {"mediaType": "text/csv", "downloadURL": "https://x/general.csv"},
                {"mediaType": "application/pdf", "downloadURL": "https://x/dictionary.pdf"},
                {"mediaType": "text/csv", "accessURL": "https://x/ratings.csv"}
            ]
        })];

        let records = select_records(items, "Hospitals");
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].download_urls,
            vec!["https://x/general.csv", "https://x/ratings.csv"]
        );
    }

    #[test]
    fn test_identifier_preferred_over_id() {
        let dataset: CmsDataset = serde_json::from_value(json!({
            "identifier": "primary",
            "id": "secondary",
            "distribution": [{"mediaType": "text/csv", "downloadURL": "https://x/p.csv"}]
        }))
        .unwrap();
        assert_eq!(dataset.into_record().id.as_deref(), Some("primary"));
    }

    #[test]
    fn test_json_type_names() {
        assert_eq!(json_type(&json!({})), "an object");
        assert_eq!(json_type(&json!(null)), "null");
    }

    #[tokio::test]
    async fn test_unreachable_catalog_is_discovery_error() {
        let c = client("http://127.0.0.1:1/api/1");
        let err = c.list_datasets("Hospitals").await.unwrap_err();
        assert_eq!(err.kind(), sheaf_core::ErrorKind::Discovery);
    }
}

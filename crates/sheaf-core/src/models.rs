//! Domain types shared by the engine, the store and the clients.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;

/// Schema version written by this build.
///
/// Changes are additive only: older and newer files both load, and fields
/// this build does not know about are carried through untouched.
pub const STATE_VERSION: u32 = 1;

/// Catalog entry as returned by a [`CatalogSource`](crate::ports::CatalogSource),
/// before validation.
///
/// Every field is optional because catalogs are loosely typed. Use
/// [`DatasetDescriptor::try_from`] to obtain something the engine can diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogRecord {
    pub id: Option<String>,
    pub title: Option<String>,
    pub modified: Option<String>,
    /// Every CSV distribution of the dataset, in catalog order.
    pub download_urls: Vec<String>,
}

/// A validated dataset from the catalog snapshot. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetDescriptor {
    pub id: String,
    pub title: String,
    pub modified: DateTime<Utc>,
    /// Never empty; blank and repeated URLs are dropped during validation.
    pub download_urls: Vec<String>,
}

impl TryFrom<CatalogRecord> for DatasetDescriptor {
    type Error = AppError;

    fn try_from(record: CatalogRecord) -> Result<Self, Self::Error> {
        let id = non_blank(record.id)
            .ok_or_else(|| AppError::Parse("catalog record has no identifier".to_string()))?;
        let modified_raw = non_blank(record.modified).ok_or_else(|| {
            AppError::Parse(format!("dataset {id} has no modified timestamp"))
        })?;
        let modified = parse_timestamp(&modified_raw).ok_or_else(|| {
            AppError::Parse(format!(
                "dataset {id} has unparsable modified timestamp {modified_raw:?}"
            ))
        })?;
        let mut download_urls: Vec<String> = Vec::new();
        for url in record.download_urls.into_iter().filter_map(|u| non_blank(Some(u))) {
            if !download_urls.contains(&url) {
                download_urls.push(url);
            }
        }
        if download_urls.is_empty() {
            return Err(AppError::Parse(format!("dataset {id} has no download URL")));
        }
        let title = non_blank(record.title).unwrap_or_else(|| format!("dataset_{id}"));

        Ok(Self {
            id,
            title,
            modified,
            download_urls,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parses a catalog timestamp into UTC.
///
/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS` (taken as UTC), or a bare
/// date (midnight UTC).
///
/// # Examples
///
/// ```
/// use sheaf_core::models::parse_timestamp;
///
/// let a = parse_timestamp("2023-01-01").unwrap();
/// let b = parse_timestamp("2023-01-01T00:00:00Z").unwrap();
/// assert_eq!(a, b);
/// assert!(parse_timestamp("last tuesday").is_none());
/// ```
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Per-dataset cursor: what was last synced and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCursorEntry {
    /// Catalog `modified` value of the last successfully written download.
    pub last_modified_synced: DateTime<Utc>,
    /// When the run that committed this entry recorded it.
    pub last_synced_at: DateTime<Utc>,
    /// Hex SHA-256 of the downloaded payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Fields written by other versions, preserved on round trip.
    #[serde(flatten)]
    pub extras: serde_json::Map<String, Value>,
}

impl SyncCursorEntry {
    pub fn new(last_modified_synced: DateTime<Utc>, last_synced_at: DateTime<Utc>) -> Self {
        Self {
            last_modified_synced,
            last_synced_at,
            content_hash: None,
            title: None,
            extras: serde_json::Map::new(),
        }
    }
}

/// The persisted cursor mapping, owned by a [`StateStore`](crate::ports::StateStore).
///
/// `datasets` is a `BTreeMap` so the serialized file has a stable key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    #[serde(default = "current_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub datasets: BTreeMap<String, SyncCursorEntry>,
    #[serde(flatten)]
    pub extras: serde_json::Map<String, Value>,
}

fn current_version() -> u32 {
    STATE_VERSION
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            last_run: None,
            datasets: BTreeMap::new(),
            extras: serde_json::Map::new(),
        }
    }
}

impl SyncState {
    /// Creates an empty state at the current schema version.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, dataset_id: &str) -> Option<&SyncCursorEntry> {
        self.datasets.get(dataset_id)
    }

    /// Records a successful sync, keeping any extra fields already stored for
    /// the dataset.
    pub fn record(&mut self, dataset_id: &str, mut entry: SyncCursorEntry) {
        if let Some(previous) = self.datasets.remove(dataset_id) {
            for (key, value) in previous.extras {
                entry.extras.entry(key).or_insert(value);
            }
        }
        self.datasets.insert(dataset_id.to_string(), entry);
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

/// A stale dataset queued for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub dataset_id: String,
    pub title: String,
    /// All of them must be written before the cursor advances.
    pub download_urls: Vec<String>,
    /// Catalog `modified` at diff time; becomes the cursor value on success.
    pub expected_modified: DateTime<Utc>,
}

impl From<&DatasetDescriptor> for DownloadTask {
    fn from(d: &DatasetDescriptor) -> Self {
        Self {
            dataset_id: d.id.clone(),
            title: d.title.clone(),
            download_urls: d.download_urls.clone(),
            expected_modified: d.modified,
        }
    }
}

/// What an output writer reports after an artifact is fully in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub bytes_written: u64,
    pub row_count: u64,
}

/// Successful task outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSuccess {
    pub bytes_written: u64,
    pub row_count: u64,
    pub content_hash: String,
}

/// Result of one [`DownloadTask`], produced by the scheduler.
#[derive(Debug)]
pub struct DownloadResult {
    pub dataset_id: String,
    pub expected_modified: DateTime<Utc>,
    pub outcome: Result<DownloadSuccess, AppError>,
}

impl DownloadResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, modified: &str, url: &str) -> CatalogRecord {
        CatalogRecord {
            id: Some(id.to_string()),
            title: Some("Hospital General Information".to_string()),
            modified: Some(modified.to_string()),
            download_urls: vec![url.to_string()],
        }
    }

    #[test]
    fn test_descriptor_from_valid_record() {
        let d = DatasetDescriptor::try_from(record(
            "xubh-q36u",
            "2023-01-01",
            "https://data.cms.gov/x.csv",
        ))
        .unwrap();
        assert_eq!(d.id, "xubh-q36u");
        assert_eq!(d.modified, parse_timestamp("2023-01-01T00:00:00Z").unwrap());
    }

    #[test]
    fn test_descriptor_rejects_missing_fields() {
        let mut r = record("a", "2023-01-01", "https://x/a.csv");
        r.id = Some("  ".to_string());
        assert!(matches!(
            DatasetDescriptor::try_from(r),
            Err(AppError::Parse(_))
        ));

        let mut r = record("a", "2023-01-01", "https://x/a.csv");
        r.download_urls = vec!["  ".to_string()];
        assert!(DatasetDescriptor::try_from(r).is_err());

        let r = record("a", "not a date", "https://x/a.csv");
        let err = DatasetDescriptor::try_from(r).unwrap_err();
        assert!(err.to_string().contains("unparsable"));
    }

    #[test]
    fn test_descriptor_keeps_every_distinct_url() {
        let mut r = record("a", "2023-01-01", "https://x/a.csv");
        r.download_urls = vec![
            "https://x/a.csv".to_string(),
            " ".to_string(),
            "https://x/b.csv".to_string(),
            "https://x/a.csv".to_string(),
        ];
        let d = DatasetDescriptor::try_from(r).unwrap();
        assert_eq!(d.download_urls, vec!["https://x/a.csv", "https://x/b.csv"]);
    }

    #[test]
    fn test_descriptor_title_fallback() {
        let mut r = record("abc", "2023-01-01", "https://x/a.csv");
        r.title = None;
        let d = DatasetDescriptor::try_from(r).unwrap();
        assert_eq!(d.title, "dataset_abc");
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = parse_timestamp("2024-03-05T10:20:30Z").unwrap();
        assert_eq!(parse_timestamp("2024-03-05T10:20:30").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-03-05 10:20:30").unwrap(), expected);
        assert_eq!(
            parse_timestamp("2024-03-05T12:20:30+02:00").unwrap(),
            expected
        );
    }

    #[test]
    fn test_state_tolerates_unknown_fields() {
        let json = r#"{
            "version": 7,
            "future_field": {"nested": true},
            "datasets": {
                "A": {
                    "last_modified_synced": "2023-01-01T00:00:00Z",
                    "last_synced_at": "2023-01-02T00:00:00Z",
                    "etag": "abc"
                }
            }
        }"#;
        let state: SyncState = serde_json::from_str(json).unwrap();
        assert_eq!(state.version, 7);
        assert!(state.extras.contains_key("future_field"));
        assert_eq!(state.get("A").unwrap().extras["etag"], "abc");

        let out = serde_json::to_value(&state).unwrap();
        assert_eq!(out["future_field"]["nested"], true);
        assert_eq!(out["datasets"]["A"]["etag"], "abc");
    }

    #[test]
    fn test_record_keeps_existing_extras() {
        let mut state = SyncState::new();
        let t0 = parse_timestamp("2023-01-01").unwrap();
        let mut first = SyncCursorEntry::new(t0, t0);
        first
            .extras
            .insert("etag".to_string(), Value::String("v1".to_string()));
        state.record("A", first);

        let t1 = parse_timestamp("2023-02-01").unwrap();
        state.record("A", SyncCursorEntry::new(t1, t1));

        let entry = state.get("A").unwrap();
        assert_eq!(entry.last_modified_synced, t1);
        assert_eq!(entry.extras["etag"], "v1");
        assert_eq!(state.len(), 1);
    }
}

//! Seams between the sync engine and the outside world.
//!
//! The engine only talks to these traits. `sheaf-client` and `sheaf-store`
//! provide the real implementations; tests use in-memory fakes.

use std::path::Path;

use async_trait::async_trait;
use csv::StringRecord;

use crate::error::AppError;
use crate::models::{CatalogRecord, DownloadTask, SyncState, WriteSummary};

/// Lists datasets from a remote catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Returns every catalog record matching `theme`.
    ///
    /// Errors from this call are fatal for the run.
    async fn list_datasets(&self, theme: &str) -> Result<Vec<CatalogRecord>, AppError>;
}

/// Downloads raw bytes from a URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches the full body at `url`.
    ///
    /// Implementations classify failures through [`AppError::kind`]: transport
    /// problems as transient, unusable responses as permanent.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AppError>;
}

/// Writes the final artifact for one downloaded distribution.
pub trait OutputWriter: Send + Sync {
    /// Writes `headers` followed by `rows`, fetched from `source_url` for
    /// `task`.
    ///
    /// Must only return `Ok` once the artifact is complete and in place.
    fn write(
        &self,
        task: &DownloadTask,
        source_url: &str,
        headers: &[String],
        rows: &[StringRecord],
    ) -> Result<WriteSummary, AppError>;
}

/// Loads and persists the sync cursor.
pub trait StateStore: Send + Sync {
    /// Returns the persisted state, or an empty one if nothing usable exists.
    fn load(&self) -> SyncState;

    /// Atomically replaces the persisted state.
    fn save(&self, state: &SyncState) -> Result<(), AppError>;

    /// Backing location, for diagnostics.
    fn path(&self) -> &Path;
}

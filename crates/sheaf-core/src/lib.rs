//! Sheaf Core - incremental sync engine, scheduler, domain types and configuration.

pub mod config;
pub mod engine;
pub mod error;
pub mod headers;
pub mod models;
pub mod ports;
pub mod retry;
pub mod scheduler;
pub mod sync;
pub mod table;

pub use config::{default_config_path, load_config_file, FileConfig, SyncConfig};
pub use engine::SyncEngine;
pub use error::{AppError, ErrorKind};
pub use models::{
    CatalogRecord, DatasetDescriptor, DownloadResult, DownloadSuccess, DownloadTask,
    SyncCursorEntry, SyncState, WriteSummary, STATE_VERSION,
};
pub use ports::{CatalogSource, Fetcher, OutputWriter, StateStore};
pub use retry::RetryConfig;
pub use scheduler::DownloadScheduler;
pub use sync::{
    assess_staleness, plan_sync, validate_catalog, FailedDataset, RunPhase, RunReport,
    StalenessDecision, SyncOutcome, SyncPlan, SyncStats,
};


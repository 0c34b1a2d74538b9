//! Sync orchestration: discover, diff, dispatch, commit.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{DownloadSuccess, DownloadTask, SyncCursorEntry, SyncState};
use crate::ports::{CatalogSource, Fetcher, OutputWriter, StateStore};
use crate::scheduler::DownloadScheduler;
use crate::sync::{self, FailedDataset, RunPhase, RunReport, SyncOutcome, SyncStats};
use crate::table::CsvPayload;

/// Drives one discover → diff → fetch → commit pass.
///
/// The engine never touches the state file directly: it loads a working copy
/// from the [`StateStore`] at the start of a run and saves it exactly once at
/// the end.
pub struct SyncEngine {
    catalog: Arc<dyn CatalogSource>,
    fetcher: Arc<dyn Fetcher>,
    writer: Arc<dyn OutputWriter>,
    store: Arc<dyn StateStore>,
    scheduler: DownloadScheduler,
    theme: String,
}

struct PhaseTracker {
    run_id: Uuid,
    phase: RunPhase,
}

impl PhaseTracker {
    fn advance(&mut self, next: RunPhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal run phase transition {:?} -> {:?}",
            self.phase,
            next
        );
        tracing::debug!(run_id = %self.run_id, "{} -> {}", self.phase.as_str(), next.as_str());
        self.phase = next;
    }

    fn abort(&mut self, err: AppError) -> AppError {
        error!(run_id = %self.run_id, "Run aborted while {}: {}", self.phase.as_str(), err);
        self.advance(RunPhase::Aborted);
        err
    }
}

impl SyncEngine {
    pub fn new(
        catalog: Arc<dyn CatalogSource>,
        fetcher: Arc<dyn Fetcher>,
        writer: Arc<dyn OutputWriter>,
        store: Arc<dyn StateStore>,
        scheduler: DownloadScheduler,
        theme: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            fetcher,
            writer,
            store,
            scheduler,
            theme: theme.into(),
        }
    }

    /// Runs a single sync pass.
    ///
    /// Individual dataset failures are reported in the returned [`RunReport`]
    /// and never fail the run.
    ///
    /// # Errors
    ///
    /// - `AppError::Discovery` if the catalog cannot be listed
    /// - `AppError::Cancelled` if `cancel` fires before any download starts
    /// - `AppError::StateIo` if the updated state cannot be saved
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunReport, AppError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut tracker = PhaseTracker {
            run_id,
            phase: RunPhase::Discovering,
        };

        let state = self.store.load();
        info!(
            run_id = %run_id,
            "Loaded sync state from {} ({} datasets)",
            self.store.path().display(),
            state.len()
        );

        info!("Fetching catalog for theme \"{}\"...", self.theme);
        let records = tokio::select! {
            r = self.catalog.list_datasets(&self.theme) => r,
            _ = cancel.cancelled() => Err(AppError::Cancelled),
        };
        let records = match records {
            Ok(r) => r,
            Err(e @ (AppError::Discovery(_) | AppError::Cancelled)) => return Err(tracker.abort(e)),
            Err(e) => return Err(tracker.abort(AppError::Discovery(e.to_string()))),
        };
        let validated = sync::validate_catalog(records);
        info!(
            "Found {} dataset(s), {} rejected",
            validated.descriptors.len(),
            validated.rejected.len()
        );

        tracker.advance(RunPhase::Diffing);
        let plan = sync::plan_sync(&validated.descriptors, &state);
        info!(
            "{} stale, {} unchanged",
            plan.tasks.len(),
            plan.unchanged
        );

        if cancel.is_cancelled() {
            return Err(tracker.abort(AppError::Cancelled));
        }

        tracker.advance(RunPhase::Dispatching);
        info!(
            "Downloading {} dataset(s), {} at a time",
            plan.tasks.len(),
            self.scheduler.concurrency_limit()
        );
        let working = Mutex::new(state);
        let results = self
            .scheduler
            .run(plan.tasks, cancel, |task| self.process(task.clone(), &working))
            .await;

        tracker.advance(RunPhase::Committing);
        let mut stats = SyncStats::new();
        stats.unchanged = plan.unchanged;
        let mut failures = validated.rejected;
        stats.failed += failures.len();
        let mut cancelled = cancel.is_cancelled();

        for result in &results {
            match &result.outcome {
                Ok(_) => {
                    let outcome = plan
                        .planned
                        .get(&result.dataset_id)
                        .copied()
                        .unwrap_or(SyncOutcome::Updated);
                    stats.record(outcome);
                }
                Err(e) => {
                    if matches!(e, AppError::Cancelled) {
                        cancelled = true;
                    }
                    stats.record(SyncOutcome::Failed);
                    failures.push(FailedDataset::new(&result.dataset_id, e));
                }
            }
        }

        let mut state = working.into_inner().unwrap_or_else(PoisonError::into_inner);
        state.last_run = Some(Utc::now());
        info!(
            "Sync finished: {} downloaded, {} unchanged, {} failed",
            stats.downloaded(),
            stats.unchanged,
            stats.failed
        );
        if let Err(e) = self.save(&state) {
            return Err(tracker.abort(e));
        }

        tracker.advance(RunPhase::Done);
        Ok(RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            stats,
            failures,
            cancelled,
        })
    }

    fn save(&self, state: &SyncState) -> Result<(), AppError> {
        self.store.save(state).map_err(|e| match e {
            AppError::StateIo { .. } => e,
            other => AppError::StateIo {
                path: self.store.path().to_path_buf(),
                source: std::io::Error::other(other.to_string()),
            },
        })
    }

    /// One download attempt: fetch, parse and write every distribution, then
    /// record the cursor.
    ///
    /// The cursor entry is recorded only after the writer reports every
    /// artifact complete, and with no await point in between, so a cancelled,
    /// crashed or partially failed attempt never advances the cursor.
    async fn process(
        &self,
        task: DownloadTask,
        working: &Mutex<SyncState>,
    ) -> Result<DownloadSuccess, AppError> {
        let mut hasher = Sha256::new();
        let mut bytes_written = 0;
        let mut row_count = 0;

        for url in &task.download_urls {
            let bytes = self.fetcher.fetch(url).await?;
            hasher.update(&bytes);

            let writer = Arc::clone(&self.writer);
            let owned_task = task.clone();
            let owned_url = url.clone();
            let summary = tokio::task::spawn_blocking(move || {
                let payload = CsvPayload::parse(&bytes)?;
                let headers = payload.normalized_headers();
                writer.write(&owned_task, &owned_url, &headers, &payload.rows)
            })
            .await
            .map_err(|e| AppError::Output {
                path: PathBuf::from(url),
                source: std::io::Error::other(e.to_string()),
            })??;

            if summary.row_count == 0 {
                warn!("{} ({}) has a header row but no data rows", task.dataset_id, url);
            }
            bytes_written += summary.bytes_written;
            row_count += summary.row_count;
        }

        let content_hash = format!("{:x}", hasher.finalize());
        let mut entry = SyncCursorEntry::new(task.expected_modified, Utc::now());
        entry.content_hash = Some(content_hash.clone());
        entry.title = Some(task.title.clone());
        working
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(&task.dataset_id, entry);

        Ok(DownloadSuccess {
            bytes_written,
            row_count,
            content_hash,
        })
    }
}

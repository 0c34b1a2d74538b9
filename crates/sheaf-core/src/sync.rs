//! Sync service layer: delta detection, run phases and run statistics.
//!
//! Everything here is pure. I/O and orchestration live in [`crate::engine`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, ErrorKind};
use crate::models::{CatalogRecord, DatasetDescriptor, DownloadTask, SyncCursorEntry, SyncState};

/// Outcome of processing a single dataset during sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Remote `modified` is not newer than the cursor - nothing to do
    Unchanged,
    /// Dataset was synced before and has changed since
    Updated,
    /// First time this dataset is synced
    Created,
    /// Processing failed for this dataset
    Failed,
}

/// Statistics for a sync run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub unchanged: usize,
    pub updated: usize,
    pub created: usize,
    pub failed: usize,
}

impl SyncStats {
    /// Creates a new empty stats tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an outcome, incrementing the appropriate counter.
    pub fn record(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Unchanged => self.unchanged += 1,
            SyncOutcome::Updated => self.updated += 1,
            SyncOutcome::Created => self.created += 1,
            SyncOutcome::Failed => self.failed += 1,
        }
    }

    /// Datasets whose output was written in this run.
    pub fn downloaded(&self) -> usize {
        self.updated + self.created
    }

    /// Returns the total number of processed datasets.
    pub fn total(&self) -> usize {
        self.unchanged + self.updated + self.created + self.failed
    }

    /// Returns the number of successfully processed datasets.
    pub fn successful(&self) -> usize {
        self.unchanged + self.updated + self.created
    }
}

/// Result of delta detection for a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalenessDecision {
    /// Whether the dataset must be downloaded
    pub stale: bool,
    /// The outcome this dataset will have if its download succeeds
    pub outcome: SyncOutcome,
    /// Human-readable reason for the decision
    pub reason: &'static str,
}

/// Determines if a dataset needs downloading by comparing timestamps.
///
/// A dataset is stale when no cursor entry exists, or when the remote
/// `modified` is strictly newer than `last_modified_synced`. Equal or older
/// remote timestamps are unchanged.
///
/// # Arguments
/// * `cursor` - The stored cursor for this dataset (None if never synced)
/// * `remote_modified` - The `modified` timestamp from the catalog
pub fn assess_staleness(
    cursor: Option<&SyncCursorEntry>,
    remote_modified: DateTime<Utc>,
) -> StalenessDecision {
    match cursor {
        Some(entry) if remote_modified > entry.last_modified_synced => StalenessDecision {
            stale: true,
            outcome: SyncOutcome::Updated,
            reason: "remote modified is newer",
        },
        Some(_) => StalenessDecision {
            stale: false,
            outcome: SyncOutcome::Unchanged,
            reason: "cursor is up to date",
        },
        None => StalenessDecision {
            stale: true,
            outcome: SyncOutcome::Created,
            reason: "new dataset",
        },
    }
}

/// A dataset that could not be processed, as shown in the run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDataset {
    pub dataset_id: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl FailedDataset {
    pub fn new(dataset_id: impl Into<String>, error: &AppError) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Catalog snapshot split into usable descriptors and rejected records.
#[derive(Debug, Default)]
pub struct ValidatedCatalog {
    pub descriptors: Vec<DatasetDescriptor>,
    pub rejected: Vec<FailedDataset>,
}

/// Validates raw catalog records at the discovery boundary.
///
/// Malformed records are rejected one by one instead of failing the run.
/// When an id appears more than once the newest `modified` wins, so the
/// result never holds duplicate ids.
pub fn validate_catalog(records: Vec<CatalogRecord>) -> ValidatedCatalog {
    let mut out = ValidatedCatalog::default();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let label = record
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| "<missing id>".to_string());

        let descriptor = match DatasetDescriptor::try_from(record) {
            Ok(d) => d,
            Err(e) => {
                warn!("Rejected catalog record {}: {}", label, e);
                out.rejected.push(FailedDataset::new(label, &e));
                continue;
            }
        };

        match index.get(&descriptor.id) {
            Some(&i) => {
                warn!(
                    "Dataset {} listed more than once; keeping the newest entry",
                    descriptor.id
                );
                if descriptor.modified > out.descriptors[i].modified {
                    out.descriptors[i] = descriptor;
                }
            }
            None => {
                index.insert(descriptor.id.clone(), out.descriptors.len());
                out.descriptors.push(descriptor);
            }
        }
    }

    out
}

/// Work derived from diffing a catalog snapshot against the cursor.
#[derive(Debug, Default)]
pub struct SyncPlan {
    /// Stale datasets to download.
    pub tasks: Vec<DownloadTask>,
    /// Expected outcome for each task, by dataset id.
    pub planned: HashMap<String, SyncOutcome>,
    /// Number of datasets skipped because their cursor is current.
    pub unchanged: usize,
}

/// Diffs validated descriptors against the stored cursor.
pub fn plan_sync(descriptors: &[DatasetDescriptor], state: &SyncState) -> SyncPlan {
    let mut plan = SyncPlan::default();

    for descriptor in descriptors {
        let decision = assess_staleness(state.get(&descriptor.id), descriptor.modified);
        if decision.stale {
            tracing::debug!("{} is stale: {}", descriptor.id, decision.reason);
            plan.planned
                .insert(descriptor.id.clone(), decision.outcome);
            plan.tasks.push(DownloadTask::from(descriptor));
        } else {
            plan.unchanged += 1;
        }
    }

    plan
}

/// Phases of one sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Discovering,
    Diffing,
    Dispatching,
    Committing,
    Done,
    Aborted,
}

impl RunPhase {
    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Phases advance strictly in order; `Aborted` is reachable from any phase
    /// that has not finished.
    pub fn can_transition_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        match next {
            Aborted => !matches!(self, Done | Aborted),
            _ => matches!(
                (self, next),
                (Discovering, Diffing)
                    | (Diffing, Dispatching)
                    | (Dispatching, Committing)
                    | (Committing, Done)
            ),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Discovering => "discovering",
            RunPhase::Diffing => "diffing",
            RunPhase::Dispatching => "dispatching",
            RunPhase::Committing => "committing",
            RunPhase::Done => "done",
            RunPhase::Aborted => "aborted",
        }
    }
}

/// Summary of a completed sync run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stats: SyncStats,
    /// Datasets that failed download, parsing or output, plus rejected
    /// catalog records.
    pub failures: Vec<FailedDataset>,
    /// True if the run was cancelled while dispatching.
    pub cancelled: bool,
}

impl RunReport {
    /// Returns true if every dataset was processed without error.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    /// Failure counts grouped by kind, in first-seen order.
    pub fn failures_by_kind(&self) -> Vec<(ErrorKind, usize)> {
        let mut counts: Vec<(ErrorKind, usize)> = Vec::new();
        for failure in &self.failures {
            match counts.iter_mut().find(|(k, _)| *k == failure.kind) {
                Some((_, n)) => *n += 1,
                None => counts.push((failure.kind, 1)),
            }
        }
        counts
    }
}

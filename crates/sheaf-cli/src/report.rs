//! Human-readable output and exit codes.

use std::fmt::Write as _;
use std::path::Path;

use sheaf_core::error::{AppError, ErrorKind};
use sheaf_core::models::SyncState;
use sheaf_core::sync::RunReport;

use crate::shutdown::EXIT_INTERRUPTED;

pub const EXIT_CONFIG: u8 = 1;
pub const EXIT_DISCOVERY: u8 = 2;
pub const EXIT_STATE_IO: u8 = 3;

/// Exit status for a run that aborted with `err`.
pub fn exit_code(err: &AppError) -> u8 {
    match err.kind() {
        ErrorKind::Discovery => EXIT_DISCOVERY,
        ErrorKind::StateIo => EXIT_STATE_IO,
        ErrorKind::Cancelled => EXIT_INTERRUPTED as u8,
        _ => EXIT_CONFIG,
    }
}

/// Exit status for a run that completed. Per-dataset failures do not count.
pub fn run_exit_code(report: &RunReport) -> u8 {
    if report.cancelled {
        EXIT_INTERRUPTED as u8
    } else {
        0
    }
}

pub fn render_summary(report: &RunReport) -> String {
    let stats = &report.stats;
    let elapsed = report.finished_at - report.started_at;
    let mut out = String::new();

    let _ = writeln!(out);
    let _ = writeln!(out, "Sync {}", if report.cancelled { "cancelled" } else { "complete" });
    let _ = writeln!(out, "  run:        {}", report.run_id);
    let _ = writeln!(out, "  datasets:   {}", stats.total());
    let _ = writeln!(out, "  succeeded:  {}", stats.successful());
    let _ = writeln!(out, "  created:    {}", stats.created);
    let _ = writeln!(out, "  updated:    {}", stats.updated);
    let _ = writeln!(out, "  unchanged:  {}", stats.unchanged);
    let _ = writeln!(out, "  failed:     {}", stats.failed);
    let _ = writeln!(
        out,
        "  elapsed:    {:.1}s",
        elapsed.num_milliseconds() as f64 / 1000.0
    );

    if !report.failures.is_empty() {
        let by_kind: Vec<String> = report
            .failures_by_kind()
            .into_iter()
            .map(|(kind, n)| format!("{n} {kind}"))
            .collect();
        let _ = writeln!(out);
        let _ = writeln!(out, "Failed datasets ({}):", by_kind.join(", "));
        for failure in &report.failures {
            let _ = writeln!(
                out,
                "  ✗ {} [{}] {}",
                failure.dataset_id, failure.kind, failure.message
            );
        }
    }

    out
}

pub fn render_status(state: &SyncState, path: &Path) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "State file: {}", path.display());
    let _ = writeln!(out, "Version:    {}", state.version);
    match state.last_run {
        Some(t) => {
            let _ = writeln!(out, "Last run:   {}", t.to_rfc3339());
        }
        None => {
            let _ = writeln!(out, "Last run:   never");
        }
    }

    if state.is_empty() {
        let _ = writeln!(out, "\nNo datasets synced yet. Run: sheaf sync");
        return out;
    }

    let _ = writeln!(out, "\n{} datasets:\n", state.len());
    for (id, entry) in &state.datasets {
        let _ = writeln!(
            out,
            "  {}  modified {}  synced {}{}",
            id,
            entry.last_modified_synced.to_rfc3339(),
            entry.last_synced_at.to_rfc3339(),
            entry
                .title
                .as_deref()
                .map(|t| format!("  {t}"))
                .unwrap_or_default()
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sheaf_core::models::SyncCursorEntry;
    use sheaf_core::sync::{FailedDataset, SyncStats};
    use std::path::PathBuf;
    use std::time::Duration;

    fn report(cancelled: bool, failures: Vec<FailedDataset>) -> RunReport {
        let started_at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        RunReport {
            run_id: uuid::Uuid::nil(),
            started_at,
            finished_at: started_at + chrono::Duration::milliseconds(2500),
            stats: SyncStats {
                unchanged: 3,
                updated: 1,
                created: 2,
                failed: failures.len(),
            },
            failures,
            cancelled,
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&AppError::Discovery("down".into())), 2);
        assert_eq!(
            exit_code(&AppError::StateIo {
                path: PathBuf::from("s.json"),
                source: std::io::Error::other("disk full"),
            }),
            3
        );
        assert_eq!(exit_code(&AppError::Config("bad".into())), 1);
        assert_eq!(exit_code(&AppError::Cancelled), 130);
    }

    #[test]
    fn test_run_exit_code_ignores_dataset_failures() {
        let failed = FailedDataset::new("B", &AppError::Timeout(Duration::from_secs(5)));
        assert_eq!(run_exit_code(&report(false, vec![failed])), 0);
        assert_eq!(run_exit_code(&report(true, vec![])), 130);
    }

    #[test]
    fn test_summary_lists_failures() {
        let failures = vec![
            FailedDataset::new("B", &AppError::Timeout(Duration::from_secs(5))),
            FailedDataset::new("C", &AppError::Parse("empty payload".into())),
        ];
        let text = render_summary(&report(false, failures));
        assert!(text.contains("Sync complete"));
        assert!(text.contains("created:    2"));
        assert!(text.contains("succeeded:  6"));
        assert!(text.contains("elapsed:    2.5s"));
        assert!(text.contains("✗ B [transient]"));
        assert!(text.contains("✗ C [parse]"));
    }

    #[test]
    fn test_status_output() {
        let t = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let mut state = SyncState::new();
        let mut entry = SyncCursorEntry::new(t, t);
        entry.title = Some("Hospital General Information".into());
        state.record("xubh-q36u", entry);

        let text = render_status(&state, Path::new("state.json"));
        assert!(text.contains("Last run:   never"));
        assert!(text.contains("1 datasets"));
        assert!(text.contains("xubh-q36u  modified 2023-01-01T00:00:00+00:00"));
        assert!(text.contains("Hospital General Information"));

        let empty = render_status(&SyncState::new(), Path::new("state.json"));
        assert!(empty.contains("No datasets synced yet"));
    }
}

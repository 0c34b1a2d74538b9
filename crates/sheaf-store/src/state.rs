//! JSON-file backed sync state.

use std::path::{Path, PathBuf};

use sheaf_core::error::AppError;
use sheaf_core::models::SyncState;
use sheaf_core::ports::StateStore;
use tracing::{debug, warn};

use crate::atomic;

/// Persists [`SyncState`] as pretty-printed JSON at a fixed path.
///
/// # Examples
///
/// ```no_run
/// use sheaf_core::StateStore;
/// use sheaf_store::JsonStateStore;
///
/// let store = JsonStateStore::new("state/sheaf_state.json");
/// let mut state = store.load();
/// state.last_run = None;
/// store.save(&state)?;
/// # Ok::<(), sheaf_core::AppError>(())
/// ```
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StateStore for JsonStateStore {
    /// Missing, unreadable or unparsable files all degrade to an empty state:
    /// the worst outcome is re-downloading everything once.
    fn load(&self) -> SyncState {
        let content = match std::fs::read(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {}, starting fresh", self.path.display());
                return SyncState::new();
            }
            Err(e) => {
                warn!(
                    "Cannot read state file {}: {}. Starting with empty state",
                    self.path.display(),
                    e
                );
                return SyncState::new();
            }
        };

        match serde_json::from_slice::<SyncState>(&content) {
            Ok(state) => {
                if state.version > sheaf_core::STATE_VERSION {
                    debug!(
                        "State file version {} is newer than {}; unknown fields are kept",
                        state.version,
                        sheaf_core::STATE_VERSION
                    );
                }
                state
            }
            Err(e) => {
                warn!(
                    "State file {} is not valid ({}). Starting with empty state",
                    self.path.display(),
                    e
                );
                SyncState::new()
            }
        }
    }

    fn save(&self, state: &SyncState) -> Result<(), AppError> {
        let json = serde_json::to_vec_pretty(state)?;
        atomic::replace_with(&self.path, |w| {
            use std::io::Write;
            w.write_all(&json)?;
            w.write_all(b"\n")
        })
        .map_err(|source| AppError::StateIo {
            path: self.path.clone(),
            source,
        })?;
        debug!(
            "Saved state with {} datasets to {}",
            state.len(),
            self.path.display()
        );
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sheaf_core::models::SyncCursorEntry;
    use std::fs;

    fn entry(day: u32) -> SyncCursorEntry {
        let t = Utc.with_ymd_and_hms(2023, 1, day, 0, 0, 0).unwrap();
        SyncCursorEntry::new(t, t)
    }

    #[test]
    fn test_missing_file_is_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path().join("state.json"));
        let state = store.load();
        assert!(state.is_empty());
        assert_eq!(state.version, sheaf_core::STATE_VERSION);
    }

    #[test]
    fn test_corrupt_file_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{\"version\": 1, \"datasets\": {tru").unwrap();
        assert!(JsonStateStore::new(&path).load().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path().join("state").join("state.json"));
        let mut state = SyncState::new();
        state.record("A", entry(1));
        state.record("B", entry(2));
        store.save(&state).unwrap();

        assert_eq!(store.load(), state);
    }

    #[test]
    fn test_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path().join("state.json"));
        let mut state = SyncState::new();
        state.record("B", entry(2));
        state.record("A", entry(1));
        store.save(&state).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(
            value["datasets"]["A"]["last_modified_synced"],
            "2023-01-01T00:00:00Z"
        );
        // sorted keys
        assert!(raw.find("\"A\"").unwrap() < raw.find("\"B\"").unwrap());
    }

    #[test]
    fn test_save_is_byte_stable() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path().join("state.json"));
        let mut state = SyncState::new();
        state.record("A", entry(1));

        store.save(&state).unwrap();
        let first = fs::read(store.path()).unwrap();
        store.save(&store.load()).unwrap();
        assert_eq!(fs::read(store.path()).unwrap(), first);
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(
            &path,
            r#"{"version": 2, "owner": "etl", "datasets": {"A": {
                "last_modified_synced": "2023-01-01T00:00:00Z",
                "last_synced_at": "2023-01-01T00:00:00Z",
                "row_count": 10}}}"#,
        )
        .unwrap();

        let store = JsonStateStore::new(&path);
        let state = store.load();
        assert_eq!(state.len(), 1);
        store.save(&state).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["owner"], "etl");
        assert_eq!(value["version"], 2);
        assert_eq!(value["datasets"]["A"]["row_count"], 10);
    }

    #[test]
    fn test_failed_save_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = JsonStateStore::new(&path);
        let mut state = SyncState::new();
        state.record("A", entry(1));
        store.save(&state).unwrap();

        // A directory where the file's parent should be makes the write fail.
        let blocked = JsonStateStore::new(path.join("nested.json"));
        let err = blocked.save(&state).unwrap_err();
        assert!(matches!(err, AppError::StateIo { .. }));
        assert_eq!(store.load(), state);
    }
}

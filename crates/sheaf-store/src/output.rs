//! CSV artifacts with normalized headers.

use std::path::{Path, PathBuf};

use csv::StringRecord;
use sheaf_core::error::AppError;
use sheaf_core::headers;
use sheaf_core::models::{DownloadTask, WriteSummary};
use sheaf_core::ports::OutputWriter;
use tracing::debug;

use crate::atomic;

/// Writes one `<stem>__snake.csv` per downloaded distribution into a directory.
///
/// Files are replaced atomically, so a reader never sees a half-written CSV
/// and a crash mid-write leaves the previous version in place.
#[derive(Debug, Clone)]
pub struct CsvDirectoryWriter {
    directory: PathBuf,
}

impl CsvDirectoryWriter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Destination file for the distribution of `task` at `source_url`.
    pub fn output_path(&self, task: &DownloadTask, source_url: &str) -> PathBuf {
        let stem = url_stem(source_url).unwrap_or_else(|| headers::normalize(&task.dataset_id));
        self.directory.join(format!("{stem}__snake.csv"))
    }
}

/// Last path segment of `url` without its extension, restricted to
/// filename-safe characters.
fn url_stem(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let stem = Path::new(last).file_stem()?.to_string_lossy().into_owned();
    let safe: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let safe = safe.trim_matches(|c| c == '_' || c == '.').to_string();
    (!safe.is_empty()).then_some(safe)
}

impl OutputWriter for CsvDirectoryWriter {
    fn write(
        &self,
        task: &DownloadTask,
        source_url: &str,
        headers: &[String],
        rows: &[StringRecord],
    ) -> Result<WriteSummary, AppError> {
        let path = self.output_path(task, source_url);

        let bytes_written = atomic::replace_with(&path, |file| {
            let mut writer = csv::Writer::from_writer(file);
            writer.write_record(headers)?;
            for row in rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
            Ok(())
        })
        .map_err(|source| AppError::Output {
            path: path.clone(),
            source,
        })?;

        debug!(
            "{} → {} ({} bytes)",
            task.dataset_id,
            path.display(),
            bytes_written
        );
        Ok(WriteSummary {
            bytes_written,
            row_count: rows.len() as u64,
        })
    }
}

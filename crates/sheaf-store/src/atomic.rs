//! Write-to-temp-then-rename file replacement.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temp file next to `dest`, unique per process and call so concurrent
/// writers in the same directory never share one.
pub(crate) fn temp_path_for(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    dest.with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), n))
}

/// Replaces `dest` with whatever `fill` writes, atomically.
///
/// `fill` writes into a temp file in the same directory; the file is flushed
/// and fsynced, then renamed over `dest`. The rename is the only step that
/// makes new content visible, so a failure at any earlier point leaves the
/// previous `dest` intact. The temp file is removed on failure.
///
/// Returns the size of the new file.
pub(crate) fn replace_with<F>(dest: &Path, fill: F) -> io::Result<u64>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_path_for(dest);
    let result = write_and_rename(&tmp, dest, fill);
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_and_rename<F>(tmp: &Path, dest: &Path, fill: F) -> io::Result<u64>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let mut writer = BufWriter::new(File::create(tmp)?);
    fill(&mut writer)?;
    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    let len = file.metadata()?.len();
    drop(file);

    fs::rename(tmp, dest)?;
    sync_parent_dir(dest);
    Ok(len)
}

/// Best effort: persist the rename itself.
#[cfg(unix)]
fn sync_parent_dir(dest: &Path) {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_dest: &Path) {}

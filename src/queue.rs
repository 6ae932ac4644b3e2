//! The pending-record store.
//!
//! A deferred variation is a JSON file at `<derived-name>.queue`, in the
//! same directory as the would-be derived file:
//!
//! ```json
//! {
//!   "original": "/files/1001/photo.jpg",
//!   "width": 260,
//!   "height": 180,
//!   "options": { "quality": 90, "cropping": true, ... }
//! }
//! ```
//!
//! Invariant: a record exists if and only if a deferred request for that
//! exact derived filename has not been materialized yet. The gate creates
//! records, the materializer consumes them (read then delete), and
//! [`cleanup_records`] removes orphans when a source image's variations are
//! bulk-deleted.
//!
//! Records that are never requested linger — that's fine, they cost a few
//! hundred bytes each and die with the source.

use crate::options::SizeOptions;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Extension of pending-record files.
pub const QUEUE_EXT: &str = "queue";

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("record decode error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The deferred request, exactly as the gate received it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRecord {
    /// URL of the source image under the files prefix.
    pub original: String,
    pub width: u32,
    pub height: u32,
    pub options: SizeOptions,
}

/// Record path for a derived file (`photo.260x180.jpg` → `photo.260x180.jpg.queue`).
pub fn record_path(variation_path: &Path) -> PathBuf {
    let mut os: OsString = variation_path.as_os_str().to_os_string();
    os.push(".");
    os.push(QUEUE_EXT);
    PathBuf::from(os)
}

pub fn is_record_path(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(QUEUE_EXT)
}

/// Persist a record next to the would-be derived file. The write must
/// succeed for the deferral to stand; failures propagate and leave nothing
/// behind (the request is either durably recorded or not deferred at all).
pub fn write_record(variation_path: &Path, record: &QueueRecord) -> Result<PathBuf, QueueError> {
    let path = record_path(variation_path);
    let json = serde_json::to_string(record)?;
    std::fs::write(&path, json)?;
    Ok(path)
}

pub fn read_record(record_path: &Path) -> Result<QueueRecord, QueueError> {
    let content = std::fs::read_to_string(record_path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Delete a record. `Ok(false)` when it was already gone — a concurrent
/// materialization may have beaten us to it, which is tolerated.
pub fn remove_record(record_path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(record_path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Outcome of a bulk cleanup run. Individual delete failures are collected
/// rather than aborting the caller's delete operation.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, io::Error)>,
}

impl fmt::Display for CleanupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failed.is_empty() {
            write!(f, "{} removed", self.removed.len())
        } else {
            write!(
                f,
                "{} removed, {} failed",
                self.removed.len(),
                self.failed.len()
            )
        }
    }
}

/// Remove every pending record belonging to a source image, called when the
/// source's variations are deleted in bulk.
///
/// Scoping is by filename prefix: records for `foo.jpg` all start with
/// `foo.` (variation names are `<stem>.<WxH...>.<ext>`), so `foobar.jpg`'s
/// records are untouched.
pub fn cleanup_records(source_path: &Path) -> io::Result<CleanupReport> {
    let dir = source_path.parent().unwrap_or(Path::new("."));
    let stem = source_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let prefix = format!("{stem}.");

    let mut report = CleanupReport::default();
    for entry in WalkDir::new(dir).max_depth(1).into_iter().flatten() {
        let path = entry.path();
        if !entry.file_type().is_file() || !is_record_path(path) {
            continue;
        }
        let name = entry.file_name().to_str().unwrap_or_default();
        if !name.starts_with(&prefix) {
            continue;
        }
        match std::fs::remove_file(path) {
            Ok(()) => report.removed.push(path.to_path_buf()),
            Err(e) => report.failed.push((path.to_path_buf(), e)),
        }
    }
    Ok(report)
}

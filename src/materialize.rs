//! On-demand materialization of deferred variations.
//!
//! This is the consumer side of the queue: given the URL of a derived file
//! that is missing on disk, look for its pending record, and if one exists
//! run the real resize and hand back the bytes. The caller (the HTTP
//! server's not-found path) serves them directly; the next request finds
//! the file on disk and never reaches this module.
//!
//! The record is deleted *before* rendering. A crash mid-render therefore
//! loses the deferral rather than wedging it, and the client sees a plain
//! 404 it can recover from by re-requesting through the gate.

use crate::imaging::ImageBackend;
use crate::options::SizeOptions;
use crate::queue::{self, QueueError};
use crate::sizer::{SizeError, Sizer};
use crate::source::SourceImage;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum MaterializeError {
    #[error("queue record error: {0}")]
    Record(QueueError),
    #[error("resize error: {0}")]
    Resize(#[from] SizeError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A freshly generated (or already present) variation, ready to serve.
#[derive(Debug)]
pub struct MaterializedImage {
    pub path: PathBuf,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

/// Attempt to materialize the variation a URL refers to.
///
/// `Ok(None)` means "nothing pending here" — no record exists, or the
/// record's original has since been deleted. The caller turns that into a
/// 404. `Ok(Some(_))` carries the rendered bytes.
pub fn materialize<B: ImageBackend>(
    sizer: &Sizer<B>,
    url_path: &str,
) -> Result<Option<MaterializedImage>, MaterializeError> {
    let Some(variation_path) = sizer.config().url_to_path(url_path) else {
        return Ok(None);
    };
    let record_path = queue::record_path(&variation_path);
    if !record_path.is_file() {
        return Ok(None);
    }

    let record = match queue::read_record(&record_path) {
        Ok(record) => record,
        Err(QueueError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
            // Lost the race to a concurrent materialization; serve its result
            return read_if_present(&variation_path);
        }
        Err(e) => return Err(MaterializeError::Record(e)),
    };
    queue::remove_record(&record_path)?;

    let Some(source) = SourceImage::resolve(sizer.config(), &record.original) else {
        warn!(
            original = %record.original,
            "pending record points at a deleted original, dropping it"
        );
        return Ok(None);
    };

    debug!(url = %url_path, original = %record.original, "materializing deferred variation");
    let mut options: SizeOptions = record.options;
    options.no_delay = true;
    let variation = sizer.size(&source, record.width, record.height, &options)?;

    let bytes = std::fs::read(&variation.path)?;
    Ok(Some(MaterializedImage {
        mime: mime_for_path(&variation.path),
        path: variation.path,
        bytes,
    }))
}

fn read_if_present(path: &Path) -> Result<Option<MaterializedImage>, MaterializeError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(MaterializedImage {
            mime: mime_for_path(path),
            path: path.to_path_buf(),
            bytes,
        })),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Content type by extension, for the handful of formats the server deals in.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

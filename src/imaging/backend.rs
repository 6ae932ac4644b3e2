//! Image processing backend trait and shared types.
//!
//! [`VariationParams`] is the full render spec for one variation — the
//! namer's resolved crop plus the geometry and encoder knobs. A backend
//! must render it deterministically: the deferral design tolerates two
//! concurrent materializations of the same record precisely because both
//! renders converge on identical output.

use crate::options::{Flip, ResolvedCrop};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Full specification for rendering one variation.
#[derive(Debug, Clone, PartialEq)]
pub struct VariationParams {
    pub source: PathBuf,
    pub output: PathBuf,
    /// Target width; 0 means "derive from height, keep aspect".
    pub width: u32,
    /// Target height; 0 means "derive from width, keep aspect".
    pub height: u32,
    pub crop: ResolvedCrop,
    /// When false, never scale beyond the source dimensions.
    pub upscaling: bool,
    /// Normalized rotation: 0 or ±90/±180/±270.
    pub rotate: i32,
    pub flip: Flip,
    /// Encoder quality 1-100 (lossy formats only).
    pub quality: u32,
}

/// Trait for image processing backends.
///
/// `Send + Sync` because the server shares one backend across request tasks.
pub trait ImageBackend: Send + Sync {
    /// Get image dimensions without decoding pixels.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Render a variation to `params.output`.
    fn render(&self, params: &VariationParams) -> Result<(), BackendError>;
}

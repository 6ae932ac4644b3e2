//! Source images and derived variations.
//!
//! A [`SourceImage`] is an original asset on disk, identified by both its
//! filesystem path and its URL under the configured files namespace. Its
//! derived variations live alongside it in the same directory.
//!
//! A [`DerivedVariation`] is the value a resize call returns. It may be
//! *materialized* (bytes exist on disk) or a *pending placeholder* (the
//! deferral gate wrote a queue record instead of pixels). Accessors consult
//! the materialized flag so callers holding a placeholder cannot mistake it
//! for a real file.
//!
//! ## Focus sidecar
//!
//! An optional focus point lives in a JSON sidecar next to the image
//! (`photo.jpg` → `photo.jpg.focus`):
//!
//! ```json
//! { "left": 62.5, "top": 30.0, "zoom": 0 }
//! ```
//!
//! `left`/`top` are percentages of the frame; `zoom` magnifies the crop
//! around that point. The namer uses the focus point for single anchor-free
//! two-dimensional crops when the `focus` option allows it.

use crate::config::ServerConfig;
use crate::options::SizeOptions;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Extension of focus sidecar files.
pub const FOCUS_EXT: &str = "focus";

/// Focus point for focus-based cropping, percentages of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocusPoint {
    pub left: f32,
    pub top: f32,
    #[serde(default)]
    pub zoom: u32,
}

/// An original image asset under the served root.
#[derive(Debug, Clone)]
pub struct SourceImage {
    /// Filesystem path of the original file.
    pub path: PathBuf,
    /// URL under the configured files prefix.
    pub url: String,
    /// Focus point from the sidecar, if one exists.
    pub focus: Option<FocusPoint>,
}

impl SourceImage {
    /// Resolve a source image from its URL. `None` when the URL is outside
    /// the files namespace or the file does not exist.
    pub fn resolve(config: &ServerConfig, url_path: &str) -> Option<SourceImage> {
        let path = config.url_to_path(url_path)?;
        if !path.is_file() {
            return None;
        }
        let focus = load_focus(&path);
        Some(SourceImage {
            path,
            url: url_path.to_string(),
            focus,
        })
    }

    /// Resolve a source image from a filesystem path under the root.
    pub fn from_path(config: &ServerConfig, path: &Path) -> Option<SourceImage> {
        if !path.is_file() {
            return None;
        }
        let url = config.path_to_url(path)?;
        let focus = load_focus(path);
        Some(SourceImage {
            path: path.to_path_buf(),
            url,
            focus,
        })
    }

    /// Filename including extension.
    pub fn basename(&self) -> &str {
        self.path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }

    /// Filename without the extension.
    pub fn stem(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }

    /// Lowercased extension, empty when there is none.
    pub fn ext(&self) -> String {
        self.path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// Directory the variations (and queue records) live in.
    pub fn variation_dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new(""))
    }
}

/// Sidecar path for an image's focus point (`photo.jpg` → `photo.jpg.focus`).
pub fn focus_sidecar_path(image_path: &Path) -> PathBuf {
    let mut os: OsString = image_path.as_os_str().to_os_string();
    os.push(".");
    os.push(FOCUS_EXT);
    PathBuf::from(os)
}

/// Read the focus sidecar. Missing or malformed sidecars mean "no focus" —
/// a bad sidecar must not break resizing.
fn load_focus(image_path: &Path) -> Option<FocusPoint> {
    let content = std::fs::read_to_string(focus_sidecar_path(image_path)).ok()?;
    serde_json::from_str(&content).ok()
}

/// A derived variation of a source image — either a real file or a pending
/// placeholder whose generation has been deferred.
#[derive(Debug, Clone)]
pub struct DerivedVariation {
    /// The original the variation derives from.
    pub source_path: PathBuf,
    /// Where the variation lives (or will live) on disk.
    pub path: PathBuf,
    /// URL of the variation under the files prefix.
    pub url: String,
    /// Requested width (0 = derived from height).
    pub width: u32,
    /// Requested height (0 = derived from width).
    pub height: u32,
    /// The options the variation was (or will be) generated with.
    pub options: SizeOptions,
    materialized: bool,
}

impl DerivedVariation {
    /// A placeholder for a deferred variation — no bytes on disk yet.
    pub fn pending(
        source_path: PathBuf,
        path: PathBuf,
        url: String,
        width: u32,
        height: u32,
        options: SizeOptions,
    ) -> Self {
        Self {
            source_path,
            path,
            url,
            width,
            height,
            options,
            materialized: false,
        }
    }

    /// A variation whose file exists on disk.
    pub fn materialized(
        source_path: PathBuf,
        path: PathBuf,
        url: String,
        width: u32,
        height: u32,
        options: SizeOptions,
    ) -> Self {
        Self {
            source_path,
            path,
            url,
            width,
            height,
            options,
            materialized: true,
        }
    }

    pub fn is_materialized(&self) -> bool {
        self.materialized
    }

    /// Variation filename.
    pub fn basename(&self) -> &str {
        self.path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }

    /// Byte size of the variation file. `None` for placeholders — the size
    /// is unknowable until the variation is materialized.
    pub fn filesize(&self) -> Option<u64> {
        if !self.materialized {
            return None;
        }
        std::fs::metadata(&self.path).map(|m| m.len()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_rooted(tmp: &TempDir) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.root = tmp.path().to_path_buf();
        config
    }

    #[test]
    fn resolve_existing_source() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("1001")).unwrap();
        fs::write(tmp.path().join("1001/photo.jpg"), "jpeg").unwrap();
        let config = config_rooted(&tmp);

        let source = SourceImage::resolve(&config, "/files/1001/photo.jpg").unwrap();
        assert_eq!(source.basename(), "photo.jpg");
        assert_eq!(source.stem(), "photo");
        assert_eq!(source.ext(), "jpg");
        assert_eq!(source.url, "/files/1001/photo.jpg");
        assert!(source.focus.is_none());
    }

    #[test]
    fn resolve_missing_source_is_none() {
        let tmp = TempDir::new().unwrap();
        let config = config_rooted(&tmp);
        assert!(SourceImage::resolve(&config, "/files/absent.jpg").is_none());
    }

    #[test]
    fn resolve_reads_focus_sidecar() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("photo.jpg"), "jpeg").unwrap();
        fs::write(
            tmp.path().join("photo.jpg.focus"),
            r#"{"left": 62.5, "top": 30.0}"#,
        )
        .unwrap();
        let config = config_rooted(&tmp);

        let source = SourceImage::resolve(&config, "/files/photo.jpg").unwrap();
        let focus = source.focus.unwrap();
        assert_eq!(focus.left, 62.5);
        assert_eq!(focus.top, 30.0);
        assert_eq!(focus.zoom, 0);
    }

    #[test]
    fn malformed_focus_sidecar_is_ignored() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("photo.jpg"), "jpeg").unwrap();
        fs::write(tmp.path().join("photo.jpg.focus"), "not json").unwrap();
        let config = config_rooted(&tmp);

        let source = SourceImage::resolve(&config, "/files/photo.jpg").unwrap();
        assert!(source.focus.is_none());
    }

    #[test]
    fn from_path_derives_url() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("photo.jpg"), "jpeg").unwrap();
        let config = config_rooted(&tmp);

        let source = SourceImage::from_path(&config, &tmp.path().join("photo.jpg")).unwrap();
        assert_eq!(source.url, "/files/photo.jpg");
    }

    #[test]
    fn placeholder_reports_unmaterialized() {
        let v = DerivedVariation::pending(
            "/a/photo.jpg".into(),
            "/a/photo.100x100.jpg".into(),
            "/files/a/photo.100x100.jpg".into(),
            100,
            100,
            SizeOptions::default(),
        );
        assert!(!v.is_materialized());
        assert_eq!(v.filesize(), None);
        assert_eq!(v.basename(), "photo.100x100.jpg");
    }

    #[test]
    fn materialized_reports_filesize() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("photo.100x100.jpg");
        fs::write(&path, b"12345").unwrap();
        let v = DerivedVariation::materialized(
            tmp.path().join("photo.jpg"),
            path,
            "/files/photo.100x100.jpg".into(),
            100,
            100,
            SizeOptions::default(),
        );
        assert!(v.is_materialized());
        assert_eq!(v.filesize(), Some(5));
    }
}

//! Pure Rust image processing backend — zero external dependencies.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::image_dimensions` |
//! | Decode (JPEG, PNG, GIF, WebP) | `image` crate (pure Rust decoders) |
//! | Resize | `image::imageops::resize` with `Lanczos3` filter |
//! | Cover-crop | scale-to-cover + `crop_imm` window at the focal point |
//! | Rotate / flip | `DynamicImage::rotate90/180/270`, `fliph`/`flipv` |
//! | Encode | `JpegEncoder` with quality for JPEG; format-by-extension otherwise |

use super::backend::{BackendError, Dimensions, ImageBackend, VariationParams};
use crate::options::{Flip, ResolvedCrop};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::io::BufWriter;
use std::path::Path;

/// Pure Rust backend using the `image` crate.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = image::image_dimensions(path).map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to identify {}: {e}", path.display()))
        })?;
        Ok(Dimensions { width, height })
    }

    fn render(&self, params: &VariationParams) -> Result<(), BackendError> {
        let img = load_image(&params.source)?;
        let img = apply_rotation(img, params.rotate);
        let img = match params.flip {
            Flip::Horizontal => img.fliph(),
            Flip::Vertical => img.flipv(),
            Flip::None => img,
        };
        let img = shape(img, params)?;
        save_output(&img, &params.output, params.quality)
    }
}

fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {e}", path.display()))
        })
}

/// Rotation must happen before geometry: a 90° turn swaps the aspect the
/// crop math sees.
fn apply_rotation(img: DynamicImage, rotate: i32) -> DynamicImage {
    match rotate {
        90 | -270 => img.rotate90(),
        180 | -180 => img.rotate180(),
        270 | -90 => img.rotate270(),
        _ => img,
    }
}

/// Apply the crop/resize geometry for the request.
fn shape(img: DynamicImage, params: &VariationParams) -> Result<DynamicImage, BackendError> {
    let (w0, h0) = (img.width(), img.height());
    if w0 == 0 || h0 == 0 {
        return Err(BackendError::ProcessingFailed(format!(
            "{} has zero dimensions",
            params.source.display()
        )));
    }
    if params.width == 0 && params.height == 0 {
        return Ok(img);
    }

    if let ResolvedCrop::Offset { x, y } = params.crop {
        if params.width == 0 || params.height == 0 {
            return Err(BackendError::ProcessingFailed(
                "offset crop requires both target dimensions".to_string(),
            ));
        }
        let x = x.min(w0.saturating_sub(1));
        let y = y.min(h0.saturating_sub(1));
        let cw = params.width.min(w0 - x);
        let ch = params.height.min(h0 - y);
        return Ok(img.crop_imm(x, y, cw, ch));
    }

    if params.width == 0 || params.height == 0 {
        let (tw, th) = single_edge_target((w0, h0), params.width, params.height, params.upscaling);
        if (tw, th) == (w0, h0) {
            return Ok(img);
        }
        return Ok(img.resize_exact(tw, th, FilterType::Lanczos3));
    }

    if params.crop == ResolvedCrop::Disabled {
        // Fit within the box, aspect preserved
        if !params.upscaling && w0 <= params.width && h0 <= params.height {
            return Ok(img);
        }
        return Ok(img.resize(params.width, params.height, FilterType::Lanczos3));
    }

    let (left, top, zoom) = focal_point(params.crop, w0, h0);
    Ok(cover_crop(
        img,
        params.width,
        params.height,
        left,
        top,
        zoom,
        params.upscaling,
    ))
}

/// Target size when only one edge is requested: scale proportionally from
/// the given edge, clamped to the original when upscaling is off.
fn single_edge_target(original: (u32, u32), width: u32, height: u32, upscaling: bool) -> (u32, u32) {
    let (w0, h0) = original;
    if width == 0 {
        let mut th = height;
        if !upscaling {
            th = th.min(h0);
        }
        let tw = ((w0 as f64) * (th as f64) / (h0 as f64)).round().max(1.0) as u32;
        (tw, th)
    } else {
        let mut tw = width;
        if !upscaling {
            tw = tw.min(w0);
        }
        let th = ((h0 as f64) * (tw as f64) / (w0 as f64)).round().max(1.0) as u32;
        (tw, th)
    }
}

/// Focal point of the crop window as percentages, plus zoom.
fn focal_point(crop: ResolvedCrop, w0: u32, h0: u32) -> (f32, f32, u32) {
    match crop {
        ResolvedCrop::Center => (50.0, 50.0, 0),
        ResolvedCrop::Anchor(a) => {
            let (l, t) = a.percents();
            (l, t, 0)
        }
        ResolvedCrop::Point { left, top, zoom } => (left, top, zoom),
        ResolvedCrop::PixelPoint { x, y } => (
            (x as f32 / w0 as f32 * 100.0).clamp(0.0, 100.0),
            (y as f32 / h0 as f32 * 100.0).clamp(0.0, 100.0),
            0,
        ),
        // Disabled and Offset are handled before we get here
        ResolvedCrop::Disabled | ResolvedCrop::Offset { .. } => (50.0, 50.0, 0),
    }
}

/// Scale the image to cover the target box (optionally zoomed in), then cut
/// the target window positioned by the focal point.
fn cover_crop(
    img: DynamicImage,
    tw: u32,
    th: u32,
    left: f32,
    top: f32,
    zoom: u32,
    upscaling: bool,
) -> DynamicImage {
    let (w0, h0) = (img.width() as f64, img.height() as f64);
    let mut scale = f64::max(tw as f64 / w0, th as f64 / h0);
    if !upscaling {
        scale = scale.min(1.0);
    }
    scale *= 1.0 + zoom as f64 / 100.0;

    let sw = (w0 * scale).round().max(1.0) as u32;
    let sh = (h0 * scale).round().max(1.0) as u32;
    let resized = if (sw, sh) == (img.width(), img.height()) {
        img
    } else {
        img.resize_exact(sw, sh, FilterType::Lanczos3)
    };

    let cw = tw.min(sw);
    let ch = th.min(sh);
    let left = (left.clamp(0.0, 100.0) / 100.0) as f64;
    let top = (top.clamp(0.0, 100.0) / 100.0) as f64;
    let cx = ((sw - cw) as f64 * left).round() as u32;
    let cy = ((sh - ch) as f64 * top).round() as u32;
    resized.crop_imm(cx, cy, cw, ch)
}

/// Encode to the output path. JPEG honors the quality setting; the other
/// formats encode by extension (webp/png are lossless in the `image` crate).
fn save_output(img: &DynamicImage, output: &Path, quality: u32) -> Result<(), BackendError> {
    let ext = output
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if ext == "jpg" || ext == "jpeg" {
        let file = std::fs::File::create(output).map_err(BackendError::Io)?;
        let mut writer = BufWriter::new(file);
        let encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100) as u8);
        img.write_with_encoder(encoder).map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to encode {}: {e}", output.display()))
        })?;
        return Ok(());
    }
    img.save(output).map_err(|e| {
        BackendError::ProcessingFailed(format!("Failed to encode {}: {e}", output.display()))
    })
}

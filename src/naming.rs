//! Derived-filename computation — the namer.
//!
//! [`variation_basename`] reproduces, bit for bit, the filename the eager
//! resize path assigns to a `(source, width, height, options)` tuple. The
//! deferral gate uses it to know where to put the queue record, and the
//! materializer's lookup works *because* a later identical request computes
//! the identical name. Everything else in this crate leans on that.
//!
//! Name shape:
//!
//! ```text
//! <stem>.<nameW>x<nameH><cropCode><suffixes>.<ext>
//!
//! photo.260x180.jpg                   plain center crop
//! photo.260x180-nw.jpg                north-west anchor
//! photo.260x180-p50x30.jpg            percent focal point
//! photo.260x180-a-b-rot90.jpg         suffixes + rotation tag, sorted
//! photo.260x180-hidpi.jpg             hidpi marker (always last)
//! ```
//!
//! Determinism: [`SizeOptions`] is a typed struct, suffix lists are
//! sanitized and sorted, and no map iteration order is involved — equal
//! inputs always produce the identical string.

use crate::options::{Cropping, Flip, ResolvedCrop, SizeOptions};
use crate::source::SourceImage;

/// What the namer decided for one request: the derived filename plus the
/// crop behavior the pixel pipeline must apply to honor that name.
#[derive(Debug, Clone, PartialEq)]
pub struct NamingOutcome {
    pub basename: String,
    pub crop: ResolvedCrop,
}

/// Compute the derived filename for a variation request.
///
/// Returns `None` for sources the pixel pipeline never resizes (vector
/// formats) — the caller must execute immediately and must not defer.
///
/// `options` must already carry the config layer (see
/// [`ServerConfig::sizer_options`](crate::config::ServerConfig::sizer_options)).
pub fn variation_basename(
    source: &SourceImage,
    width: u32,
    height: u32,
    options: &SizeOptions,
) -> Option<NamingOutcome> {
    if source.ext() == "svg" {
        return None;
    }

    let (crop, crop_code) = resolve_crop(source, width, height, options);

    let mut suffixes: Vec<String> = options.suffix.clone();
    let rotate = options.effective_rotate();
    if rotate != 0 {
        // Distinct prefixes keep +90 and -90 names apart
        let tag = if rotate > 0 { "rot" } else { "tor" };
        suffixes.push(format!("{tag}{}", rotate.abs()));
    }
    match options.effective_flip() {
        Flip::Vertical => suffixes.push("flipv".to_string()),
        Flip::Horizontal => suffixes.push("fliph".to_string()),
        Flip::None => {}
    }

    let mut cleaned: Vec<String> = suffixes
        .iter()
        .map(|s| sanitize_suffix(s))
        .filter(|s| !s.is_empty())
        .collect();
    cleaned.sort();

    let mut suffix_str = if cleaned.is_empty() {
        String::new()
    } else {
        format!("-{}", cleaned.join("-"))
    };
    if options.hidpi {
        suffix_str.push_str("-hidpi");
    }

    let mut stem = source.stem().to_string();
    if options.clean_filename
        && let Some(pos) = stem.find('.')
    {
        stem.truncate(pos);
    }

    // The filename carries the requested dimensions unless overridden
    let name_width = options.name_width.unwrap_or(width);
    let name_height = options.name_height.unwrap_or(height);

    let basename = format!(
        "{stem}.{name_width}x{name_height}{crop_code}{suffix_str}.{}",
        source.ext()
    );
    Some(NamingOutcome { basename, crop })
}

/// Resolve the crop behavior and its filename code, in priority order:
/// explicit crop region, focus point, `xNyM` offsets, then the plain
/// cropping value. Focus and offset crops leave no code in the name.
pub fn resolve_crop(
    source: &SourceImage,
    width: u32,
    height: u32,
    options: &SizeOptions,
) -> (ResolvedCrop, String) {
    if let Some([x, y, _, _]) = options.crop_extra {
        return (ResolvedCrop::Offset { x, y }, String::new());
    }
    if options.cropping == Cropping::Center
        && options.focus
        && width > 0
        && height > 0
        && let Some(focus) = source.focus
    {
        let zoom = options.zoom.unwrap_or(focus.zoom);
        return (
            ResolvedCrop::Point {
                left: focus.left,
                top: focus.top,
                zoom,
            },
            String::new(),
        );
    }
    match options.cropping {
        Cropping::Offset(x, y) => (ResolvedCrop::Offset { x, y }, String::new()),
        Cropping::Center => (ResolvedCrop::Center, String::new()),
        Cropping::Disabled => (ResolvedCrop::Disabled, String::new()),
        Cropping::Anchor(a) => (ResolvedCrop::Anchor(a), format!("-{}", a.code())),
        Cropping::Percent(x, y) => (
            ResolvedCrop::Point {
                left: x as f32,
                top: y as f32,
                zoom: 0,
            },
            format!("-p{x}x{y}"),
        ),
        Cropping::Pixels(x, y) => (ResolvedCrop::PixelPoint { x, y }, format!("-d{x}x{y}")),
    }
}

/// Reduce a suffix to a filename-safe token: lowercase `[a-z0-9_-]` only.
fn sanitize_suffix(s: &str) -> String {
    s.chars()
        .filter_map(|c| {
            let c = c.to_ascii_lowercase();
            (c.is_ascii_alphanumeric() || c == '_' || c == '-').then_some(c)
        })
        .collect()
}

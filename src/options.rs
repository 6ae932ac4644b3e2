//! The variation request option table.
//!
//! [`SizeOptions`] describes *what* variation is wanted, not *how* pixels are
//! produced. It is the unit that travels: callers build one, the deferral
//! gate serializes it into the queue record, and the materializer feeds the
//! exact same struct back into the real resize. Because it is a typed struct
//! (not a free-form map), equal requests are equal values regardless of how
//! the caller assembled them — the determinism the whole deferral scheme
//! leans on.
//!
//! ## Merge precedence
//!
//! Three layers, later wins:
//!
//! 1. built-in defaults ([`SizeOptions::default`])
//! 2. process-wide config overrides ([`crate::config::ServerConfig::sizer_options`])
//! 3. request-supplied values (caller mutates the struct it got from layer 2)
//!
//! ## JSON form
//!
//! Field names mirror the queue-record wire format (camelCase). A few fields
//! accept the historical loose encodings: `cropping` may be a bool, an
//! integer, a string (`"north"`, `"50%,30%"`, `"x40y60"`), or a two-element
//! array; `suffix` may be a single space-separated string or a list.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;

/// Crop anchor positions, stored in their short filename form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Anchor {
    /// Short code used both in filenames and the serialized option value.
    pub fn code(self) -> &'static str {
        match self {
            Anchor::North => "n",
            Anchor::NorthEast => "ne",
            Anchor::East => "e",
            Anchor::SouthEast => "se",
            Anchor::South => "s",
            Anchor::SouthWest => "sw",
            Anchor::West => "w",
            Anchor::NorthWest => "nw",
        }
    }

    /// Focal point of the anchor as percentages of the crop frame.
    pub fn percents(self) -> (f32, f32) {
        match self {
            Anchor::North => (50.0, 0.0),
            Anchor::NorthEast => (100.0, 0.0),
            Anchor::East => (100.0, 50.0),
            Anchor::SouthEast => (100.0, 100.0),
            Anchor::South => (50.0, 100.0),
            Anchor::SouthWest => (0.0, 100.0),
            Anchor::West => (0.0, 50.0),
            Anchor::NorthWest => (0.0, 0.0),
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "n" | "north" => Anchor::North,
            "ne" | "northeast" => Anchor::NorthEast,
            "e" | "east" => Anchor::East,
            "se" | "southeast" => Anchor::SouthEast,
            "s" | "south" => Anchor::South,
            "sw" | "southwest" => Anchor::SouthWest,
            "w" | "west" => Anchor::West,
            "nw" | "northwest" => Anchor::NorthWest,
            _ => return None,
        })
    }
}

/// Matches explicit pixel-offset crop strings like `x40y60` (also `x40x60`,
/// which the historical format tolerated).
static OFFSET_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^x(\d+)[yx](\d+)").unwrap());

/// The `cropping` option value.
///
/// `Center` is the default "crop to fit, centered" behavior and carries no
/// filename code. `Offset` encodes explicit pixel offsets into the source
/// and likewise leaves no code in the derived filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cropping {
    #[default]
    Center,
    Disabled,
    Anchor(Anchor),
    /// Crop focal point as percentages of the source, e.g. `"50%,30%"`.
    Percent(u32, u32),
    /// Crop focal point in source pixels, e.g. `"500,300"`.
    Pixels(u32, u32),
    /// Explicit top-left pixel offsets, from an `xNyM` string.
    Offset(u32, u32),
}

impl Cropping {
    /// Parse the string form. Unrecognized values fall back to `Center`,
    /// matching the tolerant behavior of the eager resize path.
    pub fn parse(s: &str) -> Cropping {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "" | "1" | "true" | "center" => return Cropping::Center,
            "0" | "false" | "none" => return Cropping::Disabled,
            _ => {}
        }
        if let Some(caps) = OFFSET_RE.captures(&s) {
            // Captured digits only; parse failure is unreachable but handled.
            if let (Ok(x), Ok(y)) = (caps[1].parse(), caps[2].parse()) {
                return Cropping::Offset(x, y);
            }
        }
        if let Some((a, b)) = s.split_once(',') {
            return Self::from_pair(a.trim(), b.trim()).unwrap_or(Cropping::Center);
        }
        Anchor::parse(&s).map(Cropping::Anchor).unwrap_or(Cropping::Center)
    }

    fn from_pair(a: &str, b: &str) -> Option<Cropping> {
        let percent = a.ends_with('%') || b.ends_with('%');
        let x: u32 = a.trim_end_matches('%').parse().ok()?;
        let y: u32 = b.trim_end_matches('%').parse().ok()?;
        Some(if percent {
            Cropping::Percent(x.min(100), y.min(100))
        } else {
            Cropping::Pixels(x, y)
        })
    }

    /// Canonical string form (inverse of [`Cropping::parse`] where one exists).
    fn as_value_string(&self) -> Option<String> {
        match self {
            Cropping::Center | Cropping::Disabled => None,
            Cropping::Anchor(a) => Some(a.code().to_string()),
            Cropping::Percent(x, y) => Some(format!("{x}%,{y}%")),
            Cropping::Pixels(x, y) => Some(format!("{x},{y}")),
            Cropping::Offset(x, y) => Some(format!("x{x}y{y}")),
        }
    }
}

impl Serialize for Cropping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_value_string() {
            Some(s) => serializer.serialize_str(&s),
            None => serializer.serialize_bool(*self == Cropping::Center),
        }
    }
}

impl<'de> Deserialize<'de> for Cropping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CroppingVisitor;

        impl<'de> Visitor<'de> for CroppingVisitor {
            type Value = Cropping;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a bool, integer, string, or two-element array")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Cropping, E> {
                Ok(if v { Cropping::Center } else { Cropping::Disabled })
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Cropping, E> {
                Ok(if v != 0 { Cropping::Center } else { Cropping::Disabled })
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Cropping, E> {
                Ok(if v != 0 { Cropping::Center } else { Cropping::Disabled })
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Cropping, E> {
                Ok(Cropping::parse(v))
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Cropping, A::Error> {
                let a: serde_json::Value = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let b: serde_json::Value = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                // Drain any extras (the focus form carries a third zoom element)
                while seq.next_element::<serde_json::Value>()?.is_some() {}
                let part = |v: &serde_json::Value| match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Ok(Cropping::from_pair(&part(&a), &part(&b)).unwrap_or(Cropping::Center))
            }
        }

        deserializer.deserialize_any(CroppingVisitor)
    }
}

/// Flip direction derived from the `flip` option string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flip {
    None,
    Horizontal,
    Vertical,
}

/// Accepts `suffix` as either a list or a single space-separated string.
mod suffix_list {
    use super::*;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        struct SuffixVisitor;

        impl<'de> Visitor<'de> for SuffixVisitor {
            type Value = Vec<String>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a string or a list of strings")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Vec<String>, E> {
                Ok(v.split_whitespace().map(str::to_string).collect())
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<String>, A::Error> {
                let mut out = Vec::new();
                while let Some(s) = seq.next_element::<String>()? {
                    out.push(s);
                }
                Ok(out)
            }
        }

        d.deserialize_any(SuffixVisitor)
    }
}

/// Options for a single variation request.
///
/// Defaults match the eager resize path bit-for-bit — any drift here changes
/// derived filenames and breaks queue-record interception.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SizeOptions {
    /// Allow enlarging beyond the source dimensions.
    pub upscaling: bool,
    pub cropping: Cropping,
    pub interlace: bool,
    pub sharpening: String,
    pub quality: u32,
    /// Quality substituted when `hidpi` is set (does not affect the name).
    pub hidpi_quality: u32,
    pub webp_quality: u32,
    pub webp_add: bool,
    /// Basename override for the webp sibling, when not mirroring the raster name.
    pub webp_name: String,
    pub webp_only: bool,
    #[serde(deserialize_with = "suffix_list::deserialize")]
    pub suffix: Vec<String>,
    /// Regenerate even when the derived file already exists.
    pub force_new: bool,
    pub hidpi: bool,
    /// Strip historical resize encodings from the stem (truncate at first `.`).
    pub clean_filename: bool,
    /// Degrees; only ±90/±180/±270 take effect.
    pub rotate: i32,
    /// `"v..."` flips vertically, any other nonempty value horizontally.
    pub flip: String,
    /// Override the width used in the filename (not the pixel width).
    pub name_width: Option<u32>,
    pub name_height: Option<u32>,
    /// Allow focus-point cropping when the source carries a focus point.
    pub focus: bool,
    /// Focus zoom override, percent.
    pub zoom: Option<u32>,
    pub allow_original: bool,
    /// Forces synchronous execution, bypassing the deferral gate. Set by the
    /// materializer on its internal call so it can never defer recursively.
    pub no_delay: bool,
    /// Explicit crop region `[x, y, width, height]` in source pixels.
    pub crop_extra: Option<[u32; 4]>,
}

impl Default for SizeOptions {
    fn default() -> Self {
        Self {
            upscaling: true,
            cropping: Cropping::Center,
            interlace: false,
            sharpening: "soft".to_string(),
            quality: 90,
            hidpi_quality: 40,
            webp_quality: 90,
            webp_add: false,
            webp_name: String::new(),
            webp_only: false,
            suffix: Vec::new(),
            force_new: false,
            hidpi: false,
            clean_filename: false,
            rotate: 0,
            flip: String::new(),
            name_width: None,
            name_height: None,
            focus: true,
            zoom: None,
            allow_original: false,
            no_delay: false,
            crop_extra: None,
        }
    }
}

impl SizeOptions {
    /// Rotation normalized to the values the pipeline honors (0 otherwise).
    pub fn effective_rotate(&self) -> i32 {
        if matches!(self.rotate.abs(), 90 | 180 | 270) {
            self.rotate
        } else {
            0
        }
    }

    pub fn effective_flip(&self) -> Flip {
        let Some(first) = self.flip.chars().next() else {
            return Flip::None;
        };
        if first.eq_ignore_ascii_case(&'v') {
            Flip::Vertical
        } else {
            Flip::Horizontal
        }
    }

    /// Encoder quality after the hidpi substitution.
    pub fn effective_quality(&self) -> u32 {
        if self.hidpi && self.hidpi_quality > 0 {
            self.hidpi_quality
        } else {
            self.quality
        }
    }
}

/// Crop behavior after the namer has resolved option priority: focus points,
/// explicit offsets, and anchors all collapse into one of these.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResolvedCrop {
    /// Cropping disabled — scale to fit within the requested box.
    Disabled,
    Center,
    Anchor(Anchor),
    /// Focal point as percentages of the source, optional zoom percent.
    Point { left: f32, top: f32, zoom: u32 },
    /// Focal point in source pixels.
    PixelPoint { x: u32, y: u32 },
    /// Fixed crop region offset in source pixels (width/height come from the request).
    Offset { x: u32, y: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Cropping parsing
    // =========================================================================

    #[test]
    fn cropping_center_forms() {
        for s in ["", "true", "1", "center", "CENTER"] {
            assert_eq!(Cropping::parse(s), Cropping::Center, "input {s:?}");
        }
    }

    #[test]
    fn cropping_disabled_forms() {
        for s in ["false", "0", "none"] {
            assert_eq!(Cropping::parse(s), Cropping::Disabled, "input {s:?}");
        }
    }

    #[test]
    fn cropping_anchor_long_and_short() {
        assert_eq!(Cropping::parse("north"), Cropping::Anchor(Anchor::North));
        assert_eq!(Cropping::parse("nw"), Cropping::Anchor(Anchor::NorthWest));
        assert_eq!(
            Cropping::parse("SouthEast"),
            Cropping::Anchor(Anchor::SouthEast)
        );
    }

    #[test]
    fn cropping_offset_string() {
        assert_eq!(Cropping::parse("x40y60"), Cropping::Offset(40, 60));
        // Historical tolerance: second separator may be 'x'
        assert_eq!(Cropping::parse("x40x60"), Cropping::Offset(40, 60));
    }

    #[test]
    fn cropping_percent_pair() {
        assert_eq!(Cropping::parse("50%,30%"), Cropping::Percent(50, 30));
        assert_eq!(Cropping::parse("150%,30%"), Cropping::Percent(100, 30));
    }

    #[test]
    fn cropping_pixel_pair() {
        assert_eq!(Cropping::parse("500,300"), Cropping::Pixels(500, 300));
    }

    #[test]
    fn cropping_unknown_falls_back_to_center() {
        assert_eq!(Cropping::parse("sideways"), Cropping::Center);
    }

    // =========================================================================
    // Serde forms
    // =========================================================================

    #[test]
    fn cropping_deserializes_from_bool_and_int() {
        let c: Cropping = serde_json::from_str("true").unwrap();
        assert_eq!(c, Cropping::Center);
        let c: Cropping = serde_json::from_str("false").unwrap();
        assert_eq!(c, Cropping::Disabled);
        let c: Cropping = serde_json::from_str("1").unwrap();
        assert_eq!(c, Cropping::Center);
    }

    #[test]
    fn cropping_deserializes_from_array() {
        let c: Cropping = serde_json::from_str(r#"["50%","30%"]"#).unwrap();
        assert_eq!(c, Cropping::Percent(50, 30));
        // Focus-style third element is ignored
        let c: Cropping = serde_json::from_str(r#"["50%","30%","20"]"#).unwrap();
        assert_eq!(c, Cropping::Percent(50, 30));
    }

    #[test]
    fn cropping_roundtrips_through_json() {
        for c in [
            Cropping::Center,
            Cropping::Disabled,
            Cropping::Anchor(Anchor::NorthWest),
            Cropping::Percent(50, 30),
            Cropping::Pixels(500, 300),
            Cropping::Offset(40, 60),
        ] {
            let json = serde_json::to_string(&c).unwrap();
            let back: Cropping = serde_json::from_str(&json).unwrap();
            assert_eq!(back, c, "via {json}");
        }
    }

    #[test]
    fn suffix_accepts_string_or_list() {
        let o: SizeOptions = serde_json::from_str(r#"{"suffix": "a b"}"#).unwrap();
        assert_eq!(o.suffix, vec!["a", "b"]);
        let o: SizeOptions = serde_json::from_str(r#"{"suffix": ["a", "b"]}"#).unwrap();
        assert_eq!(o.suffix, vec!["a", "b"]);
    }

    #[test]
    fn options_json_uses_camel_case_keys() {
        let mut o = SizeOptions::default();
        o.force_new = true;
        o.name_width = Some(120);
        let json = serde_json::to_string(&o).unwrap();
        assert!(json.contains("\"forceNew\":true"));
        assert!(json.contains("\"nameWidth\":120"));
        assert!(json.contains("\"noDelay\":false"));
    }

    #[test]
    fn options_key_order_is_irrelevant() {
        let a: SizeOptions =
            serde_json::from_str(r#"{"rotate": 90, "hidpi": true, "quality": 80}"#).unwrap();
        let b: SizeOptions =
            serde_json::from_str(r#"{"quality": 80, "rotate": 90, "hidpi": true}"#).unwrap();
        assert_eq!(a, b);
    }

    // =========================================================================
    // Derived accessors
    // =========================================================================

    #[test]
    fn rotate_normalizes_invalid_values() {
        let mut o = SizeOptions::default();
        o.rotate = 45;
        assert_eq!(o.effective_rotate(), 0);
        o.rotate = -270;
        assert_eq!(o.effective_rotate(), -270);
        o.rotate = 180;
        assert_eq!(o.effective_rotate(), 180);
    }

    #[test]
    fn flip_maps_on_first_letter() {
        let mut o = SizeOptions::default();
        assert_eq!(o.effective_flip(), Flip::None);
        o.flip = "vertical".into();
        assert_eq!(o.effective_flip(), Flip::Vertical);
        o.flip = "V".into();
        assert_eq!(o.effective_flip(), Flip::Vertical);
        o.flip = "horizontal".into();
        assert_eq!(o.effective_flip(), Flip::Horizontal);
        o.flip = "h".into();
        assert_eq!(o.effective_flip(), Flip::Horizontal);
    }

    #[test]
    fn hidpi_substitutes_quality() {
        let mut o = SizeOptions::default();
        assert_eq!(o.effective_quality(), 90);
        o.hidpi = true;
        assert_eq!(o.effective_quality(), 40);
        o.hidpi_quality = 0;
        assert_eq!(o.effective_quality(), 90);
    }
}

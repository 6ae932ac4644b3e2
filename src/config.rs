//! Server configuration.
//!
//! Everything the components need is carried explicitly in [`ServerConfig`]
//! — there is no process-global settings object. The config file is TOML,
//! sparse (override only what you want), and unknown keys are rejected to
//! catch typos early.
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! root = "files"               # Filesystem root of the served asset tree
//! files_prefix = "/files/"     # URL namespace for assets under root
//! listen = "127.0.0.1:8080"    # Bind address for `serve`
//!
//! [sizer]                      # Overrides for the built-in resize defaults.
//! # upscaling = true           # Requests still win over these.
//! # cropping = "center"
//! # quality = 90
//! # sharpening = "soft"
//! # hidpi_quality = 40
//!
//! [webp]
//! # quality = 90               # Replaces the default webp quality
//!
//! [policy]
//! deny_edge = 260              # Never defer variations with this edge size
//! ```

use crate::options::{Cropping, SizeOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration for the variation server and deferral gate.
///
/// All fields have defaults; a missing config file means "all defaults".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Filesystem root of the asset tree the server exposes.
    pub root: PathBuf,
    /// URL prefix the asset tree is served under. Must start and end with `/`.
    pub files_prefix: String,
    /// Bind address for the HTTP server.
    pub listen: String,
    /// Process-wide overrides applied on top of the built-in resize defaults.
    pub sizer: SizerOverrides,
    pub webp: WebpConfig,
    pub policy: PolicyConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("files"),
            files_prefix: "/files/".to_string(),
            listen: "127.0.0.1:8080".to_string(),
            sizer: SizerOverrides::default(),
            webp: WebpConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}

/// Sparse overrides of the [`SizeOptions`] defaults. Request-supplied values
/// still win over these.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SizerOverrides {
    pub upscaling: Option<bool>,
    /// String form, parsed by [`Cropping::parse`].
    pub cropping: Option<String>,
    pub interlace: Option<bool>,
    pub sharpening: Option<String>,
    pub quality: Option<u32>,
    pub hidpi_quality: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebpConfig {
    /// Replaces the default webp quality when set.
    pub quality: Option<u32>,
    /// Generate a webp sibling for every variation by default.
    pub add: Option<bool>,
}

/// Knobs for the default deferral policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Edge size (either dimension) that is never deferred — the thumbnail
    /// size internal tooling renders immediately. 0 disables the rule.
    pub deny_edge: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self { deny_edge: 260 }
    }
}

impl ServerConfig {
    /// Load from a TOML file, falling back to defaults when the file is absent.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => return Err(e.into()),
        };
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.files_prefix.starts_with('/') || !self.files_prefix.ends_with('/') {
            return Err(ConfigError::Validation(
                "files_prefix must start and end with '/'".into(),
            ));
        }
        if let Some(q) = self.sizer.quality
            && !(1..=100).contains(&q)
        {
            return Err(ConfigError::Validation("sizer.quality must be 1-100".into()));
        }
        if let Some(q) = self.webp.quality
            && !(1..=100).contains(&q)
        {
            return Err(ConfigError::Validation("webp.quality must be 1-100".into()));
        }
        Ok(())
    }

    /// The option table after the config layer: built-in defaults overlaid
    /// with [`SizerOverrides`] and the webp quality. Callers mutate the
    /// returned struct with request values, completing the precedence chain.
    pub fn sizer_options(&self) -> SizeOptions {
        let mut options = SizeOptions::default();
        if let Some(q) = self.webp.quality {
            options.webp_quality = q;
        }
        if let Some(add) = self.webp.add {
            options.webp_add = add;
        }
        if let Some(v) = self.sizer.upscaling {
            options.upscaling = v;
        }
        if let Some(c) = &self.sizer.cropping {
            options.cropping = Cropping::parse(c);
        }
        if let Some(v) = self.sizer.interlace {
            options.interlace = v;
        }
        if let Some(s) = &self.sizer.sharpening {
            options.sharpening = s.clone();
        }
        if let Some(q) = self.sizer.quality {
            options.quality = q;
        }
        if let Some(q) = self.sizer.hidpi_quality {
            options.hidpi_quality = q;
        }
        options
    }

    /// Translate a request path under `files_prefix` to a filesystem path
    /// under `root`. Returns `None` for paths outside the namespace or paths
    /// that try to climb out of it.
    pub fn url_to_path(&self, url_path: &str) -> Option<PathBuf> {
        let rel = url_path.strip_prefix(&self.files_prefix)?;
        if rel.is_empty() {
            return None;
        }
        let rel_path = Path::new(rel);
        let safe = rel_path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return None;
        }
        Some(self.root.join(rel_path))
    }

    /// Translate a filesystem path under `root` back to its URL. `None` when
    /// the path lies outside the root.
    pub fn path_to_url(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let mut url = self.files_prefix.clone();
        let parts: Vec<&str> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect();
        url.push_str(&parts.join("/"));
        Some(url)
    }
}

/// Stock config with every option documented, for `gen-config`.
pub fn stock_config_toml() -> &'static str {
    STOCK_CONFIG
}

const STOCK_CONFIG: &str = r#"# delayed-variations configuration
# All options are optional - defaults shown below.

# Filesystem root of the served asset tree.
root = "files"

# URL namespace for assets under root. Must start and end with '/'.
files_prefix = "/files/"

# Bind address for `serve`.
listen = "127.0.0.1:8080"

[sizer]
# Overrides for the built-in resize defaults. Per-request options still win.
# upscaling = true
# cropping = "center"        # center|none|n|ne|e|se|s|sw|w|nw|"50%,30%"
# interlace = false
# sharpening = "soft"
# quality = 90
# hidpi_quality = 40

[webp]
# quality = 90               # Quality for webp siblings
# add = false                # Generate a webp sibling for every variation

[policy]
# Variations with this edge size (either dimension) are generated eagerly,
# never deferred. Set to 0 to defer everything.
deny_edge = 260
"#;

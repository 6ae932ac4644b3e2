//! The deferral gate — the resize entry point.
//!
//! [`Sizer::size`] is what callers invoke where they would otherwise run the
//! resize eagerly. It decides defer-or-execute:
//!
//! ```text
//! size(source, w, h, options)
//!   ├─ no_delay set?            → execute now (the materializer's own call)
//!   ├─ policy denies deferral?  → execute now
//!   ├─ namer says not resizable?→ execute now (vector passthrough)
//!   ├─ derived file exists?     → force_new ? delete + defer : return it
//!   └─ otherwise                → write queue record, return placeholder
//! ```
//!
//! Deferring does exactly one file write (the record) and zero pixel work.
//! If the record cannot be written the call fails — a request that is not
//! durably recorded must not pretend to be deferred.

use crate::config::ServerConfig;
use crate::imaging::{BackendError, ImageBackend, VariationParams};
use crate::naming::variation_basename;
use crate::options::SizeOptions;
use crate::queue::{self, QueueError, QueueRecord};
use crate::source::{DerivedVariation, SourceImage};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SizeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("imaging error: {0}")]
    Backend(#[from] BackendError),
    #[error("queue record error: {0}")]
    Record(#[from] QueueError),
}

/// Hook deciding whether a given request may be deferred at all.
///
/// Denial is not an error — the request simply executes eagerly.
pub trait DeferralPolicy: Send + Sync {
    fn allow_deferral(
        &self,
        source: &SourceImage,
        width: u32,
        height: u32,
        options: &SizeOptions,
    ) -> bool;
}

/// Default policy: deny deferral for the fixed thumbnail edge internal
/// tooling renders inline (it would otherwise show broken previews), allow
/// everything else.
pub struct DefaultPolicy {
    pub deny_edge: u32,
}

impl DeferralPolicy for DefaultPolicy {
    fn allow_deferral(
        &self,
        _source: &SourceImage,
        width: u32,
        height: u32,
        _options: &SizeOptions,
    ) -> bool {
        self.deny_edge == 0 || (width != self.deny_edge && height != self.deny_edge)
    }
}

/// The resize front door: owns the backend, the config, and the policy.
pub struct Sizer<B: ImageBackend> {
    config: ServerConfig,
    pub(crate) backend: B,
    policy: Box<dyn DeferralPolicy>,
}

impl<B: ImageBackend> Sizer<B> {
    pub fn new(config: ServerConfig, backend: B) -> Self {
        let policy = Box::new(DefaultPolicy {
            deny_edge: config.policy.deny_edge,
        });
        Self {
            config,
            backend,
            policy,
        }
    }

    /// Replace the deferral policy.
    pub fn with_policy(mut self, policy: Box<dyn DeferralPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Request a variation, deferring generation when allowed.
    pub fn size(
        &self,
        source: &SourceImage,
        width: u32,
        height: u32,
        options: &SizeOptions,
    ) -> Result<DerivedVariation, SizeError> {
        if options.no_delay
            || !self
                .policy
                .allow_deferral(source, width, height, options)
        {
            return self.execute(source, width, height, options);
        }
        let Some(outcome) = variation_basename(source, width, height, options) else {
            return self.execute(source, width, height, options);
        };

        let variation_path = source.variation_dir().join(&outcome.basename);
        if variation_path.is_file() {
            if options.force_new {
                std::fs::remove_file(&variation_path)?;
            } else {
                // Already materialized earlier; nothing to defer
                return Ok(DerivedVariation::materialized(
                    source.path.clone(),
                    variation_path.clone(),
                    self.variation_url(&variation_path),
                    width,
                    height,
                    options.clone(),
                ));
            }
        }

        let record = QueueRecord {
            original: source.url.clone(),
            width,
            height,
            options: options.clone(),
        };
        queue::write_record(&variation_path, &record)?;

        Ok(DerivedVariation::pending(
            source.path.clone(),
            variation_path.clone(),
            self.variation_url(&variation_path),
            width,
            height,
            options.clone(),
        ))
    }

    /// Perform the real resize, bypassing deferral entirely.
    pub fn execute(
        &self,
        source: &SourceImage,
        width: u32,
        height: u32,
        options: &SizeOptions,
    ) -> Result<DerivedVariation, SizeError> {
        let Some(outcome) = variation_basename(source, width, height, options) else {
            // Vector formats pass through untouched
            return Ok(DerivedVariation::materialized(
                source.path.clone(),
                source.path.clone(),
                source.url.clone(),
                width,
                height,
                options.clone(),
            ));
        };

        let variation_path = source.variation_dir().join(&outcome.basename);
        if !variation_path.is_file() || options.force_new {
            let params = VariationParams {
                source: source.path.clone(),
                output: variation_path.clone(),
                width,
                height,
                crop: outcome.crop,
                upscaling: options.upscaling,
                rotate: options.effective_rotate(),
                flip: options.effective_flip(),
                quality: options.effective_quality(),
            };
            self.backend.render(&params)?;
        }
        // The name is satisfied now; a stale record for it must not linger
        let _ = queue::remove_record(&queue::record_path(&variation_path));

        Ok(DerivedVariation::materialized(
            source.path.clone(),
            variation_path.clone(),
            self.variation_url(&variation_path),
            width,
            height,
            options.clone(),
        ))
    }

    fn variation_url(&self, path: &Path) -> String {
        self.config.path_to_url(path).unwrap_or_default()
    }
}

//! Configuration types for the dedup pipeline.
//!
//! All pipeline behaviour is controlled through [`DedupConfig`], built via its
//! [`DedupConfigBuilder`]. Keeping every knob in one struct makes it trivial
//! to share configs across calls and to log exactly which settings produced a
//! given output.

use crate::error::DedupError;
use crate::progress::DedupProgressCallback;
use std::fmt;
use std::sync::Arc;

/// Score threshold below which two images are considered duplicates.
///
/// The comparison score is a normalised sum of squared differences, so `0.0`
/// means pixel-identical at the best alignment. `1e-4` admits the rounding
/// noise that PDF exporters introduce when they embed the same picture twice,
/// while rejecting everything visually distinct.
pub const MATCH_THRESHOLD: f32 = 1e-4;

/// Opacity applied to flattened rectangles when the caller does not choose one.
///
/// `1.0` leaves the mean colour unchanged by the white blend, which is what
/// you want for images that were opaque to begin with.
pub const DEFAULT_OPACITY: f64 = 1.0;

/// Configuration for a dedup run.
///
/// Built via [`DedupConfig::builder()`] or using [`DedupConfig::default()`].
///
/// # Example
/// ```rust
/// use svgdedup::DedupConfig;
///
/// let config = DedupConfig::builder()
///     .threshold(1e-3)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct DedupConfig {
    /// Duplicate-match threshold. Default: [`MATCH_THRESHOLD`].
    ///
    /// Raising it makes the matcher more lenient (more `<use>` rewrites,
    /// including near-misses); lowering it towards `0.0` only accepts
    /// pixel-perfect repeats.
    pub threshold: f32,

    /// Opacity used for flattened rectangles when no explicit value is
    /// chosen. Default: [`DEFAULT_OPACITY`].
    pub opacity: f64,

    /// Progress callback invoked as each embedded image is scanned.
    /// Default: none.
    pub progress_callback: Option<Arc<dyn DedupProgressCallback>>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            threshold: MATCH_THRESHOLD,
            opacity: DEFAULT_OPACITY,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for DedupConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedupConfig")
            .field("threshold", &self.threshold)
            .field("opacity", &self.opacity)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn DedupProgressCallback>"),
            )
            .finish()
    }
}

impl DedupConfig {
    /// Create a new builder for `DedupConfig`.
    pub fn builder() -> DedupConfigBuilder {
        DedupConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`DedupConfig`].
#[derive(Debug)]
pub struct DedupConfigBuilder {
    config: DedupConfig,
}

impl DedupConfigBuilder {
    pub fn threshold(mut self, t: f32) -> Self {
        self.config.threshold = t;
        self
    }

    pub fn opacity(mut self, o: f64) -> Self {
        self.config.opacity = o;
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn DedupProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DedupConfig, DedupError> {
        let c = &self.config;
        if !c.threshold.is_finite() || c.threshold <= 0.0 {
            return Err(DedupError::InvalidConfig(format!(
                "threshold must be a finite value > 0, got {}",
                c.threshold
            )));
        }
        if !c.opacity.is_finite() || !(0.0..=1.0).contains(&c.opacity) {
            return Err(DedupError::InvalidConfig(format!(
                "opacity must be between 0.0 and 1.0, got {}",
                c.opacity
            )));
        }
        Ok(self.config)
    }
}

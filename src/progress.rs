//! Progress-callback trait for per-image scan events.
//!
//! Inject an [`Arc<dyn DedupProgressCallback>`] via
//! [`crate::config::DedupConfigBuilder::progress_callback`] to receive
//! real-time events as the pipeline decodes and compares each embedded image.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a channel, a GUI widget, or a terminal progress bar
//! without the library knowing anything about how the host application
//! communicates. The trait is `Send + Sync` so the same handle can be shared
//! with a logging or UI thread.
//!
//! # Example
//!
//! ```rust
//! use svgdedup::{DedupProgressCallback, DedupConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     scanned: Arc<AtomicUsize>,
//! }
//!
//! impl DedupProgressCallback for CountingCallback {
//!     fn on_image_scanned(&self, index: usize, total: usize, duplicate: bool) {
//!         self.scanned.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("image {}/{} {}", index, total, if duplicate { "dup" } else { "new" });
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     scanned: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = DedupConfig::builder()
//!     .progress_callback(counter as Arc<dyn DedupProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the dedup pipeline as it scans each embedded image.
///
/// The scan is sequential, so events arrive in document order from a single
/// thread. All methods have default no-op implementations so callers only
/// override what they care about.
pub trait DedupProgressCallback: Send + Sync {
    /// Called once before any image is decoded.
    ///
    /// # Arguments
    /// * `total_images` — number of `<image>` elements that will be scanned
    fn on_scan_start(&self, total_images: usize) {
        let _ = total_images;
    }

    /// Called after an image has been decoded and compared against the
    /// canonical set.
    ///
    /// # Arguments
    /// * `index`     — 1-indexed position in document order
    /// * `total`     — total images in the document
    /// * `duplicate` — whether the image matched an already-kept one
    fn on_image_scanned(&self, index: usize, total: usize, duplicate: bool) {
        let _ = (index, total, duplicate);
    }

    /// Called once after every image has been compared.
    ///
    /// # Arguments
    /// * `kept`   — images that survive as canonical copies
    /// * `clones` — images that will be rewritten into `<use>` references
    fn on_scan_complete(&self, kept: usize, clones: usize) {
        let _ = (kept, clones);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl DedupProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::DedupConfig`].
pub type ProgressCallback = Arc<dyn DedupProgressCallback>;

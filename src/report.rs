//! Output types: the rewritten document plus a summary of what was done.
//!
//! [`DedupOutcome`] is what [`crate::dedup_document`] returns: the serialised
//! SVG together with a [`DedupReport`]. The report is `Serialize` so the CLI
//! can emit it as JSON for scripting (`--json`) and so callers can log it.

use serde::{Deserialize, Serialize};

/// Result of deduplicating one SVG document.
#[derive(Debug, Clone)]
pub struct DedupOutcome {
    /// The rewritten document, ready to be written to disk.
    pub svg: String,
    /// Counters describing the rewrite.
    pub report: DedupReport,
}

/// Summary counters for a dedup run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DedupReport {
    /// `<image>` elements found in the document.
    pub images_found: usize,
    /// Images kept as canonical copies (including flattened ones).
    pub kept: usize,
    /// Images rewritten into `<use>` references.
    pub clones: usize,
    /// Times a later, larger duplicate replaced an earlier canonical copy.
    pub promotions: usize,
    /// Kept images replaced by a flat-colour `<rect>`.
    pub flattened: usize,
    /// Image pairs skipped because greyscale and colour data cannot be
    /// compared.
    pub incomparable_pairs: usize,
    /// Bytes of embedded payload in the input document.
    pub embedded_bytes_before: u64,
    /// Bytes of embedded payload remaining after the rewrite.
    pub embedded_bytes_after: u64,
    /// Time spent decoding and comparing images.
    pub scan_duration_ms: u64,
    /// End-to-end time for the document.
    pub total_duration_ms: u64,
}

impl DedupReport {
    /// Embedded-payload bytes removed from the document.
    pub fn bytes_saved(&self) -> u64 {
        self.embedded_bytes_before
            .saturating_sub(self.embedded_bytes_after)
    }

    /// True when the rewrite changed at least one element.
    pub fn changed(&self) -> bool {
        self.clones > 0 || self.flattened > 0
    }
}

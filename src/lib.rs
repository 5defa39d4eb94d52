//! # svgdedup
//!
//! Deduplicate embedded raster images in SVG documents exported from PDFs.
//!
//! ## Why this crate?
//!
//! When a PDF page is exported to SVG (Inkscape, `pdftocairo`), every
//! placement of a bitmap becomes its own `<image>` element with the full
//! base64 PNG payload inline — a logo repeated on ten pages is embedded ten
//! times. This crate finds repeats by comparing pixels, keeps one canonical
//! copy per picture, and rewrites the rest into `<use>` references to it.
//! Visually flat images (chart backgrounds, colour blocks) can additionally
//! be collapsed into plain `<rect>`s filled with their mean colour.
//!
//! ## Pipeline Overview
//!
//! ```text
//! SVG (or PDF via Inkscape)
//!  │
//!  ├─ 1. Namespaces  collect xmlns bindings into an explicit map
//!  ├─ 2. Parse       event stream; untouched elements round-trip verbatim
//!  ├─ 3. Extract     data URI → base64 → PNG raster per <image>
//!  ├─ 4. Match       normalised sum-of-squares template comparison
//!  ├─ 5. Rewrite     duplicates → <use>, larger repeats promoted
//!  └─ 6. Flatten     kept images optionally → mean-colour <rect>
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use svgdedup::{dedup_svg_file, DedupConfig, NoFlatten};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DedupConfig::default();
//!     let report = dedup_svg_file("page.svg", "page-dedup.svg", &config, &mut NoFlatten)?;
//!     eprintln!("{} clones, {} bytes saved", report.clones, report.bytes_saved());
//!     Ok(())
//! }
//! ```
//!
//! PDFs go through the same pipeline with an Inkscape round trip:
//!
//! ```rust,no_run
//! use svgdedup::{dedup_pdf_file, DedupConfig, Inkscape, NoFlatten};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let inkscape = Inkscape::discover()?;
//!     let report = dedup_pdf_file(
//!         "scan.pdf",
//!         "scan-dedup.pdf",
//!         None,
//!         &DedupConfig::default(),
//!         &inkscape,
//!         &mut NoFlatten,
//!     )?;
//!     eprintln!("{} images rewritten", report.clones);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `svgdedup` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! svgdedup = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod converter;
pub mod dedup;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod report;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{DedupConfig, DedupConfigBuilder, DEFAULT_OPACITY, MATCH_THRESHOLD};
pub use converter::{Inkscape, SvgConverter};
pub use dedup::{dedup_document, dedup_pdf_file, dedup_svg_file};
pub use error::DedupError;
pub use pipeline::document::{ImageElement, SvgDocument};
pub use pipeline::extract::{DecodedImage, PixelClass};
pub use pipeline::flatten::{
    FlattenAll, FlattenCandidate, FlattenDecider, FlattenDecision, NoFlatten, ScriptedDecider,
};
pub use pipeline::matcher::MatchVerdict;
pub use pipeline::namespaces::{NamespaceMap, SVG_NS, XLINK_NS};
pub use progress::{DedupProgressCallback, NoopProgressCallback, ProgressCallback};
pub use report::{DedupOutcome, DedupReport};

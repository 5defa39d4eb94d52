//! Pipeline stages for SVG image deduplication.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. a different duplicate matcher) without
//! touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! namespaces ──▶ document ──▶ extract ──▶ matcher ──▶ rewrite ──▶ flatten
//! (xmlns scan)   (events)     (base64)    (sqdiff)    (kept set)   (rects)
//! ```
//!
//! 1. [`namespaces`] — collect every `xmlns` binding into an explicit map
//! 2. [`document`]   — parse into an event stream that round-trips
//!    untouched elements byte for byte
//! 3. [`extract`]    — decode each `xlink:href` payload (data URI → base64
//!    → PNG) into a comparable raster
//! 4. [`matcher`]    — template matching between rasters; the only stage
//!    with real number crunching
//! 5. [`rewrite`]    — the canonical-set scan deciding kept images, clones
//!    and promotions
//! 6. [`flatten`]    — mean-colour rectangle replacement for kept images,
//!    behind the [`flatten::FlattenDecider`] policy trait

pub mod document;
pub mod extract;
pub mod flatten;
pub mod matcher;
pub mod namespaces;
pub mod rewrite;

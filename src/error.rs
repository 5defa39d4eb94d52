//! Error types for the svgdedup library.
//!
//! One error type, [`DedupError`], covers the whole pipeline. Every failure
//! here is fatal for the document being processed: a malformed payload, a
//! missing attribute or a failed Inkscape call leaves the document in an
//! unknown state, so the run stops rather than emitting a half-rewritten SVG.
//!
//! Variants that a user can act on carry a hint in their message (install
//! Inkscape, pass `--overwrite`, fix the attribute) so the CLI can print them
//! verbatim.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the svgdedup library.
#[derive(Debug, Error)]
pub enum DedupError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The destination file already exists and would be clobbered.
    #[error("Output file already exists: '{path}'\nPass --overwrite to replace it.")]
    DestinationExists { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The input path has an extension this tool does not handle.
    #[error("Unsupported input '{path}': expected a .svg or .pdf file")]
    UnsupportedInput { path: PathBuf },

    // ── Document errors ───────────────────────────────────────────────────
    /// The SVG is not well-formed XML.
    #[error("Failed to parse SVG: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Re-serialising the rewritten document failed.
    #[error("Failed to serialise SVG: {detail}")]
    Serialize { detail: String },

    /// An element is missing an attribute the rewrite depends on.
    #[error("<{element}> element is missing the '{attribute}' attribute")]
    MissingAttribute { element: String, attribute: String },

    // ── Payload errors ────────────────────────────────────────────────────
    /// A data URI could not be split into media type, encoding and payload.
    #[error("Malformed data URI on <image> element: {detail}")]
    MalformedDataUri { detail: String },

    /// The data URI declares an encoding other than base64.
    #[error("Unsupported data URI encoding '{marker}': only base64 is supported")]
    UnsupportedEncoding { marker: String },

    /// The base64 payload did not decode.
    #[error("Invalid base64 image payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded bytes are not a PNG the `image` crate can read.
    #[error("Failed to decode embedded PNG: {0}")]
    ImageDecode(#[from] image::ImageError),

    // ── Converter errors ──────────────────────────────────────────────────
    /// No usable Inkscape executable.
    #[error("Inkscape executable not found: {detail}\nInstall Inkscape or point --inkscape at the binary.")]
    ConverterNotFound { detail: String },

    /// Inkscape ran but exited with a failure status.
    #[error("Inkscape {action} failed ({status})\n{stderr}")]
    ConverterFailed {
        action: String,
        status: String,
        stderr: String,
    },

    // ── Interaction errors ────────────────────────────────────────────────
    /// An interactive prompt could not be read or parsed.
    #[error("Failed to read answer from terminal: {detail}")]
    Prompt { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O failure (reading input, temp files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

//! Top-level entry points: deduplicate a document, an SVG file, or a PDF.
//!
//! [`dedup_document`] is the pure core: text in, text out, no file system.
//! [`dedup_svg_file`] and [`dedup_pdf_file`] wrap it with input validation,
//! refuse-to-clobber output handling and (for PDFs) the Inkscape round trip
//! through a temp directory.

use crate::config::DedupConfig;
use crate::converter::SvgConverter;
use crate::error::DedupError;
use crate::pipeline::document::SvgDocument;
use crate::pipeline::extract::DecodedImage;
use crate::pipeline::flatten::{self, FlattenCandidate, FlattenDecider, FlattenDecision};
use crate::pipeline::namespaces::NamespaceMap;
use crate::pipeline::rewrite::CanonicalScan;
use crate::report::{DedupOutcome, DedupReport};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Deduplicate embedded images in an SVG document.
///
/// Scans every `<image>` in document order, rewrites duplicates into
/// `<use>` references to the kept copy, then offers each kept image to
/// `decider` for flattening. Returns the rewritten text plus a
/// [`DedupReport`]; the input is never modified.
pub fn dedup_document(
    svg_text: &str,
    config: &DedupConfig,
    decider: &mut dyn FlattenDecider,
) -> Result<DedupOutcome, DedupError> {
    let total_start = Instant::now();

    // ── Step 1: Collect namespace bindings ───────────────────────────────
    let namespaces = NamespaceMap::scan(svg_text)?;
    debug!(bindings = namespaces.len(), "namespace scan complete");

    // ── Step 2: Parse into an event stream ───────────────────────────────
    let mut doc = SvgDocument::parse(svg_text, namespaces)?;
    if doc.root_name() != Some("svg") {
        warn!(root = ?doc.root_name(), "document root is not <svg>");
    }
    let total_images = doc.images().len();
    if total_images == 0 && !doc.namespaces().declares_svg() {
        warn!("document declares no SVG namespace; no images can be recognised");
    }
    info!(images = total_images, "parsed SVG document");

    if let Some(cb) = &config.progress_callback {
        cb.on_scan_start(total_images);
    }

    // ── Step 3: Decode payloads and build the canonical set ──────────────
    let scan_start = Instant::now();
    let mut scan = CanonicalScan::new(config.threshold);
    let mut embedded_bytes_before = 0u64;
    for idx in 0..total_images {
        let el = &doc.images()[idx];
        let href = el.href_value().ok_or_else(|| DedupError::MissingAttribute {
            element: el.qname(),
            attribute: "xlink:href".into(),
        })?;
        let image = DecodedImage::from_href(href)?;
        embedded_bytes_before += image.payload_len();
        let duplicate = scan.offer(idx, image);
        if let Some(cb) = &config.progress_callback {
            cb.on_image_scanned(idx + 1, total_images, duplicate);
        }
    }
    let plan = scan.into_plan();
    let scan_duration_ms = scan_start.elapsed().as_millis() as u64;
    if let Some(cb) = &config.progress_callback {
        cb.on_scan_complete(plan.kept.len(), plan.clones.len());
    }

    // ── Step 4: Rewrite clones into <use> references ─────────────────────
    for clone in &plan.clones {
        let kept = &plan.kept[clone.kept_slot];
        let target = &doc.images()[kept.element_index];
        let target_id = target
            .id()
            .ok_or_else(|| DedupError::MissingAttribute {
                element: target.qname(),
                attribute: "id".into(),
            })?
            .to_string();
        doc.rewrite_as_use(clone.element_index, &target_id)?;
    }

    // ── Step 5: Offer kept images for flattening ─────────────────────────
    let mut flattened = 0usize;
    let mut embedded_bytes_after = 0u64;
    for (pos, kept) in plan.kept.iter().enumerate() {
        let candidate = {
            let el = &doc.images()[kept.element_index];
            FlattenCandidate {
                position: pos + 1,
                total: plan.kept.len(),
                id: el.id().map(str::to_owned),
                width: kept.image.width(),
                height: kept.image.height(),
                mean_color: flatten::mean_rgb(&kept.image),
                color_stddev: flatten::rgb_stddev(&kept.image),
            }
        };
        match decider.decide(&candidate, &kept.image)? {
            FlattenDecision::Keep => {
                embedded_bytes_after += kept.image.payload_len();
            }
            FlattenDecision::Flatten { opacity } => {
                let opacity = opacity.unwrap_or(config.opacity);
                let style = flatten::flatten_style(&kept.image, Some(opacity));
                doc.rewrite_as_rect(kept.element_index, &style)?;
                flattened += 1;
                debug!(id = ?candidate.id, opacity, "flattened image to rect");
            }
        }
    }

    // ── Step 6: Serialise and report ─────────────────────────────────────
    let svg = doc.serialize()?;
    let report = DedupReport {
        images_found: total_images,
        kept: plan.kept.len(),
        clones: plan.clones.len(),
        promotions: plan.promotions,
        flattened,
        incomparable_pairs: plan.incomparable_pairs,
        embedded_bytes_before,
        embedded_bytes_after,
        scan_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    info!(
        clones = report.clones,
        flattened = report.flattened,
        bytes_saved = report.bytes_saved(),
        "dedup complete"
    );
    Ok(DedupOutcome { svg, report })
}

/// Deduplicate an SVG file on disk.
///
/// Refuses to overwrite an existing `output`; the write is atomic (temp
/// file + rename) so a crash can never leave a half-written document.
pub fn dedup_svg_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &DedupConfig,
    decider: &mut dyn FlattenDecider,
) -> Result<DedupReport, DedupError> {
    let input = input.as_ref();
    let output = output.as_ref();
    let text = read_input(input)?;
    ensure_absent(output)?;

    let outcome = dedup_document(&text, config, decider)?;
    write_atomic(output, outcome.svg.as_bytes())?;
    info!("Wrote deduplicated SVG to '{}'", output.display());
    Ok(outcome.report)
}

/// Deduplicate the images inside a PDF.
///
/// The PDF is exported to plain SVG with `converter`, deduplicated, and
/// converted back. When `keep_svg` is given, the rewritten SVG is also
/// written there; otherwise it only exists inside the run's temp directory.
pub fn dedup_pdf_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    keep_svg: Option<&Path>,
    config: &DedupConfig,
    converter: &dyn SvgConverter,
    decider: &mut dyn FlattenDecider,
) -> Result<DedupReport, DedupError> {
    let input = input.as_ref();
    let output = output.as_ref();
    validate_pdf(input)?;
    ensure_absent(output)?;
    if let Some(svg_path) = keep_svg {
        ensure_absent(svg_path)?;
    }

    // The temp dir must outlive both Inkscape calls.
    let temp_dir = TempDir::new()?;
    let stem = input
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| OsString::from("document"));

    let mut work_name = stem.clone();
    work_name.push(".svg");
    let work_svg = temp_dir.path().join(&work_name);
    converter.pdf_to_svg(input, &work_svg)?;

    let text = read_input(&work_svg)?;
    let outcome = dedup_document(&text, config, decider)?;

    let deduped_svg: PathBuf = match keep_svg {
        Some(path) => path.to_path_buf(),
        None => {
            let mut name = stem;
            name.push("-dedup.svg");
            temp_dir.path().join(&name)
        }
    };
    write_atomic(&deduped_svg, outcome.svg.as_bytes())?;
    converter.svg_to_pdf(&deduped_svg, output)?;
    info!("Wrote deduplicated PDF to '{}'", output.display());
    Ok(outcome.report)
}

/// Read an input file, with a friendlier error when it does not exist.
fn read_input(path: &Path) -> Result<String, DedupError> {
    if !path.exists() {
        return Err(DedupError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(fs::read_to_string(path)?)
}

/// Validate existence and `%PDF` magic bytes.
fn validate_pdf(path: &Path) -> Result<(), DedupError> {
    use std::io::Read;

    if !path.exists() {
        return Err(DedupError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let mut f = fs::File::open(path)?;
    let mut magic = [0u8; 4];
    // Files shorter than the magic are left for the converter to reject.
    if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
        return Err(DedupError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

fn ensure_absent(path: &Path) -> Result<(), DedupError> {
    if path.exists() {
        return Err(DedupError::DestinationExists {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Atomic write: temp file in the same directory, then rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DedupError> {
    let wrap = |e: std::io::Error| DedupError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(wrap)?;
        }
    }
    let mut ext = path
        .extension()
        .map(|e| e.to_os_string())
        .unwrap_or_default();
    ext.push(".tmp");
    let tmp_path = path.with_extension(ext);
    fs::write(&tmp_path, bytes).map_err(wrap)?;
    fs::rename(&tmp_path, path).map_err(wrap)?;
    Ok(())
}

//! End-to-end integration tests for svgdedup.
//!
//! Every fixture is synthesised in memory: PNGs are encoded with the `image`
//! crate and wrapped into data URIs, so the tests need no files on disk and
//! no network. The one test that talks to a real Inkscape skips itself when
//! the executable is not installed.
//!
//! Run with:
//!   cargo test --test dedup -- --nocapture

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use svgdedup::{
    dedup_document, dedup_svg_file, DedupConfig, DedupError, DedupProgressCallback, FlattenAll,
    FlattenDecision, Inkscape, NoFlatten, ScriptedDecider, SvgConverter,
};

// ── Fixture helpers ──────────────────────────────────────────────────────────

/// Deterministic texture with variance in every channel. Textured pixels are
/// what real figures contain; they also keep the normalised match score well
/// defined (a zero-variance image has no signal to normalise against).
fn textured(w: u32, h: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| {
        Rgb([
            (x * 23 + y * 7) as u8,
            (x * 11 + y * 31) as u8,
            (x * 5 + y * 13) as u8,
        ])
    })
}

/// The photographic negative of [`textured`]; unrelated to it as far as the
/// matcher is concerned.
fn inverse_textured(w: u32, h: u32) -> RgbImage {
    let mut img = textured(w, h);
    for px in img.pixels_mut() {
        px.0 = [255 - px.0[0], 255 - px.0[1], 255 - px.0[2]];
    }
    img
}

fn solid(w: u32, h: u32, rgb: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(w, h, Rgb(rgb))
}

/// Encode to PNG and wrap in the data-URI shape Inkscape writes.
fn data_uri(img: RgbImage) -> String {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("png encode");
    format!("data:image/png;base64,{}", STANDARD.encode(buf))
}

/// An `<image>` element styled the way Inkscape's PDF import writes them.
fn image_el(id: &str, w: u32, h: u32, href: &str) -> String {
    format!(
        r#"  <image id="{id}" x="0" y="0" width="{w}" height="{h}" transform="matrix(1,0,0,1,0,0)" preserveAspectRatio="none" xlink:href="{href}"/>"#
    )
}

fn svg_doc(elements: &[String]) -> String {
    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" width=\"400\" height=\"300\">\n{}\n</svg>",
        elements.join("\n")
    )
}

// ── Duplicate folding ────────────────────────────────────────────────────────

/// The central scenario: three images where the third is a crop of the
/// first. The crop must fold into a `<use>` reference while the unrelated
/// image stays embedded.
#[test]
fn three_image_document_folds_the_repeat() {
    let full = textured(12, 12);
    let crop = image::imageops::crop_imm(&full, 0, 0, 8, 8).to_image();

    let uri_a = data_uri(full);
    let uri_b = data_uri(inverse_textured(10, 10));
    let uri_a2 = data_uri(crop);

    let doc = svg_doc(&[
        image_el("imgA", 12, 12, &uri_a),
        image_el("imgB", 10, 10, &uri_b),
        image_el("imgA2", 8, 8, &uri_a2),
    ]);

    let outcome = dedup_document(&doc, &DedupConfig::default(), &mut NoFlatten)
        .expect("dedup should succeed");

    assert_eq!(outcome.report.images_found, 3);
    assert_eq!(outcome.report.kept, 2);
    assert_eq!(outcome.report.clones, 1);
    assert_eq!(outcome.report.promotions, 0);
    assert!(outcome.report.changed());

    // The crop became a reference to the kept original; its id survives.
    assert!(
        outcome.svg.contains(r##"xlink:href="#imgA""##),
        "expected a fragment link to imgA"
    );
    assert!(outcome.svg.contains(r#"<use id="imgA2""#));

    // Both kept payloads are still embedded; the clone's is gone.
    assert!(outcome.svg.contains(&uri_a));
    assert!(outcome.svg.contains(&uri_b));
    assert!(!outcome.svg.contains(&uri_a2));

    // Byte accounting: exactly the clone's payload was saved.
    assert_eq!(outcome.report.bytes_saved(), uri_a2.len() as u64);
    assert!(outcome.report.scan_duration_ms <= outcome.report.total_duration_ms);
}

/// When the small copy comes first, the later full-size copy must take over
/// as canonical and the small one must point at it, never the other way
/// round.
#[test]
fn later_larger_duplicate_takes_over_as_canonical() {
    let full = textured(12, 12);
    let crop = image::imageops::crop_imm(&full, 0, 0, 8, 8).to_image();

    let uri_small = data_uri(crop);
    let uri_big = data_uri(full);

    let doc = svg_doc(&[
        image_el("small", 8, 8, &uri_small),
        image_el("big", 12, 12, &uri_big),
    ]);

    let outcome = dedup_document(&doc, &DedupConfig::default(), &mut NoFlatten)
        .expect("dedup should succeed");

    assert_eq!(outcome.report.kept, 1);
    assert_eq!(outcome.report.clones, 1);
    assert_eq!(outcome.report.promotions, 1);

    assert!(
        outcome.svg.contains(r##"xlink:href="#big""##),
        "the small copy must reference the promoted one, got: {}",
        outcome.svg
    );
    assert!(outcome.svg.contains(&uri_big));
    assert!(!outcome.svg.contains(&uri_small));
    assert_eq!(outcome.report.bytes_saved(), uri_small.len() as u64);
}

/// A duplicate whose kept counterpart has no id cannot be linked to.
#[test]
fn duplicate_of_unidentified_image_fails_with_missing_attribute() {
    let uri = data_uri(textured(10, 10));
    let anonymous = format!(
        r#"  <image x="0" y="0" width="10" height="10" xlink:href="{uri}"/>"#
    );

    let doc = svg_doc(&[anonymous, image_el("copy", 10, 10, &uri)]);

    let err = dedup_document(&doc, &DedupConfig::default(), &mut NoFlatten).unwrap_err();
    match err {
        DedupError::MissingAttribute { attribute, .. } => assert_eq!(attribute, "id"),
        other => panic!("expected MissingAttribute, got {other:?}"),
    }
}

/// Distinct images must pass through untouched, byte for byte: comments,
/// formatting and escaped attribute values included.
#[test]
fn document_with_no_duplicates_round_trips_byte_identical() {
    let uri_a = data_uri(textured(9, 9));
    let uri_b = data_uri(inverse_textured(7, 7));

    let doc = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\">\n\
         <!-- two unrelated bitmaps -->\n\
         <image id=\"a\" desc=\"a&amp;b\" width=\"9\" height=\"9\" xlink:href=\"{uri_a}\"/>\n\
         <image id=\"b\" width=\"7\" height=\"7\" xlink:href=\"{uri_b}\"/>\n\
         </svg>"
    );

    let outcome = dedup_document(&doc, &DedupConfig::default(), &mut NoFlatten)
        .expect("dedup should succeed");

    assert_eq!(outcome.report.images_found, 2);
    assert_eq!(outcome.report.clones, 0);
    assert!(!outcome.report.changed());
    assert_eq!(outcome.svg, doc);
}

/// Prefixed documents (`<svg:image>`) keep their prefixes through the
/// rewrite.
#[test]
fn prefixed_document_keeps_its_prefixes() {
    let uri = data_uri(textured(10, 10));
    let doc = format!(
        r#"<svg:svg xmlns:svg="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink"><svg:image id="one" xlink:href="{uri}"/><svg:image id="two" xlink:href="{uri}"/></svg:svg>"#
    );

    let outcome = dedup_document(&doc, &DedupConfig::default(), &mut NoFlatten)
        .expect("dedup should succeed");

    assert_eq!(outcome.report.clones, 1);
    assert!(
        outcome.svg.contains(r##"<svg:use id="two" xlink:href="#one"/>"##),
        "got: {}",
        outcome.svg
    );
}

// ── Flattening ───────────────────────────────────────────────────────────────

/// `FlattenAll` turns every kept image into a `<rect>` of its mean colour.
#[test]
fn flatten_all_rewrites_kept_images_to_rects() {
    let uri = data_uri(solid(6, 6, [200, 100, 50]));
    let doc = svg_doc(&[image_el("imgC", 6, 6, &uri)]);

    let mut decider = FlattenAll { opacity: None };
    let outcome = dedup_document(&doc, &DedupConfig::default(), &mut decider)
        .expect("dedup should succeed");

    assert_eq!(outcome.report.flattened, 1);
    assert_eq!(outcome.report.embedded_bytes_after, 0);

    assert!(outcome.svg.contains(r#"<rect id="imgC""#), "got: {}", outcome.svg);
    assert!(
        outcome.svg.contains("fill:#c86432"),
        "mean colour at full opacity, got: {}",
        outcome.svg
    );
    assert!(!outcome.svg.contains("<image"));
    assert!(!outcome.svg.contains("xlink:href"));
    // The image-placement attributes make no sense on a rect.
    assert!(!outcome.svg.contains("transform="));
    assert!(!outcome.svg.contains("preserveAspectRatio"));
}

/// Half-opacity blending against white: (200,100,50) must come out as the
/// known `#e3b198`.
#[test]
fn scripted_half_opacity_blend_matches_known_vector() {
    let uri = data_uri(solid(6, 6, [200, 100, 50]));
    let doc = svg_doc(&[image_el("imgC", 6, 6, &uri)]);

    let mut decider = ScriptedDecider::new(vec![FlattenDecision::Flatten { opacity: Some(0.5) }]);
    let outcome = dedup_document(&doc, &DedupConfig::default(), &mut decider)
        .expect("dedup should succeed");

    assert_eq!(outcome.report.flattened, 1);
    assert!(
        outcome.svg.contains("fill:#e3b198"),
        "got: {}",
        outcome.svg
    );
}

// ── Progress callbacks ───────────────────────────────────────────────────────

/// Verify progress events fire once per image across the whole pipeline.
#[test]
fn progress_callback_sees_every_image() {
    struct TestCallback {
        started_total: Arc<AtomicUsize>,
        scanned: Arc<AtomicUsize>,
        duplicates: Arc<AtomicUsize>,
        final_kept: Arc<AtomicUsize>,
        final_clones: Arc<AtomicUsize>,
    }

    impl DedupProgressCallback for TestCallback {
        fn on_scan_start(&self, total_images: usize) {
            self.started_total.store(total_images, Ordering::SeqCst);
        }
        fn on_image_scanned(&self, _index: usize, _total: usize, duplicate: bool) {
            self.scanned.fetch_add(1, Ordering::SeqCst);
            if duplicate {
                self.duplicates.fetch_add(1, Ordering::SeqCst);
            }
        }
        fn on_scan_complete(&self, kept: usize, clones: usize) {
            self.final_kept.store(kept, Ordering::SeqCst);
            self.final_clones.store(clones, Ordering::SeqCst);
        }
    }

    let started_total = Arc::new(AtomicUsize::new(0));
    let scanned = Arc::new(AtomicUsize::new(0));
    let duplicates = Arc::new(AtomicUsize::new(0));
    let final_kept = Arc::new(AtomicUsize::new(0));
    let final_clones = Arc::new(AtomicUsize::new(0));

    let cb = Arc::new(TestCallback {
        started_total: Arc::clone(&started_total),
        scanned: Arc::clone(&scanned),
        duplicates: Arc::clone(&duplicates),
        final_kept: Arc::clone(&final_kept),
        final_clones: Arc::clone(&final_clones),
    });

    let full = textured(12, 12);
    let crop = image::imageops::crop_imm(&full, 0, 0, 8, 8).to_image();
    let doc = svg_doc(&[
        image_el("imgA", 12, 12, &data_uri(full)),
        image_el("imgB", 10, 10, &data_uri(inverse_textured(10, 10))),
        image_el("imgA2", 8, 8, &data_uri(crop)),
    ]);

    let config = DedupConfig::builder()
        .progress_callback(cb as Arc<dyn DedupProgressCallback>)
        .build()
        .expect("valid config");

    dedup_document(&doc, &config, &mut NoFlatten).expect("dedup should succeed");

    assert_eq!(started_total.load(Ordering::SeqCst), 3);
    assert_eq!(scanned.load(Ordering::SeqCst), 3);
    assert_eq!(duplicates.load(Ordering::SeqCst), 1);
    assert_eq!(final_kept.load(Ordering::SeqCst), 2);
    assert_eq!(final_clones.load(Ordering::SeqCst), 1);
}

// ── File-level round trip ────────────────────────────────────────────────────

/// Full file flow: read, dedup, atomic write. The input must survive
/// untouched.
#[test]
fn svg_file_round_trip_writes_output_and_leaves_input() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("figure.svg");
    let output = dir.path().join("figure-dedup.svg");

    let uri = data_uri(textured(10, 10));
    let doc = svg_doc(&[
        image_el("one", 10, 10, &uri),
        image_el("two", 10, 10, &uri),
    ]);
    std::fs::write(&input, &doc).expect("write input");

    let report = dedup_svg_file(&input, &output, &DedupConfig::default(), &mut NoFlatten)
        .expect("dedup should succeed");

    assert_eq!(report.clones, 1);
    assert_eq!(std::fs::read_to_string(&input).expect("reread input"), doc);

    let out = std::fs::read_to_string(&output).expect("read output");
    assert!(out.contains(r#"<use id="two""#), "got: {out}");
    assert!(out.contains(r##"xlink:href="#one""##), "got: {out}");
}

// ── Inkscape round trip (skipped unless installed) ───────────────────────────

/// Drive a real Inkscape through both conversion directions. Runs only when
/// an `inkscape` binary is on PATH, so CI without it just skips.
#[test]
fn inkscape_round_trip_when_installed() {
    let converter = match Inkscape::discover() {
        Ok(c) => c,
        Err(_) => {
            println!("SKIP — Inkscape not installed");
            return;
        }
    };
    println!("Using Inkscape at {}", converter.executable().display());

    let dir = tempfile::tempdir().expect("tempdir");
    let svg = dir.path().join("plain.svg");
    let pdf = dir.path().join("plain.pdf");
    let back = dir.path().join("back.svg");

    std::fs::write(
        &svg,
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="40"><rect width="40" height="40" fill="#c86432"/></svg>"##,
    )
    .expect("write svg");

    converter.svg_to_pdf(&svg, &pdf).expect("svg -> pdf");
    let bytes = std::fs::read(&pdf).expect("read pdf");
    assert!(bytes.starts_with(b"%PDF"), "Inkscape must write a real PDF");

    converter.pdf_to_svg(&pdf, &back).expect("pdf -> svg");
    let text = std::fs::read_to_string(&back).expect("read svg");
    assert!(text.contains("<svg"), "plain SVG export must be SVG text");
}

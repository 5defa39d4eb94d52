//! Duplicate detection between decoded rasters.
//!
//! Two embedded images are duplicates when sliding the smaller one over the
//! larger finds an alignment where the normalised sum of squared differences
//! drops below the threshold. Score 0 means pixel-identical at that
//! alignment, so true re-embeddings and crops of a larger original both
//! land well under [`crate::config::MATCH_THRESHOLD`].
//!
//! Multi-channel images are scored one channel at a time and combined
//! pessimistically: at each alignment the worst channel decides. A channel
//! whose normalised score is undefined at some alignment (a window with zero
//! energy makes the denominator zero) disqualifies that alignment rather
//! than silently passing it, which keeps a solid red block from matching a
//! solid magenta one on their shared empty channel.

use crate::pipeline::extract::DecodedImage;
use image::Luma;
use imageproc::definitions::Image;
use imageproc::template_matching::{match_template, MatchTemplateMethod};
use std::time::Instant;
use tracing::{debug, warn};

/// Outcome of comparing two decoded images.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchVerdict {
    /// The best alignment scored below the threshold.
    Match { score: f32 },
    /// Comparable, but the best alignment stayed above the threshold.
    NoMatch { score: f32 },
    /// Greyscale and colour rasters cannot be scored against each other.
    Incomparable,
}

impl MatchVerdict {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchVerdict::Match { .. })
    }
}

/// Compare two images and decide whether they show the same picture.
///
/// The raster with more pixels is searched; the other slides over it as the
/// template, cropped to the searched raster's extent so it never exceeds it
/// in either axis. On a pixel-count tie the first operand is the template.
/// Only the channel prefix both images share takes part in the score.
pub fn compare(a: &DecodedImage, b: &DecodedImage, threshold: f32) -> MatchVerdict {
    if a.class() != b.class() {
        warn!(
            a_channels = a.channels(),
            b_channels = b.channels(),
            "skipping comparison between greyscale and colour images"
        );
        return MatchVerdict::Incomparable;
    }
    if a.pixel_count() == 0 || b.pixel_count() == 0 {
        warn!("skipping comparison with a zero-area image");
        return MatchVerdict::Incomparable;
    }

    // Byte-identical rasters short-circuit the sliding comparison. This also
    // answers for uniform images whose normalised score would be 0/0.
    if a.same_pixels(b) {
        return MatchVerdict::Match { score: 0.0 };
    }

    let (image, template) = if a.pixel_count() > b.pixel_count() {
        (a, b)
    } else {
        (b, a)
    };
    let crop_w = template.width().min(image.width());
    let crop_h = template.height().min(image.height());
    let shared = template.channels().min(image.channels());

    let start = Instant::now();
    let surfaces: Vec<Image<Luma<f32>>> = (0..shared)
        .map(|ch| {
            let plane = image.channel_plane(ch, image.width(), image.height());
            let crop = template.channel_plane(ch, crop_w, crop_h);
            match_template(
                &plane,
                &crop,
                MatchTemplateMethod::SumOfSquaredErrorsNormalized,
            )
        })
        .collect();

    let positions = surfaces[0].as_raw().len();
    let mut best = f32::INFINITY;
    for i in 0..positions {
        let mut worst = 0.0f32;
        let mut defined = true;
        for surface in &surfaces {
            let v = surface.as_raw()[i];
            if !v.is_finite() {
                defined = false;
                break;
            }
            if v > worst {
                worst = v;
            }
        }
        if defined && worst < best {
            best = worst;
        }
    }

    debug!(
        searched = format_args!("{}x{}", image.width(), image.height()),
        template = format_args!("{}x{}", crop_w, crop_h),
        channels = shared,
        score = best,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "template comparison"
    );

    if best < threshold {
        MatchVerdict::Match { score: best }
    } else {
        MatchVerdict::NoMatch { score: best }
    }
}

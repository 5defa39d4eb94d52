//! Flattening: replace a kept image with a flat-colour rectangle.
//!
//! Charts and decorative blocks often survive PDF export as huge bitmaps
//! that are visually a single colour. Flattening swaps such an `<image>` for
//! a `<rect>` filled with the image's mean colour, blended over white at a
//! chosen opacity (the rect itself is written fully opaque, so the blend
//! bakes the transparency in).
//!
//! Deciding *which* images deserve this is a judgement call, so the policy
//! lives behind [`FlattenDecider`]. The CLI implements it with an
//! interactive prompt; library callers use [`NoFlatten`], [`FlattenAll`] or
//! their own implementation. Everything in this module is deterministic
//! given the decisions.

use crate::config::DEFAULT_OPACITY;
use crate::error::DedupError;
use crate::pipeline::extract::DecodedImage;
use std::collections::VecDeque;

/// What to do with one kept image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlattenDecision {
    /// Leave the embedded image as it is.
    Keep,
    /// Replace it with a flat rectangle. `None` uses the configured default
    /// opacity.
    Flatten { opacity: Option<f64> },
}

/// Everything a decider gets to see about one kept image.
#[derive(Debug, Clone)]
pub struct FlattenCandidate {
    /// 1-indexed position among the kept images.
    pub position: usize,
    /// Total kept images offered for flattening.
    pub total: usize,
    /// `id` attribute of the element, when present.
    pub id: Option<String>,
    pub width: u32,
    pub height: u32,
    /// Mean R, G, B over every pixel.
    pub mean_color: [f64; 3],
    /// Per-channel standard deviation; near zero means visually flat.
    pub color_stddev: [f64; 3],
}

/// Policy hook: decides per kept image whether to flatten it.
///
/// Takes `&mut self` so interactive implementations can carry state between
/// prompts (e.g. "flatten all remaining").
pub trait FlattenDecider {
    fn decide(
        &mut self,
        candidate: &FlattenCandidate,
        image: &DecodedImage,
    ) -> Result<FlattenDecision, DedupError>;
}

/// Never flattens anything. The right default for unattended runs.
pub struct NoFlatten;

impl FlattenDecider for NoFlatten {
    fn decide(
        &mut self,
        _candidate: &FlattenCandidate,
        _image: &DecodedImage,
    ) -> Result<FlattenDecision, DedupError> {
        Ok(FlattenDecision::Keep)
    }
}

/// Flattens every kept image with one fixed opacity.
pub struct FlattenAll {
    pub opacity: Option<f64>,
}

impl FlattenDecider for FlattenAll {
    fn decide(
        &mut self,
        _candidate: &FlattenCandidate,
        _image: &DecodedImage,
    ) -> Result<FlattenDecision, DedupError> {
        Ok(FlattenDecision::Flatten {
            opacity: self.opacity,
        })
    }
}

/// Replays a fixed list of decisions in order, then keeps everything.
/// Intended for tests and batch scripts.
pub struct ScriptedDecider {
    decisions: VecDeque<FlattenDecision>,
}

impl ScriptedDecider {
    pub fn new(decisions: Vec<FlattenDecision>) -> Self {
        Self {
            decisions: decisions.into(),
        }
    }
}

impl FlattenDecider for ScriptedDecider {
    fn decide(
        &mut self,
        _candidate: &FlattenCandidate,
        _image: &DecodedImage,
    ) -> Result<FlattenDecision, DedupError> {
        Ok(self.decisions.pop_front().unwrap_or(FlattenDecision::Keep))
    }
}

/// Mean R, G, B over every pixel. Alpha is ignored, not premultiplied.
pub fn mean_rgb(image: &DecodedImage) -> [f64; 3] {
    let mut sums = [0u64; 3];
    for px in image.rgba().pixels() {
        for (sum, value) in sums.iter_mut().zip(px.0.iter()) {
            *sum += u64::from(*value);
        }
    }
    let n = image.pixel_count() as f64;
    [
        sums[0] as f64 / n,
        sums[1] as f64 / n,
        sums[2] as f64 / n,
    ]
}

/// Per-channel population standard deviation of R, G, B.
pub fn rgb_stddev(image: &DecodedImage) -> [f64; 3] {
    let mean = mean_rgb(image);
    let mut sq_sums = [0f64; 3];
    for px in image.rgba().pixels() {
        for c in 0..3 {
            let d = f64::from(px.0[c]) - mean[c];
            sq_sums[c] += d * d;
        }
    }
    let n = image.pixel_count() as f64;
    [
        (sq_sums[0] / n).sqrt(),
        (sq_sums[1] / n).sqrt(),
        (sq_sums[2] / n).sqrt(),
    ]
}

/// Blend a colour over a white background at the given opacity.
pub fn blend_over_white(color: [f64; 3], opacity: f64) -> [f64; 3] {
    [
        opacity * color[0] + (1.0 - opacity) * 255.0,
        opacity * color[1] + (1.0 - opacity) * 255.0,
        opacity * color[2] + (1.0 - opacity) * 255.0,
    ]
}

/// Lowercase `#rrggbb` for a colour in 0.0–255.0 per channel.
///
/// Channels are clamped and truncated, not rounded, so `227.5` becomes
/// `0xe3`.
pub fn hex_color(color: [f64; 3]) -> String {
    let channel = |c: f64| c.clamp(0.0, 255.0) as u8;
    format!(
        "#{:02x}{:02x}{:02x}",
        channel(color[0]),
        channel(color[1]),
        channel(color[2])
    )
}

/// The full `style` attribute for a flattened rectangle.
pub fn rect_style(hex: &str) -> String {
    format!(
        "fill:{hex};fill-opacity:1.0;stroke:none;stroke-width:1.5;\
stroke-miterlimit:4;stroke-dasharray:none;stroke-opacity:1"
    )
}

/// Compose the style attribute for flattening `image` at `opacity`
/// (`None` = [`DEFAULT_OPACITY`]).
pub fn flatten_style(image: &DecodedImage, opacity: Option<f64>) -> String {
    let opacity = opacity.unwrap_or(DEFAULT_OPACITY);
    let blended = blend_over_white(mean_rgb(image), opacity);
    rect_style(&hex_color(blended))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn solid(r: u8, g: u8, b: u8) -> DecodedImage {
        DecodedImage::from_rgba8(RgbaImage::from_pixel(4, 4, Rgba([r, g, b, 255])))
    }

    #[test]
    fn mean_of_uniform_image_is_the_pixel() {
        assert_eq!(mean_rgb(&solid(10, 20, 30)), [10.0, 20.0, 30.0]);
    }

    #[test]
    fn stddev_of_uniform_image_is_zero() {
        assert_eq!(rgb_stddev(&solid(10, 20, 30)), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn stddev_of_two_level_image() {
        let img = DecodedImage::from_rgba8(RgbaImage::from_fn(4, 4, |x, _| {
            Rgba([if x < 2 { 0 } else { 10 }, 0, 0, 255])
        }));
        let std = rgb_stddev(&img);
        assert!((std[0] - 5.0).abs() < 1e-9, "got {}", std[0]);
        assert_eq!(std[1], 0.0);
    }

    #[test]
    fn half_opacity_blend_truncates_to_hex() {
        let blended = blend_over_white([200.0, 100.0, 50.0], 0.5);
        assert_eq!(blended, [227.5, 177.5, 152.5]);
        assert_eq!(hex_color(blended), "#e3b198");
    }

    #[test]
    fn full_opacity_keeps_the_colour() {
        let blended = blend_over_white([200.0, 100.0, 50.0], 1.0);
        assert_eq!(hex_color(blended), "#c86432");
    }

    #[test]
    fn hex_clamps_out_of_range_channels() {
        assert_eq!(hex_color([-3.0, 260.0, 255.0]), "#00ffff");
    }

    #[test]
    fn rect_style_matches_inkscape_shape() {
        assert_eq!(
            rect_style("#e3b198"),
            "fill:#e3b198;fill-opacity:1.0;stroke:none;stroke-width:1.5;\
stroke-miterlimit:4;stroke-dasharray:none;stroke-opacity:1"
        );
    }

    #[test]
    fn flatten_style_uses_default_opacity_when_unset() {
        let style = flatten_style(&solid(200, 100, 50), None);
        assert!(style.contains("#c86432"), "got: {style}");
        let style = flatten_style(&solid(200, 100, 50), Some(0.5));
        assert!(style.contains("#e3b198"), "got: {style}");
    }

    #[test]
    fn scripted_decider_replays_then_keeps() {
        let mut decider = ScriptedDecider::new(vec![
            FlattenDecision::Flatten { opacity: Some(0.5) },
            FlattenDecision::Keep,
        ]);
        let candidate = FlattenCandidate {
            position: 1,
            total: 1,
            id: None,
            width: 4,
            height: 4,
            mean_color: [0.0; 3],
            color_stddev: [0.0; 3],
        };
        let img = solid(1, 2, 3);
        assert_eq!(
            decider.decide(&candidate, &img).unwrap(),
            FlattenDecision::Flatten { opacity: Some(0.5) }
        );
        assert_eq!(decider.decide(&candidate, &img).unwrap(), FlattenDecision::Keep);
        assert_eq!(decider.decide(&candidate, &img).unwrap(), FlattenDecision::Keep);
    }
}

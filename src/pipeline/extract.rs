//! Payload extraction: `xlink:href` attribute text → decoded raster.
//!
//! Inkscape embeds bitmaps as base64 PNG data URIs
//! (`data:image/png;base64,iVBOR…`). Some generators skip the URI dressing
//! and store bare base64, so both shapes are accepted. Whatever declared
//! media type the URI carries, the decoded bytes must be a PNG; that is the
//! only payload format PDF-derived SVGs use in practice.

use crate::error::DedupError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
use tracing::debug;

/// Whether a raster carries colour information or only luminance.
///
/// Greyscale and colour rasters are never compared against each other; the
/// sum-of-squares score between a single-channel and a three-channel image is
/// not meaningful, so the matcher reports such pairs as incomparable instead
/// of guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelClass {
    Gray,
    Color,
}

/// One decoded embedded image.
///
/// Pixels are normalised to RGBA for uniform access; the original channel
/// count and class are kept alongside so the matcher can honour what the PNG
/// actually contained. For greyscale sources, R = G = B = luminance and the
/// alpha plane holds the source alpha (or 255 when there was none).
#[derive(Debug, Clone)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    channels: u8,
    class: PixelClass,
    rgba: RgbaImage,
    payload_len: u64,
}

impl DecodedImage {
    /// Decode the payload carried by an `xlink:href` attribute value.
    pub fn from_href(href_value: &str) -> Result<Self, DedupError> {
        let payload = split_payload(href_value)?;
        let bytes = decode_base64(payload)?;
        let img = image::load_from_memory_with_format(&bytes, ImageFormat::Png)?;
        Ok(Self::from_dynamic(img, href_value.len() as u64))
    }

    fn from_dynamic(img: DynamicImage, payload_len: u64) -> Self {
        let color = img.color();
        let class = if color.has_color() {
            PixelClass::Color
        } else {
            PixelClass::Gray
        };
        let decoded = Self {
            width: img.width(),
            height: img.height(),
            channels: color.channel_count(),
            class,
            rgba: img.to_rgba8(),
            payload_len,
        };
        debug!(
            width = decoded.width,
            height = decoded.height,
            channels = decoded.channels,
            "decoded embedded PNG"
        );
        decoded
    }

    /// Wrap an RGBA raster (4 channels, colour class).
    pub fn from_rgba8(img: RgbaImage) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
            channels: 4,
            class: PixelClass::Color,
            rgba: img,
            payload_len: 0,
        }
    }

    /// Wrap an RGB raster (3 channels, colour class). Alpha is filled with 255.
    pub fn from_rgb8(img: RgbImage) -> Self {
        let rgba = DynamicImage::ImageRgb8(img).to_rgba8();
        Self {
            width: rgba.width(),
            height: rgba.height(),
            channels: 3,
            class: PixelClass::Color,
            rgba,
            payload_len: 0,
        }
    }

    /// Wrap a greyscale raster (1 channel, grey class).
    pub fn from_luma8(img: GrayImage) -> Self {
        let rgba = DynamicImage::ImageLuma8(img).to_rgba8();
        Self {
            width: rgba.width(),
            height: rgba.height(),
            channels: 1,
            class: PixelClass::Gray,
            rgba,
            payload_len: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Total pixels, the measure used to decide which duplicate to keep.
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Channel count declared by the source PNG (1, 2, 3 or 4).
    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn class(&self) -> PixelClass {
        self.class
    }

    /// Bytes the payload occupied in the document's attribute text.
    pub fn payload_len(&self) -> u64 {
        self.payload_len
    }

    /// The normalised RGBA raster.
    pub fn rgba(&self) -> &RgbaImage {
        &self.rgba
    }

    /// Extract one source channel as a single-channel plane, cropped to
    /// `width` × `height` (top-left anchored). Channel indices follow the
    /// source layout: for grey-class images 0 is luminance and 1 is alpha;
    /// for colour-class images 0..4 are R, G, B, A.
    pub(crate) fn channel_plane(&self, channel: u8, width: u32, height: u32) -> GrayImage {
        let idx = match (self.class, channel) {
            (PixelClass::Gray, 0) => 0,
            (PixelClass::Gray, _) => 3,
            (PixelClass::Color, c) => c as usize,
        };
        GrayImage::from_fn(width, height, |x, y| {
            image::Luma([self.rgba.get_pixel(x, y)[idx]])
        })
    }

    /// True when both rasters have identical dimensions, channel layout and
    /// pixel bytes.
    pub(crate) fn same_pixels(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.channels == other.channels
            && self.rgba.as_raw() == other.rgba.as_raw()
    }
}

/// Split an `xlink:href` value into its base64 payload.
///
/// Data URIs are dissected at their first `/`, `;` and `,`; the encoding
/// marker between `;` and `,` must literally be `base64`. Values that do not
/// look like a data URI are taken to be bare base64.
fn split_payload(value: &str) -> Result<&str, DedupError> {
    if !value.starts_with("data:image") {
        debug!("href value is not a data URI; treating it as bare base64");
        return Ok(value);
    }

    let slash = value.find('/').ok_or_else(|| DedupError::MalformedDataUri {
        detail: "missing '/' after media type".into(),
    })?;
    let semi = value.find(';').ok_or_else(|| DedupError::MalformedDataUri {
        detail: "missing ';' before encoding marker".into(),
    })?;
    let comma = value.find(',').ok_or_else(|| DedupError::MalformedDataUri {
        detail: "missing ',' before payload".into(),
    })?;
    if slash >= semi || semi >= comma {
        return Err(DedupError::MalformedDataUri {
            detail: "delimiters out of order".into(),
        });
    }

    let format = &value[slash + 1..semi];
    let marker = &value[semi + 1..comma];
    if marker != "base64" {
        return Err(DedupError::UnsupportedEncoding {
            marker: marker.to_string(),
        });
    }
    debug!(format = %format, "parsed data URI header");

    Ok(&value[comma + 1..])
}

/// Decode base64, ignoring embedded ASCII whitespace.
///
/// Serialisers are free to wrap long attribute values; the line breaks are
/// not part of the payload.
fn decode_base64(payload: &str) -> Result<Vec<u8>, DedupError> {
    if payload.bytes().any(|b| b.is_ascii_whitespace()) {
        let cleaned: String = payload
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        Ok(STANDARD.decode(cleaned.as_bytes())?)
    } else {
        Ok(STANDARD.decode(payload.as_bytes())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, LumaA, Rgb, Rgba};
    use std::io::Cursor;

    fn png_bytes(img: DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("png encode");
        buf
    }

    fn data_uri(img: DynamicImage) -> String {
        format!(
            "data:image/png;base64,{}",
            STANDARD.encode(png_bytes(img))
        )
    }

    #[test]
    fn decodes_rgba_data_uri() {
        let uri = data_uri(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            6,
            4,
            Rgba([10, 20, 30, 255]),
        )));
        let img = DecodedImage::from_href(&uri).unwrap();
        assert_eq!((img.width(), img.height()), (6, 4));
        assert_eq!(img.channels(), 4);
        assert_eq!(img.class(), PixelClass::Color);
        assert_eq!(img.pixel_count(), 24);
        assert_eq!(img.payload_len(), uri.len() as u64);
    }

    #[test]
    fn decodes_bare_base64() {
        let bytes = png_bytes(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            3,
            3,
            Rgb([1, 2, 3]),
        )));
        let img = DecodedImage::from_href(&STANDARD.encode(bytes)).unwrap();
        assert_eq!(img.channels(), 3);
        assert_eq!(img.class(), PixelClass::Color);
    }

    #[test]
    fn tolerates_wrapped_payload() {
        let uri = data_uri(DynamicImage::ImageLuma8(GrayImage::from_pixel(
            2,
            2,
            Luma([128]),
        )));
        let (head, tail) = uri.split_at(uri.len() / 2);
        let wrapped = format!("{head}\n  {tail}");
        let img = DecodedImage::from_href(&wrapped).unwrap();
        assert_eq!(img.class(), PixelClass::Gray);
        assert_eq!(img.channels(), 1);
    }

    #[test]
    fn decoded_payload_reencodes_byte_identical() {
        // The payload must survive a decode/encode round trip untouched, or
        // untouched <image> elements could not be written back verbatim.
        let bytes = png_bytes(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            5,
            4,
            Rgb([9, 8, 7]),
        )));
        let payload = STANDARD.encode(&bytes);
        let decoded = decode_base64(&payload).unwrap();
        assert_eq!(decoded, bytes);
        assert_eq!(STANDARD.encode(&decoded), payload);
    }

    #[test]
    fn rejects_non_base64_encoding_marker() {
        let err = DecodedImage::from_href("data:image/png;base85,abcd").unwrap_err();
        match err {
            DedupError::UnsupportedEncoding { marker } => assert_eq!(marker, "base85"),
            other => panic!("expected UnsupportedEncoding, got {other:?}"),
        }
    }

    #[test]
    fn rejects_data_uri_without_comma() {
        let err = DecodedImage::from_href("data:image/png;base64").unwrap_err();
        assert!(matches!(err, DedupError::MalformedDataUri { .. }));
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = DecodedImage::from_href("data:image/png;base64,!!!not-base64!!!").unwrap_err();
        assert!(matches!(err, DedupError::Base64(_)));
    }

    #[test]
    fn rejects_non_png_payload() {
        let not_png = STANDARD.encode(b"GIF89a rest of a gif");
        let err =
            DecodedImage::from_href(&format!("data:image/png;base64,{not_png}")).unwrap_err();
        assert!(matches!(err, DedupError::ImageDecode(_)));
    }

    #[test]
    fn grey_alpha_png_keeps_two_channels() {
        let img = image::GrayAlphaImage::from_pixel(4, 4, LumaA([90, 200]));
        let uri = data_uri(DynamicImage::ImageLumaA8(img));
        let decoded = DecodedImage::from_href(&uri).unwrap();
        assert_eq!(decoded.channels(), 2);
        assert_eq!(decoded.class(), PixelClass::Gray);
        // Channel 1 of a grey-class image is the alpha plane.
        let alpha = decoded.channel_plane(1, 4, 4);
        assert_eq!(alpha.get_pixel(0, 0)[0], 200);
    }

    #[test]
    fn rgb_constructor_fills_alpha() {
        let img = DecodedImage::from_rgb8(RgbImage::from_pixel(2, 2, Rgb([5, 6, 7])));
        assert_eq!(img.channels(), 3);
        assert_eq!(img.rgba().get_pixel(0, 0)[3], 255);
    }

    #[test]
    fn channel_plane_crops_top_left() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([200, 0, 0, 255]));
        img.put_pixel(3, 3, Rgba([100, 0, 0, 255]));
        let decoded = DecodedImage::from_rgba8(img);
        let red = decoded.channel_plane(0, 2, 2);
        assert_eq!(red.dimensions(), (2, 2));
        assert_eq!(red.get_pixel(0, 0)[0], 200);
        assert_eq!(red.get_pixel(1, 1)[0], 0);
    }

    #[test]
    fn same_pixels_requires_matching_layout() {
        let rgba = DecodedImage::from_rgba8(RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 255])));
        let rgb = DecodedImage::from_rgb8(RgbImage::from_pixel(2, 2, Rgb([9, 9, 9])));
        // Same bytes after normalisation, but declared layouts differ.
        assert!(!rgba.same_pixels(&rgb));
        assert!(rgba.same_pixels(&rgba.clone()));
    }
}

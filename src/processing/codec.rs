//! # Raster Codec
//!
//! The decode/encode capability the compressor depends on, plus the `image`-crate
//! implementation used outside of tests.
//!
//! Pixels are always RGBA8, tightly packed. Encoders that cannot carry alpha
//! (JPEG) composite over white before encoding.

use std::fmt;
use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder};
use serde::{Deserialize, Serialize};
use tb_scale::presets::Size;

use crate::error::{ToolError, ToolResult};

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];

/// Encoded container formats the compressor can target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    #[value(name = "webp")]
    WebP,
}

impl OutputFormat {
    /// Detect the container from its magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(&PNG_SIGNATURE) {
            Some(Self::Png)
        } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(Self::WebP)
        } else {
            None
        }
    }

    /// Whether the quality parameter changes the encoded size.
    pub fn is_lossy(&self) -> bool {
        matches!(self, Self::Jpeg)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
            Self::WebP => "WebP",
        };
        f.write_str(name)
    }
}

/// Decoded RGBA8 raster.
#[derive(Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RasterImage {
    /// Wrap an RGBA8 buffer; its length must be exactly `width * height * 4`.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> ToolResult<Self> {
        if width == 0 || height == 0 {
            return Err(ToolError::validation(
                "dimensions",
                "width and height must be non-zero",
                format!("{}x{}", width, height),
            ));
        }
        let expected = Size { w: width, h: height }.byte_len();
        if pixels.len() != expected {
            return Err(ToolError::validation(
                "pixels",
                format!("expected {} RGBA8 bytes", expected),
                pixels.len().to_string(),
            ));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn size(&self) -> Size {
        Size {
            w: self.width,
            h: self.height,
        }
    }
}

impl fmt::Debug for RasterImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixels", &format_args!("[{} bytes]", self.pixels.len()))
            .finish()
    }
}

/// Host imaging capability: bytes to pixels and back.
///
/// Implementations must be deterministic: the same pixels, format and quality
/// always encode to the same bytes.
pub trait RasterCodec: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> ToolResult<RasterImage>;

    /// Encode at `quality` in `(0, 1]`. Lossless formats ignore it.
    fn encode(&self, image: &RasterImage, format: OutputFormat, quality: f32) -> ToolResult<Vec<u8>>;
}

/// [`RasterCodec`] backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCodec;

impl ImageCodec {
    pub fn new() -> Self {
        Self
    }
}

/// Map `(0, 1]` onto the JPEG encoder's 1..=100 scale.
fn jpeg_quality(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Drop alpha by blending onto white.
fn flatten_to_rgb(pixels: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(pixels.len() / 4 * 3);
    for px in pixels.chunks_exact(4) {
        let alpha = u32::from(px[3]);
        for &channel in &px[..3] {
            let blended = (u32::from(channel) * alpha + 255 * (255 - alpha) + 127) / 255;
            rgb.push(blended as u8);
        }
    }
    rgb
}

impl RasterCodec for ImageCodec {
    fn decode(&self, bytes: &[u8]) -> ToolResult<RasterImage> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| ToolError::processing("decode", e.to_string()))?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        RasterImage::new(width, height, rgba.into_raw())
    }

    fn encode(&self, image: &RasterImage, format: OutputFormat, quality: f32) -> ToolResult<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        match format {
            OutputFormat::Jpeg => {
                let rgb = flatten_to_rgb(&image.pixels);
                JpegEncoder::new_with_quality(&mut out, jpeg_quality(quality)).write_image(
                    &rgb,
                    image.width,
                    image.height,
                    ExtendedColorType::Rgb8,
                )?;
            }
            OutputFormat::Png => {
                PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive)
                    .write_image(
                        &image.pixels,
                        image.width,
                        image.height,
                        ExtendedColorType::Rgba8,
                    )?;
            }
            OutputFormat::WebP => {
                WebPEncoder::new_lossless(&mut out).write_image(
                    &image.pixels,
                    image.width,
                    image.height,
                    ExtendedColorType::Rgba8,
                )?;
            }
        }
        Ok(out.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> RasterImage {
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&[(x * 7) as u8, (y * 5) as u8, ((x ^ y) * 3) as u8, 255]);
            }
        }
        RasterImage::new(width, height, pixels).unwrap()
    }

    #[test]
    fn test_sniff() {
        assert_eq!(OutputFormat::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(OutputFormat::Jpeg));
        assert_eq!(OutputFormat::sniff(&PNG_SIGNATURE), Some(OutputFormat::Png));
        assert_eq!(OutputFormat::sniff(b"RIFF\0\0\0\0WEBPVP8L"), Some(OutputFormat::WebP));
        assert_eq!(OutputFormat::sniff(b"%PDF-1.7"), None);
        assert_eq!(OutputFormat::sniff(&[]), None);
    }

    #[test]
    fn test_raster_rejects_wrong_length() {
        assert!(RasterImage::new(2, 2, vec![0; 15]).is_err());
        assert!(RasterImage::new(0, 2, vec![]).is_err());
        assert!(RasterImage::new(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn test_jpeg_quality_mapping() {
        assert_eq!(jpeg_quality(0.001), 1);
        assert_eq!(jpeg_quality(0.5), 50);
        assert_eq!(jpeg_quality(1.0), 100);
    }

    #[test]
    fn test_flatten_composites_over_white() {
        let rgb = flatten_to_rgb(&[0, 0, 0, 0, 10, 20, 30, 255]);
        assert_eq!(rgb, vec![255, 255, 255, 10, 20, 30]);
    }

    #[test]
    fn test_image_codec_roundtrip_formats() {
        let codec = ImageCodec::new();
        let image = gradient(48, 32);

        for format in [OutputFormat::Jpeg, OutputFormat::Png, OutputFormat::WebP] {
            let bytes = codec.encode(&image, format, 0.8).unwrap();
            assert_eq!(OutputFormat::sniff(&bytes), Some(format));
            let decoded = codec.decode(&bytes).unwrap();
            assert_eq!((decoded.width, decoded.height), (48, 32));
        }
    }

    #[test]
    fn test_jpeg_size_grows_with_quality() {
        let codec = ImageCodec::new();
        let image = gradient(64, 64);
        let low = codec.encode(&image, OutputFormat::Jpeg, 0.1).unwrap();
        let high = codec.encode(&image, OutputFormat::Jpeg, 0.95).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn test_decode_rejects_non_image() {
        let err = ImageCodec::new().decode(b"definitely not pixels").unwrap_err();
        assert_eq!(err.category(), "processing");
    }
}

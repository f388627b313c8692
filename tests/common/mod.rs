//! Common test utilities and helpers for the toolbench tests
//!
//! This module provides shared fixtures: a deterministic codec with a known size
//! curve, synthetic images, and JPEG/PNG container builders.

#![allow(dead_code)]

/// Codec with a closed-form size model, for exercising the search without real encoders
pub mod synthetic {
    use toolbench::error::ToolResult;
    use toolbench::processing::{ImageCodec, OutputFormat, RasterCodec, RasterImage};

    /// Encoded size is `600 + pixels * (0.002 + 0.25 * q²)`, strictly increasing in
    /// both quality and pixel count. Output starts with the requested format's signature.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct SyntheticCodec;

    impl SyntheticCodec {
        pub fn model(pixels: u64, quality: f32) -> usize {
            let q = f64::from(quality);
            600 + (pixels as f64 * (0.002 + 0.25 * q * q)) as usize
        }
    }

    impl RasterCodec for SyntheticCodec {
        fn decode(&self, bytes: &[u8]) -> ToolResult<RasterImage> {
            ImageCodec::new().decode(bytes)
        }

        fn encode(
            &self,
            image: &RasterImage,
            format: OutputFormat,
            quality: f32,
        ) -> ToolResult<Vec<u8>> {
            let len = Self::model(image.size().pixel_count(), quality);
            let seed = (quality * 255.0) as u8 ^ (image.width as u8);
            let mut out: Vec<u8> = (0..len).map(|i| (i as u8).wrapping_mul(31) ^ seed).collect();
            let signature: &[u8] = match format {
                OutputFormat::Jpeg => &[0xFF, 0xD8, 0xFF, 0xE0],
                OutputFormat::Png => &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'],
                OutputFormat::WebP => b"RIFF\0\0\0\0WEBP",
            };
            out[..signature.len()].copy_from_slice(signature);
            Ok(out)
        }
    }
}

/// Synthetic image content
pub mod images {
    use std::io::Cursor;

    use toolbench::processing::RasterImage;

    /// Deterministic "photographic" content: smooth gradients plus hashed noise.
    pub fn photo(width: u32, height: u32) -> RasterImage {
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                let noise = (x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503)) >> 24;
                pixels.extend_from_slice(&[
                    ((x * 255 / width.max(1)) as u8).wrapping_add(noise as u8 / 4),
                    ((y * 255 / height.max(1)) as u8).wrapping_add(noise as u8 / 8),
                    (((x + y) * 3) as u8) ^ (noise as u8),
                    255,
                ]);
            }
        }
        RasterImage::new(width, height, pixels).expect("valid fixture")
    }

    /// Encode a fixture with the `image` crate's own encoders.
    pub fn encoded(image: &RasterImage, format: image::ImageFormat) -> Vec<u8> {
        let buffer = image::RgbaImage::from_raw(image.width, image.height, image.pixels.clone())
            .expect("fixture dimensions match");
        let mut out = Cursor::new(Vec::new());
        match format {
            image::ImageFormat::Jpeg => image::DynamicImage::ImageRgba8(buffer)
                .to_rgb8()
                .write_to(&mut out, format)
                .expect("encode fixture"),
            _ => buffer.write_to(&mut out, format).expect("encode fixture"),
        }
        out.into_inner()
    }
}

/// JPEG/PNG container builders and inspectors
pub mod containers {
    pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];

    /// Serialize a PNG chunk with a correct CRC.
    pub fn chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut out = (data.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        let crc = crc32fast::hash(&out[4..]);
        out.extend_from_slice(&crc.to_be_bytes());
        out
    }

    /// Split a PNG into `(offset, type, total chunk length)` triples.
    pub fn png_chunks(png: &[u8]) -> Vec<(usize, [u8; 4], usize)> {
        let mut chunks = Vec::new();
        let mut pos = PNG_SIGNATURE.len();
        while pos + 12 <= png.len() {
            let len = u32::from_be_bytes([png[pos], png[pos + 1], png[pos + 2], png[pos + 3]]) as usize;
            let kind = [png[pos + 4], png[pos + 5], png[pos + 6], png[pos + 7]];
            chunks.push((pos, kind, len + 12));
            pos += len + 12;
        }
        chunks
    }

    /// Insert a `pHYs` chunk directly after `IHDR`.
    pub fn insert_phys(png: &[u8], x: u32, y: u32, unit: u8) -> Vec<u8> {
        let (ihdr_at, _, ihdr_len) = png_chunks(png)
            .into_iter()
            .find(|(_, kind, _)| kind == b"IHDR")
            .expect("PNG has IHDR");
        let split = ihdr_at + ihdr_len;

        let mut data = x.to_be_bytes().to_vec();
        data.extend_from_slice(&y.to_be_bytes());
        data.push(unit);

        let mut out = png[..split].to_vec();
        out.extend(chunk(b"pHYs", &data));
        out.extend_from_slice(&png[split..]);
        out
    }

    /// Remove every `pHYs` chunk.
    pub fn strip_phys(png: &[u8]) -> Vec<u8> {
        let mut out = PNG_SIGNATURE.to_vec();
        for (at, kind, len) in png_chunks(png) {
            if &kind != b"pHYs" {
                out.extend_from_slice(&png[at..at + len]);
            }
        }
        out
    }

    /// True when every chunk's stored CRC matches its content.
    pub fn png_crcs_valid(png: &[u8]) -> bool {
        png_chunks(png).into_iter().all(|(at, _, len)| {
            let body = &png[at + 4..at + len - 4];
            let stored = &png[at + len - 4..at + len];
            crc32fast::hash(body).to_be_bytes() == stored
        })
    }

    /// Everything from the first start-of-scan marker on.
    pub fn jpeg_scan_data(jpeg: &[u8]) -> &[u8] {
        let at = jpeg
            .windows(2)
            .position(|w| w == [0xFF, 0xDA])
            .expect("JPEG has SOS");
        &jpeg[at..]
    }
}

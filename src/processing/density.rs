//! # Density Metadata Rewriter
//!
//! Reads and patches the resolution-density fields of encoded images without
//! touching pixel data.
//!
//! | Container | Field | Layout | Units |
//! |-----------|-------|--------|-------|
//! | JPEG | JFIF `APP0` | unit byte, x `u16`, y `u16` | none, per inch, per cm |
//! | PNG | `pHYs` chunk | x `u32`, y `u32`, unit byte, CRC | none, per metre |
//!
//! Scanning walks the container structure segment by segment and stops at the
//! first pixel-data marker, so the cost is bounded by header size. A malformed
//! structure yields `ToolError::Container` with the offending byte offset.
//!
//! Output is always a fresh buffer. When a file has no density field the
//! operation is read-only: the bytes are copied unchanged, the configured
//! default density is reported, and `applied` is false. No field is inserted.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::DensityConfig;
use crate::error::{ToolError, ToolResult};

const METERS_PER_INCH: f64 = 0.0254;
const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];
const JFIF_IDENT: &[u8; 5] = b"JFIF\0";
/// Length field of a JFIF APP0 segment without thumbnail.
const JFIF_MIN_SEGMENT: usize = 16;
const PHYS_DATA_LEN: usize = 9;
const JFIF_MAX_DENSITY: u32 = u16::MAX as u32;
/// PNG integers are limited to 2^31-1.
const PHYS_MAX_DENSITY: u32 = i32::MAX as u32;

/// Unit a density pair is expressed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DensityUnit {
    /// Pixel aspect ratio only; no physical size.
    Unitless,
    PerInch,
    PerCentimeter,
    PerMeter,
}

impl DensityUnit {
    /// Length of one unit in metres, `None` when unitless.
    fn meters(&self) -> Option<f64> {
        match self {
            DensityUnit::Unitless => None,
            DensityUnit::PerInch => Some(METERS_PER_INCH),
            DensityUnit::PerCentimeter => Some(0.01),
            DensityUnit::PerMeter => Some(1.0),
        }
    }
}

impl fmt::Display for DensityUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DensityUnit::Unitless => "unitless",
            DensityUnit::PerInch => "dpi",
            DensityUnit::PerCentimeter => "dpcm",
            DensityUnit::PerMeter => "dpm",
        };
        f.write_str(name)
    }
}

/// A container's resolution metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DensityPatch {
    pub unit: DensityUnit,
    pub x_density: u32,
    pub y_density: u32,
}

impl DensityPatch {
    pub fn new(unit: DensityUnit, x_density: u32, y_density: u32) -> Self {
        Self {
            unit,
            x_density,
            y_density,
        }
    }

    /// Square dots-per-inch density.
    pub fn dpi(dpi: u32) -> Self {
        Self::new(DensityUnit::PerInch, dpi, dpi)
    }

    /// Exact dots per inch on each axis, `None` when unitless.
    pub fn to_dpi(&self) -> Option<(f64, f64)> {
        let meters = self.unit.meters()?;
        let scale = METERS_PER_INCH / meters;
        Some((
            f64::from(self.x_density) * scale,
            f64::from(self.y_density) * scale,
        ))
    }

    /// Dots per inch rounded to the nearest integer.
    pub fn rounded_dpi(&self) -> Option<(u32, u32)> {
        self.to_dpi()
            .map(|(x, y)| (x.round() as u32, y.round() as u32))
    }

    /// Re-express in `unit`, rounding to whole units. Unitless pairs pass through.
    ///
    /// `None` when a converted value does not fit in a `u32`.
    pub fn convert(&self, unit: DensityUnit) -> Option<Self> {
        match (self.unit.meters(), unit.meters()) {
            (Some(from), Some(to)) => {
                let factor = to / from;
                let scale = |v: u32| {
                    let scaled = (f64::from(v) * factor).round();
                    (scaled <= f64::from(u32::MAX)).then_some(scaled as u32)
                };
                Some(Self::new(unit, scale(self.x_density)?, scale(self.y_density)?))
            }
            _ => Some(*self),
        }
    }
}

impl fmt::Display for DensityPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.x_density == self.y_density {
            write!(f, "{} {}", self.x_density, self.unit)
        } else {
            write!(f, "{}x{} {}", self.x_density, self.y_density, self.unit)
        }
    }
}

/// Containers the rewriter understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    /// Inline marker segments; density is patched in place at fixed width.
    Jpeg,
    /// Type-tagged chunks with a CRC per chunk.
    Png,
}

impl ContainerKind {
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(&PNG_SIGNATURE) {
            Some(Self::Png)
        } else {
            None
        }
    }

    fn detect(bytes: &[u8]) -> ToolResult<Self> {
        Self::sniff(bytes).ok_or_else(|| {
            ToolError::container("unknown", Some(0), "unrecognized container signature")
                .with_recovery_suggestion("Density rewriting supports JPEG (JFIF) and PNG files")
        })
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of [`MetadataRewriter::set_density`].
#[derive(Clone, PartialEq)]
pub struct DensityRewrite {
    /// Copy of the input with the density field overwritten.
    pub patched_bytes: Vec<u8>,
    /// Stored density before patching, or the default when absent.
    pub original_density: DensityPatch,
    /// False when the file has no density field and was left unchanged.
    pub applied: bool,
    pub container: ContainerKind,
    pub original_len: usize,
    /// The density that was requested.
    pub requested: DensityPatch,
}

impl fmt::Debug for DensityRewrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DensityRewrite")
            .field("patched_bytes", &format_args!("[{} bytes]", self.patched_bytes.len()))
            .field("original_density", &self.original_density)
            .field("applied", &self.applied)
            .field("container", &self.container)
            .field("original_len", &self.original_len)
            .field("requested", &self.requested)
            .finish()
    }
}

/// Result of [`MetadataRewriter::read_density`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DensityReading {
    pub container: ContainerKind,
    /// `None` when the file carries no density field.
    pub density: Option<DensityPatch>,
}

impl DensityReading {
    pub fn or_default(&self, default_dpi: u32) -> DensityPatch {
        self.density.unwrap_or(DensityPatch::dpi(default_dpi))
    }
}

/// Location of a density field inside a container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    /// Offset of the JFIF unit byte; x and y follow as big-endian `u16`.
    Jfif(usize),
    /// Offset of the `pHYs` chunk's length field.
    Phys(usize),
}

/// Stateless density reader and patcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataRewriter {
    default_dpi: u32,
}

impl Default for MetadataRewriter {
    fn default() -> Self {
        Self::from_config(&DensityConfig::default())
    }
}

impl MetadataRewriter {
    pub fn new(default_dpi: u32) -> Self {
        Self { default_dpi }
    }

    pub fn from_config(config: &DensityConfig) -> Self {
        Self::new(config.default_dpi)
    }

    pub fn default_dpi(&self) -> u32 {
        self.default_dpi
    }

    /// Report the stored density without copying.
    pub fn read_density(&self, bytes: &[u8]) -> ToolResult<DensityReading> {
        let container = ContainerKind::detect(bytes)?;
        let density = match locate(container, bytes)? {
            Some(field) => Some(decode_field(bytes, field)?),
            None => None,
        };
        Ok(DensityReading { container, density })
    }

    /// Return a copy of `bytes` with its density set to `target`.
    pub fn set_density(&self, bytes: &[u8], target: DensityPatch) -> ToolResult<DensityRewrite> {
        if target.x_density == 0 || target.y_density == 0 {
            return Err(ToolError::validation(
                "density",
                "must be greater than 0",
                target.to_string(),
            ));
        }

        let container = ContainerKind::detect(bytes)?;
        let mut patched = bytes.to_vec();

        let Some(field) = locate(container, bytes)? else {
            warn!(
                container = %container,
                default_dpi = self.default_dpi,
                "no density field; leaving file unchanged"
            );
            return Ok(DensityRewrite {
                patched_bytes: patched,
                original_density: DensityPatch::dpi(self.default_dpi),
                applied: false,
                container,
                original_len: bytes.len(),
                requested: target,
            });
        };

        let original = decode_field(bytes, field)?;
        match field {
            Field::Jfif(offset) => write_jfif(&mut patched, offset, target)?,
            Field::Phys(offset) => write_phys(&mut patched, offset, target)?,
        }
        debug!(
            container = %container,
            from = %original,
            to = %target,
            "density field patched"
        );

        Ok(DensityRewrite {
            patched_bytes: patched,
            original_density: original,
            applied: true,
            container,
            original_len: bytes.len(),
            requested: target,
        })
    }
}

/// How `target` is represented once written into `container`.
///
/// JFIF has no per-metre unit and stores centimetres instead; `pHYs` only knows
/// metres. Unitless pairs are stored as given. A stored value outside the field
/// (1..=65535 for JFIF, 1..=2^31-1 for `pHYs`) is a validation error.
pub fn native_form(container: ContainerKind, target: DensityPatch) -> ToolResult<DensityPatch> {
    let stored = match (container, target.unit) {
        (_, DensityUnit::Unitless) => Some(target),
        (ContainerKind::Jpeg, DensityUnit::PerMeter) => target.convert(DensityUnit::PerCentimeter),
        (ContainerKind::Jpeg, _) => Some(target),
        (ContainerKind::Png, _) => target.convert(DensityUnit::PerMeter),
    };
    let max = match container {
        ContainerKind::Jpeg => JFIF_MAX_DENSITY,
        ContainerKind::Png => PHYS_MAX_DENSITY,
    };
    match stored {
        Some(s) if (1..=max).contains(&s.x_density) && (1..=max).contains(&s.y_density) => Ok(s),
        _ => Err(ToolError::validation(
            "density",
            format!("{} density fields hold 1 to {} per unit", container, max),
            target.to_string(),
        )),
    }
}

fn be16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

fn be32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn locate(container: ContainerKind, bytes: &[u8]) -> ToolResult<Option<Field>> {
    match container {
        ContainerKind::Jpeg => locate_jfif(bytes),
        ContainerKind::Png => locate_phys(bytes),
    }
}

/// Walk JPEG marker segments up to start-of-scan looking for a JFIF `APP0`.
fn locate_jfif(bytes: &[u8]) -> ToolResult<Option<Field>> {
    let err = |offset: usize, reason: &str| ToolError::container("JPEG", Some(offset), reason);
    let mut pos = 2;

    loop {
        if pos >= bytes.len() {
            return Err(err(pos, "reached end of file before start of scan"));
        }
        if bytes[pos] != 0xFF {
            return Err(err(pos, "expected a marker"));
        }
        while pos < bytes.len() && bytes[pos] == 0xFF {
            pos += 1;
        }
        let Some(&marker) = bytes.get(pos) else {
            return Err(err(pos, "truncated marker"));
        };
        pos += 1;

        match marker {
            // TEM and RSTn carry no length.
            0x01 | 0xD0..=0xD7 => continue,
            // SOS or EOI: header is over.
            0xDA | 0xD9 => return Ok(None),
            _ => {}
        }

        if pos + 2 > bytes.len() {
            return Err(err(pos, "truncated segment length"));
        }
        let seg_len = usize::from(be16(bytes, pos));
        if seg_len < 2 {
            return Err(err(pos, "segment length below 2"));
        }
        if pos + seg_len > bytes.len() {
            return Err(err(pos, "segment runs past end of file"));
        }

        let data = pos + 2;
        if marker == 0xE0
            && seg_len >= JFIF_MIN_SEGMENT
            && &bytes[data..data + JFIF_IDENT.len()] == JFIF_IDENT
        {
            // ident (5) + version (2), then the unit byte.
            return Ok(Some(Field::Jfif(data + 7)));
        }
        pos += seg_len;
    }
}

/// Walk PNG chunks up to the first `IDAT` looking for `pHYs`.
fn locate_phys(bytes: &[u8]) -> ToolResult<Option<Field>> {
    let err = |offset: usize, reason: &str| ToolError::container("PNG", Some(offset), reason);
    let mut pos = PNG_SIGNATURE.len();

    loop {
        if pos + 12 > bytes.len() {
            return Err(err(pos, "truncated chunk header"));
        }
        let length = be32(bytes, pos) as usize;
        let kind = &bytes[pos + 4..pos + 8];
        let end = pos
            .checked_add(12)
            .and_then(|p| p.checked_add(length))
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| err(pos, "chunk length runs past end of file"))?;

        match kind {
            b"pHYs" => {
                if length != PHYS_DATA_LEN {
                    return Err(err(pos, "pHYs chunk must hold 9 bytes"));
                }
                return Ok(Some(Field::Phys(pos)));
            }
            b"IDAT" | b"IEND" => return Ok(None),
            _ => pos = end,
        }
    }
}

fn decode_field(bytes: &[u8], field: Field) -> ToolResult<DensityPatch> {
    match field {
        Field::Jfif(offset) => {
            let unit = match bytes[offset] {
                0 => DensityUnit::Unitless,
                1 => DensityUnit::PerInch,
                2 => DensityUnit::PerCentimeter,
                other => {
                    return Err(ToolError::container(
                        "JPEG",
                        Some(offset),
                        format!("unknown JFIF density unit {}", other),
                    ));
                }
            };
            Ok(DensityPatch::new(
                unit,
                u32::from(be16(bytes, offset + 1)),
                u32::from(be16(bytes, offset + 3)),
            ))
        }
        Field::Phys(offset) => {
            let data = offset + 8;
            let unit = match bytes[data + 8] {
                0 => DensityUnit::Unitless,
                1 => DensityUnit::PerMeter,
                other => {
                    return Err(ToolError::container(
                        "PNG",
                        Some(data + 8),
                        format!("unknown pHYs unit {}", other),
                    ));
                }
            };
            Ok(DensityPatch::new(unit, be32(bytes, data), be32(bytes, data + 4)))
        }
    }
}

/// Overwrite the 5-byte JFIF density block in place.
fn write_jfif(bytes: &mut [u8], offset: usize, target: DensityPatch) -> ToolResult<()> {
    let stored = native_form(ContainerKind::Jpeg, target)?;
    let unit = match stored.unit {
        DensityUnit::Unitless => 0,
        DensityUnit::PerInch => 1,
        _ => 2,
    };
    let narrow = |v: u32| {
        u16::try_from(v).map_err(|_| {
            ToolError::validation("density", "JFIF density must be between 1 and 65535", target.to_string())
        })
    };
    let x = narrow(stored.x_density)?;
    let y = narrow(stored.y_density)?;

    bytes[offset] = unit;
    bytes[offset + 1..offset + 3].copy_from_slice(&x.to_be_bytes());
    bytes[offset + 3..offset + 5].copy_from_slice(&y.to_be_bytes());
    Ok(())
}

/// Overwrite the `pHYs` payload and recompute the chunk CRC.
fn write_phys(bytes: &mut [u8], offset: usize, target: DensityPatch) -> ToolResult<()> {
    let stored = native_form(ContainerKind::Png, target)?;
    let unit = match stored.unit {
        DensityUnit::Unitless => 0,
        _ => 1,
    };

    let data = offset + 8;
    bytes[data..data + 4].copy_from_slice(&stored.x_density.to_be_bytes());
    bytes[data + 4..data + 8].copy_from_slice(&stored.y_density.to_be_bytes());
    bytes[data + 8] = unit;

    let crc_at = data + PHYS_DATA_LEN;
    let crc = crc32fast::hash(&bytes[offset + 4..crc_at]);
    bytes[crc_at..crc_at + 4].copy_from_slice(&crc.to_be_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jfif_header(unit: u8, x: u16, y: u16) -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        out.extend_from_slice(b"JFIF\0");
        out.extend_from_slice(&[1, 2, unit]);
        out.extend_from_slice(&x.to_be_bytes());
        out.extend_from_slice(&y.to_be_bytes());
        out.extend_from_slice(&[0, 0]);
        out
    }

    fn jpeg_with(header: Vec<u8>) -> Vec<u8> {
        let mut out = header;
        // DQT stub, then SOS and a few entropy bytes.
        out.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x04, 0x00, 0x01]);
        out.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02, 0x12, 0x34, 0x56]);
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    fn chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut out = (data.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        let crc = crc32fast::hash(&out[4..]);
        out.extend_from_slice(&crc.to_be_bytes());
        out
    }

    fn png_with(phys: Option<(u32, u32, u8)>) -> Vec<u8> {
        let mut out = PNG_SIGNATURE.to_vec();
        out.extend(chunk(b"IHDR", &[0, 0, 0, 1, 0, 0, 0, 1, 8, 6, 0, 0, 0]));
        if let Some((x, y, unit)) = phys {
            let mut data = x.to_be_bytes().to_vec();
            data.extend_from_slice(&y.to_be_bytes());
            data.push(unit);
            out.extend(chunk(b"pHYs", &data));
        }
        out.extend(chunk(b"IDAT", &[0x78, 0x9C, 0x01]));
        out.extend(chunk(b"IEND", &[]));
        out
    }

    #[test]
    fn test_jpeg_patch_in_place() {
        let original = jpeg_with(jfif_header(1, 72, 72));
        let rewriter = MetadataRewriter::default();

        let rewrite = rewriter.set_density(&original, DensityPatch::dpi(300)).unwrap();
        assert!(rewrite.applied);
        assert_eq!(rewrite.container, ContainerKind::Jpeg);
        assert_eq!(rewrite.original_density, DensityPatch::dpi(72));
        assert_eq!(rewrite.patched_bytes.len(), original.len());

        let changed: Vec<usize> = (0..original.len())
            .filter(|&i| original[i] != rewrite.patched_bytes[i])
            .collect();
        assert!(changed.iter().all(|&i| (13..18).contains(&i)));

        let reading = rewriter.read_density(&rewrite.patched_bytes).unwrap();
        assert_eq!(reading.density, Some(DensityPatch::dpi(300)));
    }

    #[test]
    fn test_input_never_mutated() {
        let original = jpeg_with(jfif_header(1, 72, 72));
        let snapshot = original.clone();
        let _ = MetadataRewriter::default()
            .set_density(&original, DensityPatch::dpi(96))
            .unwrap();
        assert_eq!(original, snapshot);
    }

    #[test]
    fn test_jpeg_per_meter_stored_as_per_cm() {
        let original = jpeg_with(jfif_header(0, 1, 1));
        let rewriter = MetadataRewriter::default();
        let target = DensityPatch::new(DensityUnit::PerMeter, 11_811, 11_811);

        let rewrite = rewriter.set_density(&original, target).unwrap();
        assert_eq!(rewrite.original_density.unit, DensityUnit::Unitless);
        let stored = rewriter.read_density(&rewrite.patched_bytes).unwrap().density.unwrap();
        assert_eq!(stored, DensityPatch::new(DensityUnit::PerCentimeter, 118, 118));
        assert_eq!(stored.rounded_dpi(), Some((300, 300)));
    }

    #[test]
    fn test_jpeg_overflow_rejected() {
        let original = jpeg_with(jfif_header(1, 72, 72));
        let err = MetadataRewriter::default()
            .set_density(&original, DensityPatch::dpi(70_000))
            .unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn test_png_overflow_rejected() {
        let original = png_with(Some((2835, 2835, 1)));
        let rewriter = MetadataRewriter::default();

        // Past u32 once expressed per metre.
        let err = rewriter
            .set_density(&original, DensityPatch::dpi(200_000_000))
            .unwrap_err();
        assert_eq!(err.category(), "validation");

        // Fits a u32 but not a PNG integer.
        let err = rewriter
            .set_density(&original, DensityPatch::dpi(60_000_000))
            .unwrap_err();
        assert_eq!(err.category(), "validation");

        let max = DensityPatch::new(DensityUnit::PerMeter, PHYS_MAX_DENSITY, PHYS_MAX_DENSITY);
        let rewrite = rewriter.set_density(&original, max).unwrap();
        let stored = rewriter.read_density(&rewrite.patched_bytes).unwrap().density;
        assert_eq!(stored, Some(max));
    }

    #[test]
    fn test_density_rounding_to_zero_rejected() {
        let jpeg = jpeg_with(jfif_header(1, 72, 72));
        let err = MetadataRewriter::default()
            .set_density(&jpeg, DensityPatch::new(DensityUnit::PerMeter, 40, 40))
            .unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn test_jpeg_without_jfif_is_read_only() {
        // APP1 (Exif) only.
        let mut header = vec![0xFF, 0xD8, 0xFF, 0xE1, 0x00, 0x08];
        header.extend_from_slice(b"Exif\0\0");
        let original = jpeg_with(header);

        let rewrite = MetadataRewriter::new(96)
            .set_density(&original, DensityPatch::dpi(300))
            .unwrap();
        assert!(!rewrite.applied);
        assert_eq!(rewrite.original_density, DensityPatch::dpi(96));
        assert_eq!(rewrite.patched_bytes, original);
    }

    #[test]
    fn test_jpeg_fill_bytes_and_standalone_markers() {
        let mut original = vec![0xFF, 0xD8, 0xFF, 0xFF, 0xD0];
        original.extend_from_slice(&jfif_header(2, 28, 28)[2..]);
        let original = jpeg_with(original);

        let reading = MetadataRewriter::default().read_density(&original).unwrap();
        assert_eq!(
            reading.density,
            Some(DensityPatch::new(DensityUnit::PerCentimeter, 28, 28))
        );
    }

    #[test]
    fn test_truncated_jpeg_is_container_error() {
        let mut original = jfif_header(1, 72, 72);
        original.truncate(10);
        let err = MetadataRewriter::default().read_density(&original).unwrap_err();
        assert_eq!(err.category(), "container");

        let bad_len = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x01, 0x00];
        let err = MetadataRewriter::default().read_density(&bad_len).unwrap_err();
        assert_eq!(err.category(), "container");
    }

    #[test]
    fn test_png_patch_updates_crc() {
        let original = png_with(Some((2835, 2835, 1)));
        let rewriter = MetadataRewriter::default();

        let rewrite = rewriter.set_density(&original, DensityPatch::dpi(300)).unwrap();
        assert!(rewrite.applied);
        assert_eq!(rewrite.original_density.rounded_dpi(), Some((72, 72)));
        assert_eq!(rewrite.patched_bytes.len(), original.len());

        let stored = rewriter.read_density(&rewrite.patched_bytes).unwrap().density.unwrap();
        assert_eq!(stored, DensityPatch::new(DensityUnit::PerMeter, 11_811, 11_811));

        // IHDR chunk spans 8..33; pHYs starts at 33.
        let phys = &rewrite.patched_bytes[33..33 + 21];
        let crc = u32::from_be_bytes([phys[17], phys[18], phys[19], phys[20]]);
        assert_eq!(crc, crc32fast::hash(&phys[4..17]));
    }

    #[test]
    fn test_png_without_phys_reports_default() {
        let original = png_with(None);
        let rewriter = MetadataRewriter::default();

        let reading = rewriter.read_density(&original).unwrap();
        assert_eq!(reading.density, None);
        assert_eq!(reading.or_default(72), DensityPatch::dpi(72));

        let rewrite = rewriter.set_density(&original, DensityPatch::dpi(300)).unwrap();
        assert!(!rewrite.applied);
        assert_eq!(rewrite.original_density, DensityPatch::dpi(72));
        assert_eq!(rewrite.patched_bytes, original);
    }

    #[test]
    fn test_png_bad_chunk_length() {
        let mut original = png_with(Some((2835, 2835, 1)));
        original[8..12].copy_from_slice(&u32::MAX.to_be_bytes());
        let err = MetadataRewriter::default().read_density(&original).unwrap_err();
        assert_eq!(err.to_string(), "PNG container error at byte 8: chunk length runs past end of file");
    }

    #[test]
    fn test_unknown_container() {
        let err = MetadataRewriter::default()
            .set_density(b"GIF89a....", DensityPatch::dpi(300))
            .unwrap_err();
        assert_eq!(err.category(), "container");
    }

    #[test]
    fn test_zero_density_rejected() {
        let err = MetadataRewriter::default()
            .set_density(&png_with(None), DensityPatch::dpi(0))
            .unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn test_unit_conversion() {
        let dpcm = DensityPatch::dpi(254).convert(DensityUnit::PerCentimeter);
        assert_eq!(dpcm, Some(DensityPatch::new(DensityUnit::PerCentimeter, 100, 100)));
        assert_eq!(DensityPatch::dpi(200_000_000).convert(DensityUnit::PerMeter), None);
        assert_eq!(DensityPatch::new(DensityUnit::Unitless, 1, 2).to_dpi(), None);
        assert_eq!(DensityPatch::new(DensityUnit::PerInch, 300, 150).to_string(), "300x150 dpi");
    }
}

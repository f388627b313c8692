// SPDX-License-Identifier: MIT
// CPU scaler built on fast_image_resize (SIMD-accelerated).
// RGBA8 in → RGBA8 out, direct write into caller-provided dst buffer.

use fast_image_resize as fir;
use fir::images::{TypedImage, TypedImageRef};
use fir::pixels::U8x4;
use fir::{ResizeOptions, Resizer};

use crate::presets::{ScalePlan, Size};

#[derive(Debug)]
pub enum ScaleError {
    BufferTooSmall { needed: usize, got: usize },
    SourceTooSmall { needed: usize, got: usize },
    InvalidLadder { decay: f64, floor: f64 },
    Fir(fir::ResizeError),
    ImageBuf(fir::ImageBufferError),
}

impl From<fir::ResizeError> for ScaleError { fn from(e: fir::ResizeError) -> Self { Self::Fir(e) } }
impl From<fir::ImageBufferError> for ScaleError { fn from(e: fir::ImageBufferError) -> Self { Self::ImageBuf(e) } }

impl std::fmt::Display for ScaleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScaleError::BufferTooSmall { needed, got } => {
                write!(f, "Output buffer too small: need {} bytes, got {}", needed, got)
            }
            ScaleError::SourceTooSmall { needed, got } => {
                write!(f, "Source buffer too small: need {} bytes, got {}", needed, got)
            }
            ScaleError::InvalidLadder { decay, floor } => write!(
                f,
                "Invalid decay ladder: decay {} must be in (0, 1) and floor {} in (0, 1]",
                decay, floor
            ),
            ScaleError::Fir(e) => write!(f, "Fast image resize error: {}", e),
            ScaleError::ImageBuf(e) => write!(f, "Image buffer error: {}", e),
        }
    }
}

impl std::error::Error for ScaleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScaleError::Fir(e) => Some(e),
            ScaleError::ImageBuf(e) => Some(e),
            _ => None,
        }
    }
}

/// Main scaling entry point.
/// `src_rgba` must be tightly packed (`src.w * 4` bytes per row).
/// `dst` must hold at least `plan.out.w * plan.out.h * 4` bytes.
pub fn scale_rgba_cpu(
    resizer: &mut Resizer,
    src_rgba: &[u8],
    src: Size,
    plan: &ScalePlan,
    dst: &mut [u8],
) -> Result<(), ScaleError> {
    let src_len = src.byte_len();
    if src_rgba.len() < src_len {
        return Err(ScaleError::SourceTooSmall { needed: src_len, got: src_rgba.len() });
    }
    let dst_len = plan.out.byte_len();
    if dst.len() < dst_len {
        return Err(ScaleError::BufferTooSmall { needed: dst_len, got: dst.len() });
    }

    if plan.out == src {
        dst[..dst_len].copy_from_slice(&src_rgba[..src_len]);
        return Ok(());
    }

    let src_view = TypedImageRef::<U8x4>::from_buffer(src.w, src.h, &src_rgba[..src_len])?;
    let mut dst_image = TypedImage::<U8x4>::from_buffer(plan.out.w, plan.out.h, &mut dst[..dst_len])?;

    // Sources are treated as opaque; alpha is carried through unweighted.
    let opts = ResizeOptions::new().use_alpha(false);
    resizer.resize_typed::<U8x4>(&src_view, &mut dst_image, &opts)?;

    Ok(())
}

/// Allocate and fill a new RGBA buffer for `plan.out`.
pub fn scale_rgba_to_vec(
    resizer: &mut Resizer,
    src_rgba: &[u8],
    src: Size,
    plan: &ScalePlan,
) -> Result<Vec<u8>, ScaleError> {
    let mut out = vec![0u8; plan.out.byte_len()];
    scale_rgba_cpu(resizer, src_rgba, src, plan, &mut out)?;
    Ok(out)
}

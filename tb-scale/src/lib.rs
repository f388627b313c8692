// SPDX-License-Identifier: MIT
//! # tb-scale: Downscale Ladders for Size-Targeted Encoding
//!
//! This crate provides the resampling half of toolbench's target-size compressor.
//! When no encoder quality fits a byte budget at full resolution, the compressor
//! walks a geometric ladder of smaller resolutions until the budget is met or a
//! scale floor is reached. This crate computes that ladder and performs the
//! actual RGBA resampling.
//!
//! ## Key Components
//!
//! - [`presets`]: Scale plan computation and the geometric decay ladder
//! - [`cpu`]: CPU-based RGBA scaling using SIMD acceleration
//!
//! ## Determinism
//!
//! Plans are computed with plain `f64` arithmetic and rounded to integers, and
//! `fast_image_resize` produces identical output for identical input on the same
//! machine, so a ladder walk over the same source is reproducible byte for byte.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use tb_scale::{cpu::scale_rgba_cpu, presets::{build_plan, ScaleTarget, Size}};
//!
//! let input_size = Size { w: 2000, h: 1500 };
//! let plan = build_plan(input_size, ScaleTarget::Factor(0.5));
//!
//! let src = vec![0u8; (input_size.w * input_size.h * 4) as usize];
//! let mut resizer = fast_image_resize::Resizer::new();
//! let mut output = vec![0u8; plan.out.byte_len()];
//!
//! scale_rgba_cpu(&mut resizer, &src, input_size, &plan, &mut output)?;
//! # Ok::<(), tb_scale::cpu::ScaleError>(())
//! ```

pub mod cpu;
pub mod presets;

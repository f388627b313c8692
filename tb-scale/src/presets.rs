// SPDX-License-Identifier: MIT
//! # Scale Plans and Decay Ladders
//!
//! This module computes output dimensions for downscaling operations and the
//! geometric ladder walked by the compressor's resolution-escalation phase.
//!
//! ## Design Philosophy
//!
//! 1. **ScaleTarget**: What size constraint to apply (factor, max side, or bounding box)
//! 2. **ScalePlan**: The computed output dimensions and the effective linear factor
//! 3. **DecayLadder**: A finite sequence of plans, each `decay` times smaller than the
//!    last, ending exactly at the floor factor
//!
//! ## Invariants
//!
//! - Aspect ratio is always preserved
//! - No upscaling: factors above 1.0 are clamped to 1.0
//! - Every output dimension is at least 1px

use crate::cpu::ScaleError;

/// Represents a 2D size with width and height in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Size {
    pub w: u32,
    pub h: u32,
}

impl Size {
    /// Number of bytes needed to hold an RGBA8 image of this size.
    pub fn byte_len(&self) -> usize {
        (self.w as usize) * (self.h as usize) * 4
    }

    pub fn pixel_count(&self) -> u64 {
        u64::from(self.w) * u64::from(self.h)
    }
}

/// Defines the target size constraint for scaling operations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScaleTarget {
    /// Multiply both dimensions by a linear factor in `(0, 1]`.
    Factor(f64),
    /// Clamp the longest side to a maximum value, derive the other side proportionally.
    MaxLongSide(u32),
    /// Fit inside a bounding box while keeping the aspect ratio.
    Within(Size),
}

/// Complete scaling plan computed from input parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScalePlan {
    /// Original input dimensions
    pub input: Size,
    /// Target size constraint used for planning
    pub target: ScaleTarget,
    /// Final computed output dimensions
    pub out: Size,
    /// Effective linear factor applied to both dimensions
    pub factor: f64,
}

impl ScalePlan {
    /// True when the plan leaves the image at its original size.
    pub fn is_identity(&self) -> bool {
        self.out == self.input
    }
}

/// Compute a scaling plan from input parameters.
///
/// # Performance
/// O(1) computation with minimal floating-point operations
pub fn build_plan(input: Size, target: ScaleTarget) -> ScalePlan {
    let factor = match target {
        ScaleTarget::Factor(f) => f,
        ScaleTarget::MaxLongSide(max_side) => {
            f64::from(max_side) / f64::from(input.w.max(input.h).max(1))
        }
        ScaleTarget::Within(bounds) => (f64::from(bounds.w) / f64::from(input.w.max(1)))
            .min(f64::from(bounds.h) / f64::from(input.h.max(1))),
    };
    let factor = if factor.is_finite() { factor.clamp(0.0, 1.0) } else { 1.0 };
    let (w, h) = apply_factor(input, factor);
    ScalePlan {
        input,
        target,
        out: Size { w, h },
        factor,
    }
}

/// Scale both sides by `factor`, never below 1px.
fn apply_factor(input: Size, factor: f64) -> (u32, u32) {
    (
        ((f64::from(input.w) * factor).round() as u32).max(1),
        ((f64::from(input.h) * factor).round() as u32).max(1),
    )
}

/// Geometric sequence of downscale plans: `decay^1, decay^2, ...` down to `floor`.
///
/// The final step is always exactly `floor`, so a caller walking the ladder is
/// guaranteed to test the smallest allowed resolution. Consecutive steps that
/// round to the same pixel dimensions are collapsed into one.
#[derive(Clone, Debug)]
pub struct DecayLadder {
    input: Size,
    decay: f64,
    floor: f64,
    factor: f64,
    last_out: Option<Size>,
    done: bool,
}

impl DecayLadder {
    /// Create a ladder for `input`. `decay` must lie in `(0, 1)` and `floor` in `(0, 1]`.
    pub fn new(input: Size, decay: f64, floor: f64) -> Result<Self, ScaleError> {
        if !(decay > 0.0 && decay < 1.0) || !(floor > 0.0 && floor <= 1.0) {
            return Err(ScaleError::InvalidLadder { decay, floor });
        }
        Ok(Self {
            input,
            decay,
            floor,
            factor: 1.0,
            last_out: Some(input),
            done: floor >= 1.0,
        })
    }

    /// Upper bound on the number of steps this ladder yields.
    pub fn max_steps(&self) -> usize {
        if self.floor >= 1.0 {
            return 0;
        }
        (self.floor.ln() / self.decay.ln()).ceil() as usize
    }
}

impl Iterator for DecayLadder {
    type Item = ScalePlan;

    fn next(&mut self) -> Option<ScalePlan> {
        while !self.done {
            let mut next = self.factor * self.decay;
            if next <= self.floor {
                next = self.floor;
                self.done = true;
            }
            self.factor = next;

            let plan = build_plan(self.input, ScaleTarget::Factor(next));
            if self.last_out == Some(plan.out) {
                continue;
            }
            self.last_out = Some(plan.out);
            return Some(plan);
        }
        None
    }
}

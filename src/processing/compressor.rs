//! # Size-Targeted Compression
//!
//! Converges on the highest-fidelity encoding of an image that fits a byte budget.
//!
//! ## Search
//!
//! 1. **Quality search**: binary search over `[quality_min, quality_max]` at full
//!    resolution for a fixed number of iterations. A probe that fits raises the lower
//!    bound, so the result is the highest quality that still fits.
//! 2. **Linear fallback**: if nothing fit and the recorded probes show size
//!    decreasing as quality rises, scan the bracket linearly from the top.
//! 3. **Resolution escalation**: walk a [`DecayLadder`] from the original pixels
//!    at a fixed quality until the budget is met or the scale floor is reached.
//!
//! When the floor does not fit either, the smallest encoding seen is returned with
//! `infeasible = true`. The search is strictly sequential and has no randomness, so
//! identical inputs always produce identical bytes.

use std::fmt;
use std::sync::Arc;

use fast_image_resize::Resizer;
use tb_scale::cpu::scale_rgba_to_vec;
use tb_scale::presets::{DecayLadder, ScalePlan};
use tracing::{debug, info, warn};

use crate::config::CompressionConfig;
use crate::error::{ToolError, ToolResult};
use crate::pipeline::CancelToken;
use crate::processing::codec::{OutputFormat, RasterCodec, RasterImage};

/// A compression job as submitted by a caller.
#[derive(Clone, PartialEq, Eq)]
pub struct CompressionRequest {
    /// Encoded source image.
    pub source: Vec<u8>,
    /// Maximum output size in bytes. Must be positive.
    pub target_bytes: u64,
    /// Output container; `None` keeps the source's format, or JPEG when it is unknown.
    pub format: Option<OutputFormat>,
    /// Permit resolution escalation when no quality fits.
    pub allow_resizing: bool,
}

impl CompressionRequest {
    pub fn new(source: Vec<u8>, target_bytes: u64) -> Self {
        Self {
            source,
            target_bytes,
            format: None,
            allow_resizing: true,
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn without_resizing(mut self) -> Self {
        self.allow_resizing = false;
        self
    }

    /// The format the output will be encoded in.
    pub fn resolved_format(&self) -> OutputFormat {
        self.format
            .or_else(|| OutputFormat::sniff(&self.source))
            .unwrap_or(OutputFormat::Jpeg)
    }
}

impl fmt::Debug for CompressionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressionRequest")
            .field("source", &format_args!("[{} bytes]", self.source.len()))
            .field("target_bytes", &self.target_bytes)
            .field("format", &self.format)
            .field("allow_resizing", &self.allow_resizing)
            .finish()
    }
}

/// Per-call search parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressParams {
    pub format: OutputFormat,
    pub allow_resizing: bool,
}

impl Default for CompressParams {
    fn default() -> Self {
        Self {
            format: OutputFormat::Jpeg,
            allow_resizing: true,
        }
    }
}

/// Outcome of a search. `encoded_bytes.len() <= target_bytes` unless `infeasible`.
#[derive(Clone, PartialEq)]
pub struct CompressionResult {
    pub encoded_bytes: Vec<u8>,
    pub quality_used: f32,
    pub width: u32,
    pub height: u32,
    pub infeasible: bool,
    pub format: OutputFormat,
    /// Linear factor relative to the source dimensions.
    pub scale: f64,
    /// Encodes performed during the search.
    pub probes: u32,
    pub target_bytes: u64,
}

impl CompressionResult {
    pub fn len(&self) -> usize {
        self.encoded_bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoded_bytes.is_empty()
    }

    pub fn was_resized(&self) -> bool {
        self.scale < 1.0
    }
}

impl fmt::Debug for CompressionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressionResult")
            .field("encoded_bytes", &format_args!("[{} bytes]", self.encoded_bytes.len()))
            .field("quality_used", &self.quality_used)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("infeasible", &self.infeasible)
            .field("format", &self.format)
            .field("scale", &self.scale)
            .field("probes", &self.probes)
            .field("target_bytes", &self.target_bytes)
            .finish()
    }
}

/// One encode attempt.
#[derive(Clone)]
struct Candidate {
    bytes: Vec<u8>,
    quality: f32,
    width: u32,
    height: u32,
    scale: f64,
}

impl Candidate {
    fn fits(&self, target: u64) -> bool {
        self.bytes.len() as u64 <= target
    }
}

/// Bookkeeping shared by all phases of one search.
struct Search<'a> {
    codec: &'a dyn RasterCodec,
    format: OutputFormat,
    target: u64,
    cancel: Option<&'a CancelToken>,
    /// `(quality, size)` of every full-resolution probe.
    probes: Vec<(f32, usize)>,
    encodes: u32,
    smallest: Option<Candidate>,
}

impl<'a> Search<'a> {
    fn probe(&mut self, image: &RasterImage, quality: f32, scale: f64) -> ToolResult<Candidate> {
        if let Some(token) = self.cancel {
            token.check("compression search")?;
        }
        let bytes = self.codec.encode(image, self.format, quality)?;
        self.encodes += 1;
        debug!(
            quality,
            scale,
            width = image.width,
            height = image.height,
            size = bytes.len(),
            target = self.target,
            "compression probe"
        );

        let candidate = Candidate {
            bytes,
            quality,
            width: image.width,
            height: image.height,
            scale,
        };
        let smaller = self
            .smallest
            .as_ref()
            .is_none_or(|s| candidate.bytes.len() < s.bytes.len());
        if smaller {
            self.smallest = Some(candidate.clone());
        }
        Ok(candidate)
    }

    /// True when some probe at a higher quality came out strictly smaller.
    fn probes_non_monotone(&self) -> bool {
        let mut sorted = self.probes.clone();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
        sorted.windows(2).any(|w| w[1].1 < w[0].1)
    }

    fn finish(&mut self, candidate: Candidate, infeasible: bool) -> CompressionResult {
        CompressionResult {
            encoded_bytes: candidate.bytes,
            quality_used: candidate.quality,
            width: candidate.width,
            height: candidate.height,
            infeasible,
            format: self.format,
            scale: candidate.scale,
            probes: self.encodes,
            target_bytes: self.target,
        }
    }
}

/// Two-phase convergent search over quality, then resolution.
///
/// Holds no state between calls; share one instance freely.
#[derive(Clone)]
pub struct SizeTargetCompressor {
    codec: Arc<dyn RasterCodec>,
    config: CompressionConfig,
}

impl fmt::Debug for SizeTargetCompressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SizeTargetCompressor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SizeTargetCompressor {
    pub fn new(codec: Arc<dyn RasterCodec>, config: CompressionConfig) -> ToolResult<Self> {
        config
            .validate()
            .map_err(|reason| ToolError::validation("compression", reason, format!("{:?}", config)))?;
        Ok(Self { codec, config })
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    pub fn codec(&self) -> &dyn RasterCodec {
        self.codec.as_ref()
    }

    /// Decode `request.source` and compress it.
    pub fn compress_bytes(
        &self,
        request: &CompressionRequest,
        cancel: Option<&CancelToken>,
    ) -> ToolResult<CompressionResult> {
        let image = self.codec.decode(&request.source)?;
        let params = CompressParams {
            format: request.resolved_format(),
            allow_resizing: request.allow_resizing,
        };
        self.compress(&image, request.target_bytes, &params, cancel)
    }

    /// Find the highest-fidelity encoding of `image` within `target_bytes`.
    pub fn compress(
        &self,
        image: &RasterImage,
        target_bytes: u64,
        params: &CompressParams,
        cancel: Option<&CancelToken>,
    ) -> ToolResult<CompressionResult> {
        if target_bytes == 0 {
            return Err(ToolError::validation("target_bytes", "must be greater than 0", "0"));
        }

        let mut search = Search {
            codec: self.codec.as_ref(),
            format: params.format,
            target: target_bytes,
            cancel,
            probes: Vec::new(),
            encodes: 0,
            smallest: None,
        };

        if let Some(best) = self.quality_search(&mut search, image)? {
            info!(
                size = best.bytes.len(),
                target = target_bytes,
                quality = best.quality,
                probes = search.encodes,
                "quality search converged"
            );
            return Ok(search.finish(best, false));
        }

        if self.config.linear_fallback && params.format.is_lossy() && search.probes_non_monotone() {
            warn!(
                probes = ?search.probes,
                "encoder size is not monotone in quality; scanning linearly"
            );
            if let Some(best) = self.linear_scan(&mut search, image)? {
                info!(
                    size = best.bytes.len(),
                    target = target_bytes,
                    quality = best.quality,
                    "linear scan found a fit"
                );
                return Ok(search.finish(best, false));
            }
        }

        if params.allow_resizing {
            if let Some(best) = self.resolution_search(&mut search, image)? {
                info!(
                    size = best.bytes.len(),
                    target = target_bytes,
                    width = best.width,
                    height = best.height,
                    scale = best.scale,
                    "resolution escalation converged"
                );
                return Ok(search.finish(best, false));
            }
        }

        let smallest = search
            .smallest
            .take()
            .ok_or_else(|| ToolError::processing("compression search", "no encodes were performed"))?;
        warn!(
            smallest = smallest.bytes.len(),
            target = target_bytes,
            resized = params.allow_resizing,
            "budget unreachable; returning smallest encoding"
        );
        Ok(search.finish(smallest, true))
    }

    /// Binary search at full resolution. Lossless formats need a single probe.
    fn quality_search(
        &self,
        search: &mut Search<'_>,
        image: &RasterImage,
    ) -> ToolResult<Option<Candidate>> {
        let (mut lo, mut hi) = (self.config.quality_min, self.config.quality_max);
        let iterations = if search.format.is_lossy() {
            self.config.iterations
        } else {
            1
        };

        let mut best = None;
        for _ in 0..iterations {
            let mid = (lo + hi) / 2.0;
            let candidate = search.probe(image, mid, 1.0)?;
            search.probes.push((mid, candidate.bytes.len()));
            if candidate.fits(search.target) {
                best = Some(candidate);
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Ok(best)
    }

    /// Evenly spaced qualities from the top of the bracket down; first fit wins.
    fn linear_scan(
        &self,
        search: &mut Search<'_>,
        image: &RasterImage,
    ) -> ToolResult<Option<Candidate>> {
        let (min, max) = (self.config.quality_min, self.config.quality_max);
        let steps = self.config.linear_steps.max(2);
        for i in 0..steps {
            let quality = max - (max - min) * i as f32 / (steps - 1) as f32;
            let candidate = search.probe(image, quality, 1.0)?;
            if candidate.fits(search.target) {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Downscale from the original pixels along the decay ladder.
    fn resolution_search(
        &self,
        search: &mut Search<'_>,
        image: &RasterImage,
    ) -> ToolResult<Option<Candidate>> {
        let ladder = DecayLadder::new(image.size(), self.config.resize_decay, self.config.min_scale)?;
        let mut resizer = Resizer::new();
        for plan in ladder {
            let scaled = resample(&mut resizer, image, &plan)?;
            let candidate = search.probe(&scaled, self.config.resize_quality, plan.factor)?;
            if candidate.fits(search.target) {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }
}

fn resample(resizer: &mut Resizer, image: &RasterImage, plan: &ScalePlan) -> ToolResult<RasterImage> {
    let pixels = scale_rgba_to_vec(resizer, &image.pixels, image.size(), plan)?;
    RasterImage::new(plan.out.w, plan.out.h, pixels)
}

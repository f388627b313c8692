//! # Configuration Module
//!
//! This module provides the configuration structures shared by the CLI, the tool
//! registry and the transformation engines.
//!
//! ## Configuration Parameters
//!
//! | Parameter | Type | Default | Description |
//! |-----------|------|---------|-------------|
//! | `compression.quality_min` | `f32` | 0.01 | Lower bound of the quality bracket |
//! | `compression.quality_max` | `f32` | 1.0 | Upper bound of the quality bracket |
//! | `compression.iterations` | `u32` | 8 | Binary-search probes at full resolution |
//! | `compression.resize_decay` | `f64` | 0.9 | Linear factor applied per resize step |
//! | `compression.min_scale` | `f64` | 0.1 | Smallest linear scale tried |
//! | `compression.resize_quality` | `f32` | 0.7 | Fixed quality used while resizing |
//! | `compression.linear_fallback` | `bool` | true | Linear scan when probes are non-monotone |
//! | `compression.linear_steps` | `u32` | 10 | Points in the linear scan |
//! | `density.default_dpi` | `u32` | 72 | Density reported when a file stores none |
//! | `batch_concurrency` | `usize` | 3 | In-flight items for batch runs |
//!
//! ## Examples
//!
//! ```rust
//! use toolbench::config::ToolbenchConfig;
//!
//! let mut config = ToolbenchConfig::default();
//! config.compression.iterations = 10;
//! assert!(config.validate().is_ok());
//!
//! config.compression.resize_decay = 1.5;
//! assert!(config.validate().is_err());
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ToolError, ToolResult};

/// Parameters of the two-phase target-size search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Lowest quality the binary search may probe, in `(0, 1]`.
    pub quality_min: f32,
    /// Highest quality the binary search may probe, in `(0, 1]`.
    pub quality_max: f32,
    /// Number of halvings of the quality bracket. 8 gives ~1/256 relative precision.
    pub iterations: u32,
    /// Linear factor applied to both dimensions per resolution step, in `(0, 1)`.
    pub resize_decay: f64,
    /// Scale floor relative to the original linear dimension, in `(0, 1]`.
    pub min_scale: f64,
    /// Fixed quality used during resolution escalation.
    pub resize_quality: f32,
    /// Scan the bracket linearly when binary-search probes are non-monotone.
    pub linear_fallback: bool,
    /// Number of evenly spaced qualities in the linear scan.
    pub linear_steps: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            quality_min: 0.01,
            quality_max: 1.0,
            iterations: 8,
            resize_decay: 0.9,
            min_scale: 0.1,
            resize_quality: 0.7,
            linear_fallback: true,
            linear_steps: 10,
        }
    }
}

impl CompressionConfig {
    /// Validates the search parameters.
    pub fn validate(&self) -> Result<(), String> {
        let in_unit = |q: f32| q > 0.0 && q <= 1.0;
        if !in_unit(self.quality_min) || !in_unit(self.quality_max) {
            return Err("Quality bounds must be in (0, 1]".to_string());
        }
        if self.quality_min >= self.quality_max {
            return Err("quality_min must be below quality_max".to_string());
        }
        if self.iterations == 0 || self.iterations > 32 {
            return Err("iterations must be between 1 and 32".to_string());
        }
        if !(self.resize_decay > 0.0 && self.resize_decay < 1.0) {
            return Err("resize_decay must be in (0, 1)".to_string());
        }
        if !(self.min_scale > 0.0 && self.min_scale <= 1.0) {
            return Err("min_scale must be in (0, 1]".to_string());
        }
        if !in_unit(self.resize_quality) {
            return Err("resize_quality must be in (0, 1]".to_string());
        }
        if self.linear_fallback && self.linear_steps < 2 {
            return Err("linear_steps must be at least 2 when linear_fallback is on".to_string());
        }
        Ok(())
    }
}

/// Metadata rewriter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityConfig {
    /// Density reported for files that carry no density field.
    pub default_dpi: u32,
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self { default_dpi: 72 }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolbenchConfig {
    pub compression: CompressionConfig,
    pub density: DensityConfig,
    /// Maximum number of items a batch run keeps in flight.
    pub batch_concurrency: usize,
}

impl Default for ToolbenchConfig {
    fn default() -> Self {
        Self {
            compression: CompressionConfig::default(),
            density: DensityConfig::default(),
            batch_concurrency: 3,
        }
    }
}

impl ToolbenchConfig {
    /// Validates every section.
    pub fn validate(&self) -> Result<(), String> {
        self.compression.validate()?;
        if self.density.default_dpi == 0 || self.density.default_dpi > u32::from(u16::MAX) {
            return Err("default_dpi must be between 1 and 65535".to_string());
        }
        if self.batch_concurrency == 0 {
            return Err("batch_concurrency must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Load a JSON configuration file. Missing keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> ToolResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ToolError::io("read config", e).with_path(path.display().to_string()))?;
        let config: Self = serde_json::from_str(&text)?;
        config
            .validate()
            .map_err(|reason| ToolError::validation("config", reason, path.display().to_string()))?;
        Ok(config)
    }
}

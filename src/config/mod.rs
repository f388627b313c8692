//! # Configuration Module
//!
//! This module provides configuration structures, byte-budget presets and validation
//! for the tool pipeline and its transformation engines.

pub mod config;
pub mod presets;

pub use config::{CompressionConfig, DensityConfig, ToolbenchConfig};
pub use presets::{TargetPreset, parse_byte_size};

//! Byte-budget presets and size-string parsing.
//!
//! The presets mirror the "compress image to N KB" tools people look for most.
//! All sizes use binary multiples: `50kb` is 51 200 bytes.

use serde::{Deserialize, Serialize};

use crate::error::{ToolError, ToolResult};

const KIB: u64 = 1024;

/// Common byte budgets for size-targeted compression.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum TargetPreset {
    /// 10 KB, typical for signature uploads
    #[value(name = "kb10")]
    Kb10,
    /// 20 KB, typical for passport-photo portals
    #[value(name = "kb20")]
    Kb20,
    /// 50 KB
    #[value(name = "kb50")]
    Kb50,
    /// 100 KB
    #[value(name = "kb100")]
    Kb100,
    /// 200 KB
    #[value(name = "kb200")]
    Kb200,
    /// 500 KB
    #[value(name = "kb500")]
    Kb500,
    /// 1 MB
    #[value(name = "mb1")]
    Mb1,
}

impl TargetPreset {
    pub const ALL: [TargetPreset; 7] = [
        TargetPreset::Kb10,
        TargetPreset::Kb20,
        TargetPreset::Kb50,
        TargetPreset::Kb100,
        TargetPreset::Kb200,
        TargetPreset::Kb500,
        TargetPreset::Mb1,
    ];

    /// Budget in bytes.
    pub fn bytes(self) -> u64 {
        match self {
            TargetPreset::Kb10 => 10 * KIB,
            TargetPreset::Kb20 => 20 * KIB,
            TargetPreset::Kb50 => 50 * KIB,
            TargetPreset::Kb100 => 100 * KIB,
            TargetPreset::Kb200 => 200 * KIB,
            TargetPreset::Kb500 => 500 * KIB,
            TargetPreset::Mb1 => 1024 * KIB,
        }
    }

    /// Registry identifier of the fixed-budget tool for this preset.
    pub fn tool_id(self) -> &'static str {
        match self {
            TargetPreset::Kb10 => "compress-image-to-10kb",
            TargetPreset::Kb20 => "compress-image-to-20kb",
            TargetPreset::Kb50 => "compress-image-to-50kb",
            TargetPreset::Kb100 => "compress-image-to-100kb",
            TargetPreset::Kb200 => "compress-image-to-200kb",
            TargetPreset::Kb500 => "compress-image-to-500kb",
            TargetPreset::Mb1 => "compress-image-to-1mb",
        }
    }
}

/// Parse a size string like "51200", "50kb", "1.5mb" into bytes.
pub fn parse_byte_size(text: &str) -> ToolResult<u64> {
    let trimmed = text.trim().to_ascii_lowercase();
    if let Ok(bytes) = trimmed.parse::<u64>() {
        return positive(bytes, text);
    }

    let split = trimmed
        .find(|c: char| c.is_ascii_alphabetic())
        .ok_or_else(|| ToolError::validation("size", "expected a number with optional unit", text))?;
    let (num_str, unit) = trimmed.split_at(split);
    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| ToolError::validation("size", "invalid number", text))?;

    let multiplier = match unit {
        "b" => 1,
        "k" | "kb" | "kib" => KIB,
        "m" | "mb" | "mib" => KIB * KIB,
        _ => {
            return Err(ToolError::validation(
                "size",
                "unknown unit; use b, kb or mb",
                text,
            ));
        }
    };

    if !num.is_finite() || num < 0.0 {
        return Err(ToolError::validation("size", "must be a positive number", text));
    }
    positive((num * multiplier as f64).floor() as u64, text)
}

fn positive(bytes: u64, text: &str) -> ToolResult<u64> {
    if bytes == 0 {
        return Err(ToolError::validation("size", "must be greater than 0", text));
    }
    Ok(bytes)
}

//! Infrastructure configuration - audio device, sample locations, logging.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Audio output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Output sample rate. Decoded samples are resampled to this rate.
    /// Default: 48000
    #[serde(default = "AudioConfig::default_sample_rate")]
    pub sample_rate: u32,

    /// Frames per render block (offline render and device callbacks).
    /// Default: 256
    #[serde(default = "AudioConfig::default_block_frames")]
    pub block_frames: usize,

    /// Simultaneous one-shot voices before new triggers are dropped.
    /// Default: 64
    #[serde(default = "AudioConfig::default_max_voices")]
    pub max_voices: usize,
}

impl AudioConfig {
    fn default_sample_rate() -> u32 {
        48000
    }

    fn default_block_frames() -> usize {
        256
    }

    fn default_max_voices() -> usize {
        64
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: Self::default_sample_rate(),
            block_frames: Self::default_block_frames(),
            max_voices: Self::default_max_voices(),
        }
    }
}

/// A named sample file loaded at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreloadSample {
    pub name: String,
    pub path: PathBuf,
}

/// Samples registered before the first pattern is played.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplesConfig {
    /// Directories scanned for `.wav` files; each registers under its file stem.
    #[serde(default)]
    pub dirs: Vec<PathBuf>,

    /// Explicitly named sample files, registered before directory scans.
    #[serde(default)]
    pub preload: Vec<PreloadSample>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log filter directive (trace, debug, info, warn, error, or EnvFilter syntax).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

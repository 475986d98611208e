//! Configuration loading for Beatbox.
//!
//! Kept dependency-light so both the engine crate and the CLI can import it.
//!
//! # Configuration Philosophy
//!
//! Every value here is fixed once the engine is constructed. Tempo, grid
//! resolution and lookahead intervals are construction options, not runtime
//! knobs; changing them means building a new engine.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, key by key):
//! 1. `/etc/beatbox/config.toml` (system)
//! 2. `~/.config/beatbox/config.toml` (user)
//! 3. `./beatbox.toml` (local override, replaced by an explicit `--config` path)
//! 4. Environment variables (`BEATBOX_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [timing]
//! tempo = 140.0
//! steps_per_beat = 2
//! schedule_ahead_ms = 100
//! poll_interval_ms = 25
//!
//! [grid]
//! cols = 8
//!
//! [recording]
//! countdown_beats = 3
//! capture_beats = 2.0
//!
//! [audio]
//! sample_rate = 48000
//!
//! [samples]
//! dirs = ["~/samples/drums"]
//!
//! [[samples.preload]]
//! name = "clap"
//! path = "~/samples/clap.wav"
//!
//! [telemetry]
//! log_level = "info"
//! ```

pub mod infra;
pub mod loader;
pub mod sequencer;

pub use infra::{AudioConfig, PreloadSample, SamplesConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};
pub use sequencer::{GridConfig, RecordingConfig, TimingConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Complete Beatbox configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeatConfig {
    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub grid: GridConfig,

    #[serde(default)]
    pub recording: RecordingConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub samples: SamplesConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl BeatConfig {
    /// Load configuration, letting `config_path` replace `./beatbox.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in loader::discover_config_files_with_override(config_path) {
            let table = loader::load_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let mut config = loader::from_table(merged, Path::new("<merged>"))?;
        loader::apply_env_overrides(&mut config, &mut sources);
        config.validate()?;

        Ok((config, sources))
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.timing.tempo.is_finite() && self.timing.tempo > 0.0) {
            return Err(ConfigError::Invalid {
                field: "timing.tempo",
                reason: format!("must be a positive number of BPM, got {}", self.timing.tempo),
            });
        }
        if self.timing.steps_per_beat == 0 {
            return Err(ConfigError::Invalid {
                field: "timing.steps_per_beat",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.timing.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "timing.poll_interval_ms",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.grid.cols == 0 {
            return Err(ConfigError::Invalid {
                field: "grid.cols",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.recording.capture_beats > 1.0) {
            return Err(ConfigError::Invalid {
                field: "recording.capture_beats",
                reason: format!(
                    "must be longer than one beat, got {}",
                    self.recording.capture_beats
                ),
            });
        }
        if self.audio.sample_rate == 0 || self.audio.block_frames == 0 {
            return Err(ConfigError::Invalid {
                field: "audio",
                reason: "sample_rate and block_frames must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# Beatbox Configuration\n\n");

        output.push_str("[timing]\n");
        output.push_str(&format!("tempo = {:?}\n", self.timing.tempo));
        output.push_str(&format!("steps_per_beat = {}\n", self.timing.steps_per_beat));
        output.push_str(&format!(
            "schedule_ahead_ms = {}\n",
            self.timing.schedule_ahead_ms
        ));
        output.push_str(&format!("poll_interval_ms = {}\n", self.timing.poll_interval_ms));

        output.push_str("\n[grid]\n");
        output.push_str(&format!("cols = {}\n", self.grid.cols));

        output.push_str("\n[recording]\n");
        output.push_str(&format!(
            "countdown_beats = {}\n",
            self.recording.countdown_beats
        ));
        output.push_str(&format!("capture_beats = {:?}\n", self.recording.capture_beats));

        output.push_str("\n[audio]\n");
        output.push_str(&format!("sample_rate = {}\n", self.audio.sample_rate));
        output.push_str(&format!("block_frames = {}\n", self.audio.block_frames));
        output.push_str(&format!("max_voices = {}\n", self.audio.max_voices));

        output.push_str("\n[samples]\n");
        output.push_str("dirs = [\n");
        for dir in &self.samples.dirs {
            output.push_str(&format!("    {},\n", quoted(&dir.display().to_string())));
        }
        output.push_str("]\n");
        for sample in &self.samples.preload {
            output.push_str("\n[[samples.preload]]\n");
            output.push_str(&format!("name = {}\n", quoted(&sample.name)));
            output.push_str(&format!(
                "path = {}\n",
                quoted(&sample.path.display().to_string())
            ));
        }

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = {}\n", quoted(&self.telemetry.log_level)));

        output
    }
}

/// `value` as a TOML string literal, escaped as needed
fn quoted(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

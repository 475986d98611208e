//! Sequencer configuration - fixed when the engine is constructed.

use serde::{Deserialize, Serialize};

/// Tempo and lookahead settings for the playback scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Quarter-note beats per minute.
    /// Default: 140
    #[serde(default = "TimingConfig::default_tempo")]
    pub tempo: f64,

    /// Grid columns per quarter-note beat (2 = eighth notes).
    /// Default: 2
    #[serde(default = "TimingConfig::default_steps_per_beat")]
    pub steps_per_beat: u32,

    /// How far past the audio clock events are pre-scheduled.
    /// Default: 100
    #[serde(default = "TimingConfig::default_schedule_ahead_ms")]
    pub schedule_ahead_ms: u64,

    /// How often the scheduler wakes up.
    /// Default: 25
    #[serde(default = "TimingConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl TimingConfig {
    fn default_tempo() -> f64 {
        140.0
    }

    fn default_steps_per_beat() -> u32 {
        2
    }

    fn default_schedule_ahead_ms() -> u64 {
        100
    }

    fn default_poll_interval_ms() -> u64 {
        25
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tempo: Self::default_tempo(),
            steps_per_beat: Self::default_steps_per_beat(),
            schedule_ahead_ms: Self::default_schedule_ahead_ms(),
            poll_interval_ms: Self::default_poll_interval_ms(),
        }
    }
}

/// Step grid dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Columns in one measure. Rows grow as samples are registered.
    /// Default: 8
    #[serde(default = "GridConfig::default_cols")]
    pub cols: usize,
}

impl GridConfig {
    fn default_cols() -> usize {
        8
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cols: Self::default_cols(),
        }
    }
}

/// Countdown and capture lengths for live sample recording, in beats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Countdown ticks shown before capture starts.
    /// Default: 3
    #[serde(default = "RecordingConfig::default_countdown_beats")]
    pub countdown_beats: u32,

    /// Capture length. Must exceed one beat so a full beat is always captured.
    /// Default: 2.0
    #[serde(default = "RecordingConfig::default_capture_beats")]
    pub capture_beats: f64,
}

impl RecordingConfig {
    fn default_countdown_beats() -> u32 {
        3
    }

    fn default_capture_beats() -> f64 {
        2.0
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            countdown_beats: Self::default_countdown_beats(),
            capture_beats: Self::default_capture_beats(),
        }
    }
}

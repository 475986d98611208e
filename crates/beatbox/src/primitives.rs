//! Core primitives for beatbox
//!
//! Audio-clock time, sample identity, and the tempo arithmetic shared by the
//! scheduler and the recorder.

use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// TIME TYPES
// =============================================================================

/// Absolute audio-clock time in seconds
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
pub struct Second(pub f64);

impl Second {
    pub fn zero() -> Self {
        Self(0.0)
    }

    /// Time of `frame` at `sample_rate`
    pub fn from_frames(frame: u64, sample_rate: u32) -> Self {
        Self(frame as f64 / sample_rate as f64)
    }

    /// Nearest frame index at `sample_rate`. Negative times clamp to frame 0.
    pub fn to_frame(self, sample_rate: u32) -> u64 {
        (self.0 * sample_rate as f64).round().max(0.0) as u64
    }
}

impl Add for Second {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Second(self.0 + rhs.0)
    }
}

impl Sub for Second {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Second(self.0 - rhs.0)
    }
}

impl From<std::time::Duration> for Second {
    fn from(d: std::time::Duration) -> Self {
        Second(d.as_secs_f64())
    }
}

impl fmt::Display for Second {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0)
    }
}

/// Tempo and grid resolution. Quarter-note beats, `steps_per_beat` columns each.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepTiming {
    pub tempo: f64,
    pub steps_per_beat: u32,
}

impl StepTiming {
    pub fn new(tempo: f64, steps_per_beat: u32) -> Self {
        Self {
            tempo,
            steps_per_beat,
        }
    }

    pub fn seconds_per_beat(&self) -> Second {
        Second(60.0 / self.tempo)
    }

    /// Length of one grid column: `(60 / tempo) / steps_per_beat`
    pub fn tick_time(&self) -> Second {
        Second(self.seconds_per_beat().0 / self.steps_per_beat as f64)
    }
}

impl Default for StepTiming {
    fn default() -> Self {
        Self::from(&beatconf::TimingConfig::default())
    }
}

impl From<&beatconf::TimingConfig> for StepTiming {
    fn from(config: &beatconf::TimingConfig) -> Self {
        Self::new(config.tempo, config.steps_per_beat)
    }
}

// =============================================================================
// IDENTITY
// =============================================================================

/// Stable handle to a registered sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleId(pub Uuid);

impl SampleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SampleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Playback transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
}

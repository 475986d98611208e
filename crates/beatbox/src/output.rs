//! Audio output seam
//!
//! The scheduler only ever sees this trait: read the audio clock, and queue a
//! sample to start at an absolute clock time. Both calls must return without
//! blocking on the audio thread.

use thiserror::Error;

use crate::library::Sample;
use crate::primitives::Second;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("trigger queue is full")]
    QueueFull,

    #[error("no output device available")]
    NoDevice,

    #[error("audio device error: {0}")]
    Device(String),

    #[error("failed to write audio file: {0}")]
    Write(#[from] hound::Error),
}

/// Sample-accurate one-shot playback against a running audio clock
pub trait AudioOutput: Send + Sync {
    /// Current audio-clock time
    fn now(&self) -> Second;

    /// A suspended output does not advance its clock
    fn is_suspended(&self) -> bool;

    fn resume(&self);

    /// Start `sample` at exactly `at` on the audio clock. Times already in the
    /// past start as soon as possible.
    fn schedule(&self, at: Second, sample: &Sample) -> Result<(), OutputError>;
}

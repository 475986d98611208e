//! Beatbox: step-sequencer drum machine
//!
//! A grid of (sample x step) toggles drives sample-accurate one-shot playback
//! locked to a tempo clock. The pieces, leaves first:
//!
//! - **SampleLibrary**: decoded, immutable sample buffers keyed by name
//! - **StepGrid**: rows of samples by columns of steps, each cell on or off
//! - **Scheduler**: lookahead timing; queues every active cell ahead of the audio clock
//! - **Transport**: play/pause around the scheduler's wake-up loop
//! - **Recorder**: countdown, capture, and registration of a new sample
//!
//! [`Beatbox`] ties them together and is the only thing a UI needs to hold.
//! State changes are broadcast as [`BeatboxEvent`]s.

pub mod beatbox;
pub mod decode;
#[cfg(feature = "cpal-device")]
pub mod device;
pub mod events;
pub mod grid;
pub mod library;
pub mod mixer;
pub mod output;
pub mod pattern;
pub mod primitives;
pub mod recording;
pub mod render;
pub mod scheduler;
pub mod task;
pub mod transport;

pub use beatbox::{Beatbox, BeatboxError};
pub use decode::{decode_audio, decode_wav, DecodeError, DecodedAudio};
pub use events::{BeatboxEvent, EventBus};
pub use grid::{GridError, StepGrid};
pub use library::{LibraryError, Sample, SampleLibrary};
pub use mixer::{mixer_pair, Mixer, MixerHandle};
pub use output::{AudioOutput, OutputError};
pub use pattern::{parse_pattern, PatternError, PatternLine, RowRef};
pub use primitives::*;
pub use recording::{ActiveCapture, CaptureDevice, RecorderState, RecordingError};
pub use render::RenderReport;
pub use scheduler::{PumpStats, Scheduler};
pub use task::RepeatingTask;
pub use transport::Transport;

//! Live sample recording
//!
//! ```text
//! Idle ─begin─▶ CountingDown(n) ─▶ … ─▶ CountingDown(1) ─▶ Capturing ─▶ Idle
//!                    │ one beat each                       │ capture_beats
//!                    └────────────── cancel ───────────────┴──────▶ Idle
//! ```
//!
//! The countdown and capture run as their own task chain, independent of the
//! scheduler. Captured PCM chunks are accumulated, joined into one WAV buffer
//! and registered through the same path as any other sample, so the new grid
//! row only appears once decoding succeeded.
//!
//! A recorder built without a working capture device is permanently
//! [`RecorderState::Disabled`]; that is reported once, at construction.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::beatbox::SharedState;
use crate::decode;
use crate::events::BeatboxEvent;
use crate::library::LibraryError;
use crate::primitives::StepTiming;

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("recording is disabled (no capture device)")]
    Disabled,

    #[error("a recording is already in progress ({0:?})")]
    Busy(RecorderState),

    #[error("capture device failed to start: {0}")]
    StartFailed(String),

    #[error("nothing was captured")]
    NothingCaptured,

    #[error("failed to encode capture: {0}")]
    Encode(#[from] hound::Error),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error("recording cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "remaining", rename_all = "snake_case")]
pub enum RecorderState {
    Disabled,
    Idle,
    CountingDown(u32),
    Capturing,
}

/// A source of interleaved f32 PCM
pub trait CaptureDevice: Send + Sync {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Start delivering chunks to `sink` until the returned capture is stopped
    /// or dropped.
    fn start(&self, sink: mpsc::UnboundedSender<Vec<f32>>) -> Result<ActiveCapture, RecordingError>;
}

/// A running capture. Stops on [`ActiveCapture::stop`] or drop.
pub struct ActiveCapture {
    stop: Option<Box<dyn FnOnce() + Send>>,
}

impl ActiveCapture {
    pub fn new(stop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            stop: Some(Box::new(stop)),
        }
    }

    pub fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
    }
}

impl Drop for ActiveCapture {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RecordingTiming {
    pub beat: Duration,
    pub countdown_beats: u32,
    pub capture_beats: f64,
}

impl RecordingTiming {
    pub fn new(timing: StepTiming, config: &beatconf::RecordingConfig) -> Self {
        Self {
            beat: Duration::from_secs_f64(timing.seconds_per_beat().0),
            countdown_beats: config.countdown_beats,
            capture_beats: config.capture_beats,
        }
    }

    pub fn capture_length(&self) -> Duration {
        self.beat.mul_f64(self.capture_beats)
    }
}

pub struct Recorder {
    device: Option<Arc<dyn CaptureDevice>>,
    state: Arc<Mutex<RecorderState>>,
    /// Token of the running session. Locked after `state`, never before.
    cancel: Arc<Mutex<Option<CancellationToken>>>,
    timing: RecordingTiming,
    context: Arc<SharedState>,
    runtime: Handle,
}

impl Recorder {
    pub(crate) fn new(
        device: Result<Arc<dyn CaptureDevice>, RecordingError>,
        timing: RecordingTiming,
        context: Arc<SharedState>,
        runtime: Handle,
    ) -> Self {
        let (device, state) = match device {
            Ok(device) => (Some(device), RecorderState::Idle),
            Err(e) => {
                warn!(error = %e, "recording disabled");
                (None, RecorderState::Disabled)
            }
        };

        Self {
            device,
            state: Arc::new(Mutex::new(state)),
            cancel: Arc::new(Mutex::new(None)),
            timing,
            context,
            runtime,
        }
    }

    pub fn state(&self) -> RecorderState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_enabled(&self) -> bool {
        self.device.is_some()
    }

    /// Start the countdown for a new sample called `name`.
    ///
    /// Fails immediately when disabled, busy, or when `name` is taken.
    pub fn begin(&self, name: &str) -> Result<(), RecordingError> {
        let Some(device) = self.device.clone() else {
            debug!(sample = %name, "recording requested while disabled");
            return Err(RecordingError::Disabled);
        };

        let token = CancellationToken::new();
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != RecorderState::Idle {
                return Err(RecordingError::Busy(*state));
            }
            if self.context.library().contains_name(name) {
                return Err(LibraryError::DuplicateName(name.to_string()).into());
            }
            *state = RecorderState::CountingDown(self.timing.countdown_beats);
            *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        }

        let session = Session {
            name: name.to_string(),
            device,
            state: Arc::clone(&self.state),
            cancel: Arc::clone(&self.cancel),
            timing: self.timing,
            context: Arc::clone(&self.context),
        };
        info!(sample = %name, "recording countdown started");
        self.runtime.spawn(session.run(token));
        Ok(())
    }

    /// Abandon the current countdown or capture. Nothing is registered.
    pub fn cancel(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, RecorderState::Idle | RecorderState::Disabled) {
            return false;
        }
        match self.cancel.lock().unwrap_or_else(PoisonError::into_inner).take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// One capture attempt
struct Session {
    name: String,
    device: Arc<dyn CaptureDevice>,
    state: Arc<Mutex<RecorderState>>,
    cancel: Arc<Mutex<Option<CancellationToken>>>,
    timing: RecordingTiming,
    context: Arc<SharedState>,
}

impl Session {
    async fn run(self, cancel: CancellationToken) {
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(RecordingError::Cancelled),
            result = self.countdown_and_capture() => result,
        };

        match result {
            Ok(row) => {
                info!(sample = %self.name, row, "recording registered");
                self.context.events.emit(BeatboxEvent::RecordingFinished {
                    name: self.name.clone(),
                    row,
                });
            }
            Err(RecordingError::Cancelled) => {
                info!(sample = %self.name, "recording cancelled");
            }
            Err(e) => {
                warn!(sample = %self.name, error = %e, "recording failed");
                self.context.events.emit(BeatboxEvent::RecordingFailed {
                    name: self.name.clone(),
                    reason: e.to_string(),
                });
            }
        }

        // the slot may already be empty after a cancel; either way it is ours
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = None;
        *state = RecorderState::Idle;
    }

    async fn countdown_and_capture(&self) -> Result<usize, RecordingError> {
        for remaining in (1..=self.timing.countdown_beats).rev() {
            self.set_state(RecorderState::CountingDown(remaining));
            self.context
                .events
                .emit(BeatboxEvent::CountdownTick { remaining });
            tokio::time::sleep(self.timing.beat).await;
        }

        self.set_state(RecorderState::Capturing);
        self.context.events.emit(BeatboxEvent::RecordingStarted {
            name: self.name.clone(),
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let capture = self.device.start(tx)?;

        let mut chunks: Vec<Vec<f32>> = Vec::new();
        let deadline = tokio::time::sleep(self.timing.capture_length());
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                Some(chunk) = rx.recv() => chunks.push(chunk),
            }
        }
        capture.stop();
        while let Ok(chunk) = rx.try_recv() {
            chunks.push(chunk);
        }

        let pcm = chunks.concat();
        debug!(sample = %self.name, chunks = chunks.len(), samples = pcm.len(), "capture stopped");
        if pcm.is_empty() {
            return Err(RecordingError::NothingCaptured);
        }

        let wav = decode::encode_wav(&pcm, self.device.sample_rate(), self.device.channels())?;
        let (_, row) = self.context.register(&self.name, wav).await?;
        Ok(row)
    }

    fn set_state(&self, state: RecorderState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

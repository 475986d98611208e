//! Shared fakes for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use beatbox::{
    decode::encode_wav, ActiveCapture, AudioOutput, CaptureDevice, OutputError, RecordingError,
    Sample, Second,
};
use beatconf::BeatConfig;
use tokio::sync::mpsc;

/// Output whose audio clock is tokio's clock, so `start_paused` tests are exact.
/// Records triggers instead of playing them.
pub struct ClockedOutput {
    origin: tokio::time::Instant,
    suspended: AtomicBool,
    triggers: Mutex<Vec<(Second, String)>>,
}

impl ClockedOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            origin: tokio::time::Instant::now(),
            suspended: AtomicBool::new(true),
            triggers: Mutex::new(Vec::new()),
        })
    }

    pub fn triggers(&self) -> Vec<(Second, String)> {
        self.triggers.lock().unwrap().clone()
    }
}

impl AudioOutput for ClockedOutput {
    fn now(&self) -> Second {
        (tokio::time::Instant::now() - self.origin).into()
    }

    fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    fn resume(&self) {
        self.suspended.store(false, Ordering::SeqCst);
    }

    fn schedule(&self, at: Second, sample: &Sample) -> Result<(), OutputError> {
        self.triggers.lock().unwrap().push((at, sample.name.clone()));
        Ok(())
    }
}

/// Capture device that replays fixed chunks as soon as it starts
pub struct ScriptedCapture {
    pub chunks: Vec<Vec<f32>>,
    pub fail_to_start: bool,
    pub stopped: Arc<AtomicBool>,
}

impl ScriptedCapture {
    pub fn new(chunks: Vec<Vec<f32>>) -> Self {
        Self {
            chunks,
            fail_to_start: false,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl CaptureDevice for ScriptedCapture {
    fn sample_rate(&self) -> u32 {
        8000
    }

    fn channels(&self) -> u16 {
        1
    }

    fn start(&self, sink: mpsc::UnboundedSender<Vec<f32>>) -> Result<ActiveCapture, RecordingError> {
        if self.fail_to_start {
            return Err(RecordingError::StartFailed("scripted failure".to_string()));
        }
        for chunk in &self.chunks {
            let _ = sink.send(chunk.clone());
        }
        let stopped = Arc::clone(&self.stopped);
        Ok(ActiveCapture::new(move || stopped.store(true, Ordering::SeqCst)))
    }
}

/// tempo 60 with two steps per beat: one column every 0.5s
pub fn half_second_config(cols: usize) -> BeatConfig {
    let mut config = BeatConfig::default();
    config.timing.tempo = 60.0;
    config.timing.steps_per_beat = 2;
    config.grid.cols = cols;
    config
}

pub fn short_wav() -> Vec<u8> {
    encode_wav(&[0.5; 64], 48000, 2).unwrap()
}

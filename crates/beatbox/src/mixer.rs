//! One-shot sample mixer
//!
//! Split into two halves connected by a lock-free SPSC ring:
//!
//! ```text
//!   control side                         audio thread
//!   MixerHandle::schedule() ──rtrb──▶ Mixer::render()
//!        │                                   │
//!        └──── now() ◀── frames rendered ────┘
//! ```
//!
//! The audio clock *is* the number of frames the mixer has rendered, so a
//! trigger for time `t` lands on frame `round(t * sample_rate)` exactly, even
//! when that frame falls in the middle of a block.
//!
//! **Key invariant:** `render()` never allocates or locks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rtrb::{Consumer, Producer, PushError, RingBuffer};

use crate::library::Sample;
use crate::output::{AudioOutput, OutputError};
use crate::primitives::Second;

enum MixerCommand {
    Trigger { start_frame: u64, buffer: Arc<[f32]> },
}

/// State shared between both halves
struct MixerShared {
    sample_rate: u32,
    frames_rendered: AtomicU64,
    suspended: AtomicBool,
    dropped_voices: AtomicU64,
}

#[derive(Default)]
struct Voice {
    buffer: Option<Arc<[f32]>>,
    start_frame: u64,
    /// Next frame of `buffer` to play
    position: usize,
}

/// Audio-thread half. Owns the voice pool and advances the clock.
pub struct Mixer {
    rx: Consumer<MixerCommand>,
    voices: Vec<Voice>,
    shared: Arc<MixerShared>,
}

/// Control half. Implements [`AudioOutput`].
pub struct MixerHandle {
    tx: Mutex<Producer<MixerCommand>>,
    shared: Arc<MixerShared>,
}

/// Create a connected mixer pair. Output starts suspended.
pub fn mixer_pair(sample_rate: u32, max_voices: usize) -> (Mixer, MixerHandle) {
    let (tx, rx) = RingBuffer::<MixerCommand>::new(max_voices.max(1) * 4);

    let shared = Arc::new(MixerShared {
        sample_rate,
        frames_rendered: AtomicU64::new(0),
        suspended: AtomicBool::new(true),
        dropped_voices: AtomicU64::new(0),
    });

    let mixer = Mixer {
        rx,
        voices: (0..max_voices).map(|_| Voice::default()).collect(),
        shared: Arc::clone(&shared),
    };
    let handle = MixerHandle {
        tx: Mutex::new(tx),
        shared,
    };

    (mixer, handle)
}

impl Mixer {
    /// Render one block of interleaved stereo into `out`.
    ///
    /// While suspended this writes silence and the clock stays put.
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        if self.shared.suspended.load(Ordering::Acquire) {
            return;
        }

        while let Ok(cmd) = self.rx.pop() {
            match cmd {
                MixerCommand::Trigger {
                    start_frame,
                    buffer,
                } => match self.voices.iter_mut().find(|v| v.buffer.is_none()) {
                    Some(voice) => {
                        voice.buffer = Some(buffer);
                        voice.start_frame = start_frame;
                        voice.position = 0;
                    }
                    None => {
                        self.shared.dropped_voices.fetch_add(1, Ordering::Relaxed);
                    }
                },
            }
        }

        let block_start = self.shared.frames_rendered.load(Ordering::Relaxed);
        let block_frames = out.len() / 2;

        for voice in &mut self.voices {
            let Some(buffer) = voice.buffer.as_ref() else {
                continue;
            };

            // Voices whose start has passed begin at the top of the block
            let offset = voice.start_frame.saturating_sub(block_start);
            if offset >= block_frames as u64 {
                continue;
            }

            let total = buffer.len() / 2;
            let mut pos = voice.position;
            for frame in offset as usize..block_frames {
                if pos >= total {
                    break;
                }
                out[frame * 2] += buffer[pos * 2];
                out[frame * 2 + 1] += buffer[pos * 2 + 1];
                pos += 1;
            }

            voice.position = pos;
            if pos >= total {
                voice.buffer = None;
            }
        }

        self.shared
            .frames_rendered
            .fetch_add(block_frames as u64, Ordering::Release);
    }
}

impl MixerHandle {
    /// Triggers discarded because every voice was busy
    pub fn dropped_voices(&self) -> u64 {
        self.shared.dropped_voices.load(Ordering::Relaxed)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.shared.frames_rendered.load(Ordering::Acquire)
    }
}

impl AudioOutput for MixerHandle {
    fn now(&self) -> Second {
        Second::from_frames(self.frames_rendered(), self.shared.sample_rate)
    }

    fn is_suspended(&self) -> bool {
        self.shared.suspended.load(Ordering::Acquire)
    }

    fn resume(&self) {
        self.shared.suspended.store(false, Ordering::Release);
    }

    fn schedule(&self, at: Second, sample: &Sample) -> Result<(), OutputError> {
        let cmd = MixerCommand::Trigger {
            start_frame: at.to_frame(self.shared.sample_rate),
            buffer: Arc::clone(&sample.buffer),
        };
        let mut tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        tx.push(cmd).map_err(|PushError::Full(_)| OutputError::QueueFull)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::SampleId;

    fn impulse(name: &str, frames: usize) -> Sample {
        let mut buffer = vec![0.0; frames * 2];
        buffer[0] = 1.0;
        buffer[1] = 1.0;
        Sample {
            id: SampleId::new(),
            name: name.to_string(),
            duration: Second::from_frames(frames as u64, 1000),
            buffer: Arc::from(buffer),
        }
    }

    fn active_voices(mixer: &Mixer) -> usize {
        mixer.voices.iter().filter(|v| v.buffer.is_some()).count()
    }

    fn first_nonzero_frame(block: &[f32]) -> Option<usize> {
        block.iter().position(|&s| s != 0.0).map(|i| i / 2)
    }

    #[test]
    fn test_starts_suspended_and_clock_holds() {
        let (mut mixer, handle) = mixer_pair(1000, 4);
        let mut block = vec![1.0; 128];

        assert!(handle.is_suspended());
        mixer.render(&mut block);
        assert_eq!(handle.now(), Second(0.0));
        assert!(block.iter().all(|&s| s == 0.0));

        handle.resume();
        mixer.render(&mut block);
        assert_eq!(handle.frames_rendered(), 64);
        assert_eq!(handle.now(), Second(0.064));
    }

    #[test]
    fn test_mid_block_start_is_sample_accurate() {
        let (mut mixer, handle) = mixer_pair(1000, 4);
        handle.resume();
        let mut block = vec![0.0; 128];

        // 0.074s at 1kHz = frame 74, i.e. frame 10 of the second block
        handle.schedule(Second(0.074), &impulse("tick", 4)).unwrap();

        mixer.render(&mut block);
        assert_eq!(first_nonzero_frame(&block), None);

        mixer.render(&mut block);
        assert_eq!(first_nonzero_frame(&block), Some(10));
        assert_eq!(block[20], 1.0);
        assert_eq!(block[21], 1.0);
    }

    #[test]
    fn test_late_trigger_starts_immediately() {
        let (mut mixer, handle) = mixer_pair(1000, 4);
        handle.resume();
        let mut block = vec![0.0; 64];
        mixer.render(&mut block);
        mixer.render(&mut block);

        handle.schedule(Second(0.0), &impulse("late", 4)).unwrap();
        mixer.render(&mut block);
        assert_eq!(first_nonzero_frame(&block), Some(0));
    }

    #[test]
    fn test_voice_spans_blocks_and_frees_slot() {
        let (mut mixer, handle) = mixer_pair(1000, 1);
        handle.resume();
        let mut sample = impulse("long", 40);
        // mark the last frame so we can find it in the next block
        let mut buffer = sample.buffer.to_vec();
        buffer[78] = 0.5;
        sample.buffer = Arc::from(buffer);

        handle.schedule(Second(0.020), &sample).unwrap();
        let mut block = vec![0.0; 64];
        mixer.render(&mut block); // frames 0..32, voice plays 20..32
        assert_eq!(active_voices(&mixer), 1);

        mixer.render(&mut block); // frames 32..64, voice ends at frame 59
        assert_eq!(block[(59 - 32) * 2], 0.5);
        assert_eq!(active_voices(&mixer), 0);
    }

    #[test]
    fn test_exhausted_pool_drops_and_counts() {
        let (mut mixer, handle) = mixer_pair(1000, 1);
        handle.resume();

        handle.schedule(Second(0.0), &impulse("a", 100)).unwrap();
        handle.schedule(Second(0.0), &impulse("b", 100)).unwrap();

        let mut block = vec![0.0; 64];
        mixer.render(&mut block);
        assert_eq!(active_voices(&mixer), 1);
        assert_eq!(handle.dropped_voices(), 1);
    }
}

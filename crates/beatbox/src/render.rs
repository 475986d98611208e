//! Offline rendering
//!
//! Drives the same scheduler and mixer as live playback, but the audio clock
//! advances one block at a time instead of in real time. Output is
//! bit-for-bit what the mixer would have played.

use std::path::Path;

use tracing::{info, warn};

use crate::grid::StepGrid;
use crate::library::SampleLibrary;
use crate::mixer::mixer_pair;
use crate::output::{AudioOutput, OutputError};
use crate::primitives::Second;
use crate::scheduler::Scheduler;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderReport {
    pub frames: u64,
    pub beats: usize,
    pub triggered: usize,
    pub dropped_voices: u64,
}

/// Render `measures` passes over the grid to interleaved stereo.
///
/// The output runs past the last beat until the longest sample has finished.
pub fn render_pattern(
    config: &beatconf::BeatConfig,
    grid: &StepGrid,
    library: &SampleLibrary,
    measures: u32,
) -> (Vec<f32>, RenderReport) {
    let sample_rate = library.sample_rate();
    let block_frames = config.audio.block_frames.max(1);
    let (mut mixer, handle) = mixer_pair(sample_rate, config.audio.max_voices);
    let mut scheduler = Scheduler::from_config(&config.timing);

    let tick = scheduler.tick_time();
    let total_beats = grid.cols() * measures as usize;
    let pattern_end = Second(tick.0 * total_beats as f64);
    let tail = library.iter().map(|s| s.frames() as u64).max().unwrap_or(0);
    let total_frames = pattern_end.to_frame(sample_rate) + tail;

    let block_time = Second::from_frames(block_frames as u64, sample_rate);
    if block_time >= scheduler.schedule_ahead() {
        warn!(
            %block_time,
            schedule_ahead = %scheduler.schedule_ahead(),
            "render block is longer than the lookahead; triggers will start late"
        );
    }

    handle.resume();
    scheduler.reset(Second::zero());

    // The window never reaches past half a tick after the last beat, so the
    // next measure's downbeat can't sneak in
    let last_beat = Second(tick.0 * total_beats.saturating_sub(1) as f64);
    let last_wake = last_beat + Second(tick.0 / 2.0) - scheduler.schedule_ahead();
    let mut report = RenderReport::default();
    let mut out = Vec::with_capacity(total_frames as usize * 2);
    let mut block = vec![0.0f32; block_frames * 2];

    while (out.len() / 2) < total_frames as usize {
        let now = handle.now();
        if report.beats < total_beats {
            let clock = if now < last_wake { now } else { last_wake };
            let stats = scheduler.pump(clock, grid, library, &handle, |_, _| {});
            report.beats += stats.beats;
            report.triggered += stats.triggered;
        }

        mixer.render(&mut block);
        let remaining = total_frames as usize - out.len() / 2;
        let take = remaining.min(block_frames) * 2;
        out.extend_from_slice(&block[..take]);
    }

    report.frames = (out.len() / 2) as u64;
    report.dropped_voices = handle.dropped_voices();
    if report.dropped_voices > 0 {
        warn!(dropped = report.dropped_voices, "voice pool exhausted during render");
    }

    (out, report)
}

/// Write interleaved stereo as a 32-bit float WAV file
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), OutputError> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    info!(path = %path.display(), frames = samples.len() / 2, "wrote WAV");
    Ok(())
}

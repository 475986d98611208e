//! Host audio devices via cpal
//!
//! Output: the default device runs [`Mixer::render`] from its callback, so the
//! mixer's frame counter is the device clock.
//!
//! Input: the default microphone, as a [`CaptureDevice`]. `cpal::Stream` may
//! not leave the thread that built it, so each capture owns a short-lived
//! thread that builds the stream, forwards chunks, and drops the stream when
//! told to stop.

use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::mixer::{mixer_pair, Mixer, MixerHandle};
use crate::output::OutputError;
use crate::recording::{ActiveCapture, CaptureDevice, RecordingError};

/// Open the default output device and start rendering.
///
/// The stream must be kept alive for as long as audio should play.
pub fn open_output(audio: &beatconf::AudioConfig) -> Result<(cpal::Stream, MixerHandle), OutputError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(OutputError::NoDevice)?;

    let config = cpal::StreamConfig {
        channels: 2,
        sample_rate: cpal::SampleRate(audio.sample_rate),
        buffer_size: cpal::BufferSize::Fixed(audio.block_frames as u32),
    };

    let (mut mixer, handle): (Mixer, MixerHandle) = mixer_pair(audio.sample_rate, audio.max_voices);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                mixer.render(data);
            },
            |err| error!("audio output stream error: {}", err),
            None,
        )
        .map_err(|e| OutputError::Device(e.to_string()))?;
    stream
        .play()
        .map_err(|e| OutputError::Device(e.to_string()))?;

    info!(
        device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
        sample_rate = audio.sample_rate,
        block_frames = audio.block_frames,
        "opened output device"
    );

    Ok((stream, handle))
}

/// The default input device
pub struct CpalCapture {
    sample_rate: u32,
    channels: u16,
}

/// Probe the default input device. An error here disables recording.
pub fn open_capture() -> Result<Arc<dyn CaptureDevice>, RecordingError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| RecordingError::DeviceUnavailable("no default input device".to_string()))?;
    let supported = device
        .default_input_config()
        .map_err(|e| RecordingError::DeviceUnavailable(e.to_string()))?;

    check_input(supported.sample_format(), supported.channels())?;

    let capture = CpalCapture {
        sample_rate: supported.sample_rate().0,
        channels: supported.channels(),
    };
    info!(
        sample_rate = capture.sample_rate,
        channels = capture.channels,
        "opened input device"
    );
    Ok(Arc::new(capture))
}

/// Captures are registered through the mono/stereo decode path, so only f32
/// inputs with one or two channels are accepted.
fn check_input(format: cpal::SampleFormat, channels: u16) -> Result<(), RecordingError> {
    if format != cpal::SampleFormat::F32 {
        return Err(RecordingError::DeviceUnavailable(format!(
            "unsupported input sample format {format:?}"
        )));
    }
    if !(1..=2).contains(&channels) {
        return Err(RecordingError::DeviceUnavailable(format!(
            "unsupported input channel count {channels}"
        )));
    }
    Ok(())
}

impl CaptureDevice for CpalCapture {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn start(&self, sink: mpsc::UnboundedSender<Vec<f32>>) -> Result<ActiveCapture, RecordingError> {
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), String>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let config = cpal::StreamConfig {
            channels: self.channels,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        thread::Builder::new()
            .name("beatbox-capture".to_string())
            .spawn(move || {
                let stream = match build_input_stream(&config, sink) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Sender dropped or stop sent; either way we are done
                let _ = stop_rx.recv();
                drop(stream);
                debug!("capture stream closed");
            })
            .map_err(|e| RecordingError::StartFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(ActiveCapture::new(move || {
                let _ = stop_tx.send(());
            })),
            Ok(Err(e)) => Err(RecordingError::StartFailed(e)),
            Err(_) => Err(RecordingError::StartFailed("capture thread exited".to_string())),
        }
    }
}

fn build_input_stream(
    config: &cpal::StreamConfig,
    sink: mpsc::UnboundedSender<Vec<f32>>,
) -> Result<cpal::Stream, String> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| "no default input device".to_string())?;

    let stream = device
        .build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let _ = sink.send(data.to_vec());
            },
            |err| error!("audio input stream error: {}", err),
            None,
        )
        .map_err(|e| e.to_string())?;
    stream.play().map_err(|e| e.to_string())?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_input_accepts_mono_and_stereo_f32() {
        assert!(check_input(cpal::SampleFormat::F32, 1).is_ok());
        assert!(check_input(cpal::SampleFormat::F32, 2).is_ok());
    }

    #[test]
    fn test_check_input_rejects_wide_or_integer_inputs() {
        for (format, channels) in [
            (cpal::SampleFormat::F32, 4),
            (cpal::SampleFormat::F32, 0),
            (cpal::SampleFormat::I16, 2),
        ] {
            assert!(matches!(
                check_input(format, channels),
                Err(RecordingError::DeviceUnavailable(_))
            ));
        }
    }
}

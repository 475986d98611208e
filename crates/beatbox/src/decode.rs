//! Sample decoding
//!
//! Supports WAV (via hound) and optionally MP3/FLAC (via symphonia when the
//! `symphonia-decode` feature is enabled).
//!
//! Everything the mixer plays is interleaved stereo f32 at the output rate, so
//! decoded audio is normalised here once, at registration time, and never in the
//! render path.

use std::io::Cursor;

use thiserror::Error;
use tracing::debug;

/// Why raw bytes could not become a playable buffer
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid WAV data: {0}")]
    Wav(#[from] hound::Error),

    #[error("unsupported audio format (enable symphonia-decode feature for MP3/FLAC)")]
    UnsupportedFormat,

    #[error("decode failed: {0}")]
    Codec(String),

    #[error("no audio track found")]
    NoTrack,

    #[error("audio contains no frames")]
    Empty,

    #[error("unsupported channel count {0} (mono or stereo only)")]
    UnsupportedChannels(u16),

    #[error("invalid sample rate {0}")]
    InvalidSampleRate(u32),

    #[error("decoding infrastructure unavailable: {0}")]
    Unavailable(String),
}

/// Decoded audio as found in the source
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved samples (L, R, L, R, ...) or mono
    pub samples: Vec<f32>,
    /// Original sample rate
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
}

impl DecodedAudio {
    /// Total number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Convert to interleaved stereo at `target_rate`.
    ///
    /// Mono is duplicated to both sides. More than two channels is rejected
    /// rather than guessing at a downmix.
    pub fn into_stereo(self, target_rate: u32) -> Result<Vec<f32>, DecodeError> {
        if self.sample_rate == 0 {
            return Err(DecodeError::InvalidSampleRate(self.sample_rate));
        }
        if self.frames() == 0 {
            return Err(DecodeError::Empty);
        }

        let stereo = match self.channels {
            1 => self.samples.iter().flat_map(|&s| [s, s]).collect(),
            2 => {
                let mut samples = self.samples;
                samples.truncate(samples.len() - samples.len() % 2);
                samples
            }
            n => return Err(DecodeError::UnsupportedChannels(n)),
        };

        Ok(resample_linear(&stereo, self.sample_rate, target_rate))
    }
}

/// Linear interpolation resampler over interleaved stereo frames
pub fn resample_linear(stereo: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || stereo.len() < 2 {
        return stereo.to_vec();
    }

    let frames = stereo.len() / 2;
    let ratio = target_rate as f64 / source_rate as f64;
    let out_frames = (frames as f64 * ratio).ceil() as usize;
    let mut out = Vec::with_capacity(out_frames * 2);

    for i in 0..out_frames {
        let src_pos = i as f64 / ratio;
        let idx = src_pos.floor() as usize;
        let frac = (src_pos - idx as f64) as f32;

        if idx + 1 >= frames {
            out.push(stereo[(frames - 1) * 2]);
            out.push(stereo[(frames - 1) * 2 + 1]);
        } else {
            for ch in 0..2 {
                let a = stereo[idx * 2 + ch];
                let b = stereo[(idx + 1) * 2 + ch];
                out.push(a * (1.0 - frac) + b * frac);
            }
        }
    }

    out
}

/// Decode WAV audio using hound (always available)
pub fn decode_wav(data: &[u8]) -> Result<DecodedAudio, DecodeError> {
    let reader = hound::WavReader::new(Cursor::new(data))?;

    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<_, _>>()?
        }
    };

    debug!(
        sample_rate = spec.sample_rate,
        channels = spec.channels,
        samples = samples.len(),
        "decoded WAV"
    );

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Decode audio using symphonia (MP3, FLAC)
#[cfg(feature = "symphonia-decode")]
pub fn decode_audio_symphonia(data: &[u8]) -> Result<DecodedAudio, DecodeError> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::errors::Error as SymphoniaError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let codec_err = |e: SymphoniaError| DecodeError::Codec(e.to_string());

    let cursor = Cursor::new(data.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let probed = symphonia::default::get_probe().format(
        &Hint::new(),
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )
    .map_err(codec_err)?;

    let mut format = probed.format;
    let track = format.default_track().ok_or(DecodeError::NoTrack)?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(DecodeError::InvalidSampleRate(0))?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(codec_err)?;

    let track_id = track.id;
    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(codec_err(e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder.decode(&packet).map_err(codec_err)?;

        let spec = *decoded.spec();
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        samples.extend(sample_buf.samples());
    }

    debug!(sample_rate, channels, samples = samples.len(), "decoded compressed audio");

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

/// Decode audio from raw bytes
///
/// Tries WAV first (hound), then symphonia formats if the feature is enabled.
pub fn decode_audio(data: &[u8]) -> Result<DecodedAudio, DecodeError> {
    if data.len() >= 4 && &data[0..4] == b"RIFF" {
        return decode_wav(data);
    }

    #[cfg(feature = "symphonia-decode")]
    {
        decode_audio_symphonia(data)
    }

    #[cfg(not(feature = "symphonia-decode"))]
    {
        Err(DecodeError::UnsupportedFormat)
    }
}

/// Decode and normalise to interleaved stereo at `target_rate`
pub fn decode_to_stereo(data: &[u8], target_rate: u32) -> Result<Vec<f32>, DecodeError> {
    decode_audio(data)?.into_stereo(target_rate)
}

/// Encode interleaved f32 PCM as a float WAV file in memory
pub fn encode_wav(samples: &[f32], sample_rate: u32, channels: u16) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

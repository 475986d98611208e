//! Sample library
//!
//! Owns every decoded sample. Rows in the step grid refer to samples by
//! [`SampleId`]; buffers are shared with the mixer through `Arc` so a trigger
//! never copies audio.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::decode::{self, DecodeError};
use crate::primitives::{SampleId, Second};

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("sample not found: {0}")]
    NotFound(SampleId),

    #[error("a sample named {0:?} is already registered")]
    DuplicateName(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// A decoded, immutable, playable sample
#[derive(Debug, Clone)]
pub struct Sample {
    pub id: SampleId,
    pub name: String,
    /// Interleaved stereo at the library's sample rate
    pub buffer: Arc<[f32]>,
    pub duration: Second,
}

impl Sample {
    pub fn frames(&self) -> usize {
        self.buffer.len() / 2
    }
}

/// Name-keyed store of decoded samples
#[derive(Debug)]
pub struct SampleLibrary {
    sample_rate: u32,
    samples: HashMap<SampleId, Sample>,
    by_name: HashMap<String, SampleId>,
    order: Vec<SampleId>,
}

impl SampleLibrary {
    /// Create an empty library producing buffers at `sample_rate`
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            samples: HashMap::new(),
            by_name: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Decode `raw` and store it under `name`.
    ///
    /// Decoding happens on the calling thread. The async path in
    /// [`crate::Beatbox::register_sample`] decodes on the blocking pool and
    /// then calls [`SampleLibrary::insert`].
    pub fn register(&mut self, name: &str, raw: &[u8]) -> Result<SampleId, LibraryError> {
        self.ensure_unique(name)?;
        let stereo = decode::decode_to_stereo(raw, self.sample_rate)?;
        self.insert(name, stereo)
    }

    /// Store an already-normalised stereo buffer under `name`
    pub fn insert(&mut self, name: &str, stereo: Vec<f32>) -> Result<SampleId, LibraryError> {
        self.ensure_unique(name)?;
        if stereo.len() < 2 {
            return Err(DecodeError::Empty.into());
        }

        let id = SampleId::new();
        let duration = Second::from_frames((stereo.len() / 2) as u64, self.sample_rate);
        let sample = Sample {
            id,
            name: name.to_string(),
            buffer: Arc::from(stereo),
            duration,
        };

        info!(sample = %name, %id, %duration, "registered sample");

        self.samples.insert(id, sample);
        self.by_name.insert(name.to_string(), id);
        self.order.push(id);
        Ok(id)
    }

    /// Look up a sample. Never blocks.
    pub fn get(&self, id: SampleId) -> Result<&Sample, LibraryError> {
        self.samples.get(&id).ok_or_else(|| {
            debug!(%id, "sample lookup missed");
            LibraryError::NotFound(id)
        })
    }

    pub fn id_for(&self, name: &str) -> Option<SampleId> {
        self.by_name.get(name).copied()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Samples in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.order.iter().filter_map(|id| self.samples.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn ensure_unique(&self, name: &str) -> Result<(), LibraryError> {
        if self.by_name.contains_key(name) {
            return Err(LibraryError::DuplicateName(name.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click_wav(frames: usize) -> Vec<u8> {
        let samples: Vec<f32> = (0..frames).flat_map(|i| {
            let v = if i == 0 { 1.0 } else { 0.0 };
            [v, v]
        }).collect();
        decode::encode_wav(&samples, 48000, 2).unwrap()
    }

    #[test]
    fn test_register_and_get() {
        let mut library = SampleLibrary::new(48000);
        let id = library.register("kick", &click_wav(4800)).unwrap();

        let sample = library.get(id).unwrap();
        assert_eq!(sample.name, "kick");
        assert_eq!(sample.frames(), 4800);
        assert!((sample.duration.0 - 0.1).abs() < 1e-9);
        assert_eq!(library.id_for("kick"), Some(id));
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let library = SampleLibrary::new(48000);
        let missing = SampleId::new();
        assert!(matches!(library.get(missing), Err(LibraryError::NotFound(id)) if id == missing));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut library = SampleLibrary::new(48000);
        library.register("snare", &click_wav(10)).unwrap();
        let err = library.register("snare", &click_wav(10)).unwrap_err();
        assert!(matches!(err, LibraryError::DuplicateName(ref n) if n == "snare"));
        assert_eq!(library.len(), 1);
    }

    #[test]
    fn test_decode_failure_registers_nothing() {
        let mut library = SampleLibrary::new(48000);
        let err = library.register("noise", b"not audio at all").unwrap_err();
        assert!(matches!(err, LibraryError::Decode(_)));
        assert!(library.is_empty());
        assert!(!library.contains_name("noise"));
    }

    #[test]
    fn test_iter_is_registration_order() {
        let mut library = SampleLibrary::new(48000);
        for name in ["kick", "snare", "hat"] {
            library.register(name, &click_wav(8)).unwrap();
        }
        let names: Vec<_> = library.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["kick", "snare", "hat"]);
    }
}

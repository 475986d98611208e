//! The drum machine context
//!
//! [`Beatbox`] owns everything the presentation layer talks to: the sample
//! library, the step grid, the transport and the recorder. Library and grid
//! sit behind read/write locks shared with the scheduler's wake-up task.
//! Whenever both are needed the library is locked first.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use beatconf::{BeatConfig, SamplesConfig};
use thiserror::Error;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::decode::{self, DecodeError};
use crate::events::{BeatboxEvent, EventBus};
use crate::grid::{GridError, StepGrid};
use crate::library::{LibraryError, SampleLibrary};
use crate::output::{AudioOutput, OutputError};
use crate::pattern::{PatternError, PatternLine, RowRef};
use crate::primitives::{SampleId, Second, StepTiming, TransportState};
use crate::recording::{CaptureDevice, Recorder, RecorderState, RecordingError, RecordingTiming};
use crate::render::{self, RenderReport};
use crate::scheduler::Scheduler;
use crate::transport::Transport;

#[derive(Debug, Error)]
pub enum BeatboxError {
    #[error("beatbox must be created inside a tokio runtime: {0}")]
    NoRuntime(#[from] TryCurrentError),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Recording(#[from] RecordingError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Config(#[from] beatconf::ConfigError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// State shared between the context, the scheduler task and the recorder
pub(crate) struct SharedState {
    library: RwLock<SampleLibrary>,
    grid: RwLock<StepGrid>,
    pub(crate) events: EventBus,
}

impl SharedState {
    fn new(sample_rate: u32, cols: usize) -> Self {
        Self {
            library: RwLock::new(SampleLibrary::new(sample_rate)),
            grid: RwLock::new(StepGrid::new(cols)),
            events: EventBus::new(),
        }
    }

    pub(crate) fn library(&self) -> RwLockReadGuard<'_, SampleLibrary> {
        self.library.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn grid(&self) -> RwLockReadGuard<'_, StepGrid> {
        self.grid.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn grid_mut(&self) -> RwLockWriteGuard<'_, StepGrid> {
        self.grid.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decode on the blocking pool, then add the sample and its grid row
    /// together. Nothing changes unless decoding succeeds.
    pub(crate) async fn register(
        &self,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<(SampleId, usize), LibraryError> {
        let sample_rate = {
            let library = self.library();
            if library.contains_name(name) {
                return Err(LibraryError::DuplicateName(name.to_string()));
            }
            library.sample_rate()
        };

        let stereo =
            tokio::task::spawn_blocking(move || decode::decode_to_stereo(&bytes, sample_rate))
                .await
                .map_err(|e| DecodeError::Unavailable(e.to_string()))??;

        let (id, row) = {
            let mut library = self.library.write().unwrap_or_else(PoisonError::into_inner);
            let mut grid = self.grid_mut();
            let id = library.insert(name, stereo)?;
            (id, grid.append_row(id))
        };

        self.events.emit(BeatboxEvent::SampleAdded {
            row,
            name: name.to_string(),
            id,
        });
        Ok((id, row))
    }
}

/// Step-sequencer drum machine
pub struct Beatbox {
    config: BeatConfig,
    context: Arc<SharedState>,
    transport: Transport,
    recorder: Recorder,
}

impl Beatbox {
    /// Build a drum machine playing through `output`.
    ///
    /// `capture` is the microphone, or the reason there isn't one; without it
    /// recording stays disabled for the life of this instance. Must be called
    /// from within a tokio runtime.
    pub fn new(
        config: BeatConfig,
        output: Arc<dyn AudioOutput>,
        capture: Result<Arc<dyn CaptureDevice>, RecordingError>,
    ) -> Result<Self, BeatboxError> {
        config.validate()?;
        let runtime = Handle::try_current()?;

        let context = Arc::new(SharedState::new(config.audio.sample_rate, config.grid.cols));
        let scheduler = Scheduler::from_config(&config.timing);
        let transport = Transport::new(
            scheduler,
            output,
            Arc::clone(&context),
            runtime.clone(),
        );
        let recorder = Recorder::new(
            capture,
            RecordingTiming::new(StepTiming::from(&config.timing), &config.recording),
            Arc::clone(&context),
            runtime,
        );

        info!(
            tempo = config.timing.tempo,
            steps_per_beat = config.timing.steps_per_beat,
            cols = config.grid.cols,
            recording = recorder.is_enabled(),
            "beatbox ready"
        );

        Ok(Self {
            config,
            context,
            transport,
            recorder,
        })
    }

    pub fn config(&self) -> &BeatConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BeatboxEvent> {
        self.context.events.subscribe()
    }

    // --- grid ---------------------------------------------------------------

    /// Flip one cell; returns its new state
    pub fn toggle_cell(&self, row: usize, col: usize) -> Result<bool, GridError> {
        let active = self.context.grid_mut().toggle(row, col)?;
        debug!(row, col, active, "toggled cell");
        Ok(active)
    }

    pub fn is_active(&self, row: usize, col: usize) -> Result<bool, GridError> {
        self.context.grid().is_active(row, col)
    }

    /// Copy of the grid as it is right now
    pub fn grid_snapshot(&self) -> StepGrid {
        self.context.grid().clone()
    }

    /// Activate every cell named by `pattern`. Cells not mentioned are left alone.
    ///
    /// All or nothing: an unknown sample or out-of-range cell anywhere in the
    /// pattern leaves the grid unchanged.
    pub fn apply_pattern(&self, pattern: &[PatternLine]) -> Result<(), BeatboxError> {
        let library = self.context.library();
        let mut grid = self.context.grid_mut();

        let mut cells = Vec::new();
        for line in pattern {
            let row = match &line.row {
                RowRef::Index(row) => *row,
                RowRef::Name(name) => library
                    .id_for(name)
                    .and_then(|id| grid.row_of(id))
                    .ok_or_else(|| PatternError::UnknownSample(name.clone()))?,
            };
            for &col in &line.cols {
                grid.is_active(row, col)?;
                cells.push((row, col));
            }
        }

        for (row, col) in cells {
            grid.set(row, col, true)?;
        }
        Ok(())
    }

    // --- samples ------------------------------------------------------------

    /// Decode and register a sample, appending one empty grid row on success
    pub async fn register_sample(&self, name: &str, bytes: Vec<u8>) -> Result<SampleId, LibraryError> {
        let (id, _row) = self.context.register(name, bytes).await?;
        Ok(id)
    }

    pub fn sample_names(&self) -> Vec<String> {
        self.context
            .library()
            .iter()
            .map(|s| s.name.clone())
            .collect()
    }

    /// Register configured samples: named files first, then every `.wav` in
    /// each directory, by file name. Directory entries that fail to decode or
    /// clash with an existing name are skipped with a warning.
    pub async fn preload(&self, samples: &SamplesConfig) -> Result<usize, BeatboxError> {
        let mut loaded = 0;

        for sample in &samples.preload {
            let bytes = read_file(&sample.path).await?;
            self.register_sample(&sample.name, bytes).await?;
            loaded += 1;
        }

        for dir in &samples.dirs {
            for path in wav_files(dir).await? {
                let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned())
                else {
                    continue;
                };
                let bytes = read_file(&path).await?;
                match self.register_sample(&name, bytes).await {
                    Ok(_) => loaded += 1,
                    Err(e) => warn!(path = %path.display(), error = %e, "skipped sample"),
                }
            }
        }

        info!(loaded, "preloaded samples");
        Ok(loaded)
    }

    // --- transport ----------------------------------------------------------

    pub fn transport_play(&self) -> bool {
        self.transport.play()
    }

    pub fn transport_pause(&self) -> bool {
        self.transport.pause()
    }

    pub fn transport_state(&self) -> TransportState {
        self.transport.state()
    }

    /// Column the scheduler will play next
    pub fn beat(&self) -> usize {
        self.transport.beat()
    }

    pub fn next_note_time(&self) -> Second {
        self.transport.next_note_time()
    }

    // --- recording ----------------------------------------------------------

    pub fn begin_recording(&self, name: &str) -> Result<(), RecordingError> {
        self.recorder.begin(name)
    }

    pub fn cancel_recording(&self) -> bool {
        self.recorder.cancel()
    }

    pub fn recorder_state(&self) -> RecorderState {
        self.recorder.state()
    }

    // --- offline ------------------------------------------------------------

    /// Render `measures` passes of the current grid to a WAV file
    pub fn render_to_file(&self, path: &Path, measures: u32) -> Result<RenderReport, BeatboxError> {
        let (audio, report) = {
            let library = self.context.library();
            let grid = self.context.grid();
            render::render_pattern(&self.config, &grid, &library, measures)
        };
        render::write_wav(path, &audio, self.config.audio.sample_rate)?;
        Ok(report)
    }
}

async fn read_file(path: &Path) -> Result<Vec<u8>, BeatboxError> {
    tokio::fs::read(path).await.map_err(|source| BeatboxError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// `.wav` files directly inside `dir`, sorted by path
async fn wav_files(dir: &Path) -> Result<Vec<PathBuf>, BeatboxError> {
    let io_err = |source| BeatboxError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        let is_wav = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
        if is_wav && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::Sample;
    use std::sync::Mutex;

    /// Audio clock driven by tokio's (pausable) clock
    struct TokioClockOutput {
        origin: tokio::time::Instant,
        suspended: Mutex<bool>,
        triggers: Mutex<Vec<(Second, String)>>,
    }

    impl TokioClockOutput {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                origin: tokio::time::Instant::now(),
                suspended: Mutex::new(true),
                triggers: Mutex::new(Vec::new()),
            })
        }
    }

    impl AudioOutput for TokioClockOutput {
        fn now(&self) -> Second {
            (tokio::time::Instant::now() - self.origin).into()
        }
        fn is_suspended(&self) -> bool {
            *self.suspended.lock().unwrap()
        }
        fn resume(&self) {
            *self.suspended.lock().unwrap() = false;
        }
        fn schedule(&self, at: Second, sample: &Sample) -> Result<(), OutputError> {
            self.triggers.lock().unwrap().push((at, sample.name.clone()));
            Ok(())
        }
    }

    fn wav() -> Vec<u8> {
        decode::encode_wav(&[0.5, 0.5, 0.25, 0.25], 48000, 2).unwrap()
    }

    fn beatbox(output: Arc<TokioClockOutput>) -> Beatbox {
        Beatbox::new(
            BeatConfig::default(),
            output,
            Err(RecordingError::DeviceUnavailable("test".to_string())),
        )
        .unwrap()
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let result = Beatbox::new(
            BeatConfig::default(),
            TokioClockOutput::new(),
            Err(RecordingError::DeviceUnavailable("test".to_string())),
        );
        assert!(matches!(result, Err(BeatboxError::NoRuntime(_))));
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let mut config = BeatConfig::default();
        config.grid.cols = 0;
        let result = Beatbox::new(
            config,
            TokioClockOutput::new(),
            Err(RecordingError::DeviceUnavailable("test".to_string())),
        );
        assert!(matches!(result, Err(BeatboxError::Config(_))));
    }

    #[tokio::test]
    async fn test_register_appends_one_empty_row() {
        let beatbox = beatbox(TokioClockOutput::new());
        let mut events = beatbox.subscribe();

        let id = beatbox.register_sample("clap", wav()).await.unwrap();

        let grid = beatbox.grid_snapshot();
        assert_eq!(grid.rows(), 1);
        assert_eq!(grid.sample_at(0), Some(id));
        assert_eq!(grid.active_at(0).count(), 0);
        assert!((0..grid.cols()).all(|c| !grid.is_active(0, c).unwrap()));

        assert_eq!(
            events.recv().await.unwrap(),
            BeatboxEvent::SampleAdded {
                row: 0,
                name: "clap".to_string(),
                id,
            }
        );
    }

    #[tokio::test]
    async fn test_failed_decode_leaves_grid_unchanged() {
        let beatbox = beatbox(TokioClockOutput::new());
        beatbox.register_sample("kick", wav()).await.unwrap();

        let err = beatbox
            .register_sample("broken", b"RIFF....garbage".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::Decode(_)));
        assert_eq!(beatbox.grid_snapshot().rows(), 1);
        assert_eq!(beatbox.sample_names(), vec!["kick".to_string()]);
    }

    #[tokio::test]
    async fn test_apply_pattern_by_name_and_index() {
        let beatbox = beatbox(TokioClockOutput::new());
        beatbox.register_sample("kick", wav()).await.unwrap();
        beatbox.register_sample("snare", wav()).await.unwrap();

        let pattern = crate::pattern::parse_pattern("snare:2,6;0:0,4").unwrap();
        beatbox.apply_pattern(&pattern).unwrap();

        assert!(beatbox.is_active(0, 0).unwrap());
        assert!(beatbox.is_active(0, 4).unwrap());
        assert!(beatbox.is_active(1, 2).unwrap());
        assert!(beatbox.is_active(1, 6).unwrap());
        assert!(!beatbox.is_active(1, 0).unwrap());

        let unknown = crate::pattern::parse_pattern("cowbell:1").unwrap();
        assert!(matches!(
            beatbox.apply_pattern(&unknown),
            Err(BeatboxError::Pattern(PatternError::UnknownSample(_)))
        ));
    }

    #[tokio::test]
    async fn test_rejected_pattern_leaves_grid_unchanged() {
        let beatbox = beatbox(TokioClockOutput::new());
        beatbox.register_sample("kick", wav()).await.unwrap();

        let out_of_range = crate::pattern::parse_pattern("kick:0,1;kick:99").unwrap();
        assert!(matches!(
            beatbox.apply_pattern(&out_of_range),
            Err(BeatboxError::Grid(GridError::OutOfBounds { .. }))
        ));

        let unknown_later = crate::pattern::parse_pattern("0:2,3;cowbell:1").unwrap();
        assert!(matches!(
            beatbox.apply_pattern(&unknown_later),
            Err(BeatboxError::Pattern(PatternError::UnknownSample(_)))
        ));

        let grid = beatbox.grid_snapshot();
        assert!((0..grid.cols()).all(|c| !grid.is_active(0, c).unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_resumes_output_and_pause_is_idempotent() {
        let output = TokioClockOutput::new();
        let beatbox = beatbox(Arc::clone(&output));

        assert!(beatbox.transport_play());
        assert!(!output.is_suspended());
        assert!(!beatbox.transport_play());
        assert_eq!(beatbox.transport_state(), TransportState::Playing);

        assert!(beatbox.transport_pause());
        assert!(!beatbox.transport_pause());
        assert_eq!(beatbox.transport_state(), TransportState::Stopped);
    }

    #[tokio::test]
    async fn test_preload_from_dir_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("snare.wav"), wav()).unwrap();
        std::fs::write(dir.path().join("kick.WAV"), wav()).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"not a sample").unwrap();

        let beatbox = beatbox(TokioClockOutput::new());
        let samples = SamplesConfig {
            dirs: vec![dir.path().to_path_buf()],
            preload: vec![],
        };
        let loaded = beatbox.preload(&samples).await.unwrap();

        assert_eq!(loaded, 2);
        assert_eq!(beatbox.sample_names(), vec!["kick", "snare"]);
    }
}

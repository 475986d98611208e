//! Lookahead scheduler
//!
//! Wakes up often (every `poll_interval`) and schedules a little into the
//! future (`schedule_ahead`) so timing never depends on when the wake-up
//! itself runs:
//!
//! ```text
//!  audio clock  ──────●────────────────────────────▶
//!                    now        now + ahead
//!                     │◀──────────────▶│
//!  beats           ▲     ▲     ▲     ▲ │   ▲
//!                  └─ scheduled ─────┘ │   └ next wake-up
//! ```
//!
//! Every beat whose start falls inside the window is handed to the audio
//! output at its exact clock time. The cursor (`beat`, `next_note_time`)
//! only moves forward; `reset()` is the one place it jumps.

use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::grid::StepGrid;
use crate::library::SampleLibrary;
use crate::output::AudioOutput;
use crate::primitives::{Second, StepTiming};

/// Per-wake-up results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub beats: usize,
    pub triggered: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    timing: StepTiming,
    schedule_ahead: Second,
    poll_interval: Duration,
    beat: usize,
    /// Beats scheduled since the last reset
    steps: u64,
    origin: Second,
    next_note_time: Second,
}

impl Scheduler {
    pub fn new(timing: StepTiming, schedule_ahead: Duration, poll_interval: Duration) -> Self {
        Self {
            timing,
            schedule_ahead: schedule_ahead.into(),
            poll_interval,
            beat: 0,
            steps: 0,
            origin: Second::zero(),
            next_note_time: Second::zero(),
        }
    }

    pub fn from_config(config: &beatconf::TimingConfig) -> Self {
        Self::new(
            StepTiming::from(config),
            Duration::from_millis(config.schedule_ahead_ms),
            Duration::from_millis(config.poll_interval_ms),
        )
    }

    pub fn timing(&self) -> StepTiming {
        self.timing
    }

    pub fn tick_time(&self) -> Second {
        self.timing.tick_time()
    }

    pub fn schedule_ahead(&self) -> Second {
        self.schedule_ahead
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Column the next scheduled beat will play
    pub fn beat(&self) -> usize {
        self.beat
    }

    pub fn next_note_time(&self) -> Second {
        self.next_note_time
    }

    /// Rewind to column 0 starting at `now`
    pub fn reset(&mut self, now: Second) {
        self.beat = 0;
        self.steps = 0;
        self.origin = now;
        self.next_note_time = now;
    }

    /// Schedule every beat that starts before `now + schedule_ahead`.
    ///
    /// `on_beat` is called once per beat with its column and start time, after
    /// that column's triggers were queued. Lookup and queue failures skip the
    /// trigger and never stop the loop.
    pub fn pump<F>(
        &mut self,
        now: Second,
        grid: &StepGrid,
        library: &SampleLibrary,
        output: &dyn AudioOutput,
        mut on_beat: F,
    ) -> PumpStats
    where
        F: FnMut(usize, Second),
    {
        let mut stats = PumpStats::default();
        let cols = grid.cols().max(1);
        let horizon = now + self.schedule_ahead;
        let tick = self.tick_time();

        while self.next_note_time < horizon {
            let at = self.next_note_time;

            for (row, id) in grid.active_at(self.beat) {
                let result = library
                    .get(id)
                    .map_err(|e| e.to_string())
                    .and_then(|sample| output.schedule(at, sample).map_err(|e| e.to_string()));
                match result {
                    Ok(()) => stats.triggered += 1,
                    Err(reason) => {
                        stats.skipped += 1;
                        warn!(beat = self.beat, row, %at, %reason, "skipped trigger");
                    }
                }
            }

            trace!(beat = self.beat, %at, "scheduled beat");
            on_beat(self.beat, at);
            stats.beats += 1;

            // Derived from the origin, not accumulated, so long runs don't drift
            self.steps += 1;
            self.next_note_time = self.origin + Second(tick.0 * self.steps as f64);
            self.beat = (self.beat + 1) % cols;
        }

        if stats.beats > 1 {
            debug!(beats = stats.beats, %now, "caught up multiple beats in one wake-up");
        }

        stats
    }
}

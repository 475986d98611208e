//! Play/pause state machine around the scheduler's wake-up loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tracing::info;

use crate::beatbox::SharedState;
use crate::events::BeatboxEvent;
use crate::output::AudioOutput;
use crate::primitives::{Second, TransportState};
use crate::scheduler::Scheduler;
use crate::task::RepeatingTask;

struct Cursor {
    playing: AtomicBool,
    scheduler: Mutex<Scheduler>,
}

pub struct Transport {
    cursor: Arc<Cursor>,
    task: Mutex<RepeatingTask>,
    output: Arc<dyn AudioOutput>,
    context: Arc<SharedState>,
    runtime: Handle,
}

impl Transport {
    pub(crate) fn new(
        scheduler: Scheduler,
        output: Arc<dyn AudioOutput>,
        context: Arc<SharedState>,
        runtime: Handle,
    ) -> Self {
        Self {
            cursor: Arc::new(Cursor {
                playing: AtomicBool::new(false),
                scheduler: Mutex::new(scheduler),
            }),
            task: Mutex::new(RepeatingTask::new("scheduler")),
            output,
            context,
            runtime,
        }
    }

    pub fn state(&self) -> TransportState {
        if self.cursor.playing.load(Ordering::Acquire) {
            TransportState::Playing
        } else {
            TransportState::Stopped
        }
    }

    /// Stopped -> Playing. Returns false if already playing.
    ///
    /// Rewinds to column 0 at the current audio-clock time and resumes a
    /// suspended output before the first wake-up.
    pub fn play(&self) -> bool {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if self.cursor.playing.load(Ordering::Acquire) {
            return false;
        }

        let now = self.output.now();
        let poll_interval = {
            let mut scheduler = self.scheduler();
            scheduler.reset(now);
            scheduler.poll_interval()
        };
        if self.output.is_suspended() {
            self.output.resume();
        }
        self.cursor.playing.store(true, Ordering::Release);

        let cursor = Arc::clone(&self.cursor);
        let output = Arc::clone(&self.output);
        let context = Arc::clone(&self.context);
        task.start(&self.runtime, poll_interval, move || {
            wake(&cursor, &context, output.as_ref());
        });

        info!(%now, "transport playing");
        self.context.events.emit(BeatboxEvent::TransportStateChanged {
            state: TransportState::Playing,
        });
        true
    }

    /// Playing -> Stopped. Returns false if already stopped.
    ///
    /// Returns only after any wake-up already inside the scheduler has
    /// finished, so nothing is queued once this returns. The beat cursor is
    /// left where it was; the next `play()` rewinds it.
    pub fn pause(&self) -> bool {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.cursor.playing.swap(false, Ordering::AcqRel) {
            return false;
        }
        task.cancel();
        let beat = self.scheduler().beat();

        info!(beat, "transport stopped");
        self.context.events.emit(BeatboxEvent::TransportStateChanged {
            state: TransportState::Stopped,
        });
        true
    }

    pub fn beat(&self) -> usize {
        self.scheduler().beat()
    }

    pub fn next_note_time(&self) -> Second {
        self.scheduler().next_note_time()
    }

    fn scheduler(&self) -> std::sync::MutexGuard<'_, Scheduler> {
        self.cursor
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.cursor.playing.store(false, Ordering::Release);
    }
}

/// One scheduler wake-up. Lock order: library, grid, scheduler.
fn wake(cursor: &Cursor, context: &SharedState, output: &dyn AudioOutput) {
    if !cursor.playing.load(Ordering::Acquire) {
        return;
    }

    let library = context.library();
    let grid = context.grid();
    let mut scheduler = cursor
        .scheduler
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    // pause() may have landed while we waited for the locks
    if !cursor.playing.load(Ordering::Acquire) {
        return;
    }

    scheduler.pump(output.now(), &grid, &library, output, |col, at| {
        context.events.emit(BeatboxEvent::BeatAdvance { col, at });
    });
}

//! Cancellable repeating wake-up task
//!
//! Each `start()` bumps a monotonic generation counter and spawns a ticker
//! bound to that generation. `cancel()` bumps it again and fires the
//! ticker's cancellation token. A wake-up that was already in flight when
//! cancellation happened compares generations before running and does nothing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::trace;

struct Running {
    generation: u64,
    cancel: CancellationToken,
}

pub struct RepeatingTask {
    name: &'static str,
    generation: Arc<AtomicU64>,
    running: Option<Running>,
}

impl RepeatingTask {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            generation: Arc::new(AtomicU64::new(0)),
            running: None,
        }
    }

    /// Run `wake` immediately and then every `period` until cancelled.
    ///
    /// Any previously started loop is cancelled first.
    pub fn start<F>(&mut self, runtime: &Handle, period: Duration, mut wake: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.cancel();

        let my_generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let generation = Arc::clone(&self.generation);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let name = self.name;

        runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if generation.load(Ordering::Acquire) != my_generation {
                            trace!(task = name, my_generation, "stale wake-up ignored");
                            break;
                        }
                        wake();
                    }
                }
            }
        });

        self.running = Some(Running {
            generation: my_generation,
            cancel,
        });
    }

    /// Stop the loop. Safe to call when nothing is running.
    pub fn cancel(&mut self) {
        if let Some(running) = self.running.take() {
            self.generation.fetch_add(1, Ordering::AcqRel);
            running.cancel.cancel();
            trace!(task = self.name, generation = running.generation, "cancelled");
        }
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

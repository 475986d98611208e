//! Notifications for the presentation layer
//!
//! Broadcast to every subscriber. Sending never blocks and never fails the
//! sender: with no subscribers, or a subscriber that fell behind, events are
//! simply lost for that subscriber.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::primitives::{SampleId, Second, TransportState};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BeatboxEvent {
    /// A column was scheduled to sound at `at` on the audio clock
    BeatAdvance { col: usize, at: Second },

    SampleAdded {
        row: usize,
        name: String,
        id: SampleId,
    },

    /// Countdown before capture; `remaining` counts down to 1
    CountdownTick { remaining: u32 },

    RecordingStarted { name: String },

    RecordingFinished { name: String, row: usize },

    RecordingFailed { name: String, reason: String },

    TransportStateChanged { state: TransportState },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BeatboxEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn emit(&self, event: BeatboxEvent) {
        // Err only means nobody is listening
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BeatboxEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

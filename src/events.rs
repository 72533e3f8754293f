//! Console Event Bus
//!
//! Asynchronous pub/sub for feed refreshes, manual-input saves and cache
//! invalidation. Each dashboard owns its bus; there is no global instance.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::feeds::FeedKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ConsoleEvent {
    /// A feed delivered a snapshot that replaced the previous one
    FeedUpdated { feed: FeedKey, seq: u64 },
    /// A feed refresh failed; the section now shows an error
    FeedFailed { feed: FeedKey, seq: u64, reason: String },
    /// An out-of-order response was discarded
    StaleResultDropped { feed: FeedKey, seq: u64, latest: u64 },
    /// Manual input changes were accepted by the backend
    ManualInputsSaved { fields: Vec<String> },
    /// The backend refused a manual input update
    ManualInputRejected { fields: Vec<String>, reason: String },
    /// Derived category and score state was dropped
    DerivedStateInvalidated,
}

pub struct EventBus {
    tx: broadcast::Sender<ConsoleEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: ConsoleEvent) {
        let _ = self.tx.send(event);
    }

    /// Create a new subscriber
    pub fn subscribe(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

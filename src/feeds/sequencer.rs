//! Per-feed request sequencing
//!
//! Every fetch takes a monotonic ticket; a result is applied only if no
//! newer result for the same feed was applied first.

use std::sync::atomic::{AtomicU64, Ordering};

use super::FeedKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket {
    pub feed: FeedKey,
    pub seq: u64,
}

#[derive(Debug, Default)]
pub struct RequestSequencer {
    counters: [AtomicU64; 4],
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, feed: FeedKey) -> RequestTicket {
        let seq = self.counters[feed.index()].fetch_add(1, Ordering::SeqCst) + 1;
        RequestTicket { feed, seq }
    }

    /// Sequence number of the most recently issued ticket
    pub fn latest(&self, feed: FeedKey) -> u64 {
        self.counters[feed.index()].load(Ordering::SeqCst)
    }
}

//! Dashboard State
//!
//! Owns the latest state of every feed, applies results in request order per
//! feed and composes the aggregate view on demand. A closed dashboard
//! ignores results that arrive late.

pub mod aggregate;
pub mod cache;

pub use aggregate::{
    compose, AggregateView, CategoryView, CmdsView, ComponentView, Composer, FeedState, FrsView, ManualFieldView,
    ManualGroupView, ManualView, VpView,
};
pub use cache::CategoryCache;

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::events::{ConsoleEvent, EventBus};
use crate::feeds::{FeedError, FeedKey, RequestSequencer, RequestTicket};
use crate::manual::ManualInputsState;
use crate::scoring::{CmdsSnapshot, FrsSnapshot, VpSnapshot};

struct Slot<T> {
    state: FeedState<T>,
    applied_seq: u64,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            state: FeedState::Pending,
            applied_seq: 0,
        }
    }
}

#[derive(Default)]
struct Slots {
    cmds: Slot<CmdsSnapshot>,
    frs: Slot<FrsSnapshot>,
    vp: Slot<VpSnapshot>,
    manual: Slot<ManualInputsState>,
}

pub struct Dashboard {
    sequencer: RequestSequencer,
    slots: RwLock<Slots>,
    categories: CategoryCache,
    composer: Composer,
    events: Arc<EventBus>,
    closed: AtomicBool,
}

impl Dashboard {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            sequencer: RequestSequencer::new(),
            slots: RwLock::new(Slots::default()),
            categories: CategoryCache::new(),
            composer: Composer::default(),
            events,
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_composer(mut self, composer: Composer) -> Self {
        self.composer = composer;
        self
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    /// Start a request; its result is applied only if nothing newer landed first.
    pub fn begin(&self, feed: FeedKey) -> RequestTicket {
        self.sequencer.begin(feed)
    }

    pub fn latest(&self, feed: FeedKey) -> u64 {
        self.sequencer.latest(feed)
    }

    fn accept<T>(&self, slot: &mut Slot<T>, ticket: RequestTicket, result: Result<T, FeedError>) -> bool {
        if self.is_closed() {
            debug!("Dashboard closed; ignoring {} result #{}", ticket.feed, ticket.seq);
            return false;
        }
        if ticket.seq <= slot.applied_seq {
            debug!(
                "Dropping stale {} result #{} (already showing #{})",
                ticket.feed, ticket.seq, slot.applied_seq
            );
            self.events.publish(ConsoleEvent::StaleResultDropped {
                feed: ticket.feed,
                seq: ticket.seq,
                latest: slot.applied_seq,
            });
            return false;
        }

        slot.applied_seq = ticket.seq;
        match &result {
            Ok(_) => {
                info!("{} feed updated (#{})", ticket.feed, ticket.seq);
                self.events.publish(ConsoleEvent::FeedUpdated {
                    feed: ticket.feed,
                    seq: ticket.seq,
                });
            }
            Err(err) => {
                warn!("{}", err);
                self.events.publish(ConsoleEvent::FeedFailed {
                    feed: ticket.feed,
                    seq: ticket.seq,
                    reason: err.to_string(),
                });
            }
        }
        // Wholesale replacement: a failed refresh does not keep the old snapshot.
        slot.state = result.into();
        true
    }

    pub async fn complete_cmds(&self, ticket: RequestTicket, result: Result<CmdsSnapshot, FeedError>) -> bool {
        let mut slots = self.slots.write().await;
        self.accept(&mut slots.cmds, ticket, result)
    }

    pub async fn complete_frs(&self, ticket: RequestTicket, result: Result<FrsSnapshot, FeedError>) -> bool {
        let result = result.map(|mut snap| {
            snap.normalize();
            snap
        });
        let mut slots = self.slots.write().await;
        let accepted = self.accept(&mut slots.frs, ticket, result);
        if accepted {
            self.categories.clear().await;
        }
        accepted
    }

    pub async fn complete_vp(&self, ticket: RequestTicket, result: Result<VpSnapshot, FeedError>) -> bool {
        let mut slots = self.slots.write().await;
        self.accept(&mut slots.vp, ticket, result)
    }

    pub async fn complete_manual(&self, ticket: RequestTicket, result: Result<ManualInputsState, FeedError>) -> bool {
        let mut slots = self.slots.write().await;
        self.accept(&mut slots.manual, ticket, result)
    }

    /// Drop category and score views derived from the current snapshots.
    pub async fn invalidate_derived(&self) {
        let _slots = self.slots.write().await;
        self.categories.clear().await;
        debug!("Derived category state invalidated");
        self.events.publish(ConsoleEvent::DerivedStateInvalidated);
    }

    pub async fn view(&self, now: DateTime<Utc>) -> AggregateView {
        let slots = self.slots.read().await;
        let categories = match &slots.frs.state {
            FeedState::Ready(snap) => Some(self.derived_categories(snap).await),
            _ => None,
        };
        self.composer.compose_with(
            &slots.cmds.state,
            &slots.frs.state,
            &slots.vp.state,
            &slots.manual.state,
            categories,
            now,
        )
    }

    async fn derived_categories(&self, snap: &FrsSnapshot) -> Vec<CategoryView> {
        let cached = self.categories.all().await;
        if !cached.is_empty() {
            return cached;
        }
        let built = self.composer.category_views(snap);
        self.categories.fill(built.clone()).await;
        built
    }

    /// Tear down: results that resolve afterwards are ignored.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

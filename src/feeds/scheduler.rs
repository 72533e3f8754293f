//! Refresh Scheduler
//!
//! One timer loop per score feed (default period five minutes), an eager
//! manual-inputs fetch on start, and refresh on regained focus. Every fetch
//! runs as its own task; ordering is enforced by the dashboard's per-feed
//! sequence numbers, not by waiting.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, Notify};
use tokio::task::AbortHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{FeedKey, ScoreFeed};
use crate::dashboard::Dashboard;
use crate::events::ConsoleEvent;
use crate::manual::UpdateCoordinator;

pub const DEFAULT_REFRESH_PERIOD: Duration = Duration::from_millis(300_000);

/// Fetch one score feed and hand the result to the dashboard.
/// Returns whether the result was applied.
pub async fn refresh_once(feed: &dyn ScoreFeed, dashboard: &Dashboard, key: FeedKey) -> bool {
    let ticket = dashboard.begin(key);
    debug!("Refreshing {} (#{})", key, ticket.seq);
    match key {
        FeedKey::Cmds => dashboard.complete_cmds(ticket, feed.fetch_cmds().await).await,
        FeedKey::Frs => dashboard.complete_frs(ticket, feed.fetch_frs().await).await,
        FeedKey::Vp => dashboard.complete_vp(ticket, feed.fetch_vp().await).await,
        FeedKey::ManualInputs => {
            warn!("Manual inputs are refreshed through the update coordinator");
            false
        }
    }
}

pub struct RefreshScheduler {
    feed: Arc<dyn ScoreFeed>,
    dashboard: Arc<Dashboard>,
    coordinator: Arc<UpdateCoordinator>,
    period: Duration,
    triggers: [Arc<Notify>; 3],
    tasks: Arc<Mutex<Vec<AbortHandle>>>,
}

impl RefreshScheduler {
    pub fn new(feed: Arc<dyn ScoreFeed>, dashboard: Arc<Dashboard>, coordinator: Arc<UpdateCoordinator>) -> Self {
        Self {
            feed,
            dashboard,
            coordinator,
            period: DEFAULT_REFRESH_PERIOD,
            triggers: Default::default(),
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Start the feed loops. The first tick of each loop fires immediately.
    pub async fn start(&self) {
        info!(
            "Refresh scheduler starting: score feeds every {}s",
            self.period.as_secs()
        );
        let mut tasks = self.tasks.lock().await;

        for key in FeedKey::SCORE_FEEDS {
            let feed = self.feed.clone();
            let dashboard = self.dashboard.clone();
            let trigger = self.triggers[key.index()].clone();
            let period = self.period;

            let handle = tokio::spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {}
                        _ = trigger.notified() => {}
                    }
                    let feed = feed.clone();
                    let dashboard = dashboard.clone();
                    tokio::spawn(async move {
                        refresh_once(feed.as_ref(), &dashboard, key).await;
                    });
                }
            });
            tasks.push(handle.abort_handle());
        }

        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            if let Err(e) = coordinator.refresh().await {
                warn!("Initial manual inputs fetch failed: {}", e);
            }
        });

        // A saved manual input changes FRS and therefore CMDS upstream.
        let mut rx = self.dashboard.events().subscribe();
        let frs = self.triggers[FeedKey::Frs.index()].clone();
        let cmds = self.triggers[FeedKey::Cmds.index()].clone();
        let listener = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ConsoleEvent::ManualInputsSaved { fields }) => {
                        debug!("Manual inputs saved ({}); refreshing FRS and CMDS", fields.join(", "));
                        frs.notify_one();
                        cmds.notify_one();
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => debug!("Scheduler listener skipped {} events", skipped),
                    Err(RecvError::Closed) => break,
                }
            }
        });
        tasks.push(listener.abort_handle());
    }

    /// Refresh one feed now, outside the timer
    pub fn trigger(&self, key: FeedKey) {
        match key {
            FeedKey::ManualInputs => {
                let coordinator = self.coordinator.clone();
                tokio::spawn(async move {
                    if let Err(e) = coordinator.refresh().await {
                        warn!("Manual inputs refresh failed: {}", e);
                    }
                });
            }
            score => self.triggers[score.index()].notify_one(),
        }
    }

    /// Foreground focus regained: refresh every score feed
    pub fn on_focus(&self) {
        for key in FeedKey::SCORE_FEEDS {
            self.trigger(key);
        }
    }

    pub async fn stop(&self) {
        let mut tasks = self.tasks.lock().await;
        for handle in tasks.drain(..) {
            handle.abort();
        }
        info!("Refresh scheduler stopped");
    }
}

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_test::{assert_err, assert_ok};

use risk_console::dashboard::{Composer, Dashboard};
use risk_console::events::{ConsoleEvent, EventBus};
use risk_console::feeds::{refresh_once, FeedError, FeedKey, ManualInputStore, ScoreFeed, UpdatePayload};
use risk_console::manual::{ManualInputsResponse, UpdateCoordinator, UpdateError};
use risk_console::scoring::{CmdsSnapshot, FrsSnapshot, MaxPointsTable, SchemeVersion, VpSnapshot};

type FrsGate = oneshot::Sender<Result<FrsSnapshot, FeedError>>;

/// CMDS answers at once, FRS waits for the test to release each call, VP never answers.
struct GatedFeed {
    frs_calls: mpsc::UnboundedSender<FrsGate>,
}

impl GatedFeed {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FrsGate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { frs_calls: tx }), rx)
    }
}

#[async_trait]
impl ScoreFeed for GatedFeed {
    async fn fetch_cmds(&self) -> Result<CmdsSnapshot, FeedError> {
        Ok(serde_json::from_value(json!({
            "cmds": 48.3,
            "zone": "ELEVATED",
            "components": {"frs": 46.4, "vp": 52.0, "frs_contribution": 30.2, "vp_contribution": 18.2},
            "last_updated": Utc::now().to_rfc3339()
        }))
        .unwrap())
    }

    async fn fetch_frs(&self) -> Result<FrsSnapshot, FeedError> {
        let (tx, rx) = oneshot::channel();
        self.frs_calls.send(tx).unwrap();
        rx.await.unwrap_or_else(|_| {
            Err(FeedError::Unavailable {
                feed: FeedKey::Frs,
                reason: "gate dropped".into(),
            })
        })
    }

    async fn fetch_vp(&self) -> Result<VpSnapshot, FeedError> {
        std::future::pending().await
    }
}

/// Backend that merges patches into a flat value map, optionally slowly or by refusing
struct MemoryStore {
    values: Mutex<Map<String, Value>>,
    patches: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    latency: Duration,
    reject_with: Option<String>,
}

impl MemoryStore {
    fn new() -> Self {
        let mut values = Map::new();
        values.insert("cre_delinquency_rate".into(), json!(5.0));
        values.insert("cre_delinquency_rate_as_of".into(), json!("2025-03-01"));
        values.insert("cre_office_vacancy".into(), json!(19.8));
        Self {
            values: Mutex::new(values),
            patches: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            latency: Duration::ZERO,
            reject_with: None,
        }
    }

    fn slow(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::new()
        }
    }

    fn rejecting(reason: &str) -> Self {
        Self {
            reject_with: Some(reason.to_string()),
            ..Self::new()
        }
    }
}

#[async_trait]
impl ManualInputStore for MemoryStore {
    async fn fetch(&self) -> Result<ManualInputsResponse, FeedError> {
        let values = self.values.lock().await.clone();
        Ok(serde_json::from_value(json!({
            "values": values,
            "version": "2.0",
            "last_updated": Utc::now().to_rfc3339()
        }))
        .unwrap())
    }

    async fn patch(&self, payload: &UpdatePayload) -> Result<ManualInputsResponse, UpdateError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.patches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(reason) = &self.reject_with {
            return Err(UpdateError::Rejected(reason.clone()));
        }
        let mut values = self.values.lock().await;
        for (k, v) in payload.entries() {
            values.insert(k.clone(), v.clone());
        }
        Ok(ManualInputsResponse::default())
    }
}

fn frs(score: f64, zone: &str) -> FrsSnapshot {
    serde_json::from_value(json!({"frs_score": score, "zone": zone})).unwrap()
}

fn dashboard() -> Arc<Dashboard> {
    Arc::new(Dashboard::new(Arc::new(EventBus::new())))
}

fn fixture() -> FrsSnapshot {
    serde_json::from_str(include_str!("fixtures/frs_feed.json")).unwrap()
}

// ──────────────────────────────────────────────────────────────────────────────
// FEEDS
// ──────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_partial_failure_keeps_other_sections() {
    let (feed, mut frs_calls) = GatedFeed::new();
    let dash = dashboard();

    assert!(refresh_once(&*feed, &dash, FeedKey::Cmds).await);

    let frs_task = tokio::spawn({
        let (feed, dash) = (feed.clone(), dash.clone());
        async move { refresh_once(&*feed, &dash, FeedKey::Frs).await }
    });
    let vp_task = tokio::spawn({
        let (feed, dash) = (feed.clone(), dash.clone());
        async move { refresh_once(&*feed, &dash, FeedKey::Vp).await }
    });

    frs_calls
        .recv()
        .await
        .unwrap()
        .send(Err(FeedError::Unavailable {
            feed: FeedKey::Frs,
            reason: "HTTP 503".into(),
        }))
        .unwrap();
    assert!(frs_task.await.unwrap());

    let view = dash.view(Utc::now()).await;
    assert!(!view.is_loading);
    assert_eq!(view.cmds.ready().unwrap().zone.display().label, "ELEVATED");
    assert_eq!(view.frs.error().unwrap().to_string(), "frs feed unavailable: HTTP 503");
    assert!(view.vp.is_pending());

    vp_task.abort();
}

#[tokio::test]
async fn test_last_request_wins() {
    let (feed, mut frs_calls) = GatedFeed::new();
    let dash = dashboard();

    let older = tokio::spawn({
        let (feed, dash) = (feed.clone(), dash.clone());
        async move { refresh_once(&*feed, &dash, FeedKey::Frs).await }
    });
    let older_gate = frs_calls.recv().await.unwrap();

    let newer = tokio::spawn({
        let (feed, dash) = (feed.clone(), dash.clone());
        async move { refresh_once(&*feed, &dash, FeedKey::Frs).await }
    });
    let newer_gate = frs_calls.recv().await.unwrap();

    newer_gate.send(Ok(frs(46.4, "YELLOW"))).unwrap();
    assert!(newer.await.unwrap());

    older_gate.send(Ok(frs(31.0, "YELLOW"))).unwrap();
    assert!(!older.await.unwrap());

    let view = dash.view(Utc::now()).await;
    assert_eq!(view.frs.ready().unwrap().score, 46.4);
    assert_eq!(dash.latest(FeedKey::Frs), 2);
}

#[tokio::test]
async fn test_unrecognized_zone_shows_mid_severity() {
    let (feed, mut frs_calls) = GatedFeed::new();
    let dash = dashboard();

    let task = tokio::spawn({
        let (feed, dash) = (feed.clone(), dash.clone());
        async move { refresh_once(&*feed, &dash, FeedKey::Frs).await }
    });
    frs_calls.recv().await.unwrap().send(Ok(frs(12.0, "PURPLE"))).unwrap();
    task.await.unwrap();

    let view = dash.view(Utc::now()).await;
    let zone = view.frs.ready().unwrap().zone.display();
    assert_eq!(zone.label, "ORANGE");
    assert_ne!(zone.label, "GREEN");
}

#[tokio::test]
async fn test_fixture_categories_add_up() {
    let snap = fixture();
    assert_ok!(snap.validate());

    for (name, category) in snap.categories.as_ref().unwrap() {
        assert!(
            (category.expected_score() - category.score).abs() < 1e-6,
            "{} components sum to {}, score is {}",
            name,
            category.expected_score(),
            category.score
        );
    }

    let table = MaxPointsTable::standard();
    let leverage = &snap.categories.as_ref().unwrap()["leverage"];
    let credit = leverage.components["corporate_credit"]
        .weighted_sub_total(&table, SchemeVersion::Enhanced)
        .unwrap();
    assert!((credit - 4.2).abs() < 1e-6);
    let cre = leverage.components["cre_stress"]
        .weighted_sub_total(&table, SchemeVersion::Enhanced)
        .unwrap();
    assert!((cre - 5.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_fixture_through_dashboard() {
    let dash = Arc::new(
        Dashboard::new(Arc::new(EventBus::new()))
            .with_composer(Composer::new(MaxPointsTable::standard(), SchemeVersion::Enhanced)),
    );
    let ticket = dash.begin(FeedKey::Frs);
    assert!(dash.complete_frs(ticket, Ok(fixture())).await);

    let view = dash.view(Utc::now()).await;
    let frs = view.frs.ready().unwrap();
    assert_eq!(frs.zone.display().label, "YELLOW");
    assert!(frs.zone.is_consistent());

    let names: Vec<&str> = frs.categories.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["macro", "valuation", "leverage", "earnings", "sentiment"]);
    assert!(frs.categories.iter().all(|c| c.consistent));

    let leverage = &frs.categories[2];
    assert_eq!(leverage.risk_level.as_ref().unwrap().display().label, "ELEVATED");
    let cre = leverage.components.iter().find(|c| c.name == "cre_stress").unwrap();
    assert!(cre.is_manual);
    assert_eq!(cre.sub_components.len(), 4);
}

// ──────────────────────────────────────────────────────────────────────────────
// MANUAL INPUTS
// ──────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_manual_input_round_trip() {
    let store = Arc::new(MemoryStore::new());
    let dash = dashboard();
    let mut rx = dash.events().subscribe();
    let coord = UpdateCoordinator::new(store.clone(), dash.clone());
    coord.refresh().await.unwrap();

    coord
        .stage("cre_delinquency_rate", "4.2", Some("2025-06-01"))
        .await
        .unwrap();
    let state = assert_ok!(coord.apply_pending().await);

    assert_eq!(state.value("cre_delinquency_rate"), Some(4.2));
    assert_eq!(state.as_of("cre_delinquency_rate"), NaiveDate::from_ymd_opt(2025, 6, 1));
    assert_eq!(state.value("cre_office_vacancy"), Some(19.8));
    assert_eq!(store.patches.load(Ordering::SeqCst), 1);

    let view = dash.view(Utc::now()).await;
    let manual = view.manual.ready().unwrap();
    let field = manual
        .groups
        .iter()
        .flat_map(|g| g.fields.iter())
        .find(|f| f.field.name == "cre_delinquency_rate")
        .unwrap();
    assert_eq!(field.field.value, 4.2);

    let mut saw_invalidated = false;
    loop {
        match rx.recv().await.unwrap() {
            ConsoleEvent::DerivedStateInvalidated => saw_invalidated = true,
            ConsoleEvent::ManualInputsSaved { fields } => {
                assert_eq!(fields, vec!["cre_delinquency_rate".to_string()]);
                break;
            }
            _ => {}
        }
    }
    assert!(saw_invalidated);
}

#[tokio::test]
async fn test_reapplying_same_update_changes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let coord = UpdateCoordinator::new(store.clone(), dashboard());

    coord.stage("cre_delinquency_rate", "4.2", Some("2025-06-01")).await.unwrap();
    let pending = coord.pending().await;
    let first = coord.apply(pending.clone()).await.unwrap();
    let second = coord.apply(pending).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(store.patches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rejected_update_rolls_back() {
    let store = Arc::new(MemoryStore::rejecting("cre_delinquency_rate: locked until quarter close"));
    let dash = dashboard();
    let coord = UpdateCoordinator::new(store.clone(), dash.clone());
    coord.refresh().await.unwrap();

    coord.stage("cre_delinquency_rate", "7.5", None).await.unwrap();
    let err = assert_err!(coord.apply_pending().await);
    assert_eq!(err.reason(), "cre_delinquency_rate: locked until quarter close");

    assert_eq!(coord.display_value("cre_delinquency_rate").await, Some(5.0));
    assert_eq!(
        coord.field_error("cre_delinquency_rate").await.as_deref(),
        Some("cre_delinquency_rate: locked until quarter close")
    );
    let view = dash.view(Utc::now()).await;
    let state = coord.state().await.unwrap();
    assert_eq!(state.value("cre_delinquency_rate"), Some(5.0));
    assert!(view.manual.is_ready());
}

#[tokio::test]
async fn test_out_of_range_edit_never_reaches_backend() {
    let store = Arc::new(MemoryStore::new());
    let coord = UpdateCoordinator::new(store.clone(), dashboard());

    let err = coord.stage("cre_delinquency_rate", "25", None).await.unwrap_err();
    assert_eq!(err.reason(), "Value must be between 0 and 20");
    assert_ok!(coord.apply_pending().await);
    assert_eq!(store.patches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrent_submits_are_serialized() {
    let store = Arc::new(MemoryStore::slow(Duration::from_millis(20)));
    let coord = Arc::new(UpdateCoordinator::new(store.clone(), dashboard()));
    coord.refresh().await.unwrap();

    let a = coord.stage("cre_delinquency_rate", "4.2", None).await.unwrap();
    let b = coord.stage("cre_office_vacancy", "21.0", None).await.unwrap();

    let first = tokio::spawn({
        let coord = coord.clone();
        async move { coord.apply([("cre_delinquency_rate".to_string(), a)].into()).await }
    });
    let second = tokio::spawn({
        let coord = coord.clone();
        async move { coord.apply([("cre_office_vacancy".to_string(), b)].into()).await }
    });
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    assert_eq!(store.patches.load(Ordering::SeqCst), 2);
    assert_eq!(store.max_in_flight.load(Ordering::SeqCst), 1);

    let state = coord.state().await.unwrap();
    assert_eq!(state.value("cre_delinquency_rate"), Some(4.2));
    assert_eq!(state.value("cre_office_vacancy"), Some(21.0));
}

// tests/integration_tests.rs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use flight_dash::api::FlightSource;
use flight_dash::config::{Config, DEFAULT_REFRESH_MS, DEFAULT_REGION};
use flight_dash::controller::{
    backoff_delay, Feed, FetchReason, Phase, RefreshController, RefreshState, Snapshot,
};
use flight_dash::error::{ApiError, ErrorKind};
use flight_dash::filter::{apply_filters, FilterCriteria, FilterStats};
use flight_dash::model::{AircraftRecord, RegionDescriptor, SystemStatus};
use flight_dash::poller::spawn_poller;

fn aircraft(hex: &str, distance: Option<f64>, seen: Option<f64>) -> AircraftRecord {
    AircraftRecord {
        hex: hex.to_string(),
        distance_miles: distance,
        seen,
        ..AircraftRecord::default()
    }
}

fn snapshot(hexes: &[&str]) -> Snapshot {
    Snapshot {
        aircraft: hexes.iter().map(|h| aircraft(h, None, None)).collect(),
        ..Snapshot::default()
    }
}

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.region, DEFAULT_REGION);
    assert_eq!(config.refresh, Duration::from_millis(DEFAULT_REFRESH_MS));
    assert!(config.auto_refresh);
    assert_eq!(config.poll_interval(), config.refresh);

    let paused = Config {
        auto_refresh: false,
        ..Config::default()
    };
    assert_eq!(paused.poll_interval(), Duration::ZERO);
}

#[test]
fn test_filters_drop_ground_and_sort_by_distance() {
    let mut parked = aircraft("parked", Some(0.5), Some(1.0));
    parked.on_ground = true;
    let dataset = vec![
        aircraft("far", Some(40.0), Some(1.0)),
        aircraft("unknown-old", None, Some(30.0)),
        parked,
        aircraft("near", Some(3.0), Some(9.0)),
        aircraft("unknown-fresh", None, Some(2.0)),
    ];

    let visible = apply_filters(&dataset, &FilterCriteria::default());
    let order: Vec<&str> = visible.iter().map(|ac| ac.hex.as_str()).collect();
    assert_eq!(order, vec!["near", "far", "unknown-fresh", "unknown-old"]);

    let stats = FilterStats::compute(&dataset, &visible);
    assert_eq!(stats.total, 5);
    assert_eq!(stats.visible, 4);
}

#[test]
fn test_superseded_fetch_never_commits() {
    let t0 = Instant::now();
    let mut ctrl = RefreshController::new("etex");
    let first = ctrl.start("etex", Duration::from_secs(5), t0);
    let manual = ctrl.refresh().unwrap();
    assert_eq!(manual.reason, FetchReason::Manual);
    assert!(first.cancel.is_cancelled());

    assert!(!ctrl.complete(first.id, Ok(snapshot(&["stale"])), t0));
    assert!(ctrl.state().dataset.is_empty());
    assert!(ctrl.complete(manual.id, Ok(snapshot(&["fresh"])), t0));
    assert_eq!(ctrl.state().dataset[0].hex, "fresh");
}

#[test]
fn test_rate_limit_backs_off_then_retries() {
    let t0 = Instant::now();
    let mut ctrl = RefreshController::new("etex");
    let first = ctrl.start("etex", Duration::from_secs(15), t0);
    ctrl.complete(first.id, Ok(snapshot(&["a1"])), t0);

    let tick = ctrl.poll(t0 + Duration::from_secs(15)).unwrap();
    let limited = ApiError::from_status(429, "/api/flights");
    assert_eq!(limited.kind, ErrorKind::RateLimited);
    let failed_at = t0 + Duration::from_secs(15);
    assert!(ctrl.complete(tick.id, Err(limited), failed_at));

    let state: &RefreshState = ctrl.state();
    assert_eq!(state.phase, Phase::Backoff);
    assert_eq!(state.retry_attempt, 1);
    // stale data stays visible while backing off
    assert_eq!(state.dataset.len(), 1);
    assert_eq!(state.retry_in(failed_at), Some(backoff_delay(0).as_secs()));

    let retry = ctrl.poll(failed_at + backoff_delay(0)).unwrap();
    assert_eq!(retry.reason, FetchReason::Retry);
    assert!(ctrl.complete(retry.id, Ok(snapshot(&["a1", "a2"])), failed_at));
    assert_eq!(ctrl.state().retry_attempt, 0);
    assert_eq!(ctrl.state().phase, Phase::Ready);
}

#[test]
fn test_backoff_is_capped() {
    assert_eq!(backoff_delay(0), Duration::from_secs(1));
    assert_eq!(backoff_delay(3), Duration::from_secs(8));
    assert_eq!(backoff_delay(6), Duration::from_secs(60));
    assert_eq!(backoff_delay(40), Duration::from_secs(60));
}

struct ScriptedSource {
    calls: AtomicUsize,
    regions_seen: Mutex<Vec<String>>,
}

impl FlightSource for ScriptedSource {
    fn fetch_aircraft(&self, region: &str) -> Result<Vec<AircraftRecord>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.regions_seen.lock() {
            seen.push(region.to_string());
        }
        Ok(vec![aircraft(&format!("{region}-1"), Some(1.0), Some(1.0))])
    }

    fn fetch_system_status(&self) -> Result<SystemStatus, ApiError> {
        Err(ApiError::new(ErrorKind::Http, "HTTP 503"))
    }

    fn fetch_regions(&self) -> Result<Vec<RegionDescriptor>, ApiError> {
        Ok(Vec::new())
    }

    fn check_health(&self) -> bool {
        true
    }
}

fn wait_for<F>(handle: &flight_dash::poller::PollerHandle, mut pred: F) -> Option<RefreshState>
where
    F: FnMut(&RefreshState) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if let Ok(state) = handle.updates.recv_timeout(Duration::from_millis(50)) {
            if pred(&state) {
                return Some(state);
            }
        }
    }
    None
}

#[test]
fn test_poller_commits_and_follows_region_changes() {
    let source = Arc::new(ScriptedSource {
        calls: AtomicUsize::new(0),
        regions_seen: Mutex::new(Vec::new()),
    });
    // auto-refresh off: only explicit fetches happen
    let handle = spawn_poller(Arc::clone(&source), "etex", Feed::Flights, Duration::ZERO);

    let state = wait_for(&handle, |s| s.phase == Phase::Ready).expect("initial commit");
    assert_eq!(state.dataset[0].hex, "etex-1");
    // failed status endpoint is not an error for the dashboard
    assert!(state.error.is_none());

    handle.set_region("socal");
    let state = wait_for(&handle, |s| {
        s.current_region == "socal" && s.phase == Phase::Ready && !s.loading
    })
    .expect("region commit");
    assert_eq!(state.dataset.len(), 1);
    assert_eq!(state.dataset[0].hex, "socal-1");

    handle.stop();
    let seen = source.regions_seen.lock().map(|v| v.clone()).unwrap_or_default();
    assert_eq!(seen, vec!["etex".to_string(), "socal".to_string()]);
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
}

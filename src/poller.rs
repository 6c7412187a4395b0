use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::api::FlightSource;
use crate::controller::{Feed, FetchTicket, RefreshController, RefreshState, Snapshot};
use crate::error::ApiError;

const IDLE_WAIT: Duration = Duration::from_secs(3600);

#[derive(Debug)]
pub enum Command {
    SetRegion(String),
    SetFeed(Feed),
    Refresh,
    Visibility(bool),
    Connectivity(bool),
    SetInterval(Duration),
    Stop,
    Completed {
        id: u64,
        outcome: Result<Snapshot, ApiError>,
    },
}

/// Front end's side of the poller: intents go in through `send`, committed
/// state comes out of `updates`.
#[derive(Debug)]
pub struct PollerHandle {
    tx: Sender<Command>,
    pub updates: Receiver<RefreshState>,
}

impl PollerHandle {
    pub fn sender(&self) -> Sender<Command> {
        self.tx.clone()
    }

    pub fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            debug!("poller gone, command dropped");
        }
    }

    pub fn set_region(&self, region: &str) {
        self.send(Command::SetRegion(region.to_string()));
    }

    pub fn set_feed(&self, feed: Feed) {
        self.send(Command::SetFeed(feed));
    }

    pub fn refresh(&self) {
        self.send(Command::Refresh);
    }

    pub fn set_visible(&self, visible: bool) {
        self.send(Command::Visibility(visible));
    }

    pub fn set_interval(&self, interval: Duration) {
        self.send(Command::SetInterval(interval));
    }

    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    /// Most recent state published since the last call, if any.
    pub fn latest(&self) -> Option<RefreshState> {
        self.updates.try_iter().last()
    }
}

/// Spawns the thread that owns the [`RefreshController`]. Every state change
/// is published on the handle's `updates` channel.
pub fn spawn_poller<S>(
    source: Arc<S>,
    region: &str,
    feed: Feed,
    interval: Duration,
) -> PollerHandle
where
    S: FlightSource + 'static,
{
    let (tx, rx) = mpsc::channel();
    let (state_tx, state_rx) = mpsc::channel();
    let worker_tx = tx.clone();
    let region = region.to_string();

    thread::spawn(move || {
        info!("poller started region={region}");
        let mut ctrl = RefreshController::new(&region);
        ctrl.set_feed(feed);
        let ticket = ctrl.start(&region, interval, Instant::now());
        dispatch(&source, ticket, &worker_tx);
        if state_tx.send(ctrl.state().clone()).is_err() {
            return;
        }

        loop {
            let wait = ctrl
                .next_deadline()
                .map(|at| at.saturating_duration_since(Instant::now()))
                .unwrap_or(IDLE_WAIT);

            let command = match rx.recv_timeout(wait) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            let now = Instant::now();
            let mut changed = true;
            let ticket = match command {
                None => {
                    changed = false;
                    ctrl.poll(now)
                }
                Some(Command::SetRegion(region)) => ctrl.set_region(&region, now),
                Some(Command::SetFeed(feed)) => ctrl.set_feed(feed),
                Some(Command::Refresh) => ctrl.refresh(),
                Some(Command::Visibility(visible)) => ctrl.set_visible(visible, now),
                Some(Command::Connectivity(online)) => ctrl.set_online(online, now),
                Some(Command::SetInterval(interval)) => {
                    ctrl.set_interval(interval, now);
                    None
                }
                Some(Command::Completed { id, outcome }) => {
                    changed = ctrl.complete(id, outcome, now);
                    None
                }
                Some(Command::Stop) => {
                    ctrl.stop();
                    let _ = state_tx.send(ctrl.state().clone());
                    break;
                }
            };

            if let Some(ticket) = ticket {
                dispatch(&source, ticket, &worker_tx);
                changed = true;
            }
            if changed && state_tx.send(ctrl.state().clone()).is_err() {
                debug!("receiver dropped, exiting poller");
                ctrl.stop();
                break;
            }
        }
        info!("poller stopped");
    });

    PollerHandle {
        tx,
        updates: state_rx,
    }
}

fn dispatch<S>(source: &Arc<S>, ticket: FetchTicket, tx: &Sender<Command>)
where
    S: FlightSource + 'static,
{
    let source = Arc::clone(source);
    let tx = tx.clone();
    thread::spawn(move || {
        let outcome = fetch_snapshot(source.as_ref(), &ticket);
        if ticket.cancel.is_cancelled() {
            debug!("ticket {} cancelled, discarding result", ticket.id);
            return;
        }
        let _ = tx.send(Command::Completed {
            id: ticket.id,
            outcome,
        });
    });
}

/// Aircraft are required; status and regions are fetched alongside and
/// degrade to `None` on failure.
pub fn fetch_snapshot<S>(source: &S, ticket: &FetchTicket) -> Result<Snapshot, ApiError>
where
    S: FlightSource + ?Sized,
{
    if ticket.cancel.is_cancelled() {
        return Err(ApiError::cancelled());
    }
    let (aircraft, status, regions) = thread::scope(|scope| {
        let status = scope.spawn(|| source.fetch_system_status());
        let regions = scope.spawn(|| source.fetch_regions());
        let aircraft = match ticket.feed {
            Feed::Flights => source.fetch_aircraft(&ticket.region),
            Feed::Helicopters => source.fetch_helicopters(&ticket.region),
        };
        (aircraft, status.join(), regions.join())
    });

    let aircraft = aircraft?;
    if ticket.cancel.is_cancelled() {
        return Err(ApiError::cancelled());
    }
    let status = match status {
        Ok(Ok(status)) => Some(status),
        Ok(Err(err)) => {
            warn!("system status unavailable: {err}");
            None
        }
        Err(_) => None,
    };
    let regions = match regions {
        Ok(Ok(regions)) => Some(regions),
        Ok(Err(err)) => {
            warn!("region list unavailable: {err}");
            None
        }
        Err(_) => None,
    };
    Ok(Snapshot {
        aircraft,
        status,
        regions,
    })
}

/// Probes `/health` every `every` and reports transitions as
/// [`Command::Connectivity`]. Exits when the poller goes away.
pub fn spawn_connectivity_probe<S>(source: Arc<S>, every: Duration, tx: Sender<Command>)
where
    S: FlightSource + 'static,
{
    if every.is_zero() {
        return;
    }
    thread::spawn(move || {
        info!("connectivity probe started every={every:?}");
        let mut online = true;
        loop {
            thread::sleep(every);
            let healthy = source.check_health();
            if healthy == online {
                continue;
            }
            online = healthy;
            if tx.send(Command::Connectivity(online)).is_err() {
                debug!("receiver dropped, exiting probe");
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::{fetch_snapshot, spawn_poller};
    use crate::api::FlightSource;
    use crate::controller::{CancelToken, Feed, FetchReason, FetchTicket, Phase, RefreshState};
    use crate::error::{ApiError, ErrorKind};
    use crate::model::{AircraftRecord, RegionDescriptor, SystemStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct FakeSource {
        calls: AtomicUsize,
        fail_status: bool,
    }

    impl FlightSource for FakeSource {
        fn fetch_aircraft(&self, region: &str) -> Result<Vec<AircraftRecord>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![AircraftRecord {
                hex: format!("{region}-1"),
                ..AircraftRecord::default()
            }])
        }

        fn fetch_helicopters(&self, region: &str) -> Result<Vec<AircraftRecord>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![AircraftRecord {
                hex: format!("{region}-heli"),
                icao_aircraft_class: Some("H1T".to_string()),
                ..AircraftRecord::default()
            }])
        }

        fn fetch_system_status(&self) -> Result<SystemStatus, ApiError> {
            if self.fail_status {
                Err(ApiError::new(ErrorKind::Http, "HTTP 503"))
            } else {
                Ok(SystemStatus {
                    status: "healthy".to_string(),
                    ..SystemStatus::default()
                })
            }
        }

        fn fetch_regions(&self) -> Result<Vec<RegionDescriptor>, ApiError> {
            Ok(Vec::new())
        }

        fn check_health(&self) -> bool {
            true
        }
    }

    fn ticket(region: &str) -> FetchTicket {
        FetchTicket {
            id: 1,
            region: region.to_string(),
            feed: Feed::Flights,
            cancel: CancelToken::new(),
            reason: FetchReason::Manual,
        }
    }

    fn wait_for<F>(rx: &std::sync::mpsc::Receiver<RefreshState>, pred: F) -> RefreshState
    where
        F: Fn(&RefreshState) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            let state = rx.recv_timeout(left).expect("state update");
            if pred(&state) {
                return state;
            }
        }
    }

    #[test]
    fn snapshot_tolerates_status_failure() {
        let source = FakeSource {
            fail_status: true,
            ..FakeSource::default()
        };
        let snap = fetch_snapshot(&source, &ticket("etex")).unwrap();
        assert_eq!(snap.aircraft[0].hex, "etex-1");
        assert!(snap.status.is_none());
        assert_eq!(snap.regions, Some(Vec::new()));
    }

    #[test]
    fn helicopter_ticket_reads_helicopter_feed() {
        let source = FakeSource::default();
        let t = FetchTicket {
            feed: Feed::Helicopters,
            ..ticket("etex")
        };
        let snap = fetch_snapshot(&source, &t).unwrap();
        assert_eq!(snap.aircraft.len(), 1);
        assert_eq!(snap.aircraft[0].hex, "etex-heli");
    }

    #[test]
    fn cancelled_ticket_never_fetches() {
        let source = FakeSource::default();
        let t = ticket("etex");
        t.cancel.cancel();
        let err = fetch_snapshot(&source, &t).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn poller_commits_and_switches_region() {
        let source = Arc::new(FakeSource::default());
        let handle = spawn_poller(Arc::clone(&source), "etex", Feed::Flights, Duration::ZERO);

        let state = wait_for(&handle.updates, |s| s.phase == Phase::Ready);
        assert_eq!(state.dataset[0].hex, "etex-1");
        assert_eq!(
            state.system_status.as_ref().map(|s| s.status.as_str()),
            Some("healthy")
        );

        handle.set_region("wtex");
        let state = wait_for(&handle.updates, |s| {
            s.phase == Phase::Ready && s.current_region == "wtex"
        });
        assert_eq!(state.dataset.len(), 1);
        assert_eq!(state.dataset[0].hex, "wtex-1");

        handle.set_feed(Feed::Helicopters);
        let state = wait_for(&handle.updates, |s| {
            s.phase == Phase::Ready && s.feed == Feed::Helicopters && !s.loading
        });
        assert_eq!(state.dataset[0].hex, "wtex-heli");

        handle.stop();
        let state = wait_for(&handle.updates, |s| s.phase == Phase::Stopped);
        assert!(!state.loading);
    }
}

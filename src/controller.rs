//! Refresh controller: keeps one authoritative [`RefreshState`] for the
//! selected region fresh from three trigger sources (periodic timer,
//! visibility transitions, user intents) without letting a superseded
//! response land.
//!
//! The controller does no I/O and reads no clock. Callers pass `now`, run
//! the returned [`FetchTicket`]s however they like, and hand results back
//! through [`RefreshController::complete`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::model::{find_region, AircraftRecord, RegionDescriptor, SystemStatus};

const BACKOFF_BASE_MS: u64 = 1000;
const BACKOFF_MAX_MS: u64 = 60_000;

/// `min(2^attempt * 1s, 60s)`.
pub fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
    Duration::from_millis(BACKOFF_BASE_MS.saturating_mul(factor).min(BACKOFF_MAX_MS))
}

/// Shared flag marking a request void. Workers poll it to stop early; the
/// controller never commits a result whose token has been cancelled.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Which aircraft endpoint a fetch reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Feed {
    #[default]
    Flights,
    Helicopters,
}

impl Feed {
    pub fn label(self) -> &'static str {
        match self {
            Feed::Flights => "flights",
            Feed::Helicopters => "choppers",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchReason {
    Initial,
    Tick,
    Retry,
    Manual,
    RegionChange,
    Visible,
    Reconnect,
    FeedChange,
}

#[derive(Clone, Debug)]
pub struct FetchTicket {
    pub id: u64,
    pub region: String,
    pub feed: Feed,
    pub cancel: CancelToken,
    pub reason: FetchReason,
}

/// Everything one poll brings back. Status and regions are best effort.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub aircraft: Vec<AircraftRecord>,
    pub status: Option<SystemStatus>,
    pub regions: Option<Vec<RegionDescriptor>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Ready,
    Failed,
    Backoff,
    Stopped,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Idle => "IDLE",
            Phase::Loading => "LOADING",
            Phase::Ready => "LIVE",
            Phase::Failed => "ERROR",
            Phase::Backoff => "BACKOFF",
            Phase::Stopped => "STOPPED",
        }
    }
}

#[derive(Clone, Debug)]
pub struct RefreshState {
    pub dataset: Vec<AircraftRecord>,
    pub loading: bool,
    pub error: Option<ApiError>,
    pub last_update: Option<DateTime<Utc>>,
    pub current_region: String,
    pub feed: Feed,
    pub retry_attempt: u32,
    pub phase: Phase,
    pub retry_at: Option<Instant>,
    pub system_status: Option<SystemStatus>,
    pub regions: Vec<RegionDescriptor>,
    pub region_info: Option<RegionDescriptor>,
    pub online: bool,
    pub visible: bool,
    pub interval: Duration,
}

impl RefreshState {
    pub fn new(region: &str) -> Self {
        Self {
            dataset: Vec::new(),
            loading: true,
            error: None,
            last_update: None,
            current_region: region.to_string(),
            feed: Feed::default(),
            retry_attempt: 0,
            phase: Phase::Idle,
            retry_at: None,
            system_status: None,
            regions: Vec::new(),
            region_info: None,
            online: true,
            visible: true,
            interval: Duration::ZERO,
        }
    }

    /// Whole seconds until the pending backoff retry, rounded up.
    pub fn retry_in(&self, now: Instant) -> Option<u64> {
        self.retry_at.map(|at| {
            let left = at.saturating_duration_since(now);
            let secs = left.as_secs();
            if left.subsec_nanos() > 0 {
                secs + 1
            } else {
                secs
            }
        })
    }
}

#[derive(Debug)]
struct InFlight {
    id: u64,
    region: String,
    feed: Feed,
    cancel: CancelToken,
}

#[derive(Debug)]
pub struct RefreshController {
    state: RefreshState,
    running: bool,
    next_tick: Option<Instant>,
    in_flight: Option<InFlight>,
    next_ticket: u64,
}

impl RefreshController {
    pub fn new(region: &str) -> Self {
        Self {
            state: RefreshState::new(region),
            running: false,
            next_tick: None,
            in_flight: None,
            next_ticket: 1,
        }
    }

    pub fn state(&self) -> &RefreshState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn auto_refresh(&self) -> bool {
        !self.state.interval.is_zero()
    }

    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight.as_ref().map(|f| f.id)
    }

    /// Fetches immediately, then every `interval` while visible. A zero
    /// interval turns periodic refresh off.
    pub fn start(&mut self, region: &str, interval: Duration, now: Instant) -> FetchTicket {
        info!("refresh start region={region} interval={interval:?}");
        self.running = true;
        self.state.current_region = region.to_string();
        self.state.interval = interval;
        self.state.loading = true;
        self.rebase_timer(now);
        self.begin_fetch(FetchReason::Initial)
    }

    pub fn set_region(&mut self, region: &str, now: Instant) -> Option<FetchTicket> {
        if region == self.state.current_region && self.running {
            return None;
        }
        info!(
            "region change {} -> {region}",
            self.state.current_region
        );
        self.cancel_in_flight();
        self.state.current_region = region.to_string();
        self.state.dataset.clear();
        self.state.loading = true;
        self.state.error = None;
        self.state.retry_attempt = 0;
        self.state.retry_at = None;
        self.state.region_info = find_region(&self.state.regions, region).cloned();
        if !self.running {
            return None;
        }
        self.rebase_timer(now);
        Some(self.begin_fetch(FetchReason::RegionChange))
    }

    /// Manual refresh. Supersedes whatever is in flight and skips a pending
    /// backoff wait.
    pub fn refresh(&mut self) -> Option<FetchTicket> {
        if !self.running {
            return None;
        }
        self.state.retry_at = None;
        self.state.loading = true;
        Some(self.begin_fetch(FetchReason::Manual))
    }

    /// Switches the aircraft endpoint. The current dataset stays on screen
    /// until the new feed commits. Before `start` it only records the feed.
    pub fn set_feed(&mut self, feed: Feed) -> Option<FetchTicket> {
        if self.state.feed == feed {
            return None;
        }
        info!(
            "feed change {} -> {}",
            self.state.feed.label(),
            feed.label()
        );
        self.state.feed = feed;
        if !self.running {
            return None;
        }
        self.state.retry_at = None;
        self.state.loading = true;
        Some(self.begin_fetch(FetchReason::FeedChange))
    }

    pub fn stop(&mut self) {
        if !self.running && self.state.phase == Phase::Stopped {
            return;
        }
        info!("refresh stop region={}", self.state.current_region);
        self.running = false;
        self.cancel_in_flight();
        self.next_tick = None;
        self.state.retry_at = None;
        self.state.loading = false;
        self.state.phase = Phase::Stopped;
    }

    pub fn set_visible(&mut self, visible: bool, now: Instant) -> Option<FetchTicket> {
        if self.state.visible == visible {
            return None;
        }
        self.state.visible = visible;
        if !visible {
            debug!("hidden: timer suspended");
            self.next_tick = None;
            return None;
        }
        if !self.running || !self.auto_refresh() {
            return None;
        }
        self.rebase_timer(now);
        if self.state.retry_at.is_some() {
            debug!("visible during backoff: waiting for scheduled retry");
            return None;
        }
        debug!("visible: immediate refresh");
        Some(self.begin_fetch(FetchReason::Visible))
    }

    pub fn set_online(&mut self, online: bool, now: Instant) -> Option<FetchTicket> {
        if self.state.online == online {
            return None;
        }
        self.state.online = online;
        if !online {
            warn!("connection lost");
            self.state.error = Some(ApiError::connection_lost());
            self.state.loading = false;
            if self.running {
                self.state.phase = Phase::Failed;
            }
            return None;
        }
        info!("connection restored");
        if !self.running || !self.auto_refresh() {
            return None;
        }
        self.refresh().map(|mut ticket| {
            ticket.reason = FetchReason::Reconnect;
            ticket
        })
    }

    pub fn set_interval(&mut self, interval: Duration, now: Instant) {
        if self.state.interval == interval {
            return;
        }
        debug!("interval {:?} -> {:?}", self.state.interval, interval);
        self.state.interval = interval;
        self.rebase_timer(now);
    }

    /// Earliest instant at which [`poll`](Self::poll) has something to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        if !self.running || !self.state.visible {
            return None;
        }
        match (self.next_tick, self.state.retry_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn poll(&mut self, now: Instant) -> Option<FetchTicket> {
        if !self.running || !self.state.visible {
            return None;
        }

        if let Some(at) = self.state.retry_at {
            if at <= now {
                self.state.retry_at = None;
                debug!("backoff elapsed, retrying");
                return Some(self.begin_fetch(FetchReason::Retry));
            }
        }

        let due = self.next_tick.filter(|tick| *tick <= now)?;
        let interval = self.state.interval;
        let mut next = due + interval;
        while next <= now {
            next += interval;
        }
        self.next_tick = Some(next);

        if self.state.retry_at.is_some() {
            debug!("tick suppressed by pending backoff");
            return None;
        }
        if self.in_flight.is_some() {
            debug!("tick skipped, request still in flight");
            return None;
        }
        Some(self.begin_fetch(FetchReason::Tick))
    }

    /// Commits a finished fetch. Returns `false` when the result was dropped
    /// because its ticket was superseded, cancelled or the controller is
    /// stopped.
    pub fn complete(
        &mut self,
        ticket_id: u64,
        outcome: Result<Snapshot, ApiError>,
        now: Instant,
    ) -> bool {
        let live = match &self.in_flight {
            Some(f) => f.id == ticket_id && !f.cancel.is_cancelled(),
            None => false,
        };
        if !live || !self.running {
            debug!("dropping superseded result for ticket {ticket_id}");
            return false;
        }
        let flight = match self.in_flight.take() {
            Some(f) => f,
            None => return false,
        };
        if flight.region != self.state.current_region || flight.feed != self.state.feed {
            debug!(
                "dropping result for stale {} {}",
                flight.region,
                flight.feed.label()
            );
            return false;
        }

        match outcome {
            Ok(snapshot) => {
                debug!(
                    "commit ticket={} aircraft={}",
                    ticket_id,
                    snapshot.aircraft.len()
                );
                self.state.dataset = snapshot.aircraft;
                if let Some(status) = snapshot.status {
                    self.state.system_status = Some(status);
                }
                if let Some(regions) = snapshot.regions {
                    self.state.regions = regions;
                }
                self.state.region_info =
                    find_region(&self.state.regions, &self.state.current_region).cloned();
                self.state.loading = false;
                self.state.error = None;
                self.state.last_update = Some(Utc::now());
                self.state.retry_attempt = 0;
                self.state.retry_at = None;
                self.state.phase = Phase::Ready;
                true
            }
            Err(err) if err.is_cancelled() => {
                debug!("ticket {ticket_id} cancelled");
                false
            }
            Err(err) if err.is_rate_limited() => {
                let delay = backoff_delay(self.state.retry_attempt);
                self.state.retry_attempt = self.state.retry_attempt.saturating_add(1);
                self.state.retry_at = Some(now + delay);
                let message = format!(
                    "Rate limited. Retrying in {}s.",
                    delay.as_secs().max(1)
                );
                warn!(
                    "rate limited (attempt {}), retry in {:?}",
                    self.state.retry_attempt, delay
                );
                self.state.error = Some(ApiError {
                    message,
                    ..err
                });
                self.state.loading = false;
                self.state.phase = Phase::Backoff;
                true
            }
            Err(err) => {
                warn!("fetch failed: {err}");
                self.state.retry_attempt = 0;
                self.state.error = Some(err);
                self.state.loading = false;
                self.state.phase = Phase::Failed;
                true
            }
        }
    }

    fn begin_fetch(&mut self, reason: FetchReason) -> FetchTicket {
        self.cancel_in_flight();
        let id = self.next_ticket;
        self.next_ticket += 1;
        let cancel = CancelToken::new();
        let region = self.state.current_region.clone();
        let feed = self.state.feed;
        debug!(
            "fetch ticket={id} region={region} feed={} reason={reason:?}",
            feed.label()
        );
        self.in_flight = Some(InFlight {
            id,
            region: region.clone(),
            feed,
            cancel: cancel.clone(),
        });
        if self.state.loading || self.state.phase == Phase::Idle {
            self.state.phase = Phase::Loading;
        }
        FetchTicket {
            id,
            region,
            feed,
            cancel,
            reason,
        }
    }

    fn cancel_in_flight(&mut self) {
        if let Some(flight) = self.in_flight.take() {
            debug!("cancel ticket={}", flight.id);
            flight.cancel.cancel();
        }
    }

    fn rebase_timer(&mut self, now: Instant) {
        self.next_tick = if self.state.visible && !self.state.interval.is_zero() {
            Some(now + self.state.interval)
        } else {
            None
        };
    }
}

// src/reset_scheduler.rs
//
// Period rollover detection for the dashboard views. A scheduler instance
// owns its state and its broadcast channel; views subscribe and clear their
// local caches when an event arrives. Server-side history is never touched.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::period::{days_until, Period, PeriodScheme};
use crate::reset_config::ResetConfig;

/// Plenty for the handful of dashboard sections that subscribe.
const RESET_EVENT_CAPACITY: usize = 16;

/// Broadcast payload identifying the period a reset rolled into.
///
/// `month` stays 0-11 on the wire; the previous dashboard consumers indexed
/// months that way and the payload shape is kept compatible.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetEvent {
    pub event: &'static str,
    /// ISO-8601 local timestamp of the reset.
    pub reset_date: String,
    pub month: u32,
    pub year: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quincena: Option<u8>,
}

/// `Stable` until a poll observes a period crossing on a boundary Monday;
/// back to `Stable` once a reset (automatic or manual) executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPhase {
    Stable,
    BoundaryCrossed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetState {
    pub period: Period,
    pub last_reset: Option<NaiveDateTime>,
    /// True on the single poll that first observes a period change.
    pub is_new_period: bool,
    /// True only while a boundary crossing is waiting to be consumed.
    pub should_reset: bool,
    pub phase: SchedulerPhase,
}

struct SchedulerInner {
    period: Period,
    last_reset: Option<NaiveDateTime>,
    is_new_period: bool,
    should_reset: bool,
    phase: SchedulerPhase,
}

impl SchedulerInner {
    fn snapshot(&self) -> ResetState {
        ResetState {
            period: self.period,
            last_reset: self.last_reset,
            is_new_period: self.is_new_period,
            should_reset: self.should_reset,
            phase: self.phase,
        }
    }
}

/// Generic period reset scheduler. The scheme decides how time is
/// partitioned (monthly or quincena); everything else is shared.
pub struct PeriodResetScheduler<S: PeriodScheme> {
    scheme: S,
    clock: Arc<dyn Clock>,
    config: ResetConfig,
    state: Mutex<SchedulerInner>,
    events: broadcast::Sender<ResetEvent>,
}

impl<S: PeriodScheme> PeriodResetScheduler<S> {
    pub fn new(scheme: S, clock: Arc<dyn Clock>, config: ResetConfig) -> Self {
        let initial_period = scheme.period_for(clock.now());
        let (events, _) = broadcast::channel(RESET_EVENT_CAPACITY);
        Self {
            scheme,
            clock,
            config,
            state: Mutex::new(SchedulerInner {
                period: initial_period,
                last_reset: None,
                is_new_period: false,
                should_reset: false,
                phase: SchedulerPhase::Stable,
            }),
            events,
        }
    }

    pub fn event_name(&self) -> &'static str {
        self.scheme.event_name()
    }

    pub fn config(&self) -> &ResetConfig {
        &self.config
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    /// New receiver for reset events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<ResetEvent> {
        self.events.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Period identifier for "now". Pure function of the clock and scheme.
    pub fn current_period(&self) -> Period {
        self.scheme.period_for(self.clock.now())
    }

    /// True only on a Monday that is also one of the scheme's boundary days.
    pub fn is_boundary_now(&self) -> bool {
        self.scheme.is_boundary(self.clock.today())
    }

    /// Recomputes the current period and compares it to the stored one.
    /// The stored period is updated unconditionally, so `is_new_period`
    /// fires exactly once per transition.
    pub fn poll(&self) -> ResetState {
        let now = self.clock.now();
        let period = self.scheme.period_for(now);
        let boundary_today = self.scheme.is_boundary(now.date());

        let mut inner = self.state.lock().unwrap();
        let is_new_period = period != inner.period;
        let should_reset = is_new_period && boundary_today;

        inner.is_new_period = is_new_period;
        inner.should_reset = should_reset;
        if should_reset {
            inner.phase = SchedulerPhase::BoundaryCrossed;
            info!(
                "{}: boundary crossing into {:?} detected",
                self.scheme.event_name(),
                period
            );
        }
        inner.period = period;
        inner.snapshot()
    }

    /// Next calendar reset date, always strictly in the future.
    pub fn next_reset_date(&self) -> chrono::NaiveDate {
        self.scheme.next_boundary(self.clock.today())
    }

    pub fn days_until_reset(&self) -> i64 {
        days_until(self.clock.now(), self.next_reset_date())
    }

    /// Warning-banner window: the reset is `banner_warning_days` away or
    /// closer.
    pub fn should_show_banner(&self) -> bool {
        self.days_until_reset() <= self.config.banner_warning_days
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.state.lock().unwrap().phase
    }

    pub fn state(&self) -> ResetState {
        self.state.lock().unwrap().snapshot()
    }

    pub fn last_reset(&self) -> Option<NaiveDateTime> {
        self.state.lock().unwrap().last_reset
    }

    /// Executes a reset: stamps `last_reset`, returns the phase to `Stable`
    /// and broadcasts the event. Always broadcasts, even when no crossing is
    /// pending, so a manual trigger is never refused. Back-to-back calls are
    /// state-wise no-ops beyond the timestamp.
    pub fn execute_reset(&self) -> ResetEvent {
        let now = self.clock.now();
        let period = self.scheme.period_for(now);

        {
            let mut inner = self.state.lock().unwrap();
            inner.last_reset = Some(now);
            inner.is_new_period = false;
            inner.should_reset = false;
            inner.phase = SchedulerPhase::Stable;
            inner.period = period;
        }

        let event = ResetEvent {
            event: self.scheme.event_name(),
            reset_date: now.format("%Y-%m-%dT%H:%M:%S").to_string(),
            month: period.month() - 1,
            year: period.year(),
            quincena: period.quincena(),
        };
        info!(
            "{}: reset executed for {}-{:02}{}",
            event.event,
            event.year,
            period.month(),
            match event.quincena {
                Some(q) => format!(" quincena {}", q),
                None => String::new(),
            }
        );
        if self.events.send(event.clone()).is_err() {
            debug!("{}: reset event had no subscribers", event.event);
        }
        event
    }
}

/// Handle over the spawned poll tasks. Dropping it (or calling `shutdown`)
/// aborts them so no timer callback outlives its owner.
pub struct SchedulerTasks {
    handles: Vec<JoinHandle<()>>,
}

impl SchedulerTasks {
    pub fn shutdown(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
        self.handles.clear();
    }
}

impl Drop for SchedulerTasks {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawns the boundary poll and the hourly auto-reset check for a scheduler.
/// Does nothing when automatic resets are disabled.
pub fn spawn_polling<S: PeriodScheme + 'static>(
    scheduler: &Arc<PeriodResetScheduler<S>>,
) -> SchedulerTasks {
    if !scheduler.config().enabled {
        info!(
            "{}: automatic resets disabled; poll tasks not started",
            scheduler.event_name()
        );
        return SchedulerTasks { handles: Vec::new() };
    }
    SchedulerTasks {
        handles: vec![
            tokio::spawn(run_boundary_poll(scheduler.clone())),
            tokio::spawn(run_auto_reset(scheduler.clone())),
        ],
    }
}

/// Minute-cadence poll detecting period crossings.
pub async fn run_boundary_poll<S: PeriodScheme>(scheduler: Arc<PeriodResetScheduler<S>>) {
    info!("Starting {} boundary poll task", scheduler.event_name());
    let interval = Duration::from_millis(scheduler.config().check_interval_ms);
    loop {
        let state = scheduler.poll();
        if state.should_reset {
            info!(
                "{}: reset pending for {:?}",
                scheduler.event_name(),
                state.period
            );
        }
        sleep(interval).await;
    }
}

/// Hour-cadence check that executes the reset once a crossing has been
/// latched and today is a boundary Monday. The phase latch guarantees at
/// most one automatic reset per crossing.
pub async fn run_auto_reset<S: PeriodScheme>(scheduler: Arc<PeriodResetScheduler<S>>) {
    info!("Starting {} auto-reset task", scheduler.event_name());
    let interval = Duration::from_millis(scheduler.config().monday_check_interval_ms);
    loop {
        if scheduler.phase() == SchedulerPhase::BoundaryCrossed && scheduler.is_boundary_now() {
            info!(
                "{}: reset Monday detected, executing automatic reset",
                scheduler.event_name()
            );
            scheduler.execute_reset();
        }
        sleep(interval).await;
    }
}

//! Periodic and one-time scheduling of sync runs on tokio.
//!
//! Every job shares one run lock, so at most one sync run executes at a time no
//! matter how many names are enqueued. Retryable failures back off according to
//! the request's [`BackoffPolicy`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::debounce::Debouncer;
use super::engine::SyncOutcome;
use crate::config::SyncSettings;
use crate::state::SyncState;

/// Name used for the recurring background sync
pub const PERIODIC_SYNC: &str = "periodic_sync";
/// Name used for user-requested syncs
pub const MANUAL_SYNC: &str = "manual_sync";

const CONNECTIVITY_POLL: Duration = Duration::from_secs(30);

/// Something the scheduler can run repeatedly
pub trait SyncJob: Send + Sync + 'static {
    /// `attempt` counts retries of the same request, starting at zero
    fn run_job(&self, attempt: u32) -> impl Future<Output = SyncOutcome> + Send;
}

/// Network reachability as seen by the host
pub trait ConnectivityProbe: Send + Sync {
    fn is_connected(&self) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnline;

impl ConnectivityProbe for AlwaysOnline {
    fn is_connected(&self) -> bool {
        true
    }
}

/// What to do when a job with the same name is still scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingWorkPolicy {
    Keep,
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffPolicy {
    Exponential { initial: Duration, max: Duration },
    Linear { step: Duration, max: Duration },
}

impl BackoffPolicy {
    /// Wait before retry `attempt` (zero based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Exponential { initial, max } => {
                let factor = 2_u32.checked_pow(attempt).unwrap_or(u32::MAX);
                initial.checked_mul(factor).unwrap_or(max).min(max)
            }
            Self::Linear { step, max } => step
                .checked_mul(attempt.saturating_add(1))
                .unwrap_or(max)
                .min(max),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicRequest {
    pub interval: Duration,
    /// A tick is skipped when another run finished less than `flex` ago
    pub flex: Duration,
    pub network_required: bool,
    pub backoff: BackoffPolicy,
}

impl PeriodicRequest {
    pub const fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            interval: settings.sync_interval(),
            flex: settings.flex_interval(),
            network_required: true,
            backoff: settings.backoff(),
        }
    }
}

struct Shared<J> {
    job: Arc<J>,
    probe: Arc<dyn ConnectivityProbe>,
    run_lock: tokio::sync::Mutex<()>,
    status: watch::Sender<SyncState>,
    last_finished: Mutex<Option<Instant>>,
}

/// Resets the status if a run is dropped before it reports back.
struct RunningGuard<'a> {
    status: &'a watch::Sender<SyncState>,
    finished: bool,
}

impl<'a> RunningGuard<'a> {
    fn start(status: &'a watch::Sender<SyncState>) -> Self {
        status.send_replace(SyncState::Syncing);
        Self {
            status,
            finished: false,
        }
    }

    fn finish(mut self, state: SyncState) {
        self.status.send_replace(state);
        self.finished = true;
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.status.send_replace(SyncState::Idle);
        }
    }
}

const fn state_after(outcome: &SyncOutcome) -> SyncState {
    match outcome {
        SyncOutcome::Success(_) => SyncState::Success,
        // Waiting for the next attempt
        SyncOutcome::Retry(_) => SyncState::Idle,
        SyncOutcome::Fail(_) => SyncState::Error,
    }
}

impl<J: SyncJob> Shared<J> {
    async fn run_once(&self, attempt: u32) -> SyncOutcome {
        let _lock = self.run_lock.lock().await;
        let guard = RunningGuard::start(&self.status);
        let outcome = self.job.run_job(attempt).await;
        guard.finish(state_after(&outcome));
        *self
            .last_finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        outcome
    }

    async fn run_with_retries(&self, name: &str, backoff: BackoffPolicy) {
        let mut attempt = 0_u32;
        loop {
            match self.run_once(attempt).await {
                SyncOutcome::Success(_) => {
                    debug!(job = name, attempt, "Sync job succeeded");
                    return;
                }
                SyncOutcome::Fail(reason) => {
                    warn!(job = name, attempt, %reason, "Sync job failed permanently");
                    return;
                }
                SyncOutcome::Retry(reason) => {
                    let delay = backoff.delay(attempt);
                    info!(
                        job = name,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        %reason,
                        "Sync job will retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    fn finished_within(&self, window: Duration) -> bool {
        self.last_finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some_and(|finished| finished.elapsed() < window)
    }

    async fn periodic_loop(self: Arc<Self>, name: String, request: PeriodicRequest) {
        let period = request.interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if request.network_required && !self.probe.is_connected() {
                debug!(job = %name, "Offline; skipping periodic sync");
                continue;
            }
            if !request.flex.is_zero() && self.finished_within(request.flex) {
                debug!(job = %name, "A sync finished recently; skipping periodic sync");
                continue;
            }
            self.run_with_retries(&name, request.backoff).await;
        }
    }

    async fn one_time(self: Arc<Self>, name: String, backoff: BackoffPolicy) {
        while !self.probe.is_connected() {
            debug!(job = %name, "Offline; waiting before one-time sync");
            tokio::time::sleep(CONNECTIVITY_POLL).await;
        }
        self.run_with_retries(&name, backoff).await;
    }
}

/// Owns the background tasks that drive a [`SyncJob`].
pub struct SyncScheduler<J> {
    shared: Arc<Shared<J>>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    debouncer: Debouncer,
    one_time_backoff: BackoffPolicy,
}

impl<J: SyncJob> SyncScheduler<J> {
    pub fn new(job: Arc<J>, settings: &SyncSettings) -> Self {
        Self::with_parts(job, settings, Arc::new(AlwaysOnline), Arc::new(SystemClock))
    }

    pub fn with_parts(
        job: Arc<J>,
        settings: &SyncSettings,
        probe: Arc<dyn ConnectivityProbe>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (status, _) = watch::channel(SyncState::Idle);
        Self {
            shared: Arc::new(Shared {
                job,
                probe,
                run_lock: tokio::sync::Mutex::new(()),
                status,
                last_finished: Mutex::new(None),
            }),
            tasks: Mutex::new(HashMap::new()),
            debouncer: Debouncer::new(clock, settings.trigger_debounce()),
            one_time_backoff: settings.backoff(),
        }
    }

    /// Schedule a recurring job. Returns `false` when `Keep` left an existing one in place.
    pub fn enqueue_unique_periodic(
        &self,
        name: &str,
        policy: ExistingWorkPolicy,
        request: PeriodicRequest,
    ) -> bool {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if !Self::make_room(&mut tasks, name, policy) {
            return false;
        }

        let handle = tokio::spawn(
            Arc::clone(&self.shared).periodic_loop(name.to_string(), request),
        );
        tasks.insert(name.to_string(), handle);
        info!(
            job = name,
            interval_secs = request.interval.as_secs(),
            "Scheduled periodic sync"
        );
        true
    }

    /// Schedule a single run as soon as the network allows.
    ///
    /// Returns `false` when a job with the same name is still pending.
    pub fn enqueue_one_time(&self, name: &str) -> bool {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if !Self::make_room(&mut tasks, name, ExistingWorkPolicy::Keep) {
            return false;
        }

        let handle = tokio::spawn(
            Arc::clone(&self.shared).one_time(name.to_string(), self.one_time_backoff),
        );
        tasks.insert(name.to_string(), handle);
        debug!(job = name, "Scheduled one-time sync");
        true
    }

    /// Debounced manual trigger
    pub fn request_sync(&self) -> bool {
        if !self.debouncer.try_trigger() {
            debug!("Ignoring sync request inside debounce window");
            return false;
        }
        self.enqueue_one_time(MANUAL_SYNC)
    }

    /// Stop a scheduled job. An in-flight run is abandoned without a checkpoint.
    pub fn cancel(&self, name: &str) -> bool {
        let handle = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        match handle {
            Some(handle) => {
                let was_running = !handle.is_finished();
                handle.abort();
                info!(job = name, "Cancelled sync job");
                was_running
            }
            None => false,
        }
    }

    /// Abort every job
    pub fn shutdown(&self) {
        let tasks: Vec<(String, JoinHandle<()>)> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (name, handle) in tasks {
            handle.abort();
            debug!(job = %name, "Stopped sync job");
        }
    }

    pub fn status(&self) -> watch::Receiver<SyncState> {
        self.shared.status.subscribe()
    }

    /// Whether a job with this name is scheduled and not finished
    pub fn is_scheduled(&self, name: &str) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .is_some_and(|handle| !handle.is_finished())
    }

    fn make_room(
        tasks: &mut HashMap<String, JoinHandle<()>>,
        name: &str,
        policy: ExistingWorkPolicy,
    ) -> bool {
        match tasks.get(name) {
            Some(existing) if !existing.is_finished() => match policy {
                ExistingWorkPolicy::Keep => false,
                ExistingWorkPolicy::Replace => {
                    existing.abort();
                    true
                }
            },
            _ => true,
        }
    }
}

impl<J> Drop for SyncScheduler<J> {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }
}

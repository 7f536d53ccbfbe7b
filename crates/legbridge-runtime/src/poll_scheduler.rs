//! [`PollScheduler`] – independently rated fetch → publish pipelines.
//!
//! Every registered [`Feed`] gets its own timer task.  On each tick the task
//! runs the feed's fetch and publish stages on the blocking pool, unless the
//! previous cycle is still running, in which case the tick is dropped and
//! counted.  A failing or panicking feed is logged and counted but never
//! disturbs another feed or the scheduler itself.
//!
//! # Example
//!
//! ```rust,no_run
//! use legbridge_runtime::poll_scheduler::{Feed, FeedId, PollScheduler};
//!
//! # async fn demo() -> Result<(), legbridge_types::BridgeError> {
//! let mut scheduler = PollScheduler::new();
//! scheduler.register(Feed::new(FeedId::Metrics, 1.0, || Ok(42_u32), |_| Ok(())))?;
//! scheduler.start()?;
//! // ...
//! scheduler.stop().await;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use legbridge_types::BridgeError;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Feed identity
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedId {
    RobotState,
    Metrics,
    Leases,
    FrontImages,
    SideImages,
    RearImages,
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeedId::RobotState => "robot_state",
            FeedId::Metrics => "metrics",
            FeedId::Leases => "leases",
            FeedId::FrontImages => "front_images",
            FeedId::SideImages => "side_images",
            FeedId::RearImages => "rear_images",
        };
        f.write_str(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Feed
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Fetch,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Fetch => f.write_str("fetch"),
            Stage::Publish => f.write_str("publish"),
        }
    }
}

type Cycle = dyn Fn() -> Result<(), (Stage, BridgeError)> + Send + Sync;

/// One periodic pipeline: a blocking fetch followed by translation and
/// publication of its result.
pub struct Feed {
    id: FeedId,
    rate_hz: f64,
    cycle: Arc<Cycle>,
}

impl Feed {
    /// Both stages run on the blocking pool, `publish` only after a
    /// successful `fetch`.
    pub fn new<T, F, P>(id: FeedId, rate_hz: f64, fetch: F, publish: P) -> Self
    where
        T: Send + 'static,
        F: Fn() -> Result<T, BridgeError> + Send + Sync + 'static,
        P: Fn(T) -> Result<(), BridgeError> + Send + Sync + 'static,
    {
        let cycle = move || {
            let value = fetch().map_err(|e| (Stage::Fetch, e))?;
            publish(value).map_err(|e| (Stage::Publish, e))
        };
        Self {
            id,
            rate_hz,
            cycle: Arc::new(cycle),
        }
    }

    pub fn id(&self) -> FeedId {
        self.id
    }

    pub fn rate_hz(&self) -> f64 {
        self.rate_hz
    }
}

impl fmt::Debug for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feed")
            .field("id", &self.id)
            .field("rate_hz", &self.rate_hz)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Statistics
// ─────────────────────────────────────────────────────────────────────────────

/// Point-in-time counters for one feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    /// Timer ticks fired.
    pub ticks: u64,
    /// Cycles launched.
    pub started: u64,
    /// Cycles that fetched and published successfully.
    pub completed: u64,
    /// Cycles that returned an error or panicked.
    pub failed: u64,
    /// Ticks skipped because a cycle was still in flight.
    pub dropped: u64,
    pub in_flight: bool,
}

#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    in_flight: AtomicBool,
}

impl Counters {
    fn snapshot(&self) -> FeedStats {
        FeedStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Acquire),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

struct Registered {
    id: FeedId,
    period: Duration,
    cycle: Arc<Cycle>,
    counters: Arc<Counters>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the feed set and one timer task per feed.
///
/// The feed set is fixed once [`start`][Self::start] has been called.
pub struct PollScheduler {
    feeds: Vec<Registered>,
    tasks: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
    started: bool,
}

impl Default for PollScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl PollScheduler {
    pub fn new() -> Self {
        Self {
            feeds: Vec::new(),
            tasks: Vec::new(),
            shutdown: CancellationToken::new(),
            started: false,
        }
    }

    /// Add a feed.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Validation`] after [`start`][Self::start], for
    /// a duplicate feed id, or for a rate that is not a positive finite
    /// number.
    pub fn register(&mut self, feed: Feed) -> Result<(), BridgeError> {
        if self.started {
            return Err(BridgeError::Validation(format!(
                "cannot register feed {} after the scheduler started",
                feed.id
            )));
        }
        if self.feeds.iter().any(|f| f.id == feed.id) {
            return Err(BridgeError::Validation(format!(
                "feed {} is already registered",
                feed.id
            )));
        }
        if !feed.rate_hz.is_finite() || feed.rate_hz <= 0.0 {
            return Err(BridgeError::Validation(format!(
                "feed {} rate must be a positive number of Hz, got {}",
                feed.id, feed.rate_hz
            )));
        }
        self.feeds.push(Registered {
            id: feed.id,
            period: Duration::from_secs_f64(1.0 / feed.rate_hz),
            cycle: feed.cycle,
            counters: Arc::new(Counters::default()),
        });
        Ok(())
    }

    /// Spawn one timer task per feed on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Validation`] when already started and
    /// [`BridgeError::Config`] when called outside a Tokio runtime.
    pub fn start(&mut self) -> Result<(), BridgeError> {
        if self.started {
            return Err(BridgeError::Validation("scheduler already started".into()));
        }
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| BridgeError::Config(format!("no Tokio runtime: {e}")))?;
        self.started = true;
        for feed in &self.feeds {
            let task = FeedTask {
                id: feed.id,
                period: feed.period,
                cycle: feed.cycle.clone(),
                counters: feed.counters.clone(),
                shutdown: self.shutdown.clone(),
            };
            self.tasks.push(handle.spawn(task.run()));
        }
        info!(feeds = self.feeds.len(), "poll scheduler started");
        Ok(())
    }

    /// Stop every timer and wait for in-flight cycles to finish.
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "feed task ended abnormally");
            }
        }
        info!("poll scheduler stopped");
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Ids of every registered feed, in registration order.
    pub fn feed_ids(&self) -> Vec<FeedId> {
        self.feeds.iter().map(|f| f.id).collect()
    }

    pub fn stats(&self, id: FeedId) -> Option<FeedStats> {
        self.feeds
            .iter()
            .find(|f| f.id == id)
            .map(|f| f.counters.snapshot())
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-feed timer task
// ─────────────────────────────────────────────────────────────────────────────

type CycleOutcome = Result<(), (Stage, BridgeError)>;

struct FeedTask {
    id: FeedId,
    period: Duration,
    cycle: Arc<Cycle>,
    counters: Arc<Counters>,
    shutdown: CancellationToken,
}

impl FeedTask {
    async fn run(self) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<JoinHandle<CycleOutcome>> = None;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                joined = join_in_flight(&mut in_flight) => {
                    in_flight = None;
                    self.finish(joined);
                }
                _ = interval.tick() => {
                    Counters::bump(&self.counters.ticks);
                    if in_flight.is_some() {
                        Counters::bump(&self.counters.dropped);
                        debug!(feed = %self.id, "tick dropped, previous cycle still in flight");
                        continue;
                    }
                    Counters::bump(&self.counters.started);
                    self.counters.in_flight.store(true, Ordering::Release);
                    let cycle = self.cycle.clone();
                    in_flight = Some(tokio::task::spawn_blocking(move || cycle()));
                }
            }
        }

        // Drain: the last cycle finishes before the task reports stopped.
        if let Some(handle) = in_flight.take() {
            self.finish(handle.await);
        }
        debug!(feed = %self.id, "feed stopped");
    }

    fn finish(&self, joined: Result<CycleOutcome, JoinError>) {
        match joined {
            Ok(Ok(())) => Counters::bump(&self.counters.completed),
            Ok(Err((stage, e))) => {
                Counters::bump(&self.counters.failed);
                warn!(feed = %self.id, %stage, error = %e, "feed cycle failed");
            }
            Err(e) => {
                Counters::bump(&self.counters.failed);
                warn!(feed = %self.id, panicked = e.is_panic(), error = %e, "feed cycle aborted");
            }
        }
        self.counters.in_flight.store(false, Ordering::Release);
    }
}

/// Resolves with the in-flight task's output, or never when the slot is empty.
pub(crate) async fn join_in_flight<T>(slot: &mut Option<JoinHandle<T>>) -> Result<T, JoinError> {
    match slot {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn noop(id: FeedId, rate_hz: f64) -> Feed {
        Feed::new(id, rate_hz, || Ok(()), |_| Ok(()))
    }

    #[test]
    fn rejects_bad_rates_and_duplicates() {
        let mut scheduler = PollScheduler::new();
        assert!(scheduler.register(noop(FeedId::Metrics, 0.0)).is_err());
        assert!(scheduler.register(noop(FeedId::Metrics, -1.0)).is_err());
        assert!(scheduler.register(noop(FeedId::Metrics, f64::NAN)).is_err());
        assert!(scheduler.register(noop(FeedId::Metrics, f64::INFINITY)).is_err());
        scheduler.register(noop(FeedId::Metrics, 0.04)).unwrap();
        let err = scheduler.register(noop(FeedId::Metrics, 1.0)).unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));
        assert_eq!(scheduler.feed_ids(), vec![FeedId::Metrics]);
    }

    #[test]
    fn start_outside_runtime_is_a_config_error() {
        let mut scheduler = PollScheduler::new();
        scheduler.register(noop(FeedId::Leases, 1.0)).unwrap();
        assert!(matches!(scheduler.start(), Err(BridgeError::Config(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn register_after_start_is_rejected() {
        let mut scheduler = PollScheduler::new();
        scheduler.register(noop(FeedId::Leases, 1.0)).unwrap();
        scheduler.start().unwrap();
        assert!(scheduler.register(noop(FeedId::Metrics, 1.0)).is_err());
        assert!(scheduler.start().is_err());
        scheduler.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_fetch_drops_ticks_and_never_overlaps() {
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));
        let (a, m) = (active.clone(), max_active.clone());
        let fetch = move || {
            let now = a.fetch_add(1, Ordering::SeqCst) + 1;
            m.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(120));
            a.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        };

        let mut scheduler = PollScheduler::new();
        scheduler
            .register(Feed::new(FeedId::RobotState, 100.0, fetch, |_| Ok(())))
            .unwrap();
        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        scheduler.stop().await;

        let stats = scheduler.stats(FeedId::RobotState).unwrap();
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        assert!(stats.dropped > 0, "{stats:?}");
        assert_eq!(stats.ticks, stats.started + stats.dropped);
        assert_eq!(stats.started, stats.completed);
        assert!(!stats.in_flight);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failing_feed_does_not_starve_its_neighbour() {
        let published = Arc::new(Mutex::new(Vec::new()));
        let sink = published.clone();

        let mut scheduler = PollScheduler::new();
        scheduler
            .register(Feed::new(
                FeedId::Metrics,
                50.0,
                || -> Result<(), BridgeError> { panic!("fetch blew up") },
                |_| Ok(()),
            ))
            .unwrap();
        scheduler
            .register(Feed::new(
                FeedId::Leases,
                50.0,
                || Err::<(), _>(BridgeError::transport("fetch_leases", "timeout")),
                |_| Ok(()),
            ))
            .unwrap();
        scheduler
            .register(Feed::new(
                FeedId::RobotState,
                50.0,
                || Ok(7_u32),
                move |v| {
                    sink.lock().unwrap().push(v);
                    Ok(())
                },
            ))
            .unwrap();
        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.stop().await;

        let panicking = scheduler.stats(FeedId::Metrics).unwrap();
        let erroring = scheduler.stats(FeedId::Leases).unwrap();
        let healthy = scheduler.stats(FeedId::RobotState).unwrap();
        assert!(panicking.failed > 1);
        assert_eq!(panicking.completed, 0);
        assert!(erroring.failed > 1);
        assert!(healthy.completed > 1);
        assert_eq!(healthy.failed, 0);
        assert_eq!(published.lock().unwrap().len() as u64, healthy.completed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_feed_does_not_delay_a_fast_neighbour() {
        let mut scheduler = PollScheduler::new();
        scheduler
            .register(Feed::new(
                FeedId::FrontImages,
                10.0,
                || {
                    thread::sleep(Duration::from_millis(300));
                    Ok(())
                },
                |_| Ok(()),
            ))
            .unwrap();
        scheduler.register(noop(FeedId::RobotState, 50.0)).unwrap();
        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        scheduler.stop().await;

        let slow = scheduler.stats(FeedId::FrontImages).unwrap();
        let fast = scheduler.stats(FeedId::RobotState).unwrap();
        assert!(slow.completed <= 4, "{slow:?}");
        assert!(slow.dropped > 0, "{slow:?}");
        // 50 Hz for one second, first tick immediate.
        assert!(fast.completed >= 40, "{fast:?}");
        assert_eq!(fast.failed, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn publish_errors_are_counted() {
        let mut scheduler = PollScheduler::new();
        scheduler
            .register(Feed::new(
                FeedId::SideImages,
                50.0,
                || Ok(()),
                |_| Err(BridgeError::Channel("closed".into())),
            ))
            .unwrap();
        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;
        let stats = scheduler.stats(FeedId::SideImages).unwrap();
        assert!(stats.failed > 0);
        assert_eq!(stats.completed, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_waits_for_the_in_flight_cycle() {
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();
        let mut scheduler = PollScheduler::new();
        scheduler
            .register(Feed::new(
                FeedId::RearImages,
                1.0,
                move || {
                    thread::sleep(Duration::from_millis(150));
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                },
                |_| Ok(()),
            ))
            .unwrap();
        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        scheduler.stop().await;
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(scheduler.stats(FeedId::RearImages).unwrap().completed, 1);
    }
}

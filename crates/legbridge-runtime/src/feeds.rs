//! Standard telemetry feeds and the shared [`TelemetryCache`].
//!
//! | Feed | Fetch | Publishes |
//! |---|---|---|
//! | robot state | full robot state | joints, dynamic TF, odometry, feet, e-stop, wifi, battery, power, faults |
//! | metrics | aggregate metrics | `status/metrics` |
//! | leases | lease table | `status/leases` |
//! | front / side / rear images | one camera group | image + camera info per source, latched static TF |

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use legbridge_hal::RobotTransport;
use legbridge_middleware::{EventBus, Message, Topic, translate};
use legbridge_perception::{OdomFrames, StaticFrameCache};
use legbridge_types::BridgeError;
use legbridge_types::messages::TfMessage;
use legbridge_types::robot::{CameraGroup, ImageCapture, RobotState};
use tracing::warn;

use crate::poll_scheduler::{Feed, FeedId};

// ─────────────────────────────────────────────────────────────────────────────
// Telemetry cache
// ─────────────────────────────────────────────────────────────────────────────

/// Latest robot state, swapped whole on every poll.
///
/// Readers clone the `Arc` and never hold the lock while using the state.
#[derive(Debug, Default)]
pub struct TelemetryCache {
    latest: RwLock<Option<Arc<RobotState>>>,
}

impl TelemetryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, state: RobotState) -> Arc<RobotState> {
        let state = Arc::new(state);
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(state.clone());
        state
    }

    pub fn latest(&self) -> Option<Arc<RobotState>> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rates
// ─────────────────────────────────────────────────────────────────────────────

/// Poll rate of every standard feed, in Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedRates {
    pub robot_state: f64,
    pub metrics: f64,
    pub leases: f64,
    pub front_images: f64,
    pub side_images: f64,
    pub rear_images: f64,
}

impl Default for FeedRates {
    fn default() -> Self {
        Self {
            robot_state: 20.0,
            metrics: 0.04,
            leases: 1.0,
            front_images: 10.0,
            side_images: 10.0,
            rear_images: 10.0,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Feed construction
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the standard feeds share.
#[derive(Clone)]
pub struct FeedContext {
    pub transport: Arc<dyn RobotTransport>,
    pub bus: EventBus,
    pub telemetry: Arc<TelemetryCache>,
    pub static_frames: Arc<StaticFrameCache>,
    pub frames: OdomFrames,
    /// Child frames never recorded as static.
    pub excluded: Arc<HashSet<String>>,
}

/// The six standard feeds at `rates`.
pub fn standard_feeds(ctx: &FeedContext, rates: &FeedRates) -> Vec<Feed> {
    vec![
        robot_state_feed(ctx, rates.robot_state),
        metrics_feed(ctx, rates.metrics),
        lease_feed(ctx, rates.leases),
        camera_feed(ctx, FeedId::FrontImages, CameraGroup::Front, rates.front_images),
        camera_feed(ctx, FeedId::SideImages, CameraGroup::Side, rates.side_images),
        camera_feed(ctx, FeedId::RearImages, CameraGroup::Rear, rates.rear_images),
    ]
}

pub fn robot_state_feed(ctx: &FeedContext, rate_hz: f64) -> Feed {
    let transport = ctx.transport.clone();
    let (bus, telemetry, frames) = (ctx.bus.clone(), ctx.telemetry.clone(), ctx.frames.clone());
    Feed::new(
        FeedId::RobotState,
        rate_hz,
        move || transport.fetch_robot_state(),
        move |state| {
            let state = telemetry.store(state);
            publish_all(&bus, translate::robot_state_messages(&state, &frames))
        },
    )
}

pub fn metrics_feed(ctx: &FeedContext, rate_hz: f64) -> Feed {
    let transport = ctx.transport.clone();
    let bus = ctx.bus.clone();
    Feed::new(
        FeedId::Metrics,
        rate_hz,
        move || transport.fetch_metrics(),
        move |raw| {
            bus.publish(Topic::Metrics, Message::Metrics(translate::metrics(&raw)))?;
            Ok(())
        },
    )
}

pub fn lease_feed(ctx: &FeedContext, rate_hz: f64) -> Feed {
    let transport = ctx.transport.clone();
    let bus = ctx.bus.clone();
    Feed::new(
        FeedId::Leases,
        rate_hz,
        move || transport.fetch_leases(),
        move |raw| {
            bus.publish(Topic::Leases, Message::Leases(translate::leases(&raw)))?;
            Ok(())
        },
    )
}

/// Images and camera info for `group`; every batch also feeds the static
/// frame cache.
pub fn camera_feed(ctx: &FeedContext, id: FeedId, group: CameraGroup, rate_hz: f64) -> Feed {
    let transport = ctx.transport.clone();
    let ctx = ctx.clone();
    Feed::new(
        id,
        rate_hz,
        move || transport.fetch_images(group),
        move |captures| {
            discover_static_frames(&ctx, &captures);
            publish_all(&ctx.bus, translate::image_messages(&captures))
        },
    )
}

fn discover_static_frames(ctx: &FeedContext, captures: &[ImageCapture]) {
    for capture in captures {
        ctx.static_frames.observe(
            &capture.transforms,
            capture.acquired_at,
            &ctx.excluded,
            |records| {
                let message = Message::Tf(TfMessage {
                    transforms: records.to_vec(),
                });
                if let Err(e) = ctx.bus.publish_latched(Topic::StaticTf, message) {
                    warn!(error = %e, "static tf rebroadcast failed");
                }
            },
        );
    }
}

fn publish_all(bus: &EventBus, messages: Vec<(Topic, Message)>) -> Result<(), BridgeError> {
    for (topic, message) in messages {
        bus.publish(topic, message)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll_scheduler::PollScheduler;
    use legbridge_hal::SimRobot;
    use legbridge_hal::sim::FetchKind;
    use legbridge_perception::static_frames::excluded_frames;
    use legbridge_types::robot::{Camera, ImageKind};
    use std::time::Duration;

    fn context(robot: Arc<SimRobot>) -> FeedContext {
        FeedContext {
            transport: robot,
            bus: EventBus::default(),
            telemetry: Arc::new(TelemetryCache::new()),
            static_frames: Arc::new(StaticFrameCache::new()),
            frames: OdomFrames::default(),
            excluded: Arc::new(excluded_frames("odom", "vision")),
        }
    }

    #[test]
    fn telemetry_cache_swaps_snapshots() {
        let robot = SimRobot::new().connected();
        let cache = TelemetryCache::new();
        assert!(cache.latest().is_none());
        let first = cache.store(robot.fetch_robot_state().unwrap());
        let held = cache.latest().unwrap();
        cache.store(robot.fetch_robot_state().unwrap());
        assert!(Arc::ptr_eq(&first, &held));
        assert!(!Arc::ptr_eq(&held, &cache.latest().unwrap()));
    }

    #[test]
    fn default_rates_match_robot_limits() {
        let rates = FeedRates::default();
        assert_eq!(rates.robot_state, 20.0);
        assert_eq!(rates.metrics, 0.04);
        assert_eq!(rates.leases, 1.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn robot_state_feed_fans_out_and_caches() -> Result<(), Box<dyn std::error::Error>> {
        let robot = Arc::new(SimRobot::new().connected());
        let ctx = context(robot.clone());
        let mut joints = ctx.bus.subscribe(Topic::JointStates);
        let mut odom = ctx.bus.subscribe(Topic::Odometry);

        let mut scheduler = PollScheduler::new();
        scheduler.register(robot_state_feed(&ctx, 50.0))?;
        scheduler.start()?;
        let joint_event = tokio::time::timeout(Duration::from_secs(2), joints.recv()).await??;
        let odom_event = tokio::time::timeout(Duration::from_secs(2), odom.recv()).await??;
        scheduler.stop().await;

        assert!(matches!(joint_event.payload, Message::JointState(_)));
        match odom_event.payload {
            Message::Odometry(msg) => assert_eq!(msg.header.frame_id, "odom"),
            other => panic!("expected odometry, got {other:?}"),
        }
        assert!(ctx.telemetry.latest().is_some());
        assert!(robot.fetches(FetchKind::RobotState) > 0);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn camera_feed_publishes_images_and_latches_static_frames()
    -> Result<(), Box<dyn std::error::Error>> {
        let robot = Arc::new(SimRobot::new().connected());
        let ctx = context(robot);
        let mut front_left = ctx.bus.subscribe(Topic::Image {
            camera: Camera::FrontLeft,
            kind: ImageKind::Visual,
        });

        let mut scheduler = PollScheduler::new();
        scheduler.register(camera_feed(&ctx, FeedId::FrontImages, CameraGroup::Front, 50.0))?;
        scheduler.start()?;
        tokio::time::timeout(Duration::from_secs(2), front_left.recv()).await??;
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;

        let discovered = ctx.static_frames.snapshot();
        assert!(!discovered.is_empty());
        let keys: HashSet<_> = discovered
            .iter()
            .map(|r| (r.parent_frame.clone(), r.child_frame.clone()))
            .collect();
        assert_eq!(keys.len(), discovered.len(), "duplicate static frame");
        assert!(discovered.iter().all(|r| !ctx.excluded.contains(&r.child_frame)));

        // Late subscribers see the full set.
        let latched = ctx.bus.latched(Topic::StaticTf).ok_or("no latched static tf")?;
        match latched.payload {
            Message::Tf(tf) => assert_eq!(tf.transforms, discovered),
            other => panic!("expected tf, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unreachable_robot_counts_failures_only() -> Result<(), Box<dyn std::error::Error>> {
        let robot = Arc::new(SimRobot::new().unreachable());
        let ctx = context(robot);
        let mut scheduler = PollScheduler::new();
        for feed in standard_feeds(&ctx, &FeedRates { metrics: 50.0, leases: 50.0, ..FeedRates::default() }) {
            scheduler.register(feed)?;
        }
        scheduler.start()?;
        tokio::time::sleep(Duration::from_millis(150)).await;
        scheduler.stop().await;

        for id in scheduler.feed_ids() {
            let stats = scheduler.stats(id).ok_or("missing stats")?;
            assert!(stats.failed > 0, "{id}: {stats:?}");
            assert_eq!(stats.completed, 0, "{id}");
        }
        assert!(ctx.telemetry.latest().is_none());
        Ok(())
    }
}

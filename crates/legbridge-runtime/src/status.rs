//! [`StatusPublisher`] – periodic posture, identity and mobility snapshot.
//!
//! Posture comes from the [`TelemetryCache`], so the status task never talks
//! to the robot for it.  Identity fields are fetched in the background until
//! every field is known, at most once per [`IDENTITY_RETRY`]; a slow or failed
//! fetch only leaves the missing fields empty.

use std::sync::Arc;
use std::time::{Duration, Instant};

use legbridge_hal::RobotTransport;
use legbridge_kernel::MobilityStore;
use legbridge_middleware::{EventBus, Message, Topic, translate};
use legbridge_types::BridgeError;
use legbridge_types::robot::RobotIdentity;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::feeds::TelemetryCache;
use crate::poll_scheduler::join_in_flight;

type IdentityFetch = Result<RobotIdentity, BridgeError>;

/// Minimum spacing between identity fetch attempts.
pub const IDENTITY_RETRY: Duration = Duration::from_secs(1);

pub struct StatusPublisher {
    transport: Arc<dyn RobotTransport>,
    bus: EventBus,
    telemetry: Arc<TelemetryCache>,
    mobility: Arc<MobilityStore>,
    identity: RobotIdentity,
    period: Duration,
}

impl StatusPublisher {
    /// `rate_hz` must be positive and finite; it is validated when the
    /// bridge settings are.
    pub fn new(
        transport: Arc<dyn RobotTransport>,
        bus: EventBus,
        telemetry: Arc<TelemetryCache>,
        mobility: Arc<MobilityStore>,
        rate_hz: f64,
    ) -> Self {
        Self {
            transport,
            bus,
            telemetry,
            mobility,
            identity: RobotIdentity::default(),
            period: Duration::from_secs_f64(1.0 / rate_hz),
        }
    }

    /// Publish every period until `shutdown` is cancelled.
    ///
    /// Identity fetches run on the blocking pool next to the tick; a slow or
    /// failing fetch never delays a status message.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut next_identity_attempt = Instant::now();
        let mut in_flight: Option<JoinHandle<IdentityFetch>> = None;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                joined = join_in_flight(&mut in_flight) => {
                    in_flight = None;
                    self.absorb_identity(joined);
                }
                _ = interval.tick() => {
                    if in_flight.is_none()
                        && !self.identity.is_complete()
                        && Instant::now() >= next_identity_attempt
                    {
                        next_identity_attempt = Instant::now() + IDENTITY_RETRY;
                        in_flight = Some(self.fetch_identity());
                    }
                    self.publish();
                }
            }
        }
        debug!("status publisher stopped");
    }

    fn fetch_identity(&self) -> JoinHandle<IdentityFetch> {
        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.fetch_identity())
    }

    fn absorb_identity(&mut self, joined: Result<IdentityFetch, JoinError>) {
        match joined {
            Ok(Ok(identity)) => self.identity.merge(identity),
            Ok(Err(e)) => debug!(error = %e, "robot identity unavailable"),
            Err(e) => warn!(error = %e, "identity fetch task failed"),
        }
    }

    /// Publish one status message and one mobility snapshot.
    pub fn publish(&self) {
        let posture = self
            .telemetry
            .latest()
            .map(|state| state.posture)
            .unwrap_or_default();
        let status = translate::status(posture, &self.identity);
        if let Err(e) = self.bus.publish(Topic::Status, Message::Status(status)) {
            warn!(error = %e, "status publish failed");
        }
        let mobility = Message::Mobility(self.mobility.snapshot());
        if let Err(e) = self.bus.publish(Topic::MobilityParams, mobility) {
            warn!(error = %e, "mobility snapshot publish failed");
        }
    }

    pub fn identity(&self) -> &RobotIdentity {
        &self.identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legbridge_hal::SimRobot;
    use legbridge_middleware::TopicReceiver;
    use legbridge_types::MobilityConfig;
    use legbridge_types::messages::StatusFeedback;

    fn identity() -> RobotIdentity {
        RobotIdentity {
            serial_number: Some("BD-1234".into()),
            species: Some("legged".into()),
            version: Some("4.0.2".into()),
            nickname: Some("rex".into()),
            computer_serial_number: None,
        }
    }

    #[test]
    fn publish_reflects_cached_posture_and_mobility() {
        let robot = Arc::new(SimRobot::new().connected());
        let bus = EventBus::default();
        let telemetry = Arc::new(TelemetryCache::new());
        let mut state = robot.fetch_robot_state().unwrap();
        state.posture.standing = true;
        telemetry.store(state);
        let mobility = Arc::new(MobilityStore::new(MobilityConfig {
            stair_hint: true,
            ..MobilityConfig::default()
        }));

        let publisher = StatusPublisher::new(robot, bus.clone(), telemetry, mobility, 50.0);
        let mut status = bus.subscribe(Topic::Status);
        let mut params = bus.subscribe(Topic::MobilityParams);
        publisher.publish();

        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            match status.recv().await.unwrap().payload {
                Message::Status(s) => {
                    assert!(s.standing);
                    assert_eq!(s.identity, RobotIdentity::default());
                }
                other => panic!("expected status, got {other:?}"),
            }
            match params.recv().await.unwrap().payload {
                Message::Mobility(cfg) => assert!(cfg.stair_hint),
                other => panic!("expected mobility, got {other:?}"),
            }
        });
    }

    async fn next_status(
        status: &mut TopicReceiver,
    ) -> Result<StatusFeedback, Box<dyn std::error::Error>> {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), status.recv()).await??;
            if let Message::Status(s) = event.payload {
                return Ok(s);
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn identity_is_merged_into_later_status() -> Result<(), Box<dyn std::error::Error>> {
        let robot = Arc::new(SimRobot::new().with_identity(identity()).connected());
        let bus = EventBus::default();
        let publisher = StatusPublisher::new(
            robot,
            bus.clone(),
            Arc::new(TelemetryCache::new()),
            Arc::new(MobilityStore::default()),
            100.0,
        );
        let mut status = bus.subscribe(Topic::Status);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(publisher.run(shutdown.clone()));

        let mut received = next_status(&mut status).await?;
        while received.identity.nickname.is_none() {
            received = next_status(&mut status).await?;
        }
        shutdown.cancel();
        task.await?;
        assert_eq!(received.identity.serial_number.as_deref(), Some("BD-1234"));
        assert!(received.identity.computer_serial_number.is_none());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_identity_fetch_does_not_stall_status() -> Result<(), Box<dyn std::error::Error>> {
        let robot = Arc::new(
            SimRobot::new()
                .with_identity(identity())
                .with_call_delay("fetch_identity", Duration::from_millis(800))
                .connected(),
        );
        let bus = EventBus::default();
        let publisher = StatusPublisher::new(
            robot,
            bus.clone(),
            Arc::new(TelemetryCache::new()),
            Arc::new(MobilityStore::default()),
            50.0,
        );
        let mut status = bus.subscribe(Topic::Status);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(publisher.run(shutdown.clone()));

        // 50 Hz over half a second while the first fetch is still blocked.
        let window = Instant::now();
        let mut count = 0;
        while window.elapsed() < Duration::from_millis(500) {
            let s = next_status(&mut status).await?;
            assert_eq!(s.identity, RobotIdentity::default());
            count += 1;
        }
        assert!(count >= 15, "only {count} status messages in 500ms");

        let mut received = next_status(&mut status).await?;
        while received.identity.nickname.is_none() {
            received = next_status(&mut status).await?;
        }
        shutdown.cancel();
        task.await?;
        assert_eq!(received.identity.nickname.as_deref(), Some("rex"));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn missing_identity_degrades_to_empty_fields() -> Result<(), Box<dyn std::error::Error>> {
        let robot = Arc::new(SimRobot::new().with_identity(RobotIdentity::default()).connected());
        let mut publisher = StatusPublisher::new(
            robot,
            EventBus::default(),
            Arc::new(TelemetryCache::new()),
            Arc::new(MobilityStore::default()),
            50.0,
        );
        let joined = publisher.fetch_identity().await;
        assert!(matches!(joined, Ok(Err(_))));
        publisher.absorb_identity(joined);
        assert_eq!(publisher.identity(), &RobotIdentity::default());
        Ok(())
    }
}

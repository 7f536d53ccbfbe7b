//! [`Bridge`] – the assembled control plane.
//!
//! Startup order:
//!
//! 1. validate settings and build every feed (nothing touches the robot yet)
//! 2. connect (fatal on failure)
//! 3. run the boot sequence
//! 4. start the poll scheduler, the status publisher and the continuous-input
//!    listener
//!
//! Shutdown reverses it: abort goals, stop feeds and background tasks, sit,
//! disconnect.

use std::sync::Arc;

use legbridge_hal::{ConnectionSettings, RobotTransport};
use legbridge_kernel::{BootReport, BootSequence, CommandExecutor, MobilityStore};
use legbridge_middleware::{Event, EventBus, Message, Topic, TopicReceiver};
use legbridge_perception::static_frames::excluded_frames;
use legbridge_perception::{OdomFrames, StaticFrameCache};
use legbridge_types::{BridgeError, Command, CommandResult, RobotCommand};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::feeds::{FeedContext, FeedRates, TelemetryCache, standard_feeds};
use crate::goal_runner::GoalRunner;
use crate::poll_scheduler::{FeedId, FeedStats, PollScheduler};
use crate::status::StatusPublisher;

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Everything [`Bridge::start`] needs.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub connection: ConnectionSettings,
    pub boot: BootSequence,
    pub frames: OdomFrames,
    pub rates: FeedRates,
    pub status_rate_hz: f64,
    /// Velocity components below this magnitude are sent as zero.
    pub deadzone: f64,
    pub bus_capacity: usize,
}

impl BridgeSettings {
    pub fn new(connection: ConnectionSettings) -> Self {
        Self {
            connection,
            boot: BootSequence::default(),
            frames: OdomFrames::default(),
            rates: FeedRates::default(),
            status_rate_hz: 50.0,
            deadzone: 0.05,
            bus_capacity: 256,
        }
    }

    pub fn with_boot(mut self, boot: BootSequence) -> Self {
        self.boot = boot;
        self
    }

    pub fn with_frames(mut self, frames: OdomFrames) -> Self {
        self.frames = frames;
        self
    }

    pub fn with_rates(mut self, rates: FeedRates) -> Self {
        self.rates = rates;
        self
    }

    pub fn with_status_rate(mut self, rate_hz: f64) -> Self {
        self.status_rate_hz = rate_hz;
        self
    }

    pub fn with_deadzone(mut self, deadzone: f64) -> Self {
        self.deadzone = deadzone;
        self
    }

    /// # Errors
    ///
    /// [`BridgeError::Config`] for a non-positive status rate, a negative or
    /// non-finite deadzone, a zero bus capacity, or empty or identical
    /// odometry frame names.  Feed rates are checked on registration.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if !self.status_rate_hz.is_finite() || self.status_rate_hz <= 0.0 {
            return Err(BridgeError::Config(format!(
                "status rate must be positive, got {}",
                self.status_rate_hz
            )));
        }
        if !self.deadzone.is_finite() || self.deadzone < 0.0 {
            return Err(BridgeError::Config(format!(
                "deadzone must be a non-negative number, got {}",
                self.deadzone
            )));
        }
        if self.bus_capacity == 0 {
            return Err(BridgeError::Config("bus capacity must be positive".into()));
        }
        if self.frames.kinematic.is_empty() || self.frames.vision.is_empty() {
            return Err(BridgeError::Config("odometry frame names must not be empty".into()));
        }
        if self.frames.kinematic == self.frames.vision {
            return Err(BridgeError::Config(format!(
                "kinematic and vision odometry frames must differ, both are '{}'",
                self.frames.kinematic
            )));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bridge
// ─────────────────────────────────────────────────────────────────────────────

pub struct Bridge {
    bus: EventBus,
    transport: Arc<dyn RobotTransport>,
    executor: Arc<CommandExecutor>,
    goals: GoalRunner,
    scheduler: PollScheduler,
    telemetry: Arc<TelemetryCache>,
    static_frames: Arc<StaticFrameCache>,
    boot: BootReport,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Bridge {
    /// Connect, boot and start every background task.
    ///
    /// # Errors
    ///
    /// Returns the validation, registration or connection error that stopped
    /// startup.  Nothing is running when this fails.
    pub async fn start(
        settings: BridgeSettings,
        transport: Arc<dyn RobotTransport>,
    ) -> Result<Self, BridgeError> {
        settings.validate()?;

        let bus = EventBus::new(settings.bus_capacity);
        let telemetry = Arc::new(TelemetryCache::new());
        let static_frames = Arc::new(StaticFrameCache::new());
        let feed_ctx = FeedContext {
            transport: transport.clone(),
            bus: bus.clone(),
            telemetry: telemetry.clone(),
            static_frames: static_frames.clone(),
            excluded: Arc::new(excluded_frames(
                &settings.frames.kinematic,
                &settings.frames.vision,
            )),
            frames: settings.frames.clone(),
        };
        let mut scheduler = PollScheduler::new();
        for feed in standard_feeds(&feed_ctx, &settings.rates) {
            scheduler.register(feed)?;
        }

        let connection = settings.connection.clone();
        let robot = transport.clone();
        tokio::task::spawn_blocking(move || robot.connect(&connection))
            .await
            .map_err(|e| BridgeError::transport("connect", e.to_string()))??;
        info!(hostname = %settings.connection.hostname, "connected to robot");

        let mobility = Arc::new(MobilityStore::default());
        let executor = Arc::new(CommandExecutor::new(
            transport.clone(),
            mobility.clone(),
            settings.deadzone,
        ));

        let boot_seq = settings.boot;
        let exec = executor.clone();
        let boot = tokio::task::spawn_blocking(move || boot_seq.run(&exec))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "boot sequence task failed");
                BootReport::default()
            });

        scheduler.start()?;

        let shutdown = CancellationToken::new();
        let status = StatusPublisher::new(
            transport.clone(),
            bus.clone(),
            telemetry.clone(),
            mobility,
            settings.status_rate_hz,
        );
        let tasks = vec![
            tokio::spawn(status.run(shutdown.clone())),
            tokio::spawn(listen_for_inputs(
                bus.subscribe(Topic::CmdVel),
                bus.subscribe(Topic::BodyPose),
                executor.clone(),
                shutdown.clone(),
            )),
        ];

        info!(feeds = scheduler.feed_ids().len(), "bridge started");
        Ok(Self {
            bus,
            transport,
            goals: GoalRunner::new(executor.clone()),
            executor,
            scheduler,
            telemetry,
            static_frames,
            boot,
            shutdown,
            tasks,
        })
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn executor(&self) -> &Arc<CommandExecutor> {
        &self.executor
    }

    pub fn goals(&self) -> &GoalRunner {
        &self.goals
    }

    pub fn boot_report(&self) -> &BootReport {
        &self.boot
    }

    pub fn telemetry(&self) -> &Arc<TelemetryCache> {
        &self.telemetry
    }

    pub fn static_frames(&self) -> &Arc<StaticFrameCache> {
        &self.static_frames
    }

    pub fn feed_stats(&self, id: FeedId) -> Option<FeedStats> {
        self.scheduler.stats(id)
    }

    /// Run a synchronous command on the blocking pool.
    pub async fn command(&self, command: Command) -> CommandResult {
        let exec = self.executor.clone();
        tokio::task::spawn_blocking(move || exec.execute(command))
            .await
            .unwrap_or_else(|e| CommandResult::failed(format!("command task failed: {e}")))
    }

    /// Abort goals, stop every task, sit and disconnect.
    ///
    /// # Errors
    ///
    /// Returns the disconnect error; earlier steps only log.
    pub async fn shutdown(mut self) -> Result<(), BridgeError> {
        info!("bridge shutting down");
        self.goals.shutdown().await;
        self.scheduler.stop().await;
        self.shutdown.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "background task ended abnormally");
            }
        }

        let sit = self.command(Command::Robot(RobotCommand::Sit)).await;
        if !sit.success {
            warn!(message = %sit.message, "sit on shutdown failed");
        }

        let robot = self.transport.clone();
        tokio::task::spawn_blocking(move || robot.disconnect())
            .await
            .map_err(|e| BridgeError::transport("disconnect", e.to_string()))??;
        info!("bridge stopped");
        Ok(())
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Continuous inputs
// ─────────────────────────────────────────────────────────────────────────────

async fn listen_for_inputs(
    mut velocity: TopicReceiver,
    mut body_pose: TopicReceiver,
    executor: Arc<CommandExecutor>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            Some(event) = velocity.next() => event,
            Some(event) = body_pose.next() => event,
            else => break,
        };
        let Some(command) = input_command(&event) else {
            continue;
        };
        let exec = executor.clone();
        match tokio::task::spawn_blocking(move || exec.execute(command)).await {
            Ok(result) if !result.success => {
                warn!(topic = %event.topic.name(), message = %result.message, "input rejected");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "input task failed"),
        }
    }
}

fn input_command(event: &Event) -> Option<Command> {
    match &event.payload {
        Message::CmdVel(twist) => Some(Command::Velocity {
            linear_x: twist.linear.x,
            linear_y: twist.linear.y,
            angular_z: twist.angular.z,
        }),
        Message::BodyPose(pose) => Some(Command::SetBodyOffset {
            position_z: pose.position_z,
            orientation: pose.orientation,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legbridge_types::OdomFrameMode;
    use std::time::Duration;
    use zeroize::Zeroizing;

    fn settings() -> BridgeSettings {
        BridgeSettings::new(ConnectionSettings {
            hostname: "192.168.80.3".into(),
            username: "operator".into(),
            password: Zeroizing::new("hunter2".into()),
            estop_timeout: Duration::from_secs(9),
        })
    }

    #[test]
    fn default_settings_are_valid() {
        assert!(settings().validate().is_ok());
    }

    #[test]
    fn invalid_settings_are_config_errors() {
        let bad = [
            settings().with_status_rate(0.0),
            settings().with_deadzone(-0.1),
            settings().with_deadzone(f64::NAN),
            settings().with_frames(OdomFrames {
                kinematic: "odom".into(),
                vision: "odom".into(),
                mode: OdomFrameMode::Vision,
            }),
        ];
        for s in bad {
            assert!(matches!(s.validate(), Err(BridgeError::Config(_))), "{s:?}");
        }
    }

    #[test]
    fn settings_debug_hides_password() {
        assert!(!format!("{:?}", settings()).contains("hunter2"));
    }
}

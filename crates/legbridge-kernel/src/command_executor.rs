//! [`CommandExecutor`] – synchronous request/response wrapper around the
//! robot's discrete commands.
//!
//! Every public method returns exactly one [`CommandResult`] and never
//! propagates a failure: transport errors, robot rejections, validation
//! errors and transport panics all come back as `success == false` with a
//! non-empty message.
//!
//! All methods block on the transport.  Async callers run them on the
//! blocking pool.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use legbridge_hal::SimRobot;
//! use legbridge_kernel::{CommandExecutor, MobilityStore};
//!
//! let robot = Arc::new(SimRobot::new().connected());
//! let executor = CommandExecutor::new(robot, Arc::new(MobilityStore::default()), 0.05);
//!
//! assert!(executor.claim().success);
//! // Stand is rejected until motor power is on.
//! assert!(!executor.stand().success);
//! ```

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use legbridge_hal::RobotTransport;
use legbridge_types::robot::TrajectoryProgress;
use legbridge_types::{
    BridgeError, Command, CommandResult, LocomotionHint, NavigateGoal, Quaternion, RobotCommand,
    TrajectoryGoal, Twist, VelocityLimit,
};
use tracing::{debug, warn};

use crate::mobility::MobilityStore;

pub struct CommandExecutor {
    transport: Arc<dyn RobotTransport>,
    mobility: Arc<MobilityStore>,
    /// Velocity components with a smaller magnitude are sent as zero.
    deadzone: f64,
}

impl CommandExecutor {
    pub fn new(
        transport: Arc<dyn RobotTransport>,
        mobility: Arc<MobilityStore>,
        deadzone: f64,
    ) -> Self {
        Self {
            transport,
            mobility,
            deadzone: deadzone.abs(),
        }
    }

    pub fn mobility(&self) -> &Arc<MobilityStore> {
        &self.mobility
    }

    pub fn transport(&self) -> &Arc<dyn RobotTransport> {
        &self.transport
    }

    // ── Discrete commands ───────────────────────────────────────────────────

    pub fn claim(&self) -> CommandResult {
        self.discrete(RobotCommand::Claim)
    }

    pub fn release(&self) -> CommandResult {
        self.discrete(RobotCommand::Release)
    }

    pub fn stop(&self) -> CommandResult {
        self.discrete(RobotCommand::Stop)
    }

    pub fn self_right(&self) -> CommandResult {
        self.discrete(RobotCommand::SelfRight)
    }

    pub fn sit(&self) -> CommandResult {
        self.discrete(RobotCommand::Sit)
    }

    pub fn stand(&self) -> CommandResult {
        self.discrete(RobotCommand::Stand)
    }

    pub fn power_on(&self) -> CommandResult {
        self.discrete(RobotCommand::PowerOn)
    }

    /// Sit down, then cut motor power.
    pub fn power_off(&self) -> CommandResult {
        self.discrete(RobotCommand::SafePowerOff)
    }

    pub fn estop_hard(&self) -> CommandResult {
        self.discrete(RobotCommand::EstopHard)
    }

    pub fn estop_soft(&self) -> CommandResult {
        self.discrete(RobotCommand::EstopSoft)
    }

    pub fn estop_release(&self) -> CommandResult {
        self.discrete(RobotCommand::EstopRelease)
    }

    pub fn clear_behavior_fault(&self, id: u32) -> CommandResult {
        self.discrete(RobotCommand::ClearBehaviorFault(id))
    }

    /// Waypoint ids of the graph at `upload_path`, comma separated.
    pub fn list_graph(&self, upload_path: &str) -> CommandResult {
        self.run("list_graph", || {
            let ids = self.transport.list_graph(upload_path)?;
            Ok(ids.join(", "))
        })
    }

    // ── Mobility configuration ──────────────────────────────────────────────

    pub fn set_stair_hint(&self, enabled: bool) -> CommandResult {
        self.run("set_stair_hint", || {
            self.mobility.update_with(self.transport.as_ref(), |c| {
                c.stair_hint = enabled;
                Ok(())
            })?;
            Ok(format!("Stair hint set to {enabled}"))
        })
    }

    /// Set the locomotion hint from its raw numeric mode.  Unknown modes are
    /// rejected without touching the robot.
    pub fn set_locomotion_mode(&self, mode: u32) -> CommandResult {
        self.run("set_locomotion_mode", || {
            let hint = LocomotionHint::try_from(mode)?;
            self.mobility.update_with(self.transport.as_ref(), |c| {
                c.locomotion_hint = hint;
                Ok(())
            })?;
            Ok(format!("Locomotion mode set to {hint:?}"))
        })
    }

    pub fn set_velocity_limit(&self, linear_x: f64, linear_y: f64, angular_z: f64) -> CommandResult {
        self.run("set_velocity_limit", || {
            for (axis, v) in [("x", linear_x), ("y", linear_y), ("angular", angular_z)] {
                if !v.is_finite() || v < 0.0 {
                    return Err(BridgeError::Validation(format!(
                        "velocity limit {axis} must be a non-negative number, got {v}"
                    )));
                }
            }
            self.mobility.update_with(self.transport.as_ref(), |c| {
                c.velocity_limit = Some(VelocityLimit {
                    linear_x,
                    linear_y,
                    angular_z,
                });
                Ok(())
            })?;
            Ok("Velocity limit updated".to_string())
        })
    }

    /// Merge a body height and orientation into the mobility body offset.
    /// The quaternion is normalised; a zero quaternion is rejected.
    pub fn set_body_offset(&self, position_z: f64, orientation: Quaternion) -> CommandResult {
        self.run("set_body_offset", || {
            if !position_z.is_finite() {
                return Err(BridgeError::Validation(format!(
                    "body height must be finite, got {position_z}"
                )));
            }
            let orientation = orientation.normalized().ok_or_else(|| {
                BridgeError::Validation("body orientation must be a non-zero quaternion".into())
            })?;
            self.mobility.update_with(self.transport.as_ref(), |c| {
                c.body_offset.position.z = position_z;
                c.body_offset.orientation = orientation;
                Ok(())
            })?;
            Ok("Body offset updated".to_string())
        })
    }

    // ── Motion ──────────────────────────────────────────────────────────────

    /// Short-lived velocity command after the deadzone is applied.
    pub fn velocity(&self, linear_x: f64, linear_y: f64, angular_z: f64) -> CommandResult {
        self.run("velocity", || {
            if ![linear_x, linear_y, angular_z].iter().all(|v| v.is_finite()) {
                return Err(BridgeError::Validation("velocity must be finite".into()));
            }
            let twist = Twist::planar(
                self.apply_deadzone(linear_x),
                self.apply_deadzone(linear_y),
                self.apply_deadzone(angular_z),
            );
            let config = self.mobility.snapshot();
            self.transport.velocity(twist, &config)
        })
    }

    /// Start a non-blocking trajectory with the current mobility config.
    pub fn trajectory(&self, goal: &TrajectoryGoal) -> CommandResult {
        self.run("trajectory", || {
            let config = self.mobility.snapshot();
            self.transport.trajectory(goal, &config)
        })
    }

    pub fn trajectory_progress(&self) -> Result<TrajectoryProgress, BridgeError> {
        guarded("trajectory_progress", || self.transport.trajectory_progress())
    }

    /// Blocking waypoint-graph navigation.
    pub fn navigate(&self, goal: &NavigateGoal) -> CommandResult {
        self.run("navigate", || self.transport.navigate_to(goal))
    }

    pub fn localization_waypoint(&self) -> Result<Option<String>, BridgeError> {
        guarded("localization_waypoint", || {
            self.transport.localization_waypoint()
        })
    }

    // ── Typed dispatch ──────────────────────────────────────────────────────

    pub fn execute(&self, command: Command) -> CommandResult {
        match command {
            Command::Robot(cmd) => self.discrete(cmd),
            Command::SetStairHint(enabled) => self.set_stair_hint(enabled),
            Command::SetLocomotionMode(mode) => self.set_locomotion_mode(mode),
            Command::SetVelocityLimit {
                linear_x,
                linear_y,
                angular_z,
            } => self.set_velocity_limit(linear_x, linear_y, angular_z),
            Command::SetBodyOffset {
                position_z,
                orientation,
            } => self.set_body_offset(position_z, orientation),
            Command::Velocity {
                linear_x,
                linear_y,
                angular_z,
            } => self.velocity(linear_x, linear_y, angular_z),
            Command::ListGraph(path) => self.list_graph(&path),
        }
    }

    // ── Internal helpers ────────────────────────────────────────────────────

    fn discrete(&self, command: RobotCommand) -> CommandResult {
        self.run(command.name(), || self.transport.issue(&command))
    }

    fn apply_deadzone(&self, v: f64) -> f64 {
        if v.abs() < self.deadzone { 0.0 } else { v }
    }

    fn run<F>(&self, operation: &str, f: F) -> CommandResult
    where
        F: FnOnce() -> Result<String, BridgeError>,
    {
        match guarded(operation, f) {
            Ok(message) => {
                debug!(operation, "command succeeded");
                CommandResult::ok(message)
            }
            Err(e) => {
                warn!(operation, error = %e, "command failed");
                CommandResult::failed(e.to_string())
            }
        }
    }
}

/// Run `f`, turning a panic into a transport error.
fn guarded<T, F>(operation: &str, f: F) -> Result<T, BridgeError>
where
    F: FnOnce() -> Result<T, BridgeError>,
{
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(BridgeError::transport(
            operation,
            format!("panicked: {}", panic_message(payload.as_ref())),
        ))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legbridge_hal::SimRobot;
    use legbridge_types::{MobilityConfig, Vec3};

    fn executor(robot: SimRobot) -> (Arc<SimRobot>, CommandExecutor) {
        let robot = Arc::new(robot.connected());
        let exec = CommandExecutor::new(robot.clone(), Arc::new(MobilityStore::default()), 0.05);
        (robot, exec)
    }

    #[test]
    fn discrete_commands_reach_the_robot() {
        let (robot, exec) = executor(SimRobot::new());
        assert!(exec.claim().success);
        assert!(exec.power_on().success);
        assert!(exec.stand().success);
        assert!(exec.sit().success);
        assert!(exec.clear_behavior_fault(7).success);
        assert_eq!(
            robot.issued(),
            vec![
                RobotCommand::Claim,
                RobotCommand::PowerOn,
                RobotCommand::Stand,
                RobotCommand::Sit,
                RobotCommand::ClearBehaviorFault(7),
            ]
        );
    }

    #[test]
    fn every_failure_has_a_message() {
        let (_, exec) = executor(SimRobot::new().rejecting("release"));
        let results = [
            exec.release(),
            exec.stand(),
            exec.set_locomotion_mode(99),
            exec.set_velocity_limit(f64::NAN, 0.0, 0.0),
            exec.set_body_offset(0.0, Quaternion::new(0.0, 0.0, 0.0, 0.0)),
            exec.list_graph(""),
        ];
        for r in results {
            assert!(!r.success);
            assert!(!r.message.trim().is_empty());
        }
    }

    #[test]
    fn transport_panic_becomes_failed_result() {
        let (_, exec) = executor(SimRobot::new().panicking_on("self_right"));
        let r = exec.self_right();
        assert!(!r.success);
        assert!(r.message.contains("panicked"), "{}", r.message);
    }

    #[test]
    fn set_velocity_limit_leaves_other_fields_unchanged() {
        let (robot, exec) = executor(SimRobot::new());
        assert!(exec.set_stair_hint(true).success);
        assert!(exec.set_locomotion_mode(LocomotionHint::Crawl as u32).success);

        assert!(exec.set_velocity_limit(0.5, 0.3, 1.0).success);
        let cfg = exec.mobility().snapshot();
        assert_eq!(
            cfg.velocity_limit,
            Some(VelocityLimit {
                linear_x: 0.5,
                linear_y: 0.3,
                angular_z: 1.0
            })
        );
        assert!(cfg.stair_hint);
        assert_eq!(cfg.locomotion_hint, LocomotionHint::Crawl);
        assert_eq!(robot.mobility_pushes().last().copied(), Some(cfg));
    }

    #[test]
    fn unknown_locomotion_mode_does_not_touch_robot() {
        let (robot, exec) = executor(SimRobot::new());
        let r = exec.set_locomotion_mode(42);
        assert!(!r.success);
        assert!(r.message.contains("42"));
        assert!(robot.mobility_pushes().is_empty());
        assert_eq!(exec.mobility().snapshot(), MobilityConfig::default());
    }

    #[test]
    fn body_offset_is_normalised() {
        let (_, exec) = executor(SimRobot::new());
        assert!(exec.set_body_offset(-0.1, Quaternion::new(2.0, 0.0, 0.0, 0.0)).success);
        let offset = exec.mobility().snapshot().body_offset;
        assert_eq!(offset.orientation, Quaternion::identity());
        assert!((offset.position.z + 0.1).abs() < 1e-12);
    }

    #[test]
    fn body_offset_merges_into_existing_offset() {
        let robot = Arc::new(SimRobot::new().connected());
        let mut initial = MobilityConfig {
            stair_hint: true,
            ..MobilityConfig::default()
        };
        initial.body_offset.position = Vec3::new(0.2, -0.1, 0.0);
        let exec = CommandExecutor::new(robot, Arc::new(MobilityStore::new(initial)), 0.05);

        assert!(exec.set_body_offset(0.15, Quaternion::identity()).success);
        let config = exec.mobility().snapshot();
        assert_eq!(config.body_offset.position, Vec3::new(0.2, -0.1, 0.15));
        assert!(config.stair_hint);
    }

    #[test]
    fn velocity_applies_deadzone() {
        let (robot, exec) = executor(SimRobot::new());
        assert!(exec.velocity(0.01, 0.4, -0.02).success);
        assert_eq!(robot.velocities(), vec![Twist::planar(0.0, 0.4, 0.0)]);
    }

    #[test]
    fn execute_dispatches_typed_commands() {
        let (robot, exec) = executor(SimRobot::new().with_graph(&["a", "b"]));
        assert!(exec.execute(Command::Robot(RobotCommand::Claim)).success);
        assert!(exec.execute(Command::SetStairHint(true)).success);
        let graph = exec.execute(Command::ListGraph("/maps/lab".into()));
        assert_eq!(graph.message, "a, b");
        assert_eq!(robot.count_issued(&RobotCommand::Claim), 1);
        assert!(exec.mobility().snapshot().stair_hint);
    }
}

//! `RobotTransport` – the synchronous interface to the robot.
//!
//! Every call may block on network I/O and may fail.  Callers on an async
//! runtime are expected to move calls onto the blocking pool; the trait
//! itself is deliberately synchronous so implementations can wrap a
//! blocking vendor client directly.

use std::fmt;
use std::time::Duration;

use legbridge_types::robot::{
    CameraGroup, ImageCapture, LeaseSample, RobotIdentity, RobotMetrics, RobotState,
    TrajectoryProgress,
};
use legbridge_types::{
    BridgeError, MobilityConfig, NavigateGoal, RobotCommand, TrajectoryGoal, Twist,
};
use zeroize::Zeroizing;

/// Credentials and session parameters for connecting to a robot.
#[derive(Clone)]
pub struct ConnectionSettings {
    pub hostname: String,
    pub username: String,
    pub password: Zeroizing<String>,
    /// How long the robot keeps running without an e-stop check-in.
    pub estop_timeout: Duration,
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("estop_timeout", &self.estop_timeout)
            .finish()
    }
}

/// Native command and telemetry interface of a legged robot.
///
/// Implementations must be shareable across threads: feeds, command handlers
/// and goals all hold the same `Arc<dyn RobotTransport>`.
pub trait RobotTransport: Send + Sync {
    /// Open an authenticated session.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] when the robot is unreachable or
    /// rejects the credentials.
    fn connect(&self, settings: &ConnectionSettings) -> Result<(), BridgeError>;

    fn disconnect(&self) -> Result<(), BridgeError>;

    fn fetch_robot_state(&self) -> Result<RobotState, BridgeError>;

    fn fetch_metrics(&self) -> Result<RobotMetrics, BridgeError>;

    fn fetch_leases(&self) -> Result<Vec<LeaseSample>, BridgeError>;

    /// Capture every source of `group`, in [`CameraGroup::sources`] order.
    fn fetch_images(&self, group: CameraGroup) -> Result<Vec<ImageCapture>, BridgeError>;

    /// Identity fields the robot was able to report.  Missing fields are
    /// `None`; an `Err` means nothing could be read at all.
    fn fetch_identity(&self) -> Result<RobotIdentity, BridgeError>;

    /// Issue a discrete command and return the robot's acknowledgement text.
    fn issue(&self, command: &RobotCommand) -> Result<String, BridgeError>;

    /// Push the complete mobility configuration to the robot.
    fn apply_mobility(&self, config: &MobilityConfig) -> Result<(), BridgeError>;

    /// Short-lived body velocity command.
    fn velocity(&self, twist: Twist, config: &MobilityConfig) -> Result<String, BridgeError>;

    /// Start a non-blocking move to a pose relative to the body.
    fn trajectory(
        &self,
        goal: &TrajectoryGoal,
        config: &MobilityConfig,
    ) -> Result<String, BridgeError>;

    /// Progress of the most recently issued trajectory.
    fn trajectory_progress(&self) -> Result<TrajectoryProgress, BridgeError>;

    /// Upload a recorded graph and walk it to the destination.  Blocks until
    /// the robot arrives, fails, or the motion is stopped.
    fn navigate_to(&self, goal: &NavigateGoal) -> Result<String, BridgeError>;

    /// Waypoint the robot is currently localized at, if any.
    fn localization_waypoint(&self) -> Result<Option<String>, BridgeError>;

    /// Waypoint ids of the graph stored at `upload_path`.
    fn list_graph(&self, upload_path: &str) -> Result<Vec<String>, BridgeError>;
}

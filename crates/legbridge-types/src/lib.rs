//! `legbridge-types` – shared vocabulary of the bridge.
//!
//! Every other crate speaks in these types: the error enum, command results,
//! the typed command set, mobility configuration, geometry, raw robot data,
//! outbound messages and goal lifecycle.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod geometry;
pub mod goal;
pub mod messages;
pub mod mobility;
pub mod robot;

pub use geometry::{Quaternion, Transform3D, Twist, Vec3};
pub use goal::{
    GoalFeedback, GoalKind, GoalOutcome, GoalRequest, GoalState, NavigateGoal, TrajectoryGoal,
};
pub use messages::TransformRecord;
pub use mobility::{BodyOffset, LocomotionHint, MobilityConfig, OdomFrameMode, VelocityLimit};

/// Discrete robot commands understood by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "snake_case")]
pub enum RobotCommand {
    Claim,
    Release,
    Stop,
    SelfRight,
    Sit,
    Stand,
    PowerOn,
    SafePowerOff,
    /// Cut motor power immediately.
    EstopHard,
    /// Settle on the ground, then cut motor power.
    EstopSoft,
    EstopRelease,
    ClearBehaviorFault(u32),
}

impl RobotCommand {
    pub fn name(&self) -> &'static str {
        match self {
            RobotCommand::Claim => "claim",
            RobotCommand::Release => "release",
            RobotCommand::Stop => "stop",
            RobotCommand::SelfRight => "self_right",
            RobotCommand::Sit => "sit",
            RobotCommand::Stand => "stand",
            RobotCommand::PowerOn => "power_on",
            RobotCommand::SafePowerOff => "power_off",
            RobotCommand::EstopHard => "estop_hard",
            RobotCommand::EstopSoft => "estop_soft",
            RobotCommand::EstopRelease => "estop_release",
            RobotCommand::ClearBehaviorFault(_) => "clear_behavior_fault",
        }
    }
}

/// Every synchronous request the bridge accepts from the middleware.
///
/// Dispatch is a `match` over this enum, so an unhandled command is a compile
/// error rather than a missing dictionary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "snake_case")]
pub enum Command {
    Robot(RobotCommand),
    SetStairHint(bool),
    /// Raw numeric locomotion mode, validated on execution.
    SetLocomotionMode(u32),
    SetVelocityLimit {
        linear_x: f64,
        linear_y: f64,
        angular_z: f64,
    },
    SetBodyOffset {
        position_z: f64,
        orientation: Quaternion,
    },
    Velocity {
        linear_x: f64,
        linear_y: f64,
        angular_z: f64,
    },
    ListGraph(String),
}

/// Outcome of a single command invocation.
///
/// `message` is never empty when `success` is `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
}

impl CommandResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            message: if message.trim().is_empty() {
                "command failed without a description".to_string()
            } else {
                message
            },
        }
    }
}

impl From<Result<String, BridgeError>> for CommandResult {
    fn from(result: Result<String, BridgeError>) -> Self {
        match result {
            Ok(message) => CommandResult::ok(message),
            Err(e) => CommandResult::failed(e.to_string()),
        }
    }
}

/// Global error type spanning transport failures, robot rejections,
/// validation and configuration problems.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BridgeError {
    #[error("Transport error during {operation}: {details}")]
    Transport { operation: String, details: String },

    #[error("Robot rejected {operation}: {reason}")]
    Rejected { operation: String, reason: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl BridgeError {
    pub fn transport(operation: impl Into<String>, details: impl Into<String>) -> Self {
        BridgeError::Transport {
            operation: operation.into(),
            details: details.into(),
        }
    }

    pub fn rejected(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::Rejected {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_result_never_has_empty_message() {
        let r = CommandResult::failed("");
        assert!(!r.success);
        assert!(!r.message.is_empty());

        let r = CommandResult::failed("   ");
        assert!(!r.message.trim().is_empty());
    }

    #[test]
    fn result_conversion_keeps_error_text() {
        let r: CommandResult = Err(BridgeError::rejected("stand", "motors off")).into();
        assert!(!r.success);
        assert!(r.message.contains("motors off"));

        let r: CommandResult = Ok("Success".to_string()).into();
        assert!(r.success);
        assert_eq!(r.message, "Success");
    }

    #[test]
    fn command_roundtrip() {
        let cmd = Command::SetVelocityLimit {
            linear_x: 0.5,
            linear_y: 0.3,
            angular_z: 1.0,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        let back: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(cmd, back);

        let json = serde_json::to_string(&Command::Robot(RobotCommand::ClearBehaviorFault(3))).unwrap();
        assert!(json.contains("clear_behavior_fault"));
    }

    #[test]
    fn bridge_error_display() {
        let err = BridgeError::transport("fetch_state", "connection reset");
        assert!(err.to_string().contains("fetch_state"));
        assert!(err.to_string().contains("connection reset"));
        assert!(BridgeError::Validation("bad".into()).to_string().contains("Validation"));
    }
}

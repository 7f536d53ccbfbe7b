//! Long-running motion goals: requests, lifecycle states and outcomes.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CommandResult;

/// Lifecycle state of a goal.
///
/// Transitions are monotonic: `Validating → Monitoring → <terminal>` or
/// `Validating → Aborted`.  Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalState {
    Validating,
    Monitoring,
    Succeeded,
    Aborted,
    TimedOut,
    Preempted,
}

impl fmt::Display for GoalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalState::Validating => write!(f, "validating"),
            GoalState::Monitoring => write!(f, "monitoring"),
            GoalState::Succeeded => write!(f, "succeeded"),
            GoalState::Aborted => write!(f, "aborted"),
            GoalState::TimedOut => write!(f, "timed_out"),
            GoalState::Preempted => write!(f, "preempted"),
        }
    }
}

impl GoalState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GoalState::Succeeded | GoalState::Aborted | GoalState::TimedOut | GoalState::Preempted
        )
    }

    /// Check whether moving from this state to `next` is a legal transition.
    pub fn can_transition_to(self, next: GoalState) -> bool {
        matches!(
            (self, next),
            (GoalState::Validating, GoalState::Monitoring)
                | (GoalState::Validating, GoalState::Aborted)
                | (GoalState::Monitoring, GoalState::Succeeded)
                | (GoalState::Monitoring, GoalState::Aborted)
                | (GoalState::Monitoring, GoalState::TimedOut)
                | (GoalState::Monitoring, GoalState::Preempted)
        )
    }
}

/// Move to a pose relative to the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryGoal {
    pub target_x: f64,
    pub target_y: f64,
    /// Heading in radians.
    pub target_heading: f64,
    /// Reference frame of the target; must be the body frame.
    pub frame: String,
    /// Time budget in seconds.  Must be positive.
    pub duration_secs: f64,
    /// Request final position adjustments near the goal.
    pub precise: bool,
}

/// Replay a recorded waypoint graph to a destination waypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigateGoal {
    pub upload_path: String,
    pub destination: String,
    pub initial_fiducial: bool,
    pub initial_waypoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GoalRequest {
    Trajectory(TrajectoryGoal),
    Navigate(NavigateGoal),
}

impl GoalRequest {
    pub fn kind(&self) -> GoalKind {
        match self {
            GoalRequest::Trajectory(_) => GoalKind::Trajectory,
            GoalRequest::Navigate(_) => GoalKind::Navigate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalKind {
    Trajectory,
    Navigate,
}

impl fmt::Display for GoalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalKind::Trajectory => write!(f, "trajectory"),
            GoalKind::Navigate => write!(f, "navigate"),
        }
    }
}

/// One advisory progress message for a running goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalFeedback {
    pub goal_id: Uuid,
    pub message: String,
}

/// Terminal result of a goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalOutcome {
    pub goal_id: Uuid,
    pub kind: GoalKind,
    pub state: GoalState,
    pub result: CommandResult,
    pub issued_at: DateTime<Utc>,
    pub elapsed: Duration,
}

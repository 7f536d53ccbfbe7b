//! Raw data as returned by the robot transport, before translation into
//! outbound messages.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::{Transform3D, Twist, Vec3};

// ────────────────────────────────────────────────────────────────────────────
// Frames
// ────────────────────────────────────────────────────────────────────────────

/// One edge of a kinematic frame tree: the pose of `child` in `parent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameEdge {
    pub child: String,
    /// Empty for the root of the tree.
    pub parent: String,
    pub parent_tform_child: Transform3D,
}

/// Frame tree captured together with a state sample or an image.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameSnapshot {
    pub edges: Vec<FrameEdge>,
}

impl FrameSnapshot {
    /// Look up the edge whose child is `child`.
    pub fn edge(&self, child: &str) -> Option<&FrameEdge> {
        self.edges.iter().find(|e| e.child == child)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Robot state
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointSample {
    pub name: String,
    pub position: f64,
    pub velocity: f64,
    pub load: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactState {
    Unknown,
    Made,
    Lost,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootSample {
    pub position_rt_body: Vec3,
    pub contact: ContactState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstopKind {
    Hardware,
    Software,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstopSample {
    pub name: String,
    pub kind: EstopKind,
    pub engaged: bool,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WifiSample {
    pub mode: String,
    pub essid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatterySample {
    pub identifier: String,
    pub charge_percentage: f64,
    pub estimated_runtime: Duration,
    pub current: f64,
    pub voltage: f64,
    pub temperatures: Vec<f64>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PowerSample {
    pub motor_power_on: bool,
    pub shore_power_on: bool,
    pub locomotion_charge_percentage: f64,
    pub locomotion_estimated_runtime: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemFaultSample {
    pub name: String,
    pub code: i32,
    pub uid: u64,
    pub error_message: String,
    pub severity: String,
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorFaultSample {
    pub id: u32,
    pub cause: String,
    pub clearable: bool,
}

/// Standing / sitting / moving flags derived from the latest state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PostureFlags {
    pub standing: bool,
    pub sitting: bool,
    pub moving: bool,
}

/// One complete robot-state sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotState {
    pub acquired_at: DateTime<Utc>,
    pub joints: Vec<JointSample>,
    pub kinematic: FrameSnapshot,
    /// Body velocity expressed in the kinematic odometry frame.
    pub velocity_odom: Twist,
    /// Body velocity expressed in the vision odometry frame.
    pub velocity_vision: Twist,
    pub feet: Vec<FootSample>,
    pub estops: Vec<EstopSample>,
    pub wifi: WifiSample,
    pub batteries: Vec<BatterySample>,
    pub power: PowerSample,
    pub system_faults: Vec<SystemFaultSample>,
    pub behavior_faults: Vec<BehaviorFaultSample>,
    pub posture: PostureFlags,
}

// ────────────────────────────────────────────────────────────────────────────
// Metrics, leases, identity
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetricValue {
    Float(f64),
    Int(i64),
    Duration(Duration),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    pub label: String,
    pub value: MetricValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotMetrics {
    pub acquired_at: DateTime<Utc>,
    pub entries: Vec<MetricEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseSample {
    pub resource: String,
    pub epoch: String,
    pub sequence: Vec<u32>,
    pub client_name: String,
    pub user_name: String,
}

/// Robot identity.  Every field is independently optional.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RobotIdentity {
    pub serial_number: Option<String>,
    pub species: Option<String>,
    pub version: Option<String>,
    pub nickname: Option<String>,
    pub computer_serial_number: Option<String>,
}

impl RobotIdentity {
    /// `true` once every field has been resolved.
    pub fn is_complete(&self) -> bool {
        self.serial_number.is_some()
            && self.species.is_some()
            && self.version.is_some()
            && self.nickname.is_some()
            && self.computer_serial_number.is_some()
    }

    /// Fill fields missing in `self` from `other`.
    pub fn merge(&mut self, other: RobotIdentity) {
        fn fill(slot: &mut Option<String>, value: Option<String>) {
            if slot.is_none() {
                *slot = value;
            }
        }
        fill(&mut self.serial_number, other.serial_number);
        fill(&mut self.species, other.species);
        fill(&mut self.version, other.version);
        fill(&mut self.nickname, other.nickname);
        fill(&mut self.computer_serial_number, other.computer_serial_number);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Cameras
// ────────────────────────────────────────────────────────────────────────────

/// Physical camera positions on the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Camera {
    FrontLeft,
    FrontRight,
    Left,
    Right,
    Back,
}

impl Camera {
    pub fn name(self) -> &'static str {
        match self {
            Camera::FrontLeft => "frontleft",
            Camera::FrontRight => "frontright",
            Camera::Left => "left",
            Camera::Right => "right",
            Camera::Back => "back",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Visual,
    Depth,
}

/// Cameras fetched together in one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraGroup {
    Front,
    Side,
    Rear,
}

impl CameraGroup {
    /// Sources requested for this group, in publication order.
    pub fn sources(self) -> &'static [(Camera, ImageKind)] {
        match self {
            CameraGroup::Front => &[
                (Camera::FrontLeft, ImageKind::Visual),
                (Camera::FrontRight, ImageKind::Visual),
                (Camera::FrontLeft, ImageKind::Depth),
                (Camera::FrontRight, ImageKind::Depth),
            ],
            CameraGroup::Side => &[
                (Camera::Left, ImageKind::Visual),
                (Camera::Right, ImageKind::Visual),
                (Camera::Left, ImageKind::Depth),
                (Camera::Right, ImageKind::Depth),
            ],
            CameraGroup::Rear => &[
                (Camera::Back, ImageKind::Visual),
                (Camera::Back, ImageKind::Depth),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Intrinsics {
    pub focal_x: f64,
    pub focal_y: f64,
    pub principal_x: f64,
    pub principal_y: f64,
}

/// One captured image plus the frame tree valid at acquisition time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCapture {
    pub camera: Camera,
    pub kind: ImageKind,
    pub acquired_at: DateTime<Utc>,
    /// Sensor frame name, e.g. `frontleft_fisheye`.
    pub frame_id: String,
    pub width: u32,
    pub height: u32,
    pub encoding: String,
    pub data: Vec<u8>,
    pub intrinsics: Intrinsics,
    pub transforms: FrameSnapshot,
}

// ────────────────────────────────────────────────────────────────────────────
// Motion progress
// ────────────────────────────────────────────────────────────────────────────

/// Progress of the most recent trajectory command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrajectoryProgress {
    pub at_goal: bool,
    pub near_goal: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_merge_fills_only_missing_fields() {
        let mut id = RobotIdentity {
            serial_number: Some("sn-1".into()),
            ..Default::default()
        };
        id.merge(RobotIdentity {
            serial_number: Some("other".into()),
            nickname: Some("rex".into()),
            ..Default::default()
        });
        assert_eq!(id.serial_number.as_deref(), Some("sn-1"));
        assert_eq!(id.nickname.as_deref(), Some("rex"));
        assert!(!id.is_complete());
    }

    #[test]
    fn camera_groups_cover_ten_sources() {
        let total: usize = [CameraGroup::Front, CameraGroup::Side, CameraGroup::Rear]
            .iter()
            .map(|g| g.sources().len())
            .sum();
        assert_eq!(total, 10);
    }
}

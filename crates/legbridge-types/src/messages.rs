//! Typed outbound (and inbound) middleware messages.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::{Quaternion, Transform3D, Twist};
use crate::robot::{
    BatterySample, BehaviorFaultSample, EstopSample, FootSample, LeaseSample, PowerSample,
    RobotIdentity, SystemFaultSample, WifiSample,
};

/// Stamp and reference frame carried by most messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub stamp: DateTime<Utc>,
    pub frame_id: String,
}

impl Header {
    pub fn new(stamp: DateTime<Utc>, frame_id: impl Into<String>) -> Self {
        Self {
            stamp,
            frame_id: frame_id.into(),
        }
    }
}

/// A single parent→child transform, stamped with when it was observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformRecord {
    pub parent_frame: String,
    pub child_frame: String,
    pub transform: Transform3D,
    pub observed_at: DateTime<Utc>,
}

impl TransformRecord {
    /// Dedup key of a static transform.
    pub fn key(&self) -> (&str, &str) {
        (&self.parent_frame, &self.child_frame)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TfMessage {
    pub transforms: Vec<TransformRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointStateMsg {
    pub header: Header,
    pub names: Vec<String>,
    pub positions: Vec<f64>,
    pub velocities: Vec<f64>,
    pub efforts: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdometryMsg {
    /// `frame_id` is the selected odometry parent frame.
    pub header: Header,
    pub child_frame_id: String,
    pub pose: Transform3D,
    pub twist: Twist,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwistStampedMsg {
    pub header: Header,
    pub twist: Twist,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootStateArray {
    pub feet: Vec<FootSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstopStateArray {
    pub header: Header,
    pub estops: Vec<EstopSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WifiStateMsg {
    pub wifi: WifiSample,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryStateArray {
    pub header: Header,
    pub batteries: Vec<BatterySample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerStateMsg {
    pub header: Header,
    pub power: PowerSample,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemFaultState {
    pub header: Header,
    pub faults: Vec<SystemFaultSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorFaultState {
    pub header: Header,
    pub faults: Vec<BehaviorFaultSample>,
}

/// Aggregate robot usage counters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsMsg {
    pub stamp: Option<DateTime<Utc>>,
    pub distance: f64,
    pub gait_cycles: i64,
    pub time_moving: Duration,
    pub electric_power: Duration,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LeaseArray {
    pub resources: Vec<LeaseSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMsg {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub encoding: String,
    /// Row length in bytes.
    pub step: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraInfoMsg {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub distortion_model: String,
    /// Row-major 3x3 intrinsic matrix.
    pub k: [f64; 9],
    /// Row-major 3x4 projection matrix.
    pub p: [f64; 12],
}

/// Periodic status: posture flags plus best-effort identity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusFeedback {
    pub standing: bool,
    pub sitting: bool,
    pub moving: bool,
    pub identity: RobotIdentity,
}

/// Inbound body-pose offset request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyPoseInput {
    pub position_z: f64,
    pub orientation: Quaternion,
}

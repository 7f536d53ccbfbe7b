//! Pure translation from raw robot data to outbound bus messages.
//!
//! Nothing here performs I/O; each function maps one raw sample to the
//! message(s) published for it.

use legbridge_perception::frame_tree::{self, BODY_FRAME, OdomFrames};
use legbridge_types::messages::{
    BatteryStateArray, BehaviorFaultState, CameraInfoMsg, EstopStateArray, FootStateArray, Header,
    ImageMsg, JointStateMsg, LeaseArray, MetricsMsg, OdometryMsg, PowerStateMsg, StatusFeedback,
    SystemFaultState, TfMessage, TwistStampedMsg, WifiStateMsg,
};
use legbridge_types::robot::{
    ImageCapture, LeaseSample, MetricValue, PostureFlags, RobotIdentity, RobotMetrics, RobotState,
};
use legbridge_types::OdomFrameMode;

use crate::bus::{Message, Topic};

// ────────────────────────────────────────────────────────────────────────────
// Robot state
// ────────────────────────────────────────────────────────────────────────────

pub fn joint_states(state: &RobotState) -> JointStateMsg {
    JointStateMsg {
        header: Header::new(state.acquired_at, ""),
        names: state.joints.iter().map(|j| j.name.clone()).collect(),
        positions: state.joints.iter().map(|j| j.position).collect(),
        velocities: state.joints.iter().map(|j| j.velocity).collect(),
        efforts: state.joints.iter().map(|j| j.load).collect(),
    }
}

/// Dynamic frame tree with the body re-parented under the selected odometry
/// frame.
pub fn dynamic_tf(state: &RobotState, frames: &OdomFrames) -> TfMessage {
    TfMessage {
        transforms: frame_tree::dynamic_transforms(&state.kinematic, state.acquired_at, frames),
    }
}

/// Odometry in the selected parent frame.  `None` when the snapshot does not
/// link that frame to the body.
pub fn odometry(state: &RobotState, frames: &OdomFrames) -> Option<OdometryMsg> {
    let pose = frame_tree::odometry_pose(&state.kinematic, frames)?;
    let twist = match frames.mode {
        OdomFrameMode::Odom => state.velocity_odom,
        OdomFrameMode::Vision => state.velocity_vision,
    };
    Some(OdometryMsg {
        header: Header::new(state.acquired_at, frames.parent()),
        child_frame_id: BODY_FRAME.to_string(),
        pose,
        twist,
    })
}

/// Body velocity in the kinematic odometry frame.
pub fn odometry_twist(state: &RobotState, frames: &OdomFrames) -> TwistStampedMsg {
    TwistStampedMsg {
        header: Header::new(state.acquired_at, frames.kinematic.as_str()),
        twist: state.velocity_odom,
    }
}

pub fn feet(state: &RobotState) -> FootStateArray {
    FootStateArray {
        feet: state.feet.clone(),
    }
}

pub fn estops(state: &RobotState) -> EstopStateArray {
    EstopStateArray {
        header: Header::new(state.acquired_at, ""),
        estops: state.estops.clone(),
    }
}

pub fn wifi(state: &RobotState) -> WifiStateMsg {
    WifiStateMsg {
        wifi: state.wifi.clone(),
    }
}

pub fn batteries(state: &RobotState) -> BatteryStateArray {
    BatteryStateArray {
        header: Header::new(state.acquired_at, ""),
        batteries: state.batteries.clone(),
    }
}

pub fn power(state: &RobotState) -> PowerStateMsg {
    PowerStateMsg {
        header: Header::new(state.acquired_at, ""),
        power: state.power.clone(),
    }
}

pub fn system_faults(state: &RobotState) -> SystemFaultState {
    SystemFaultState {
        header: Header::new(state.acquired_at, ""),
        faults: state.system_faults.clone(),
    }
}

pub fn behavior_faults(state: &RobotState) -> BehaviorFaultState {
    BehaviorFaultState {
        header: Header::new(state.acquired_at, ""),
        faults: state.behavior_faults.clone(),
    }
}

/// Every message published for one robot-state sample, in publication
/// order.  An empty dynamic tree is not published.
pub fn robot_state_messages(state: &RobotState, frames: &OdomFrames) -> Vec<(Topic, Message)> {
    let mut out = Vec::with_capacity(12);
    out.push((Topic::JointStates, Message::JointState(joint_states(state))));

    let tf = dynamic_tf(state, frames);
    if !tf.transforms.is_empty() {
        out.push((Topic::Tf, Message::Tf(tf)));
    }
    out.push((
        Topic::OdometryTwist,
        Message::TwistStamped(odometry_twist(state, frames)),
    ));
    if let Some(odom) = odometry(state, frames) {
        out.push((Topic::Odometry, Message::Odometry(odom)));
    }
    out.push((Topic::Feet, Message::Feet(feet(state))));
    out.push((Topic::Estop, Message::Estop(estops(state))));
    out.push((Topic::Wifi, Message::Wifi(wifi(state))));
    out.push((Topic::Battery, Message::Battery(batteries(state))));
    out.push((Topic::Power, Message::Power(power(state))));
    out.push((Topic::SystemFaults, Message::SystemFaults(system_faults(state))));
    out.push((
        Topic::BehaviorFaults,
        Message::BehaviorFaults(behavior_faults(state)),
    ));
    out
}

// ────────────────────────────────────────────────────────────────────────────
// Metrics and leases
// ────────────────────────────────────────────────────────────────────────────

/// Map labelled metric entries onto the fixed metrics message.  Unknown
/// labels and entries whose value type does not match are ignored.
pub fn metrics(raw: &RobotMetrics) -> MetricsMsg {
    let mut msg = MetricsMsg {
        stamp: Some(raw.acquired_at),
        ..MetricsMsg::default()
    };
    for entry in &raw.entries {
        match (entry.label.as_str(), &entry.value) {
            ("distance", MetricValue::Float(v)) => msg.distance = *v,
            ("gait cycles", MetricValue::Int(v)) => msg.gait_cycles = *v,
            ("time moving", MetricValue::Duration(d)) => msg.time_moving = *d,
            ("electric power", MetricValue::Duration(d)) => msg.electric_power = *d,
            _ => {}
        }
    }
    msg
}

pub fn leases(raw: &[LeaseSample]) -> LeaseArray {
    LeaseArray {
        resources: raw.to_vec(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Images
// ────────────────────────────────────────────────────────────────────────────

/// Image plus matching camera info for one capture.
pub fn image(capture: &ImageCapture) -> (ImageMsg, CameraInfoMsg) {
    let header = Header::new(capture.acquired_at, capture.frame_id.as_str());
    let step = if capture.height == 0 {
        0
    } else {
        (capture.data.len() / capture.height as usize) as u32
    };
    let i = capture.intrinsics;
    let info = CameraInfoMsg {
        header: header.clone(),
        height: capture.height,
        width: capture.width,
        distortion_model: "plumb_bob".to_string(),
        k: [
            i.focal_x, 0.0, i.principal_x, //
            0.0, i.focal_y, i.principal_y, //
            0.0, 0.0, 1.0,
        ],
        p: [
            i.focal_x, 0.0, i.principal_x, 0.0, //
            0.0, i.focal_y, i.principal_y, 0.0, //
            0.0, 0.0, 1.0, 0.0,
        ],
    };
    let image = ImageMsg {
        header,
        height: capture.height,
        width: capture.width,
        encoding: capture.encoding.clone(),
        step,
        data: capture.data.clone(),
    };
    (image, info)
}

/// Image and camera-info messages for a whole batch, routed per camera.
pub fn image_messages(captures: &[ImageCapture]) -> Vec<(Topic, Message)> {
    let mut out = Vec::with_capacity(captures.len() * 2);
    for capture in captures {
        let (img, info) = image(capture);
        let (camera, kind) = (capture.camera, capture.kind);
        out.push((Topic::Image { camera, kind }, Message::Image(img)));
        out.push((Topic::CameraInfo { camera, kind }, Message::CameraInfo(info)));
    }
    out
}

// ────────────────────────────────────────────────────────────────────────────
// Status
// ────────────────────────────────────────────────────────────────────────────

pub fn status(posture: PostureFlags, identity: &RobotIdentity) -> StatusFeedback {
    StatusFeedback {
        standing: posture.standing,
        sitting: posture.sitting,
        moving: posture.moving,
        identity: identity.clone(),
    }
}

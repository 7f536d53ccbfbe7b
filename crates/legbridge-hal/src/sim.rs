//! In-process simulated robot for tests and hardware-free runs.
//!
//! [`SimRobot`] implements [`RobotTransport`] entirely in memory.  It records
//! every command it receives so tests can assert on them, and its timing and
//! failure behaviour is scripted through the `with_*` builder methods.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use legbridge_hal::sim::SimRobot;
//! use legbridge_hal::RobotTransport;
//! use legbridge_types::RobotCommand;
//!
//! let robot = SimRobot::new()
//!     .with_arrival(Duration::from_millis(50), Some(Duration::from_millis(100)))
//!     .connected();
//!
//! robot.issue(&RobotCommand::Claim).expect("sim claim must succeed");
//! assert_eq!(robot.count_issued(&RobotCommand::Claim), 1);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use legbridge_types::robot::{
    BatterySample, Camera, CameraGroup, ContactState, EstopKind, EstopSample, FootSample,
    FrameEdge, FrameSnapshot, ImageCapture, ImageKind, Intrinsics, JointSample, LeaseSample,
    MetricEntry, MetricValue, PostureFlags, PowerSample, RobotIdentity, RobotMetrics, RobotState,
    TrajectoryProgress, WifiSample,
};
use legbridge_types::{
    BridgeError, MobilityConfig, NavigateGoal, Quaternion, RobotCommand, Transform3D,
    TrajectoryGoal, Twist, Vec3,
};
use tracing::debug;

use crate::transport::{ConnectionSettings, RobotTransport};

const JOINT_NAMES: [&str; 12] = [
    "fl.hx", "fl.hy", "fl.kn", "fr.hx", "fr.hy", "fr.kn", "hl.hx", "hl.hy", "hl.kn", "hr.hx",
    "hr.hy", "hr.kn",
];

const IMAGE_WIDTH: u32 = 8;
const IMAGE_HEIGHT: u32 = 6;

// ────────────────────────────────────────────────────────────────────────────
// Fetch probes
// ────────────────────────────────────────────────────────────────────────────

/// Telemetry sources of the simulated robot, used to inspect fetch activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    RobotState,
    Metrics,
    Leases,
    Images,
}

impl FetchKind {
    fn index(self) -> usize {
        match self {
            FetchKind::RobotState => 0,
            FetchKind::Metrics => 1,
            FetchKind::Leases => 2,
            FetchKind::Images => 3,
        }
    }
}

#[derive(Default)]
struct FetchProbe {
    started: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FetchProbe {
    fn enter(&self) -> ProbeGuard<'_> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        ProbeGuard(self)
    }
}

struct ProbeGuard<'a>(&'a FetchProbe);

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Script and mutable state
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct SimScript {
    near_after: Option<Duration>,
    arrive_after: Option<Duration>,
    fetch_delay: Duration,
    navigate_duration: Duration,
    waypoints: Vec<String>,
    graph: Vec<String>,
    identity: RobotIdentity,
    unreachable: bool,
    rejected: HashSet<String>,
    panicking: HashSet<String>,
    delays: HashMap<String, Duration>,
    navigate_ignores_stop: bool,
}

impl Default for SimScript {
    fn default() -> Self {
        Self {
            near_after: Some(Duration::from_secs(1)),
            arrive_after: Some(Duration::from_secs(2)),
            fetch_delay: Duration::ZERO,
            navigate_duration: Duration::from_secs(3),
            waypoints: vec!["wp-start".into(), "wp-mid".into(), "wp-end".into()],
            graph: vec!["wp-start".into(), "wp-mid".into(), "wp-end".into()],
            identity: RobotIdentity {
                serial_number: Some("sim-0001".into()),
                species: Some("quadruped".into()),
                version: Some("4.0.0".into()),
                nickname: Some("sim".into()),
                computer_serial_number: Some("sim-cpu-0001".into()),
            },
            unreachable: false,
            rejected: HashSet::new(),
            panicking: HashSet::new(),
            delays: HashMap::new(),
            navigate_ignores_stop: false,
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    connected: bool,
    username: String,
    motor_power: bool,
    posture: PostureFlags,
    issued: Vec<RobotCommand>,
    mobility_pushes: Vec<MobilityConfig>,
    velocities: Vec<Twist>,
    trajectories: Vec<TrajectoryGoal>,
    trajectory_started: Option<Instant>,
    navigate_started: Option<Instant>,
    stops: usize,
    lease_sequence: u32,
}

// ────────────────────────────────────────────────────────────────────────────
// SimRobot
// ────────────────────────────────────────────────────────────────────────────

/// A simulated legged robot.  Thread-safe; share it as
/// `Arc<SimRobot>` and hand a clone to the bridge as `Arc<dyn RobotTransport>`.
#[derive(Default)]
pub struct SimRobot {
    script: SimScript,
    state: Mutex<SimState>,
    probes: [FetchProbe; 4],
}

impl SimRobot {
    /// A robot that reaches the near-goal zone after 1 s and arrives after
    /// 2 s, with instant fetches and no injected failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the robot as already connected, skipping [`RobotTransport::connect`].
    pub fn connected(self) -> Self {
        self.lock().connected = true;
        self
    }

    /// Script trajectory progress relative to when the trajectory is issued.
    /// `arrive_after = None` means the robot never arrives.
    pub fn with_arrival(mut self, near_after: Duration, arrive_after: Option<Duration>) -> Self {
        self.script.near_after = Some(near_after);
        self.script.arrive_after = arrive_after;
        self
    }

    /// The robot never reports near-goal or at-goal.
    pub fn never_arrives(mut self) -> Self {
        self.script.near_after = None;
        self.script.arrive_after = None;
        self
    }

    /// Every fetch blocks for `delay` before returning.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.script.fetch_delay = delay;
        self
    }

    /// Script a navigation run: how long it takes and the waypoints passed.
    pub fn with_navigation(mut self, duration: Duration, waypoints: &[&str]) -> Self {
        self.script.navigate_duration = duration;
        self.script.waypoints = waypoints.iter().map(|w| w.to_string()).collect();
        self
    }

    pub fn with_graph(mut self, waypoints: &[&str]) -> Self {
        self.script.graph = waypoints.iter().map(|w| w.to_string()).collect();
        self
    }

    /// Identity reported by the robot.  An all-`None` identity makes
    /// [`RobotTransport::fetch_identity`] fail.
    pub fn with_identity(mut self, identity: RobotIdentity) -> Self {
        self.script.identity = identity;
        self
    }

    /// Connection attempts fail.
    pub fn unreachable(mut self) -> Self {
        self.script.unreachable = true;
        self
    }

    /// The robot rejects the named operation (a [`RobotCommand::name`], or one
    /// of `fetch_robot_state`, `fetch_metrics`, `fetch_leases`,
    /// `fetch_images`, `mobility`, `velocity`, `trajectory`, `navigate`,
    /// `list_graph`).
    pub fn rejecting(mut self, operation: &str) -> Self {
        self.script.rejected.insert(operation.to_string());
        self
    }

    /// The named operation (same names as [`rejecting`][Self::rejecting],
    /// plus `trajectory_progress`, `fetch_identity` and `localization`)
    /// blocks for `delay` before answering.
    pub fn with_call_delay(mut self, operation: &str, delay: Duration) -> Self {
        self.script.delays.insert(operation.to_string(), delay);
        self
    }

    /// Navigation keeps running to completion even after a stop.
    pub fn ignoring_stop_during_navigation(mut self) -> Self {
        self.script.navigate_ignores_stop = true;
        self
    }

    /// The transport panics inside the named operation.
    pub fn panicking_on(mut self, operation: &str) -> Self {
        self.script.panicking.insert(operation.to_string());
        self
    }

    // ── Inspection ──────────────────────────────────────────────────────────

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Every discrete command received, in order.
    pub fn issued(&self) -> Vec<RobotCommand> {
        self.lock().issued.clone()
    }

    pub fn count_issued(&self, command: &RobotCommand) -> usize {
        self.lock().issued.iter().filter(|c| *c == command).count()
    }

    /// Every mobility configuration pushed, in order.
    pub fn mobility_pushes(&self) -> Vec<MobilityConfig> {
        self.lock().mobility_pushes.clone()
    }

    pub fn velocities(&self) -> Vec<Twist> {
        self.lock().velocities.clone()
    }

    pub fn trajectories(&self) -> Vec<TrajectoryGoal> {
        self.lock().trajectories.clone()
    }

    pub fn posture(&self) -> PostureFlags {
        self.lock().posture
    }

    /// Fetches started for `kind` so far.
    pub fn fetches(&self, kind: FetchKind) -> usize {
        self.probes[kind.index()].started.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously running fetches observed for `kind`.
    pub fn max_concurrent_fetches(&self, kind: FetchKind) -> usize {
        self.probes[kind.index()].max_in_flight.load(Ordering::SeqCst)
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply scripted panics and rejections for `operation`.
    fn gate(&self, operation: &str) -> Result<(), BridgeError> {
        if let Some(delay) = self.script.delays.get(operation) {
            thread::sleep(*delay);
        }
        if self.script.panicking.contains(operation) {
            panic!("simulated transport panic during {operation}");
        }
        if self.script.rejected.contains(operation) {
            return Err(BridgeError::rejected(operation, "simulated rejection"));
        }
        if !self.lock().connected {
            return Err(BridgeError::transport(operation, "not connected"));
        }
        Ok(())
    }

    fn fetch<T>(
        &self,
        kind: FetchKind,
        operation: &str,
        build: impl FnOnce(&SimState) -> T,
    ) -> Result<T, BridgeError> {
        let _probe = self.probes[kind.index()].enter();
        if !self.script.fetch_delay.is_zero() {
            thread::sleep(self.script.fetch_delay);
        }
        self.gate(operation)?;
        let state = self.lock();
        Ok(build(&state))
    }

    fn progress(&self, state: &SimState) -> TrajectoryProgress {
        let Some(started) = state.trajectory_started else {
            return TrajectoryProgress::default();
        };
        let elapsed = started.elapsed();
        TrajectoryProgress {
            at_goal: self.script.arrive_after.is_some_and(|d| elapsed >= d),
            near_goal: self.script.near_after.is_some_and(|d| elapsed >= d),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Synthetic telemetry
// ────────────────────────────────────────────────────────────────────────────

/// Pose of the body in the kinematic odometry frame.
fn odom_tform_body() -> Transform3D {
    Transform3D::new(Vec3::new(1.0, 0.5, 0.45), Quaternion::from_yaw(0.3))
}

/// Pose of the body in the vision odometry frame.
fn vision_tform_body() -> Transform3D {
    Transform3D::new(Vec3::new(1.1, 0.4, 0.45), Quaternion::from_yaw(0.25))
}

fn edge(child: &str, parent: &str, parent_tform_child: Transform3D) -> FrameEdge {
    FrameEdge {
        child: child.to_string(),
        parent: parent.to_string(),
        parent_tform_child,
    }
}

/// Frame tree rooted at the body, as the robot reports it.
fn body_rooted_tree() -> Vec<FrameEdge> {
    vec![
        edge("body", "", Transform3D::identity()),
        edge("odom", "body", odom_tform_body().inverse()),
        edge("vision", "body", vision_tform_body().inverse()),
        edge(
            "flat_body",
            "body",
            Transform3D::new(Vec3::zero(), Quaternion::from_yaw(0.0)),
        ),
        edge(
            "gpe",
            "odom",
            Transform3D::new(Vec3::new(0.0, 0.0, -0.05), Quaternion::identity()),
        ),
    ]
}

fn camera_mount(camera: Camera) -> Transform3D {
    let (x, y, yaw) = match camera {
        Camera::FrontLeft => (0.42, 0.04, 0.0),
        Camera::FrontRight => (0.42, -0.04, 0.0),
        Camera::Left => (-0.12, 0.11, std::f64::consts::FRAC_PI_2),
        Camera::Right => (-0.12, -0.11, -std::f64::consts::FRAC_PI_2),
        Camera::Back => (-0.42, 0.0, std::f64::consts::PI),
    };
    Transform3D::new(Vec3::new(x, y, 0.03), Quaternion::from_yaw(yaw))
}

fn sensor_frame(camera: Camera, kind: ImageKind) -> String {
    match kind {
        ImageKind::Visual => format!("{}_fisheye", camera.name()),
        ImageKind::Depth => format!("{}_depth", camera.name()),
    }
}

fn capture(camera: Camera, kind: ImageKind) -> ImageCapture {
    let frame_id = sensor_frame(camera, kind);
    let mut edges = body_rooted_tree();
    edges.push(edge(camera.name(), "body", camera_mount(camera)));
    edges.push(edge(
        &frame_id,
        camera.name(),
        Transform3D::new(Vec3::new(0.01, 0.0, 0.0), Quaternion::identity()),
    ));
    let (encoding, bytes_per_pixel) = match kind {
        ImageKind::Visual => ("mono8", 1),
        ImageKind::Depth => ("16UC1", 2),
    };
    ImageCapture {
        camera,
        kind,
        acquired_at: Utc::now(),
        frame_id,
        width: IMAGE_WIDTH,
        height: IMAGE_HEIGHT,
        encoding: encoding.to_string(),
        data: vec![0u8; (IMAGE_WIDTH * IMAGE_HEIGHT * bytes_per_pixel) as usize],
        intrinsics: Intrinsics {
            focal_x: 330.0,
            focal_y: 330.0,
            principal_x: f64::from(IMAGE_WIDTH) / 2.0,
            principal_y: f64::from(IMAGE_HEIGHT) / 2.0,
        },
        transforms: FrameSnapshot { edges },
    }
}

fn robot_state(state: &SimState) -> RobotState {
    let velocity = if state.posture.moving {
        Twist::planar(0.4, 0.0, 0.1)
    } else {
        Twist::default()
    };
    RobotState {
        acquired_at: Utc::now(),
        joints: JOINT_NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| JointSample {
                name: (*name).to_string(),
                position: 0.1 * i as f64,
                velocity: 0.0,
                load: 0.5,
            })
            .collect(),
        kinematic: FrameSnapshot {
            edges: body_rooted_tree(),
        },
        velocity_odom: velocity,
        velocity_vision: velocity,
        feet: [(0.3, 0.15), (0.3, -0.15), (-0.3, 0.15), (-0.3, -0.15)]
            .into_iter()
            .map(|(x, y)| FootSample {
                position_rt_body: Vec3::new(x, y, -0.5),
                contact: if state.posture.standing {
                    ContactState::Made
                } else {
                    ContactState::Unknown
                },
            })
            .collect(),
        estops: vec![
            EstopSample {
                name: "hardware_estop".into(),
                kind: EstopKind::Hardware,
                engaged: false,
                description: "physical stop button".into(),
            },
            EstopSample {
                name: "software_estop".into(),
                kind: EstopKind::Software,
                engaged: !state.motor_power && state.issued.contains(&RobotCommand::EstopHard),
                description: "bridge e-stop endpoint".into(),
            },
        ],
        wifi: WifiSample {
            mode: "client".into(),
            essid: "sim-lab".into(),
        },
        batteries: vec![BatterySample {
            identifier: "battery-0".into(),
            charge_percentage: 87.0,
            estimated_runtime: Duration::from_secs(75 * 60),
            current: if state.motor_power { -4.2 } else { -0.3 },
            voltage: 56.1,
            temperatures: vec![31.0, 31.5, 30.8],
            status: "discharging".into(),
        }],
        power: PowerSample {
            motor_power_on: state.motor_power,
            shore_power_on: false,
            locomotion_charge_percentage: 87.0,
            locomotion_estimated_runtime: Duration::from_secs(75 * 60),
        },
        system_faults: Vec::new(),
        behavior_faults: Vec::new(),
        posture: state.posture,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// RobotTransport implementation
// ────────────────────────────────────────────────────────────────────────────

impl RobotTransport for SimRobot {
    fn connect(&self, settings: &ConnectionSettings) -> Result<(), BridgeError> {
        if self.script.unreachable {
            return Err(BridgeError::transport(
                "connect",
                format!("cannot reach {}", settings.hostname),
            ));
        }
        let mut state = self.lock();
        state.connected = true;
        state.username = settings.username.clone();
        debug!(hostname = %settings.hostname, "sim robot connected");
        Ok(())
    }

    fn disconnect(&self) -> Result<(), BridgeError> {
        self.lock().connected = false;
        Ok(())
    }

    fn fetch_robot_state(&self) -> Result<RobotState, BridgeError> {
        self.fetch(FetchKind::RobotState, "fetch_robot_state", robot_state)
    }

    fn fetch_metrics(&self) -> Result<RobotMetrics, BridgeError> {
        self.fetch(FetchKind::Metrics, "fetch_metrics", |_| RobotMetrics {
            acquired_at: Utc::now(),
            entries: vec![
                MetricEntry {
                    label: "distance".into(),
                    value: MetricValue::Float(1523.4),
                },
                MetricEntry {
                    label: "gait cycles".into(),
                    value: MetricValue::Int(20931),
                },
                MetricEntry {
                    label: "time moving".into(),
                    value: MetricValue::Duration(Duration::from_secs(3_600)),
                },
                MetricEntry {
                    label: "electric power".into(),
                    value: MetricValue::Duration(Duration::from_secs(7_200)),
                },
                MetricEntry {
                    label: "self rights".into(),
                    value: MetricValue::Int(2),
                },
            ],
        })
    }

    fn fetch_leases(&self) -> Result<Vec<LeaseSample>, BridgeError> {
        self.fetch(FetchKind::Leases, "fetch_leases", |state| {
            if !state.issued.contains(&RobotCommand::Claim) {
                return Vec::new();
            }
            vec![LeaseSample {
                resource: "body".into(),
                epoch: "sim-epoch".into(),
                sequence: vec![1, state.lease_sequence],
                client_name: "legbridge".into(),
                user_name: state.username.clone(),
            }]
        })
    }

    fn fetch_images(&self, group: CameraGroup) -> Result<Vec<ImageCapture>, BridgeError> {
        self.fetch(FetchKind::Images, "fetch_images", |_| {
            group
                .sources()
                .iter()
                .map(|(camera, kind)| capture(*camera, *kind))
                .collect()
        })
    }

    fn fetch_identity(&self) -> Result<RobotIdentity, BridgeError> {
        self.gate("fetch_identity")?;
        if self.script.identity == RobotIdentity::default() {
            return Err(BridgeError::transport(
                "fetch_identity",
                "robot id service unavailable",
            ));
        }
        Ok(self.script.identity.clone())
    }

    fn issue(&self, command: &RobotCommand) -> Result<String, BridgeError> {
        let name = command.name();
        if self.script.panicking.contains(name) {
            panic!("simulated transport panic during {name}");
        }
        let mut state = self.lock();
        state.issued.push(command.clone());
        if self.script.rejected.contains(name) {
            return Err(BridgeError::rejected(name, "simulated rejection"));
        }
        if !state.connected {
            return Err(BridgeError::transport(name, "not connected"));
        }
        let message = match command {
            RobotCommand::Claim => {
                state.lease_sequence += 1;
                "Lease claimed".to_string()
            }
            RobotCommand::Release => "Lease released".to_string(),
            RobotCommand::Stop => {
                state.stops += 1;
                state.trajectory_started = None;
                state.posture.moving = false;
                "Stopped".to_string()
            }
            RobotCommand::SelfRight => "Self-right complete".to_string(),
            RobotCommand::Sit => {
                state.posture = PostureFlags {
                    standing: false,
                    sitting: true,
                    moving: false,
                };
                "Sitting".to_string()
            }
            RobotCommand::Stand => {
                if !state.motor_power {
                    return Err(BridgeError::rejected(name, "motor power is off"));
                }
                state.posture = PostureFlags {
                    standing: true,
                    sitting: false,
                    moving: false,
                };
                "Standing".to_string()
            }
            RobotCommand::PowerOn => {
                state.motor_power = true;
                "Powered on".to_string()
            }
            RobotCommand::SafePowerOff | RobotCommand::EstopHard | RobotCommand::EstopSoft => {
                state.motor_power = false;
                state.posture = PostureFlags {
                    standing: false,
                    sitting: true,
                    moving: false,
                };
                "Motor power off".to_string()
            }
            RobotCommand::EstopRelease => "E-stop released".to_string(),
            RobotCommand::ClearBehaviorFault(id) => format!("Behavior fault {id} cleared"),
        };
        Ok(message)
    }

    fn apply_mobility(&self, config: &MobilityConfig) -> Result<(), BridgeError> {
        self.gate("mobility")?;
        self.lock().mobility_pushes.push(*config);
        Ok(())
    }

    fn velocity(&self, twist: Twist, _config: &MobilityConfig) -> Result<String, BridgeError> {
        self.gate("velocity")?;
        let mut state = self.lock();
        state.velocities.push(twist);
        state.posture.moving = twist != Twist::default();
        Ok("Velocity command accepted".to_string())
    }

    fn trajectory(
        &self,
        goal: &TrajectoryGoal,
        _config: &MobilityConfig,
    ) -> Result<String, BridgeError> {
        self.gate("trajectory")?;
        let mut state = self.lock();
        state.trajectories.push(goal.clone());
        state.trajectory_started = Some(Instant::now());
        state.posture.moving = true;
        Ok(format!(
            "Moving to ({:.2}, {:.2}, {:.2})",
            goal.target_x, goal.target_y, goal.target_heading
        ))
    }

    fn trajectory_progress(&self) -> Result<TrajectoryProgress, BridgeError> {
        self.gate("trajectory_progress")?;
        let mut state = self.lock();
        let progress = self.progress(&state);
        if progress.at_goal {
            state.posture.moving = false;
        }
        Ok(progress)
    }

    fn navigate_to(&self, goal: &NavigateGoal) -> Result<String, BridgeError> {
        self.gate("navigate")?;
        let stops_at_start = {
            let mut state = self.lock();
            state.navigate_started = Some(Instant::now());
            state.posture.moving = true;
            state.stops
        };
        let started = Instant::now();
        loop {
            thread::sleep(Duration::from_millis(10));
            let mut state = self.lock();
            if state.stops > stops_at_start && !self.script.navigate_ignores_stop {
                state.navigate_started = None;
                return Err(BridgeError::rejected("navigate", "navigation stopped"));
            }
            if started.elapsed() >= self.script.navigate_duration {
                state.navigate_started = None;
                state.posture.moving = false;
                return Ok(format!("Arrived at {}", goal.destination));
            }
        }
    }

    fn localization_waypoint(&self) -> Result<Option<String>, BridgeError> {
        self.gate("localization")?;
        let state = self.lock();
        let Some(started) = state.navigate_started else {
            return Ok(None);
        };
        if self.script.waypoints.is_empty() {
            return Ok(None);
        }
        let total = self.script.navigate_duration.as_secs_f64().max(f64::EPSILON);
        let fraction = (started.elapsed().as_secs_f64() / total).min(1.0);
        let last = self.script.waypoints.len() - 1;
        let index = ((fraction * self.script.waypoints.len() as f64) as usize).min(last);
        Ok(Some(self.script.waypoints[index].clone()))
    }

    fn list_graph(&self, upload_path: &str) -> Result<Vec<String>, BridgeError> {
        self.gate("list_graph")?;
        if upload_path.trim().is_empty() {
            return Err(BridgeError::Validation("upload path is empty".into()));
        }
        Ok(self.script.graph.clone())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

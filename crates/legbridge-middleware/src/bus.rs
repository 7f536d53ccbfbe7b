//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! Every outbound telemetry stream and every inbound continuous input has its
//! own [`Topic`] variant.  Channels are created on first use.  A topic
//! published with [`EventBus::publish_latched`] remembers its last event and
//! hands it to every later subscriber before any live traffic.
//!
//! A global firehose channel ([`EventBus::subscribe_all`]) additionally
//! carries every event on every topic; the WebSocket mirror consumes it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use legbridge_types::messages::{
    BatteryStateArray, BehaviorFaultState, BodyPoseInput, CameraInfoMsg, EstopStateArray,
    FootStateArray, ImageMsg, JointStateMsg, LeaseArray, MetricsMsg, OdometryMsg, PowerStateMsg,
    StatusFeedback, SystemFaultState, TfMessage, TwistStampedMsg, WifiStateMsg,
};
use legbridge_types::robot::{Camera, ImageKind};
use legbridge_types::{BridgeError, MobilityConfig, Twist};
use serde::{Serialize, Serializer};
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

// ────────────────────────────────────────────────────────────────────────────
// Topics
// ────────────────────────────────────────────────────────────────────────────

/// Every routing topic on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    JointStates,
    /// Dynamic frame tree.
    Tf,
    /// Latched static sensor frames.
    StaticTf,
    Odometry,
    OdometryTwist,
    Feet,
    Estop,
    Wifi,
    Battery,
    Power,
    SystemFaults,
    BehaviorFaults,
    Metrics,
    Leases,
    Status,
    MobilityParams,
    Image { camera: Camera, kind: ImageKind },
    CameraInfo { camera: Camera, kind: ImageKind },
    /// Inbound velocity commands.
    CmdVel,
    /// Inbound body pose offsets.
    BodyPose,
}

impl Topic {
    /// Middleware-facing topic name.
    pub fn name(&self) -> String {
        let fixed = match self {
            Topic::JointStates => "joint_states",
            Topic::Tf => "tf",
            Topic::StaticTf => "tf_static",
            Topic::Odometry => "odometry",
            Topic::OdometryTwist => "odometry/twist",
            Topic::Feet => "status/feet",
            Topic::Estop => "status/estop",
            Topic::Wifi => "status/wifi",
            Topic::Battery => "status/battery_states",
            Topic::Power => "status/power_state",
            Topic::SystemFaults => "status/system_faults",
            Topic::BehaviorFaults => "status/behavior_faults",
            Topic::Metrics => "status/metrics",
            Topic::Leases => "status/leases",
            Topic::Status => "status/feedback",
            Topic::MobilityParams => "status/mobility_params",
            Topic::CmdVel => "cmd_vel",
            Topic::BodyPose => "body_pose",
            Topic::Image { camera, kind } => {
                return format!("{}/{}/image", kind_prefix(*kind), camera.name());
            }
            Topic::CameraInfo { camera, kind } => {
                return format!("{}/{}/camera_info", kind_prefix(*kind), camera.name());
            }
        };
        fixed.to_string()
    }

    /// `true` for topics carrying data into the bridge.
    pub fn is_inbound(&self) -> bool {
        matches!(self, Topic::CmdVel | Topic::BodyPose)
    }

    /// Whether `message` is the payload type this topic carries.
    pub fn accepts(&self, message: &Message) -> bool {
        matches!(
            (self, message),
            (Topic::JointStates, Message::JointState(_))
                | (Topic::Tf | Topic::StaticTf, Message::Tf(_))
                | (Topic::Odometry, Message::Odometry(_))
                | (Topic::OdometryTwist, Message::TwistStamped(_))
                | (Topic::Feet, Message::Feet(_))
                | (Topic::Estop, Message::Estop(_))
                | (Topic::Wifi, Message::Wifi(_))
                | (Topic::Battery, Message::Battery(_))
                | (Topic::Power, Message::Power(_))
                | (Topic::SystemFaults, Message::SystemFaults(_))
                | (Topic::BehaviorFaults, Message::BehaviorFaults(_))
                | (Topic::Metrics, Message::Metrics(_))
                | (Topic::Leases, Message::Leases(_))
                | (Topic::Status, Message::Status(_))
                | (Topic::MobilityParams, Message::Mobility(_))
                | (Topic::Image { .. }, Message::Image(_))
                | (Topic::CameraInfo { .. }, Message::CameraInfo(_))
                | (Topic::CmdVel, Message::CmdVel(_))
                | (Topic::BodyPose, Message::BodyPose(_))
        )
    }
}

fn kind_prefix(kind: ImageKind) -> &'static str {
    match kind {
        ImageKind::Visual => "camera",
        ImageKind::Depth => "depth",
    }
}

impl Serialize for Topic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Messages and events
// ────────────────────────────────────────────────────────────────────────────

/// Payload of a bus event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Message {
    JointState(JointStateMsg),
    Tf(TfMessage),
    Odometry(OdometryMsg),
    TwistStamped(TwistStampedMsg),
    Feet(FootStateArray),
    Estop(EstopStateArray),
    Wifi(WifiStateMsg),
    Battery(BatteryStateArray),
    Power(PowerStateMsg),
    SystemFaults(SystemFaultState),
    BehaviorFaults(BehaviorFaultState),
    Metrics(MetricsMsg),
    Leases(LeaseArray),
    Image(ImageMsg),
    CameraInfo(CameraInfoMsg),
    Status(StatusFeedback),
    Mobility(MobilityConfig),
    CmdVel(Twist),
    BodyPose(BodyPoseInput),
}

/// One published message together with its routing metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub topic: Topic,
    pub payload: Message,
}

// ────────────────────────────────────────────────────────────────────────────
// EventBus
// ────────────────────────────────────────────────────────────────────────────

struct TopicChannel {
    sender: broadcast::Sender<Event>,
    latched: Option<Event>,
}

/// Shared event bus.  Clone it cheaply – all clones share the same
/// underlying channels.
#[derive(Clone)]
pub struct EventBus {
    capacity: usize,
    firehose: broadcast::Sender<Event>,
    topics: Arc<Mutex<HashMap<Topic, TopicChannel>>>,
}

impl EventBus {
    /// Create a new bus.  `capacity` applies to every topic channel and to
    /// the firehose independently.
    pub fn new(capacity: usize) -> Self {
        let (firehose, _) = broadcast::channel(capacity);
        Self {
            capacity,
            firehose,
            topics: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Publish `message` on `topic`.
    ///
    /// Returns the number of topic subscribers that were handed the event;
    /// `Ok(0)` when nobody is listening (a normal condition).
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Channel`] when the payload type does not belong
    /// on `topic`.
    pub fn publish(&self, topic: Topic, message: Message) -> Result<usize, BridgeError> {
        self.send(topic, message, false)
    }

    /// Publish and remember the event as the topic's latched value.
    pub fn publish_latched(&self, topic: Topic, message: Message) -> Result<usize, BridgeError> {
        self.send(topic, message, true)
    }

    /// Subscribe to one topic.  If the topic has a latched value the receiver
    /// yields it first.
    pub fn subscribe(&self, topic: Topic) -> TopicReceiver {
        let mut topics = self.lock();
        let channel = self.channel(&mut topics, topic);
        TopicReceiver {
            topic,
            pending: channel.latched.clone(),
            receiver: channel.sender.subscribe(),
        }
    }

    /// Subscribe to every event on every topic.
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event> {
        self.firehose.subscribe()
    }

    /// Last latched event on `topic`, if any.
    pub fn latched(&self, topic: Topic) -> Option<Event> {
        self.lock().get(&topic).and_then(|c| c.latched.clone())
    }

    fn send(&self, topic: Topic, message: Message, latch: bool) -> Result<usize, BridgeError> {
        if !topic.accepts(&message) {
            return Err(BridgeError::Channel(format!(
                "payload does not belong on topic {}",
                topic.name()
            )));
        }
        let event = Event {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            topic,
            payload: message,
        };

        let mut topics = self.lock();
        let channel = self.channel(&mut topics, topic);
        if latch {
            channel.latched = Some(event.clone());
        }
        let delivered = channel.sender.send(event.clone()).unwrap_or(0);
        drop(topics);

        // The firehose may legitimately have no subscribers.
        let _ = self.firehose.send(event);
        Ok(delivered)
    }

    fn channel<'a>(
        &self,
        topics: &'a mut HashMap<Topic, TopicChannel>,
        topic: Topic,
    ) -> &'a mut TopicChannel {
        topics.entry(topic).or_insert_with(|| TopicChannel {
            sender: broadcast::channel(self.capacity).0,
            latched: None,
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Topic, TopicChannel>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Topic receiver
// ────────────────────────────────────────────────────────────────────────────

/// An async receiver bound to a single [`Topic`].
///
/// Obtained via [`EventBus::subscribe`].
pub struct TopicReceiver {
    topic: Topic,
    pending: Option<Event>,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – the latched event on first call, then live events.
    /// * `Err(RecvError::Lagged(n))` – the subscriber fell behind and `n`
    ///   messages were dropped.  The caller decides whether to continue.
    /// * `Err(RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        if let Some(event) = self.pending.take() {
            return Ok(event);
        }
        self.receiver.recv().await
    }

    /// Like [`recv`][Self::recv] but skips over lag, logging it.  Returns
    /// `None` once the bus is closed.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = %self.topic.name(), lagged_by = n, "topic receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legbridge_types::messages::TfMessage;
    use std::time::Duration;

    fn cmd_vel(x: f64) -> Message {
        Message::CmdVel(Twist::planar(x, 0.0, 0.0))
    }

    #[test]
    fn topic_names() {
        assert_eq!(Topic::StaticTf.name(), "tf_static");
        assert_eq!(Topic::Battery.name(), "status/battery_states");
        assert_eq!(
            Topic::Image {
                camera: Camera::FrontLeft,
                kind: ImageKind::Visual
            }
            .name(),
            "camera/frontleft/image"
        );
        assert_eq!(
            Topic::CameraInfo {
                camera: Camera::Back,
                kind: ImageKind::Depth
            }
            .name(),
            "depth/back/camera_info"
        );
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        assert_eq!(bus.publish(Topic::CmdVel, cmd_vel(0.1))?, 0);
        Ok(())
    }

    #[test]
    fn mismatched_payload_is_rejected() {
        let bus = EventBus::default();
        let err = bus
            .publish(Topic::Odometry, Message::Tf(TfMessage::default()))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Channel(_)));
    }

    #[tokio::test]
    async fn topic_multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut s1 = bus.subscribe(Topic::CmdVel);
        let mut s2 = bus.subscribe(Topic::CmdVel);

        assert_eq!(bus.publish(Topic::CmdVel, cmd_vel(0.5))?, 2);

        let e1 = s1.recv().await?;
        let e2 = s2.recv().await?;
        assert_eq!(e1.id, e2.id);
        assert_eq!(e1.payload, cmd_vel(0.5));
        Ok(())
    }

    #[tokio::test]
    async fn topic_subscriber_does_not_receive_other_topic_events() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut pose_sub = bus.subscribe(Topic::BodyPose);
        bus.publish(Topic::CmdVel, cmd_vel(0.2))?;

        let result = tokio::time::timeout(Duration::from_millis(50), pose_sub.recv()).await;
        assert!(result.is_err(), "BodyPose subscriber must not see a CmdVel event");
        Ok(())
    }

    #[tokio::test]
    async fn late_subscriber_receives_latched_value_first() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        bus.publish_latched(Topic::StaticTf, Message::Tf(TfMessage::default()))?;

        let mut late = bus.subscribe(Topic::StaticTf);
        let first = late.recv().await?;
        assert_eq!(first.topic, Topic::StaticTf);
        assert!(bus.latched(Topic::StaticTf).is_some());
        assert!(bus.latched(Topic::Tf).is_none());
        Ok(())
    }

    #[tokio::test]
    async fn firehose_sees_every_topic() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut all = bus.subscribe_all();
        bus.publish(Topic::CmdVel, cmd_vel(0.1))?;
        bus.publish(Topic::Tf, Message::Tf(TfMessage::default()))?;

        assert_eq!(all.recv().await?.topic, Topic::CmdVel);
        assert_eq!(all.recv().await?.topic, Topic::Tf);
        Ok(())
    }

    #[tokio::test]
    async fn topic_channel_lag_on_slow_subscriber() {
        let bus = EventBus::new(16);
        let mut slow = bus.subscribe(Topic::CmdVel);
        for i in 0..1_000 {
            let _ = bus.publish(Topic::CmdVel, cmd_vel(f64::from(i)));
        }
        let result = slow.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
    }

    #[test]
    fn event_serializes_topic_by_name() -> Result<(), Box<dyn std::error::Error>> {
        let event = Event {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            topic: Topic::CmdVel,
            payload: cmd_vel(1.0),
        };
        let json = serde_json::to_string(&event)?;
        assert!(json.contains(r#""topic":"cmd_vel""#));
        Ok(())
    }
}

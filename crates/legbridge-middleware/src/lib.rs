//! `legbridge-middleware` – publish/subscribe plumbing.
//!
//! Routes typed messages between the robot-facing side of the bridge and its
//! consumers without caring where they go next.
//!
//! # Modules
//!
//! - [`bus`] – Typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels, with latched topics.
//! - [`translate`] – Pure mapping from raw robot samples to outbound
//!   messages.
//! - [`ws_bridge`] – WebSocket mirror that streams every event as JSON and
//!   accepts inbound velocity and body-pose inputs.

pub mod bus;
pub mod translate;
pub mod ws_bridge;

pub use bus::{Event, EventBus, Message, Topic, TopicReceiver};
pub use ws_bridge::WsBridge;

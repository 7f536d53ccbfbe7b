//! `legbridge-hal` – Robot transport layer.
//!
//! # Modules
//!
//! - [`transport`] – [`RobotTransport`][transport::RobotTransport]: the
//!   synchronous fetch/command interface every other crate talks to, plus
//!   [`ConnectionSettings`][transport::ConnectionSettings].
//! - [`sim`] – [`SimRobot`][sim::SimRobot]: a scriptable in-memory robot used
//!   by tests and by hardware-free runs of the bridge.

pub mod sim;
pub mod transport;

pub use sim::SimRobot;
pub use transport::{ConnectionSettings, RobotTransport};

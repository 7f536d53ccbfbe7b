//! `legbridge-runtime` – the running bridge.
//!
//! Drives everything that happens over time: periodic telemetry polling,
//! status publication and long-running motion goals, and assembles them
//! with the kernel and middleware into a [`Bridge`].
//!
//! # Modules
//!
//! - [`poll_scheduler`] – [`PollScheduler`][poll_scheduler::PollScheduler]:
//!   one timer task per [`Feed`][poll_scheduler::Feed]; fetches run on the
//!   blocking pool, overlapping ticks are dropped and counted, failures are
//!   isolated per feed.
//! - [`feeds`] – the six standard feeds (robot state, metrics, leases, three
//!   camera groups) and the [`TelemetryCache`][feeds::TelemetryCache]
//!   snapshot they refresh.
//! - [`status`] – [`StatusPublisher`][status::StatusPublisher]: posture,
//!   identity and mobility snapshot at a fixed rate.
//! - [`goal_runner`] – [`GoalRunner`][goal_runner::GoalRunner]: the
//!   trajectory and navigate goal state machines with preemption, timeout
//!   and advisory feedback.
//! - [`bridge`] – [`Bridge`][bridge::Bridge]: startup, continuous inputs and
//!   graceful shutdown.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export.

pub mod bridge;
pub mod feeds;
pub mod goal_runner;
pub mod poll_scheduler;
pub mod status;
pub mod telemetry;

pub use bridge::{Bridge, BridgeSettings};
pub use feeds::{FeedRates, TelemetryCache};
pub use goal_runner::{GoalHandle, GoalRunner};
pub use poll_scheduler::{Feed, FeedId, FeedStats, PollScheduler};
pub use status::StatusPublisher;
pub use telemetry::{TracerProviderGuard, init_tracing};

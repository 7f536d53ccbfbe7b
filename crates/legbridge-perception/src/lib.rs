//! `legbridge-perception` – coordinate frames.
//!
//! # Modules
//!
//! - [`transform`] – [`TfEngine`][transform::TfEngine]: directed graph of
//!   named frames with BFS lookup of composed transforms.
//! - [`frame_tree`] – re-parents the body under the selected odometry frame
//!   for dynamic TF publication and computes the odometry pose.
//! - [`static_frames`] – [`StaticFrameCache`][static_frames::StaticFrameCache]:
//!   deduplicated, append-only discovery of static sensor frames.

pub mod frame_tree;
pub mod static_frames;
pub mod transform;

pub use frame_tree::{BODY_FRAME, OdomFrames};
pub use static_frames::StaticFrameCache;
pub use transform::TfEngine;

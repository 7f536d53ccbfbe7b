//! Dynamic frame tree publication.
//!
//! The robot reports its kinematic tree rooted at the body.  Consumers expect
//! the body to hang off an odometry frame instead, so the edge between the
//! body and the selected odometry frame is inverted before publishing.

use chrono::{DateTime, Utc};
use legbridge_types::robot::FrameSnapshot;
use legbridge_types::{OdomFrameMode, Transform3D, TransformRecord};

use crate::transform::TfEngine;

/// Frame every body-relative quantity is expressed in.
pub const BODY_FRAME: &str = "body";

/// Names of the two odometry frames and which one parents the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OdomFrames {
    pub kinematic: String,
    pub vision: String,
    pub mode: OdomFrameMode,
}

impl Default for OdomFrames {
    fn default() -> Self {
        Self {
            kinematic: "odom".to_string(),
            vision: "vision".to_string(),
            mode: OdomFrameMode::Odom,
        }
    }
}

impl OdomFrames {
    /// Frame the body is re-parented under.
    pub fn parent(&self) -> &str {
        match self.mode {
            OdomFrameMode::Odom => &self.kinematic,
            OdomFrameMode::Vision => &self.vision,
        }
    }
}

/// Convert a body-rooted snapshot into publishable transforms.
///
/// Root edges are skipped.  The edge whose child is the selected odometry
/// frame is inverted so the odometry frame becomes the body's parent; every
/// other edge is published as reported.
pub fn dynamic_transforms(
    snapshot: &FrameSnapshot,
    observed_at: DateTime<Utc>,
    frames: &OdomFrames,
) -> Vec<TransformRecord> {
    let parent = frames.parent();
    snapshot
        .edges
        .iter()
        .filter(|edge| !edge.parent.is_empty())
        .map(|edge| {
            if edge.child == parent {
                TransformRecord {
                    parent_frame: edge.child.clone(),
                    child_frame: edge.parent.clone(),
                    transform: edge.parent_tform_child.inverse(),
                    observed_at,
                }
            } else {
                TransformRecord {
                    parent_frame: edge.parent.clone(),
                    child_frame: edge.child.clone(),
                    transform: edge.parent_tform_child,
                    observed_at,
                }
            }
        })
        .collect()
}

/// Pose of the body in the selected odometry frame, if the snapshot links
/// the two.
pub fn odometry_pose(snapshot: &FrameSnapshot, frames: &OdomFrames) -> Option<Transform3D> {
    TfEngine::from_snapshot(snapshot).lookup(frames.parent(), BODY_FRAME)
}

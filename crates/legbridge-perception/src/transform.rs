//! Transform Frame (TF) Engine.
//!
//! Maintains a directed graph of named reference frames and the rigid-body
//! transforms that relate them.  Given any two frame names the engine
//! composes a chain of transforms via BFS to produce the combined
//! [`Transform3D`].
//!
//! # Example
//!
//! ```rust
//! use legbridge_perception::transform::TfEngine;
//! use legbridge_types::{Quaternion, Transform3D, Vec3};
//!
//! let mut tf = TfEngine::new();
//!
//! // body is 1 m forward of the odometry origin, same orientation.
//! tf.set_transform("odom", "body",
//!     Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()));
//!
//! // the camera is 0.5 m forward of the body.
//! tf.set_transform("body", "frontleft",
//!     Transform3D::new(Vec3::new(0.5, 0.0, 0.0), Quaternion::identity()));
//!
//! let t = tf.lookup("odom", "frontleft").unwrap();
//! assert!((t.translation.x - 1.5).abs() < 1e-9);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use legbridge_types::Transform3D;
use legbridge_types::robot::FrameSnapshot;

/// A directed graph of named reference frames.
///
/// Edges are directional: adding `"A" → "B"` does not create the inverse
/// unless the graph is built with [`TfEngine::from_snapshot`], which inserts
/// both directions for every edge.
#[derive(Debug, Default)]
pub struct TfEngine {
    /// `edges[parent][child] = parent_tform_child`
    edges: HashMap<String, HashMap<String, Transform3D>>,
}

impl TfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a bidirectional graph from a robot frame snapshot.  Root edges
    /// (empty parent) carry no relation and are skipped.
    pub fn from_snapshot(snapshot: &FrameSnapshot) -> Self {
        let mut tf = Self::new();
        for edge in snapshot.edges.iter().filter(|e| !e.parent.is_empty()) {
            tf.set_transform(&edge.parent, &edge.child, edge.parent_tform_child);
            tf.set_transform(&edge.child, &edge.parent, edge.parent_tform_child.inverse());
        }
        tf
    }

    /// Register or update the transform from `parent_frame` to `child_frame`.
    pub fn set_transform(&mut self, parent_frame: &str, child_frame: &str, transform: Transform3D) {
        self.edges
            .entry(parent_frame.to_string())
            .or_default()
            .insert(child_frame.to_string(), transform);
    }

    /// Pose of `target_frame` expressed in `source_frame`.
    ///
    /// Returns `None` if no path exists between the two frames.
    pub fn lookup(&self, source_frame: &str, target_frame: &str) -> Option<Transform3D> {
        if source_frame == target_frame {
            return Some(Transform3D::identity());
        }

        let mut queue: VecDeque<(&str, Transform3D)> = VecDeque::new();
        let mut visited: HashSet<&str> = HashSet::new();

        queue.push_back((source_frame, Transform3D::identity()));
        visited.insert(source_frame);

        while let Some((current, accumulated)) = queue.pop_front() {
            let Some(neighbours) = self.edges.get(current) else {
                continue;
            };
            for (next, edge_tf) in neighbours {
                if !visited.insert(next.as_str()) {
                    continue;
                }
                let composed = accumulated.compose(*edge_tf);
                if next == target_frame {
                    return Some(composed);
                }
                queue.push_back((next.as_str(), composed));
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legbridge_types::robot::FrameEdge;
    use legbridge_types::{Quaternion, Vec3};
    use std::f64::consts::FRAC_1_SQRT_2;

    #[test]
    fn lookup_same_frame_returns_identity() {
        let tf = TfEngine::new();
        assert_eq!(tf.lookup("body", "body"), Some(Transform3D::identity()));
    }

    #[test]
    fn lookup_composed_chain() {
        let mut tf = TfEngine::new();
        tf.set_transform(
            "odom",
            "body",
            Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()),
        );
        tf.set_transform(
            "body",
            "back",
            Transform3D::new(Vec3::new(-0.5, 0.0, 0.0), Quaternion::identity()),
        );
        let t = tf.lookup("odom", "back").unwrap();
        assert!((t.translation.x - 0.5).abs() < 1e-9);
        assert!(tf.lookup("back", "odom").is_none());
    }

    #[test]
    fn lookup_respects_rotation_in_chain() {
        let q90z = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let mut tf = TfEngine::new();
        tf.set_transform("odom", "body", Transform3D::new(Vec3::zero(), q90z));
        tf.set_transform(
            "body",
            "frontleft",
            Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()),
        );
        let t = tf.lookup("odom", "frontleft").unwrap();
        assert!(t.translation.x.abs() < 1e-9, "x={}", t.translation.x);
        assert!((t.translation.y - 1.0).abs() < 1e-9, "y={}", t.translation.y);
    }

    #[test]
    fn snapshot_graph_is_bidirectional() {
        let odom_tform_body = Transform3D::new(Vec3::new(2.0, 1.0, 0.4), Quaternion::from_yaw(0.5));
        let snapshot = FrameSnapshot {
            edges: vec![
                FrameEdge {
                    child: "body".into(),
                    parent: String::new(),
                    parent_tform_child: Transform3D::identity(),
                },
                FrameEdge {
                    child: "odom".into(),
                    parent: "body".into(),
                    parent_tform_child: odom_tform_body.inverse(),
                },
            ],
        };
        let tf = TfEngine::from_snapshot(&snapshot);
        let t = tf.lookup("odom", "body").unwrap();
        assert!((t.translation.x - 2.0).abs() < 1e-9);
        assert!((t.translation.y - 1.0).abs() < 1e-9);
        assert!((t.rotation.yaw() - 0.5).abs() < 1e-9);
    }
}

//! Static sensor-frame discovery.
//!
//! Camera mounting transforms never change while the process runs, but they
//! are calibrated per robot and only arrive embedded in image batches.
//! [`StaticFrameCache`] extracts them as batches come in, keeps each
//! (parent, child) pair once in discovery order, and rebroadcasts the full
//! set whenever it grows so late subscribers of a latched topic see every
//! frame.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use legbridge_types::TransformRecord;
use legbridge_types::robot::FrameSnapshot;
use tracing::debug;

use crate::frame_tree::BODY_FRAME;

/// Child frames never treated as static: both odometry roots (they move) and
/// the body (published by the dynamic tree).
pub fn excluded_frames(kinematic_odom: &str, vision_odom: &str) -> HashSet<String> {
    [kinematic_odom, vision_odom, BODY_FRAME]
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Default)]
struct Discovered {
    records: Vec<TransformRecord>,
    keys: HashSet<(String, String)>,
}

/// Append-only, deduplicated set of static transforms.
#[derive(Debug, Default)]
pub struct StaticFrameCache {
    inner: Mutex<Discovered>,
}

impl StaticFrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one sensor batch into the cache.
    ///
    /// Every newly discovered edge is appended and `broadcast` is called with
    /// the whole set, once per new edge.  The lock is held across append and
    /// broadcast so concurrent observers publish growing sets in order.
    /// Returns the number of new edges.
    pub fn observe<F>(
        &self,
        snapshot: &FrameSnapshot,
        observed_at: DateTime<Utc>,
        excluded: &HashSet<String>,
        mut broadcast: F,
    ) -> usize
    where
        F: FnMut(&[TransformRecord]),
    {
        let mut inner = self.lock();
        let mut added = 0;
        for edge in &snapshot.edges {
            if edge.parent.is_empty() || excluded.contains(&edge.child) {
                continue;
            }
            let key = (edge.parent.clone(), edge.child.clone());
            if inner.keys.contains(&key) {
                continue;
            }
            debug!(parent = %edge.parent, child = %edge.child, "new static frame");
            inner.keys.insert(key);
            inner.records.push(TransformRecord {
                parent_frame: edge.parent.clone(),
                child_frame: edge.child.clone(),
                transform: edge.parent_tform_child,
                observed_at,
            });
            added += 1;
            broadcast(&inner.records);
        }
        added
    }

    /// Copy of every transform discovered so far, in discovery order.
    pub fn snapshot(&self) -> Vec<TransformRecord> {
        self.lock().records.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Discovered> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legbridge_types::Transform3D;
    use legbridge_types::robot::FrameEdge;
    use std::sync::Arc;
    use std::thread;

    fn edge(child: &str, parent: &str) -> FrameEdge {
        FrameEdge {
            child: child.into(),
            parent: parent.into(),
            parent_tform_child: Transform3D::identity(),
        }
    }

    fn batch(edges: Vec<FrameEdge>) -> FrameSnapshot {
        FrameSnapshot { edges }
    }

    #[test]
    fn excluded_and_root_edges_are_ignored() {
        let cache = StaticFrameCache::new();
        let excluded = excluded_frames("odom", "vision");
        let mut broadcasts = 0;
        let added = cache.observe(
            &batch(vec![
                edge("body", ""),
                edge("odom", "body"),
                edge("vision", "body"),
                edge("body", "odom"),
                edge("frontleft", "body"),
            ]),
            Utc::now(),
            &excluded,
            |_| broadcasts += 1,
        );
        assert_eq!(added, 1);
        assert_eq!(broadcasts, 1);
        assert_eq!(cache.snapshot()[0].child_frame, "frontleft");
    }

    #[test]
    fn each_new_edge_triggers_one_full_rebroadcast() {
        let cache = StaticFrameCache::new();
        let excluded = HashSet::new();
        let mut sizes = Vec::new();

        cache.observe(
            &batch(vec![edge("frontleft", "body"), edge("frontleft_fisheye", "frontleft")]),
            Utc::now(),
            &excluded,
            |set| sizes.push(set.len()),
        );
        // Same edges again plus one new one.
        cache.observe(
            &batch(vec![
                edge("frontleft", "body"),
                edge("frontleft_fisheye", "frontleft"),
                edge("back", "body"),
            ]),
            Utc::now(),
            &excluded,
            |set| sizes.push(set.len()),
        );
        assert_eq!(sizes, vec![1, 2, 3]);

        let children: Vec<_> = cache
            .snapshot()
            .into_iter()
            .map(|r| r.child_frame)
            .collect();
        assert_eq!(children, vec!["frontleft", "frontleft_fisheye", "back"]);
    }

    #[test]
    fn repeated_batches_are_idempotent() {
        let cache = StaticFrameCache::new();
        let excluded = HashSet::new();
        let b = batch(vec![edge("left", "body")]);
        assert_eq!(cache.observe(&b, Utc::now(), &excluded, |_| {}), 1);
        assert_eq!(cache.observe(&b, Utc::now(), &excluded, |_| {}), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn same_child_under_different_parent_is_a_new_key() {
        let cache = StaticFrameCache::new();
        let excluded = HashSet::new();
        cache.observe(
            &batch(vec![edge("hand", "arm0.link_wr1"), edge("hand", "body")]),
            Utc::now(),
            &excluded,
            |_| {},
        );
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn concurrent_observers_publish_strictly_growing_sets() {
        let cache = Arc::new(StaticFrameCache::new());
        let published = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = cache.clone();
                let published = published.clone();
                thread::spawn(move || {
                    let edges = (0..25)
                        .map(|i| edge(&format!("cam{}", (i + t * 7) % 40), "body"))
                        .collect();
                    cache.observe(&batch(edges), Utc::now(), &HashSet::new(), |set| {
                        published.lock().unwrap().push(set.len());
                    });
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let sizes = published.lock().unwrap().clone();
        assert_eq!(sizes.len(), cache.len());
        assert!(sizes.windows(2).all(|w| w[1] == w[0] + 1));
        assert_eq!(*sizes.last().unwrap(), cache.len());
    }
}

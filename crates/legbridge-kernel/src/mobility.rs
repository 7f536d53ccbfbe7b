//! [`MobilityStore`] – the single live [`MobilityConfig`].
//!
//! Every mutation is a read-modify-write: copy the current value, edit the
//! targeted fields, push the full value to the robot, and only then commit
//! it.  The lock is held across the whole cycle, including the transport
//! call, so two concurrent mutators can never clobber each other's fields.

use std::sync::{Mutex, MutexGuard, PoisonError};

use legbridge_hal::RobotTransport;
use legbridge_types::{BridgeError, MobilityConfig};

#[derive(Debug, Default)]
pub struct MobilityStore {
    config: Mutex<MobilityConfig>,
}

impl MobilityStore {
    pub fn new(initial: MobilityConfig) -> Self {
        Self {
            config: Mutex::new(initial),
        }
    }

    /// Current configuration.
    pub fn snapshot(&self) -> MobilityConfig {
        *self.lock()
    }

    /// Apply `mutate` to a copy of the configuration, push the result to
    /// `transport` and commit it.
    ///
    /// Nothing is committed when `mutate` or the push fails.  Returns the
    /// committed configuration.
    pub fn update_with<F>(
        &self,
        transport: &dyn RobotTransport,
        mutate: F,
    ) -> Result<MobilityConfig, BridgeError>
    where
        F: FnOnce(&mut MobilityConfig) -> Result<(), BridgeError>,
    {
        let mut current = self.lock();
        let mut next = *current;
        mutate(&mut next)?;
        transport.apply_mobility(&next)?;
        *current = next;
        Ok(next)
    }

    fn lock(&self) -> MutexGuard<'_, MobilityConfig> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legbridge_hal::SimRobot;
    use legbridge_types::{LocomotionHint, VelocityLimit};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn failed_push_leaves_config_untouched() {
        let robot = SimRobot::new().rejecting("mobility").connected();
        let store = MobilityStore::default();
        let result = store.update_with(&robot, |c| {
            c.stair_hint = true;
            Ok(())
        });
        assert!(result.is_err());
        assert!(!store.snapshot().stair_hint);
    }

    #[test]
    fn failed_mutation_skips_push() {
        let robot = SimRobot::new().connected();
        let store = MobilityStore::default();
        let result = store.update_with(&robot, |_| Err(BridgeError::Validation("nope".into())));
        assert!(result.is_err());
        assert!(robot.mobility_pushes().is_empty());
    }

    #[test]
    fn concurrent_mutators_do_not_clobber_each_other() {
        let robot = Arc::new(SimRobot::new().connected());
        let store = Arc::new(MobilityStore::default());

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let robot = robot.clone();
                let store = store.clone();
                thread::spawn(move || {
                    if i % 2 == 0 {
                        store
                            .update_with(robot.as_ref(), |c| {
                                c.stair_hint = true;
                                Ok(())
                            })
                            .unwrap();
                    } else {
                        store
                            .update_with(robot.as_ref(), |c| {
                                c.locomotion_hint = LocomotionHint::Crawl;
                                c.velocity_limit = Some(VelocityLimit {
                                    linear_x: 0.5,
                                    linear_y: 0.3,
                                    angular_z: 1.0,
                                });
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let cfg = store.snapshot();
        assert!(cfg.stair_hint);
        assert_eq!(cfg.locomotion_hint, LocomotionHint::Crawl);
        assert!(cfg.velocity_limit.is_some());
        assert_eq!(robot.mobility_pushes().len(), 50);
        assert_eq!(robot.mobility_pushes().last().copied(), Some(cfg));
    }
}

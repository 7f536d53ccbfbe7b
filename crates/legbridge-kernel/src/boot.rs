//! [`BootSequence`] – optional claim → power-on → stand at startup.
//!
//! Each step is gated on the previous one: power-on only runs if claim ran
//! and succeeded, stand only if power-on ran and succeeded.

use legbridge_types::CommandResult;
use tracing::{info, warn};

use crate::command_executor::CommandExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BootSequence {
    pub auto_claim: bool,
    pub auto_power_on: bool,
    pub auto_stand: bool,
}

/// Result of each step, `None` when the step did not run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BootReport {
    pub claim: Option<CommandResult>,
    pub power_on: Option<CommandResult>,
    pub stand: Option<CommandResult>,
}

impl BootReport {
    /// `true` if every step that ran succeeded.
    pub fn all_succeeded(&self) -> bool {
        [&self.claim, &self.power_on, &self.stand]
            .into_iter()
            .flatten()
            .all(|r| r.success)
    }
}

impl BootSequence {
    pub fn run(&self, executor: &CommandExecutor) -> BootReport {
        let mut report = BootReport::default();

        if !self.auto_claim {
            return report;
        }
        let claim = step("claim", executor.claim());
        let claimed = claim.success;
        report.claim = Some(claim);

        if !(self.auto_power_on && claimed) {
            return report;
        }
        let power_on = step("power_on", executor.power_on());
        let powered = power_on.success;
        report.power_on = Some(power_on);

        if self.auto_stand && powered {
            report.stand = Some(step("stand", executor.stand()));
        }
        report
    }
}

fn step(name: &str, result: CommandResult) -> CommandResult {
    if result.success {
        info!(step = name, "boot step succeeded");
    } else {
        warn!(step = name, message = %result.message, "boot step failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mobility::MobilityStore;
    use legbridge_hal::SimRobot;
    use legbridge_types::RobotCommand;
    use std::sync::Arc;

    fn run(robot: SimRobot, seq: BootSequence) -> (Arc<SimRobot>, BootReport) {
        let robot = Arc::new(robot.connected());
        let exec = CommandExecutor::new(robot.clone(), Arc::new(MobilityStore::default()), 0.0);
        let report = seq.run(&exec);
        (robot, report)
    }

    const ALL: BootSequence = BootSequence {
        auto_claim: true,
        auto_power_on: true,
        auto_stand: true,
    };

    #[test]
    fn full_sequence_stands_the_robot() {
        let (robot, report) = run(SimRobot::new(), ALL);
        assert!(report.all_succeeded());
        assert!(report.stand.is_some());
        assert!(robot.posture().standing);
    }

    #[test]
    fn failed_claim_skips_power_and_stand() {
        let (robot, report) = run(SimRobot::new().rejecting("claim"), ALL);
        assert!(!report.all_succeeded());
        assert!(report.power_on.is_none());
        assert!(report.stand.is_none());
        assert_eq!(robot.issued(), vec![RobotCommand::Claim]);
    }

    #[test]
    fn stand_requires_power_on_to_have_run() {
        let seq = BootSequence {
            auto_power_on: false,
            ..ALL
        };
        let (robot, report) = run(SimRobot::new(), seq);
        assert!(report.claim.is_some());
        assert!(report.power_on.is_none());
        assert!(report.stand.is_none());
        assert_eq!(robot.count_issued(&RobotCommand::Stand), 0);
    }

    #[test]
    fn nothing_runs_without_auto_claim() {
        let (robot, report) = run(SimRobot::new(), BootSequence::default());
        assert_eq!(report, BootReport::default());
        assert!(robot.issued().is_empty());
    }
}

//! [`GoalRunner`] – long-running motion goals.
//!
//! A goal moves through `Validating → Monitoring → <terminal>` (or straight
//! from `Validating` to `Aborted`).  The call that creates a goal resolves
//! only once the goal is terminal.
//!
//! # Trajectory goals
//!
//! The trajectory command is issued once, then a single monitoring future
//! selects over five sources every iteration:
//!
//! 1. the caller's cancel token → stop once, `Preempted`
//! 2. the goal's own timeout (armed for the duration budget) → stop once,
//!    `TimedOut`
//! 3. runner shutdown → stop once, `Aborted`
//! 4. a 10 Hz tick → start a progress query unless one is still running
//! 5. the running progress query → emit advisory feedback, `Succeeded` on
//!    arrival
//!
//! The timeout lives inside the monitoring future, so it cannot fire once the
//! goal has returned.
//!
//! # Navigate goals
//!
//! The blocking navigate call runs on the blocking pool while a reporter task
//! streams the current waypoint id at 10 Hz.  The reporter is stopped and
//! joined before every terminal transition, and is cancelled and aborted if
//! the goal future is dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use legbridge_kernel::CommandExecutor;
use legbridge_perception::BODY_FRAME;
use legbridge_types::robot::TrajectoryProgress;
use legbridge_types::{
    BridgeError, CommandResult, GoalFeedback, GoalKind, GoalOutcome, GoalRequest, GoalState,
    NavigateGoal, TrajectoryGoal,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::poll_scheduler::join_in_flight;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Progress polling and feedback period while monitoring.
pub const FEEDBACK_PERIOD: Duration = Duration::from_millis(100);

/// How long a preempted navigate call may keep running after stop.
pub const NAVIGATE_STOP_GRACE: Duration = Duration::from_secs(5);

pub const MOVING: &str = "Moving to goal";
pub const NEAR: &str = "Near goal";
pub const NEAR_PRECISE: &str = "Near goal, performing final adjustments";
pub const REACHED: &str = "Reached goal";
pub const PREEMPTED: &str = "Preempted";
pub const TIMED_OUT: &str = "Failed to reach goal, timed out";
pub const FAILED: &str = "Failed to reach goal";

// ─────────────────────────────────────────────────────────────────────────────
// Goal record
// ─────────────────────────────────────────────────────────────────────────────

struct Goal {
    id: Uuid,
    kind: GoalKind,
    state: GoalState,
    issued_at: DateTime<Utc>,
    started: Instant,
    feedback: mpsc::UnboundedSender<GoalFeedback>,
}

impl Goal {
    fn new(id: Uuid, kind: GoalKind, feedback: mpsc::UnboundedSender<GoalFeedback>) -> Self {
        Self {
            id,
            kind,
            state: GoalState::Validating,
            issued_at: Utc::now(),
            started: Instant::now(),
            feedback,
        }
    }

    fn transition(&mut self, next: GoalState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal goal transition {} -> {next}",
            self.state
        );
        info!(goal_id = %self.id, kind = %self.kind, from = %self.state, to = %next, "goal transition");
        self.state = next;
    }

    fn emit(&self, message: impl Into<String>) {
        emit(&self.feedback, self.id, message);
    }

    /// Emit the terminal feedback message, transition, and build the outcome.
    fn finish(mut self, state: GoalState, feedback: Option<&str>, result: CommandResult) -> GoalOutcome {
        if let Some(message) = feedback {
            self.emit(message);
        }
        self.transition(state);
        GoalOutcome {
            goal_id: self.id,
            kind: self.kind,
            state,
            result,
            issued_at: self.issued_at,
            elapsed: self.started.elapsed(),
        }
    }
}

fn emit(feedback: &mpsc::UnboundedSender<GoalFeedback>, goal_id: Uuid, message: impl Into<String>) {
    // Feedback is advisory: a caller that stopped listening is not an error.
    let _ = feedback.send(GoalFeedback {
        goal_id,
        message: message.into(),
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation
// ─────────────────────────────────────────────────────────────────────────────

fn validate_trajectory(goal: &TrajectoryGoal) -> Result<Duration, BridgeError> {
    if goal.frame != BODY_FRAME {
        return Err(BridgeError::Validation(format!(
            "trajectory frame must be '{BODY_FRAME}', got '{}'",
            goal.frame
        )));
    }
    if !goal.duration_secs.is_finite() || goal.duration_secs <= 0.0 {
        return Err(BridgeError::Validation(format!(
            "trajectory duration must be positive, got {}",
            goal.duration_secs
        )));
    }
    if ![goal.target_x, goal.target_y, goal.target_heading]
        .iter()
        .all(|v| v.is_finite())
    {
        return Err(BridgeError::Validation("trajectory target must be finite".into()));
    }
    Duration::try_from_secs_f64(goal.duration_secs)
        .map_err(|e| BridgeError::Validation(format!("trajectory duration: {e}")))
}

fn validate_navigate(goal: &NavigateGoal) -> Result<(), BridgeError> {
    if goal.upload_path.trim().is_empty() {
        return Err(BridgeError::Validation("navigate upload path is empty".into()));
    }
    if goal.destination.trim().is_empty() {
        return Err(BridgeError::Validation("navigate destination is empty".into()));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Runner
// ─────────────────────────────────────────────────────────────────────────────

/// Executes goals against a shared [`CommandExecutor`].
///
/// Cloning is cheap; clones share the shutdown signal and the set of
/// active goals.
#[derive(Clone)]
pub struct GoalRunner {
    executor: Arc<CommandExecutor>,
    shutdown: CancellationToken,
    active: TaskTracker,
    stop_grace: Duration,
}

impl GoalRunner {
    pub fn new(executor: Arc<CommandExecutor>) -> Self {
        Self {
            executor,
            shutdown: CancellationToken::new(),
            active: TaskTracker::new(),
            stop_grace: NAVIGATE_STOP_GRACE,
        }
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Run `request` to a terminal state.
    ///
    /// `cancel` preempts the goal; `feedback` receives advisory progress and
    /// the terminal message.  The sender is dropped when this returns, so a
    /// receiver sees no feedback after the terminal transition.
    pub async fn execute(
        &self,
        request: GoalRequest,
        cancel: CancellationToken,
        feedback: mpsc::UnboundedSender<GoalFeedback>,
    ) -> GoalOutcome {
        self.run(Uuid::new_v4(), request, cancel, feedback).await
    }

    /// Spawn `request` on the current runtime and return a handle to it.
    pub fn spawn(&self, request: GoalRequest) -> GoalHandle {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let runner = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move { runner.run(id, request, token, tx).await });
        GoalHandle {
            id,
            cancel,
            feedback: rx,
            task,
        }
    }

    /// Abort every active goal and wait until all of them are terminal.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.active.close();
        self.active.wait().await;
    }

    pub fn active_goals(&self) -> usize {
        self.active.len()
    }

    async fn run(
        &self,
        id: Uuid,
        request: GoalRequest,
        cancel: CancellationToken,
        feedback: mpsc::UnboundedSender<GoalFeedback>,
    ) -> GoalOutcome {
        let _active = self.active.token();
        let goal = Goal::new(id, request.kind(), feedback);
        info!(goal_id = %id, kind = %goal.kind, "goal received");
        match request {
            GoalRequest::Trajectory(target) => self.trajectory(goal, target, cancel).await,
            GoalRequest::Navigate(target) => self.navigate(goal, target, cancel).await,
        }
    }

    // ── Trajectory ──────────────────────────────────────────────────────────

    async fn trajectory(
        &self,
        mut goal: Goal,
        target: TrajectoryGoal,
        cancel: CancellationToken,
    ) -> GoalOutcome {
        let budget = match validate_trajectory(&target) {
            Ok(budget) => budget,
            Err(e) => {
                warn!(goal_id = %goal.id, error = %e, "trajectory rejected");
                return goal.finish(GoalState::Aborted, None, CommandResult::failed(e.to_string()));
            }
        };

        let precise = target.precise;
        let issued = self.blocking(move |exec| exec.trajectory(&target)).await;
        if !issued.success {
            return goal.finish(GoalState::Aborted, None, issued);
        }
        goal.transition(GoalState::Monitoring);

        let timeout = tokio::time::sleep(budget);
        tokio::pin!(timeout);
        let mut tick = tokio::time::interval(FEEDBACK_PERIOD);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // At most one progress query runs at a time; it never blocks the
        // cancel, timeout or shutdown branches.
        let mut in_flight: Option<JoinHandle<Result<TrajectoryProgress, BridgeError>>> = None;

        loop {
            let progress = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.stop(&goal).await;
                    return goal.finish(
                        GoalState::Preempted,
                        Some(PREEMPTED),
                        CommandResult::failed("goal preempted"),
                    );
                }
                _ = &mut timeout => {
                    self.stop(&goal).await;
                    let e = BridgeError::Timeout(format!(
                        "{TIMED_OUT} after {:.1}s",
                        budget.as_secs_f64()
                    ));
                    return goal.finish(
                        GoalState::TimedOut,
                        Some(TIMED_OUT),
                        CommandResult::failed(e.to_string()),
                    );
                }
                _ = self.shutdown.cancelled() => {
                    self.stop(&goal).await;
                    return goal.finish(
                        GoalState::Aborted,
                        Some(FAILED),
                        CommandResult::failed(format!("{FAILED}: bridge shutting down")),
                    );
                }
                joined = join_in_flight(&mut in_flight) => {
                    in_flight = None;
                    joined
                }
                _ = tick.tick() => {
                    if in_flight.is_none() {
                        let exec = self.executor.clone();
                        in_flight =
                            Some(tokio::task::spawn_blocking(move || exec.trajectory_progress()));
                    }
                    continue;
                }
            };

            let progress = match progress {
                Ok(Ok(progress)) => progress,
                Ok(Err(e)) => {
                    debug!(goal_id = %goal.id, error = %e, "progress poll failed");
                    continue;
                }
                Err(e) => {
                    warn!(goal_id = %goal.id, error = %e, "progress task failed");
                    continue;
                }
            };
            if progress.at_goal {
                return goal.finish(GoalState::Succeeded, Some(REACHED), issued);
            }
            goal.emit(match (progress.near_goal, precise) {
                (true, true) => NEAR_PRECISE,
                (true, false) => NEAR,
                (false, _) => MOVING,
            });
        }
    }

    // ── Navigate ────────────────────────────────────────────────────────────

    async fn navigate(
        &self,
        mut goal: Goal,
        target: NavigateGoal,
        cancel: CancellationToken,
    ) -> GoalOutcome {
        if let Err(e) = validate_navigate(&target) {
            warn!(goal_id = %goal.id, error = %e, "navigate rejected");
            return goal.finish(GoalState::Aborted, None, CommandResult::failed(e.to_string()));
        }
        goal.transition(GoalState::Monitoring);

        let reporter = ScopedTask::spawn({
            let executor = self.executor.clone();
            let feedback = goal.feedback.clone();
            let goal_id = goal.id;
            move |stop| report_waypoints(executor, feedback, goal_id, stop)
        });

        let exec = self.executor.clone();
        let mut navigation = tokio::task::spawn_blocking(move || exec.navigate(&target));

        let finished = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GoalState::Preempted),
            _ = self.shutdown.cancelled() => Err(GoalState::Aborted),
            joined = &mut navigation => Ok(joined),
        };

        let joined = match finished {
            Ok(joined) => joined,
            Err(state) => {
                self.stop(&goal).await;
                // The blocking call returns once the robot acknowledges the stop.
                match tokio::time::timeout(self.stop_grace, navigation).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!(goal_id = %goal.id, error = %e, "navigate task failed"),
                    Err(_) => {
                        let e = BridgeError::Timeout(format!(
                            "navigation still running {:.1}s after stop",
                            self.stop_grace.as_secs_f64()
                        ));
                        warn!(goal_id = %goal.id, error = %e, "abandoning navigate call");
                    }
                }
                reporter.stop().await;
                let (feedback, result) = if state == GoalState::Preempted {
                    (PREEMPTED, CommandResult::failed("goal preempted"))
                } else {
                    (FAILED, CommandResult::failed(format!("{FAILED}: bridge shutting down")))
                };
                return goal.finish(state, Some(feedback), result);
            }
        };

        let result =
            joined.unwrap_or_else(|e| CommandResult::failed(format!("navigate task failed: {e}")));
        reporter.stop().await;
        if result.success {
            goal.finish(GoalState::Succeeded, Some(REACHED), result)
        } else {
            goal.finish(GoalState::Aborted, Some(FAILED), result)
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────────────

    async fn stop(&self, goal: &Goal) {
        let result = self.blocking(|exec| exec.stop()).await;
        if !result.success {
            warn!(goal_id = %goal.id, message = %result.message, "stop failed");
        }
    }

    async fn blocking<F>(&self, f: F) -> CommandResult
    where
        F: FnOnce(&CommandExecutor) -> CommandResult + Send + 'static,
    {
        let exec = self.executor.clone();
        tokio::task::spawn_blocking(move || f(&exec))
            .await
            .unwrap_or_else(|e| CommandResult::failed(format!("blocking task failed: {e}")))
    }
}

async fn report_waypoints(
    executor: Arc<CommandExecutor>,
    feedback: mpsc::UnboundedSender<GoalFeedback>,
    goal_id: Uuid,
    stop: CancellationToken,
) {
    let mut tick = tokio::time::interval(FEEDBACK_PERIOD);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut in_flight: Option<JoinHandle<Result<Option<String>, BridgeError>>> = None;
    loop {
        let joined = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            joined = join_in_flight(&mut in_flight) => {
                in_flight = None;
                joined
            }
            _ = tick.tick() => {
                if in_flight.is_none() {
                    let exec = executor.clone();
                    in_flight =
                        Some(tokio::task::spawn_blocking(move || exec.localization_waypoint()));
                }
                continue;
            }
        };
        match joined {
            Ok(Ok(Some(waypoint))) if !stop.is_cancelled() => emit(&feedback, goal_id, waypoint),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!(%goal_id, error = %e, "localization poll failed"),
            Err(e) => warn!(%goal_id, error = %e, "localization task failed"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scope-bound task
// ─────────────────────────────────────────────────────────────────────────────

/// A spawned task tied to a scope: [`stop`][Self::stop] signals and joins it,
/// dropping without `stop` signals and aborts it.
struct ScopedTask {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ScopedTask {
    fn spawn<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let handle = tokio::spawn(f(token.clone()));
        Self {
            token,
            handle: Some(handle),
        }
    }

    async fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "scoped task ended abnormally");
            }
        }
    }
}

impl Drop for ScopedTask {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Goal handle
// ─────────────────────────────────────────────────────────────────────────────

/// A goal running on its own task.
pub struct GoalHandle {
    pub id: Uuid,
    cancel: CancellationToken,
    /// Advisory feedback; closes once the goal is terminal.
    pub feedback: mpsc::UnboundedReceiver<GoalFeedback>,
    task: JoinHandle<GoalOutcome>,
}

impl GoalHandle {
    /// Request preemption.  The outcome still has to be awaited.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the terminal outcome.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Channel`] if the goal task panicked or was
    /// aborted.
    pub async fn outcome(self) -> Result<GoalOutcome, BridgeError> {
        self.task
            .await
            .map_err(|e| BridgeError::Channel(format!("goal task failed: {e}")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

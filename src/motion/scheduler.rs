//! Keyframe scheduler.
//!
//! The scheduler is a deadline-driven state machine: [`MotionScheduler::start`]
//! loads a command, and each [`MotionScheduler::advance`] performs every action
//! that is due at `now` and reports the next deadline. [`MotionScheduler::run`]
//! drives one command to completion by sleeping until each deadline, which is
//! the blocking execution mode. A control loop that wants to keep reading
//! input during motion can call `advance` itself when the deadline fires.
//!
//! Per keyframe: presence resolution and start angles come from the groups'
//! recorded positions, the policy steps the joints, the addressed groups
//! commit their targets, then the keyframe holds for `duration / frames`.

use super::policy::{FrameMotion, InterpolationPolicy, StepOutcome};
use super::MotionError;
use crate::command::MotionCommand;
use crate::hardware::ActuatorGroup;
use tokio::time::{Duration, Instant};

/// Result of one [`MotionScheduler::advance`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    Idle,
    /// Nothing more to do until the given instant.
    Pending(Instant),
    Completed(CommandReport),
}

/// Summary of a finished command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandReport {
    pub token: String,
    pub keyframes: usize,
    /// Software steps taken per keyframe (zero under native smoothing).
    pub steps: Vec<u32>,
    pub elapsed: Duration,
}

#[derive(Debug)]
enum Phase {
    Moving(FrameMotion),
    Holding,
}

#[derive(Debug)]
struct ActiveCommand {
    command: MotionCommand,
    frame: usize,
    phase: Phase,
    deadline: Instant,
    started: Instant,
    steps: Vec<u32>,
}

pub struct MotionScheduler {
    groups: Vec<ActuatorGroup>,
    policy: Box<dyn InterpolationPolicy>,
    active: Option<ActiveCommand>,
}

impl MotionScheduler {
    pub fn new(groups: Vec<ActuatorGroup>, policy: Box<dyn InterpolationPolicy>) -> Self {
        Self {
            groups,
            policy,
            active: None,
        }
    }

    pub fn groups(&self) -> &[ActuatorGroup] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&ActuatorGroup> {
        self.groups.iter().find(|g| g.name() == name)
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// Token of the command in flight, if any.
    pub fn current_token(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.command.token.as_str())
    }

    /// When the next action is due, if a command is in flight.
    pub fn deadline(&self) -> Option<Instant> {
        self.active.as_ref().map(|a| a.deadline)
    }

    /// Loads `command`; its first keyframe begins on the next `advance`.
    pub fn start(&mut self, command: MotionCommand, now: Instant) -> Result<(), MotionError> {
        if let Some(active) = &self.active {
            return Err(MotionError::Busy(active.command.token.clone()));
        }
        if command.keyframes.is_empty() {
            return Err(MotionError::EmptyKeyframeList);
        }
        tracing::info!(
            "Starting '{}': {} keyframes over {}s ({})",
            command.token,
            command.frame_count(),
            command.duration,
            self.policy.name()
        );
        let first = FrameMotion::plan(&command.keyframes[0], &self.groups);
        self.log_frame(0, &first);
        self.active = Some(ActiveCommand {
            command,
            frame: 0,
            phase: Phase::Moving(first),
            deadline: now,
            started: now,
            steps: Vec::new(),
        });
        Ok(())
    }

    /// Performs every action due at `now`.
    ///
    /// A hardware failure abandons the command; recorded angles keep the
    /// values of the last keyframe that completed.
    pub fn advance(&mut self, now: Instant) -> Result<Progress, MotionError> {
        let Some(mut active) = self.active.take() else {
            return Ok(Progress::Idle);
        };
        loop {
            if now < active.deadline {
                let deadline = active.deadline;
                self.active = Some(active);
                return Ok(Progress::Pending(deadline));
            }
            match &mut active.phase {
                Phase::Moving(motion) => match self.policy.step(motion, &mut self.groups)? {
                    StepOutcome::Moved(delay) => {
                        active.deadline = after(active.deadline, delay)?;
                    }
                    StepOutcome::Settled => {
                        motion.commit(&mut self.groups);
                        active.steps.push(motion.steps_taken());
                        active.phase = Phase::Holding;
                        active.deadline = after(active.deadline, active.command.frame_hold())?;
                    }
                },
                Phase::Holding => {
                    active.frame += 1;
                    if active.frame >= active.command.keyframes.len() {
                        let report = CommandReport {
                            token: active.command.token,
                            keyframes: active.frame,
                            steps: active.steps,
                            elapsed: now.duration_since(active.started),
                        };
                        tracing::info!("Finished '{}' in {:?}", report.token, report.elapsed);
                        return Ok(Progress::Completed(report));
                    }
                    let motion = FrameMotion::plan(&active.command.keyframes[active.frame], &self.groups);
                    self.log_frame(active.frame, &motion);
                    active.phase = Phase::Moving(motion);
                }
            }
        }
    }

    /// Runs `command` to completion, sleeping between actions.
    pub async fn run(&mut self, command: MotionCommand) -> Result<CommandReport, MotionError> {
        self.start(command, Instant::now())?;
        loop {
            match self.advance(Instant::now())? {
                Progress::Pending(deadline) => tokio::time::sleep_until(deadline).await,
                Progress::Completed(report) => return Ok(report),
                Progress::Idle => return Err(MotionError::NotRunning),
            }
        }
    }

    fn log_frame(&self, frame: usize, motion: &FrameMotion) {
        let addressed: Vec<&str> = motion
            .addressed_groups()
            .map(|g| self.groups[g].name())
            .collect();
        tracing::debug!(
            "Keyframe {}: groups {:?}, {} steps",
            frame,
            addressed,
            motion.max_steps()
        );
    }
}

/// Next deadline, counted from the previous one so late wakeups do not
/// accumulate.
fn after(deadline: Instant, delay: Duration) -> Result<Instant, MotionError> {
    deadline
        .checked_add(delay)
        .ok_or(MotionError::DeadlineOverflow(delay))
}

impl std::fmt::Debug for MotionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionScheduler")
            .field("groups", &self.groups)
            .field("policy", &self.policy.name())
            .field("active", &self.current_token())
            .finish()
    }
}

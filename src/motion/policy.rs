//! Interpolation policies.
//!
//! A policy moves the joints of one keyframe from their recorded start
//! angles to the keyframe targets. The scheduler calls [`InterpolationPolicy::step`]
//! repeatedly, sleeping for the returned delay between calls, until the
//! policy reports [`StepOutcome::Settled`].

use crate::command::Keyframe;
use crate::hardware::{ActuatorGroup, HardwareError};
use std::time::Duration;

/// One addressed joint within a keyframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointMotion {
    pub group: usize,
    pub index: usize,
    pub current: i32,
    pub target: i32,
}

impl JointMotion {
    pub fn remaining(&self) -> u32 {
        self.target.abs_diff(self.current)
    }

    pub fn is_settled(&self) -> bool {
        self.current == self.target
    }

    /// Moves one degree toward the target; settled joints hold.
    fn advance(&mut self) {
        self.current += (self.target - self.current).signum();
    }
}

/// Per-keyframe motion state: which groups move, where every joint is, and
/// how far the stepping has progressed.
#[derive(Debug, Clone)]
pub struct FrameMotion {
    joints: Vec<JointMotion>,
    targets: Vec<(usize, Vec<i32>)>,
    max_steps: u32,
    steps_taken: u32,
    issued: bool,
}

impl FrameMotion {
    /// Resolves which groups `keyframe` addresses and starts each addressed
    /// joint from its group's recorded angle.
    pub fn plan(keyframe: &Keyframe, groups: &[ActuatorGroup]) -> Self {
        let mut joints = Vec::new();
        let mut targets = Vec::new();
        for (g, group) in groups.iter().enumerate() {
            let Some(angles) = keyframe.targets(group.name()) else {
                continue;
            };
            if angles.len() != group.len() {
                tracing::debug!(
                    "Group {} expects {} targets, keyframe has {}; group holds",
                    group.name(),
                    group.len(),
                    angles.len()
                );
                continue;
            }
            for (index, (&start, &target)) in group.last_angles().iter().zip(angles).enumerate() {
                joints.push(JointMotion { group: g, index, current: start, target });
            }
            targets.push((g, angles.to_vec()));
        }
        let max_steps = joints.iter().map(JointMotion::remaining).max().unwrap_or(0);
        Self {
            joints,
            targets,
            max_steps,
            steps_taken: 0,
            issued: false,
        }
    }

    /// Largest angular delta over every addressed joint.
    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    pub fn steps_taken(&self) -> u32 {
        self.steps_taken
    }

    pub fn joints(&self) -> &[JointMotion] {
        &self.joints
    }

    pub fn is_addressed(&self, group: usize) -> bool {
        self.targets.iter().any(|(g, _)| *g == group)
    }

    pub fn addressed_groups(&self) -> impl Iterator<Item = usize> + '_ {
        self.targets.iter().map(|(g, _)| *g)
    }

    /// Overwrites the recorded angles of every addressed group with its targets.
    pub(crate) fn commit(&self, groups: &mut [ActuatorGroup]) {
        for (g, angles) in &self.targets {
            groups[*g].commit(angles);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Joints were written; call again after the delay.
    Moved(Duration),
    /// The keyframe's motion is complete.
    Settled,
}

pub trait InterpolationPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn step(
        &self,
        frame: &mut FrameMotion,
        groups: &mut [ActuatorGroup],
    ) -> Result<StepOutcome, HardwareError>;
}

/// Hands each target to the driver's speed-limited move and settles at once.
#[derive(Debug, Clone)]
pub struct NativeSmoothing {
    speed: u8,
}

impl NativeSmoothing {
    pub fn new(speed: u8) -> Self {
        Self { speed }
    }

    pub fn speed(&self) -> u8 {
        self.speed
    }
}

impl InterpolationPolicy for NativeSmoothing {
    fn name(&self) -> &'static str {
        "native_smoothing"
    }

    fn step(
        &self,
        frame: &mut FrameMotion,
        groups: &mut [ActuatorGroup],
    ) -> Result<StepOutcome, HardwareError> {
        if !frame.issued {
            for joint in &mut frame.joints {
                groups[joint.group].write_smooth(joint.index, joint.target, self.speed)?;
                joint.current = joint.target;
            }
            frame.issued = true;
        }
        Ok(StepOutcome::Settled)
    }
}

/// One degree per joint per step, every addressed joint written each step.
///
/// Stepping lasts `max_steps` steps; joints with a smaller delta reach their
/// target early and hold.
#[derive(Debug, Clone)]
pub struct SoftwareStep {
    step_delay: Duration,
}

impl SoftwareStep {
    pub fn new(step_delay: Duration) -> Self {
        Self { step_delay }
    }

    pub fn step_delay(&self) -> Duration {
        self.step_delay
    }
}

impl InterpolationPolicy for SoftwareStep {
    fn name(&self) -> &'static str {
        "software_step"
    }

    fn step(
        &self,
        frame: &mut FrameMotion,
        groups: &mut [ActuatorGroup],
    ) -> Result<StepOutcome, HardwareError> {
        if frame.steps_taken >= frame.max_steps {
            return Ok(StepOutcome::Settled);
        }
        for joint in &mut frame.joints {
            joint.advance();
            groups[joint.group].write(joint.index, joint.current)?;
        }
        frame.steps_taken += 1;
        Ok(StepOutcome::Moved(self.step_delay))
    }
}

// src/motion/mod.rs
pub mod policy;
pub mod scheduler;

pub use policy::{FrameMotion, InterpolationPolicy, JointMotion, NativeSmoothing, SoftwareStep, StepOutcome};
pub use scheduler::{CommandReport, MotionScheduler, Progress};

use crate::config::{MotionConfig, PolicyKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MotionError {
    #[error("Scheduler busy with command '{0}'")]
    Busy(String),
    #[error("No keyframes!")]
    EmptyKeyframeList,
    #[error("Next deadline is {0:?} away and cannot be scheduled")]
    DeadlineOverflow(std::time::Duration),
    #[error("No command in progress")]
    NotRunning,
    #[error("Hardware error: {0}")]
    Hardware(#[from] crate::hardware::HardwareError),
}

/// Policy selected by the deployment's motion configuration.
pub fn policy_from_config(config: &MotionConfig) -> Box<dyn InterpolationPolicy> {
    match config.policy {
        PolicyKind::NativeSmoothing => {
            tracing::info!("Using native smoothing at speed {}", config.smoothing_speed);
            Box::new(NativeSmoothing::new(config.smoothing_speed))
        }
        PolicyKind::SoftwareStep => {
            tracing::info!("Using software stepping, {}ms per degree", config.step_delay_ms);
            Box::new(SoftwareStep::new(config.step_delay()))
        }
    }
}

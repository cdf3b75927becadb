//! gesture-rs: keyframe servo motion controller.
//!
//! A host sends one JSON gesture per line. The controller buffers lines in a
//! bounded queue, decodes them into per-group target angles and moves the
//! configured actuator groups through each keyframe, answering `ACK` when a
//! gesture has finished.

pub mod command;
pub mod communication;
pub mod config;
pub mod controller;
pub mod hardware;
pub mod host;
pub mod motion;

pub use command::{CommandDecoder, CommandQueue, DecodeError, Keyframe, MotionCommand};
pub use config::{Config, ExecutionMode, PolicyKind};
pub use controller::{Controller, ControllerError, ControllerStats, ACK};
pub use hardware::{Actuator, ActuatorGroup, HardwareError};
pub use motion::{InterpolationPolicy, MotionError, MotionScheduler, NativeSmoothing, SoftwareStep};

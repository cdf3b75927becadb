// src/command/mod.rs - Motion commands as they travel from the wire to the scheduler
pub mod decoder;
pub mod queue;

pub use decoder::{CommandDecoder, DecodeError};
pub use queue::{CommandQueue, QueueError};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Placeholder used when a command carries no usable token.
pub const UNKNOWN_TOKEN: &str = "<unknown>";

/// Longest hold the scheduler will wait after one keyframe (one year).
pub const MAX_FRAME_HOLD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// One decoded gesture: a token for diagnostics, a time budget and its keyframes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionCommand {
    #[serde(default = "unknown_token")]
    pub token: String,
    #[serde(default = "one_second")]
    pub duration: f64,
    pub keyframes: Vec<Keyframe>,
}

impl MotionCommand {
    pub fn new(token: &str, duration: f64, keyframes: Vec<Keyframe>) -> Self {
        Self {
            token: token.to_string(),
            duration,
            keyframes,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.keyframes.len()
    }

    /// Hold time after each keyframe, `duration / frame_count`.
    ///
    /// A duration whose hold is negative, not a number or beyond
    /// [`MAX_FRAME_HOLD`] yields no hold.
    pub fn frame_hold(&self) -> Duration {
        Self::hold_for(self.duration, self.keyframes.len()).unwrap_or(Duration::ZERO)
    }

    /// Per-keyframe hold for `duration` spread over `frames` keyframes, if
    /// it can be scheduled.
    pub fn hold_for(duration: f64, frames: usize) -> Option<Duration> {
        if frames == 0 {
            return Some(Duration::ZERO);
        }
        Duration::try_from_secs_f64(duration / frames as f64)
            .ok()
            .filter(|hold| *hold <= MAX_FRAME_HOLD)
    }
}

/// Target angles per group. A group missing from the map does not move.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Keyframe {
    targets: BTreeMap<String, Vec<i32>>,
}

impl Keyframe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, name: &str, angles: &[i32]) -> Self {
        self.insert(name, angles.to_vec());
        self
    }

    pub fn insert(&mut self, name: &str, angles: Vec<i32>) {
        self.targets.insert(name.to_string(), angles);
    }

    pub fn targets(&self, name: &str) -> Option<&[i32]> {
        self.targets.get(name).map(Vec::as_slice)
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &[i32])> {
        self.targets.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

fn unknown_token() -> String {
    UNKNOWN_TOKEN.to_string()
}

fn one_second() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_hold_divides_duration() {
        let cmd = MotionCommand::new(
            "HELLO",
            1.0,
            vec![Keyframe::new(), Keyframe::new(), Keyframe::new(), Keyframe::new()],
        );
        assert_eq!(cmd.frame_hold(), Duration::from_millis(250));
    }

    #[test]
    fn test_keyframe_serializes_as_plain_map() {
        let frame = Keyframe::new().with_group("LE", &[45]).with_group("L", &[0, 1, 2, 3, 4]);
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"L":[0,1,2,3,4],"LE":[45]}"#);
    }

    #[test]
    fn test_strict_deserialize_fills_defaults() {
        let cmd: MotionCommand = serde_json::from_str(r#"{"keyframes":[{"L":[1,2]}]}"#).unwrap();
        assert_eq!(cmd.token, UNKNOWN_TOKEN);
        assert_eq!(cmd.duration, 1.0);
        assert_eq!(cmd.keyframes[0].targets("L"), Some(&[1, 2][..]));
    }

    #[test]
    fn test_unschedulable_hold_is_rejected() {
        assert_eq!(MotionCommand::hold_for(2.0, 4), Some(Duration::from_millis(500)));
        assert_eq!(MotionCommand::hold_for(1e30, 1), None);
        assert_eq!(MotionCommand::hold_for(1e18, 2), None);
        assert_eq!(MotionCommand::hold_for(f64::NAN, 1), None);
        let cmd = MotionCommand::new("BIG", 1e30, vec![Keyframe::new()]);
        assert_eq!(cmd.frame_hold(), Duration::ZERO);
    }
}

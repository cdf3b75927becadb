//! Decoding of one command line into a [`MotionCommand`].
//!
//! The decoder is lenient below the command level: a group array whose
//! shape does not match the configured group is dropped from that keyframe
//! and the rest of the command still runs. Only unparseable input, an
//! oversized line and a command without keyframes are rejected outright.

use super::{Keyframe, MotionCommand, UNKNOWN_TOKEN};
use crate::config::Config;
use serde_json::{Map, Value};
use std::ops::RangeInclusive;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("JSON parse error: {0}")]
    MalformedSyntax(String),
    #[error("No keyframes!")]
    EmptyKeyframeList,
    #[error("Command too long ({len} > {max} bytes)")]
    TooLarge { len: usize, max: usize },
}

/// Shape of one configured group as the decoder sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct GroupShape {
    name: String,
    actuators: usize,
}

#[derive(Debug, Clone)]
pub struct CommandDecoder {
    groups: Vec<GroupShape>,
    angle_range: RangeInclusive<i32>,
    default_duration: f64,
    max_len: usize,
}

impl CommandDecoder {
    /// Decoder for the given `(group name, actuator count)` layout with the
    /// stock limits (0..=180 degrees, 1 s default duration, 2048 byte lines).
    pub fn new(layout: Vec<(String, usize)>) -> Self {
        Self {
            groups: layout
                .into_iter()
                .map(|(name, actuators)| GroupShape { name, actuators })
                .collect(),
            angle_range: 0..=180,
            default_duration: 1.0,
            max_len: 2048,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.group_layout())
            .with_angle_range(config.motion.angle_range())
            .with_default_duration(config.motion.default_duration)
            .with_max_len(config.controller.max_command_len)
    }

    pub fn with_angle_range(mut self, range: RangeInclusive<i32>) -> Self {
        self.angle_range = range;
        self
    }

    pub fn with_default_duration(mut self, duration: f64) -> Self {
        self.default_duration = duration;
        self
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    pub fn decode(&self, text: &str) -> Result<MotionCommand, DecodeError> {
        if text.len() > self.max_len {
            return Err(DecodeError::TooLarge { len: text.len(), max: self.max_len });
        }
        let doc: Value =
            serde_json::from_str(text).map_err(|e| DecodeError::MalformedSyntax(e.to_string()))?;
        let Value::Object(doc) = doc else {
            return Err(DecodeError::MalformedSyntax("expected a JSON object".to_string()));
        };

        let token = match doc.get("token") {
            Some(Value::String(token)) => token.clone(),
            _ => UNKNOWN_TOKEN.to_string(),
        };
        let frames = match doc.get("keyframes") {
            Some(Value::Array(frames)) if !frames.is_empty() => frames,
            _ => return Err(DecodeError::EmptyKeyframeList),
        };
        let duration = self.duration(doc.get("duration"), frames.len());

        let keyframes = frames
            .iter()
            .enumerate()
            .map(|(index, frame)| match frame {
                Value::Object(frame) => self.keyframe(index, frame),
                other => {
                    tracing::debug!("Keyframe {} is not an object ({}), no group moves", index, other);
                    Keyframe::new()
                }
            })
            .collect();

        Ok(MotionCommand { token, duration, keyframes })
    }

    /// Requested duration, or the default when it is not a positive number
    /// whose per-keyframe hold fits in a timer.
    fn duration(&self, value: Option<&Value>, frames: usize) -> f64 {
        match value.and_then(Value::as_f64) {
            Some(d) if d.is_finite() && d > 0.0 && MotionCommand::hold_for(d, frames).is_some() => d,
            Some(d) => {
                tracing::warn!("Invalid duration {}, using {}s", d, self.default_duration);
                self.default_duration
            }
            None => self.default_duration,
        }
    }

    fn keyframe(&self, index: usize, frame: &Map<String, Value>) -> Keyframe {
        let mut keyframe = Keyframe::new();
        for key in frame.keys() {
            if !self.groups.iter().any(|g| &g.name == key) {
                tracing::debug!("Keyframe {}: ignoring unknown group '{}'", index, key);
            }
        }
        for group in &self.groups {
            let Some(value) = frame.get(&group.name) else {
                continue;
            };
            match self.angles(value, group.actuators) {
                Some(angles) => keyframe.insert(&group.name, angles),
                None => tracing::debug!(
                    "Keyframe {}: group '{}' expects {} angles in {:?}, got {}; group skipped",
                    index,
                    group.name,
                    group.actuators,
                    self.angle_range,
                    value
                ),
            }
        }
        keyframe
    }

    /// Target array for a group, or `None` when its shape does not fit.
    fn angles(&self, value: &Value, expected: usize) -> Option<Vec<i32>> {
        let items = value.as_array()?;
        if items.len() != expected {
            return None;
        }
        items
            .iter()
            .map(|item| {
                let angle = match item.as_i64() {
                    Some(n) => n,
                    None => item.as_f64()?.trunc() as i64,
                };
                let angle = i32::try_from(angle).ok()?;
                self.angle_range.contains(&angle).then_some(angle)
            })
            .collect()
    }
}

//! # Controller Configuration
//!
//! Deployment layout (actuator groups and their pins), queue sizing, the
//! interpolation policy and the transport settings, all loaded once at
//! startup from a TOML file.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [controller]
//! label = "LEFT_ARM"
//! queue_capacity = 3
//!
//! [motion]
//! policy = "software_step"
//! step_delay_ms = 2
//!
//! [[groups]]
//! name = "L"
//! pins = [12, 14, 27, 26, 25]
//!
//! [[groups]]
//! name = "LE"
//! pins = [22]
//! ```
//!
//! Missing sections fall back to the left-arm layout, so an empty file is
//! a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct for the controller, its transport, motion and groups.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default = "default_groups")]
    pub groups: Vec<GroupConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self::left_arm()
    }
}

/// How the control loop interleaves input reception with motion.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Input is not read while a command executes.
    Blocking,
    /// Input keeps flowing into the queue while the scheduler runs.
    Concurrent,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_max_command_len")]
    pub max_command_len: usize,
    #[serde(default = "default_execution")]
    pub execution: ExecutionMode,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
            queue_capacity: default_queue_capacity(),
            max_command_len: default_max_command_len(),
            execution: default_execution(),
        }
    }
}

/// Host link settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud: default_baud(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    NativeSmoothing,
    SoftwareStep,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MotionConfig {
    #[serde(default = "default_policy")]
    pub policy: PolicyKind,
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    #[serde(default = "default_smoothing_speed")]
    pub smoothing_speed: u8,
    #[serde(default = "default_neutral_angle")]
    pub neutral_angle: i32,
    #[serde(default = "default_duration")]
    pub default_duration: f64,
    #[serde(default = "default_min_angle")]
    pub min_angle: i32,
    #[serde(default = "default_max_angle")]
    pub max_angle: i32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            policy: default_policy(),
            step_delay_ms: default_step_delay_ms(),
            smoothing_speed: default_smoothing_speed(),
            neutral_angle: default_neutral_angle(),
            default_duration: default_duration(),
            min_angle: default_min_angle(),
            max_angle: default_max_angle(),
        }
    }
}

impl MotionConfig {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    pub fn angle_range(&self) -> std::ops::RangeInclusive<i32> {
        self.min_angle..=self.max_angle
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Simulated,
    Mcu,
}

/// Actuator back-end selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriverConfig {
    #[serde(default = "default_driver_kind")]
    pub kind: DriverKind,
    #[serde(default = "default_driver_port")]
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            kind: default_driver_kind(),
            port: default_driver_port(),
            baud: default_baud(),
        }
    }
}

/// One named actuator group; the pin list fixes its actuator count.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct GroupConfig {
    pub name: String,
    pub pins: Vec<u8>,
}

impl GroupConfig {
    pub fn new(name: &str, pins: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            pins: pins.to_vec(),
        }
    }
}

impl Config {
    /// Hand plus wrist, elbow and shoulder, stepped in software.
    pub fn left_arm() -> Self {
        Self {
            controller: ControllerConfig::default(),
            serial: SerialConfig::default(),
            motion: MotionConfig::default(),
            driver: DriverConfig::default(),
            groups: default_groups(),
        }
    }

    /// Single five-finger hand driven through the servo's own smoothing.
    pub fn hand() -> Self {
        Self {
            controller: ControllerConfig {
                label: "ESP32".to_string(),
                ..ControllerConfig::default()
            },
            serial: SerialConfig::default(),
            motion: MotionConfig {
                policy: PolicyKind::NativeSmoothing,
                ..MotionConfig::default()
            },
            driver: DriverConfig::default(),
            groups: vec![GroupConfig::new("L", &[2, 3, 4, 5, 6])],
        }
    }

    /// Group names paired with their actuator counts, in configuration order.
    pub fn group_layout(&self) -> Vec<(String, usize)> {
        self.groups
            .iter()
            .map(|g| (g.name.clone(), g.pins.len()))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.controller.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be > 0".to_string()));
        }
        if self.controller.max_command_len == 0 {
            return Err(ConfigError::Invalid("max_command_len must be > 0".to_string()));
        }
        let motion = &self.motion;
        if motion.min_angle > motion.max_angle {
            return Err(ConfigError::Invalid(format!(
                "min_angle {} exceeds max_angle {}",
                motion.min_angle, motion.max_angle
            )));
        }
        if !motion.angle_range().contains(&motion.neutral_angle) {
            return Err(ConfigError::Invalid(format!(
                "neutral_angle {} outside {}..={}",
                motion.neutral_angle, motion.min_angle, motion.max_angle
            )));
        }
        if !(motion.default_duration.is_finite() && motion.default_duration > 0.0) {
            return Err(ConfigError::Invalid("default_duration must be > 0".to_string()));
        }
        if motion.smoothing_speed == 0 {
            return Err(ConfigError::Invalid("smoothing_speed must be between 1 and 255".to_string()));
        }
        if self.groups.is_empty() {
            return Err(ConfigError::Invalid("at least one group is required".to_string()));
        }
        let mut seen = HashSet::new();
        for group in &self.groups {
            if group.name.is_empty() {
                return Err(ConfigError::Invalid("group name cannot be empty".to_string()));
            }
            if group.pins.is_empty() {
                return Err(ConfigError::Invalid(format!("group '{}' has no pins", group.name)));
            }
            if !seen.insert(group.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate group '{}'", group.name)));
            }
        }
        Ok(())
    }
}

// Default value functions
fn default_label() -> String { "LEFT_ARM".to_string() }
fn default_queue_capacity() -> usize { 3 }
fn default_max_command_len() -> usize { 2048 }
fn default_execution() -> ExecutionMode { ExecutionMode::Blocking }
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_driver_port() -> String { "/dev/ttyACM0".to_string() }
fn default_baud() -> u32 { 115200 }
fn default_policy() -> PolicyKind { PolicyKind::SoftwareStep }
fn default_step_delay_ms() -> u64 { 2 }
fn default_smoothing_speed() -> u8 { 225 }
fn default_neutral_angle() -> i32 { 90 }
fn default_duration() -> f64 { 1.0 }
fn default_min_angle() -> i32 { 0 }
fn default_max_angle() -> i32 { 180 }
fn default_driver_kind() -> DriverKind { DriverKind::Simulated }
fn default_groups() -> Vec<GroupConfig> {
    vec![
        GroupConfig::new("L", &[12, 14, 27, 26, 25]),
        GroupConfig::new("LW", &[32, 33]),
        GroupConfig::new("LE", &[22]),
        GroupConfig::new("LS", &[23, 25]),
    ]
}

/// Load and validate configuration from a TOML file at the given path.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!("Failed to read config file '{}': {}", path.display(), e);
        ConfigError::Io(e)
    })?;
    let config: Config = toml::from_str(&contents).map_err(|e| {
        tracing::error!("Failed to parse config TOML: {}", e);
        ConfigError::Toml(e)
    })?;
    config.validate()?;
    Ok(config)
}

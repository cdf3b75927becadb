// src/hardware/mod.rs - Actuator groups and the driver capability they wrap
pub mod mcu;
pub mod simulated;

use crate::config::{Config, DriverKind, GroupConfig};
use thiserror::Error;

pub use mcu::{McuServo, McuServoBus};
pub use simulated::{ServoJournal, ServoWrite, SimulatedServo};

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("Actuator on pin {0} is not attached")]
    NotAttached(u8),
    #[error("Group '{group}' has no actuator {index}")]
    IndexOutOfRange { group: String, index: usize },
    #[error("Servo bus closed")]
    BusClosed,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Low-level servo driver: turns an angle into a pulse on one pin.
///
/// Implementations never report a position back; the owning
/// [`ActuatorGroup`] keeps the last commanded angle instead.
pub trait Actuator: Send {
    fn pin(&self) -> u8;
    fn attach(&mut self) -> Result<(), HardwareError>;
    /// Jump to `angle` immediately.
    fn write(&mut self, angle: i32) -> Result<(), HardwareError>;
    /// Move to `angle` using the driver's own speed-limited ramp.
    fn write_smooth(&mut self, angle: i32, speed: u8) -> Result<(), HardwareError>;
}

/// A named, ordered set of actuators plus the last angle commanded to each.
pub struct ActuatorGroup {
    name: String,
    actuators: Vec<Box<dyn Actuator>>,
    last_angles: Vec<i32>,
}

impl ActuatorGroup {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            actuators: Vec::new(),
            last_angles: Vec::new(),
        }
    }

    /// Attaches a handle and drives it to `neutral`, which becomes its
    /// recorded position.
    pub fn attach(&mut self, mut handle: Box<dyn Actuator>, neutral: i32) -> Result<(), HardwareError> {
        handle.attach()?;
        handle.write(neutral)?;
        self.actuators.push(handle);
        self.last_angles.push(neutral);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.actuators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actuators.is_empty()
    }

    pub fn last_angles(&self) -> &[i32] {
        &self.last_angles
    }

    pub fn pins(&self) -> Vec<u8> {
        self.actuators.iter().map(|a| a.pin()).collect()
    }

    pub fn write(&mut self, index: usize, angle: i32) -> Result<(), HardwareError> {
        self.actuator(index)?.write(angle)
    }

    pub fn write_smooth(&mut self, index: usize, angle: i32, speed: u8) -> Result<(), HardwareError> {
        self.actuator(index)?.write_smooth(angle, speed)
    }

    /// Records `targets` as the group's position once a keyframe settles.
    pub(crate) fn commit(&mut self, targets: &[i32]) {
        debug_assert_eq!(targets.len(), self.last_angles.len());
        self.last_angles.copy_from_slice(targets);
    }

    fn actuator(&mut self, index: usize) -> Result<&mut Box<dyn Actuator>, HardwareError> {
        let group = &self.name;
        self.actuators
            .get_mut(index)
            .ok_or_else(|| HardwareError::IndexOutOfRange { group: group.clone(), index })
    }
}

impl std::fmt::Debug for ActuatorGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActuatorGroup")
            .field("name", &self.name)
            .field("pins", &self.pins())
            .field("last_angles", &self.last_angles)
            .finish()
    }
}

/// Builds every configured group, creating one handle per pin with `make`.
pub fn build_groups<F>(
    groups: &[GroupConfig],
    neutral: i32,
    mut make: F,
) -> Result<Vec<ActuatorGroup>, HardwareError>
where
    F: FnMut(&GroupConfig, u8) -> Box<dyn Actuator>,
{
    let mut built = Vec::with_capacity(groups.len());
    for config in groups {
        let mut group = ActuatorGroup::new(&config.name);
        for &pin in &config.pins {
            group.attach(make(config, pin), neutral)?;
        }
        tracing::info!("Attached group {} on pins {:?}", group.name(), config.pins);
        built.push(group);
    }
    Ok(built)
}

/// Builds the configured groups on the configured driver back-end.
pub async fn connect_groups(config: &Config) -> Result<Vec<ActuatorGroup>, HardwareError> {
    let range = config.motion.angle_range();
    let neutral = config.motion.neutral_angle;
    match config.driver.kind {
        DriverKind::Simulated => build_groups(&config.groups, neutral, |_, pin| {
            Box::new(SimulatedServo::new(pin).with_range(range.clone()))
        }),
        DriverKind::Mcu => {
            let bus = McuServoBus::open(&config.driver.port, config.driver.baud).await?;
            build_groups(&config.groups, neutral, |_, pin| Box::new(bus.servo(pin)))
        }
    }
}

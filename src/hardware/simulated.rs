// src/hardware/simulated.rs - In-memory servo for bench runs and tests
use super::{Actuator, HardwareError};
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex};

/// One instruction as received by a simulated servo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServoWrite {
    Jump { pin: u8, angle: i32 },
    Smooth { pin: u8, angle: i32, speed: u8 },
}

impl ServoWrite {
    pub fn pin(&self) -> u8 {
        match *self {
            ServoWrite::Jump { pin, .. } | ServoWrite::Smooth { pin, .. } => pin,
        }
    }

    pub fn angle(&self) -> i32 {
        match *self {
            ServoWrite::Jump { angle, .. } | ServoWrite::Smooth { angle, .. } => angle,
        }
    }
}

/// Shared, ordered log of writes across any number of simulated servos.
#[derive(Debug, Clone, Default)]
pub struct ServoJournal {
    writes: Arc<Mutex<Vec<ServoWrite>>>,
}

impl ServoJournal {
    pub fn record(&self, write: ServoWrite) {
        if let Ok(mut writes) = self.writes.lock() {
            writes.push(write);
        }
    }

    pub fn writes(&self) -> Vec<ServoWrite> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    /// Angles written to one pin, in order.
    pub fn angles_for(&self, pin: u8) -> Vec<i32> {
        self.writes()
            .into_iter()
            .filter(|w| w.pin() == pin)
            .map(|w| w.angle())
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut writes) = self.writes.lock() {
            writes.clear();
        }
    }
}

#[derive(Debug)]
pub struct SimulatedServo {
    pin: u8,
    attached: bool,
    angle: i32,
    range: RangeInclusive<i32>,
    journal: Option<ServoJournal>,
}

impl SimulatedServo {
    pub fn new(pin: u8) -> Self {
        Self {
            pin,
            attached: false,
            angle: 0,
            range: 0..=180,
            journal: None,
        }
    }

    pub fn with_range(mut self, range: RangeInclusive<i32>) -> Self {
        self.range = range;
        self
    }

    pub fn with_journal(mut self, journal: ServoJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn angle(&self) -> i32 {
        self.angle
    }

    fn drive(&mut self, write: ServoWrite) -> Result<(), HardwareError> {
        if !self.attached {
            return Err(HardwareError::NotAttached(self.pin));
        }
        let angle = write.angle().clamp(*self.range.start(), *self.range.end());
        if angle != write.angle() {
            tracing::warn!("Servo {}: angle {} clamped to {}", self.pin, write.angle(), angle);
        }
        self.angle = angle;
        tracing::trace!("Servo {} -> {}", self.pin, angle);
        if let Some(journal) = &self.journal {
            journal.record(write);
        }
        Ok(())
    }
}

impl Actuator for SimulatedServo {
    fn pin(&self) -> u8 {
        self.pin
    }

    fn attach(&mut self) -> Result<(), HardwareError> {
        self.attached = true;
        Ok(())
    }

    fn write(&mut self, angle: i32) -> Result<(), HardwareError> {
        self.drive(ServoWrite::Jump { pin: self.pin, angle })
    }

    fn write_smooth(&mut self, angle: i32, speed: u8) -> Result<(), HardwareError> {
        self.drive(ServoWrite::Smooth { pin: self.pin, angle, speed })
    }
}

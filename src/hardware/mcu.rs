// src/hardware/mcu.rs - Servos driven by a co-processor over a serial text bus
//
// Wire format, one line per instruction:
//   attach <pin>
//   servo <pin> <angle>
//   servo <pin> <angle> <speed>
use super::{Actuator, HardwareError};
use crate::communication::{serial, spawn_line_reader, spawn_line_writer};
use tokio::sync::mpsc;

const MAX_RESPONSE_LEN: usize = 256;

/// Command channel to the servo co-processor; cheap to clone.
#[derive(Debug, Clone)]
pub struct McuServoBus {
    tx: mpsc::UnboundedSender<String>,
}

impl McuServoBus {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }

    /// Opens the co-processor port and starts its writer and response logger.
    pub async fn open(port: &str, baud: u32) -> Result<Self, HardwareError> {
        tracing::info!("Connecting to servo MCU on {} at {} baud", port, baud);
        let port = serial::open_port(port, baud)?;
        let (reader, writer) = tokio::io::split(port);
        let tx = spawn_line_writer(writer);
        let mut responses = spawn_line_reader(reader, MAX_RESPONSE_LEN);
        tokio::spawn(async move {
            while let Some(line) = responses.recv().await {
                let line = line.trim();
                if line.starts_with("error") {
                    tracing::error!("Servo MCU: {}", line);
                } else if !line.is_empty() {
                    tracing::debug!("Servo MCU: {}", line);
                }
            }
            tracing::info!("Servo MCU response stream closed");
        });
        Ok(Self { tx })
    }

    pub fn servo(&self, pin: u8) -> McuServo {
        McuServo {
            pin,
            bus: self.clone(),
        }
    }

    fn send(&self, line: String) -> Result<(), HardwareError> {
        tracing::trace!("Servo bus TX: {}", line);
        self.tx.send(line).map_err(|_| HardwareError::BusClosed)
    }
}

#[derive(Debug)]
pub struct McuServo {
    pin: u8,
    bus: McuServoBus,
}

impl Actuator for McuServo {
    fn pin(&self) -> u8 {
        self.pin
    }

    fn attach(&mut self) -> Result<(), HardwareError> {
        self.bus.send(format!("attach {}", self.pin))
    }

    fn write(&mut self, angle: i32) -> Result<(), HardwareError> {
        self.bus.send(format!("servo {} {}", self.pin, angle))
    }

    fn write_smooth(&mut self, angle: i32, speed: u8) -> Result<(), HardwareError> {
        self.bus.send(format!("servo {} {} {}", self.pin, angle, speed))
    }
}

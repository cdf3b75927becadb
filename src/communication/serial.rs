// src/communication/serial.rs - Serial port access via serial2-tokio
use super::{LineWriter, spawn_line_reader};
use serial2_tokio::SerialPort;
use tokio::io::WriteHalf;
use tokio::sync::mpsc;

/// Opens `port` at `baud` (8N1, no flow control).
pub fn open_port(port: &str, baud: u32) -> std::io::Result<SerialPort> {
    SerialPort::open(port, baud).map_err(|e| {
        tracing::error!("Failed to open serial port {}: {}", port, e);
        e
    })
}

/// Serial ports present on this machine, for diagnostics.
pub fn available_ports() -> Vec<String> {
    SerialPort::available_ports()
        .map(|ports| ports.into_iter().map(|p| p.display().to_string()).collect())
        .unwrap_or_default()
}

/// A serial port split into an incoming line channel and an outgoing writer.
pub struct SerialLink {
    pub lines: mpsc::Receiver<String>,
    pub writer: LineWriter<WriteHalf<SerialPort>>,
}

impl SerialLink {
    /// Incoming lines longer than `max_line` bytes are cut, see
    /// [`spawn_line_reader`].
    pub fn open(port: &str, baud: u32, max_line: usize) -> std::io::Result<Self> {
        tracing::info!("Opening serial link on {} at {} baud", port, baud);
        let port = open_port(port, baud)?;
        let (reader, writer) = tokio::io::split(port);
        Ok(Self {
            lines: spawn_line_reader(reader, max_line),
            writer: LineWriter::new(writer),
        })
    }
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink").finish_non_exhaustive()
    }
}

//! `gesture-send`: push gesture files to a controller, one at a time, waiting
//! for each `ACK` before sending the next.

use clap::Parser;
use gesture_rs::command::MotionCommand;
use gesture_rs::host::{HostError, HostLink};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "gesture-send", about = "Send keyframe gestures to a motion controller and wait for ACK.")]
struct Cli {
    /// Controller serial port
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value_t = 115200)]
    baud: u32,

    /// How long to wait for each ACK
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,

    /// Gesture files (JSON: token, duration, keyframes)
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn load_gesture(path: &PathBuf) -> Result<MotionCommand, Box<dyn std::error::Error + Send + Sync + 'static>> {
    let contents = std::fs::read_to_string(path)?;
    let command: MotionCommand = serde_json::from_str(&contents)?;
    Ok(command)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let timeout = Duration::from_millis(cli.timeout_ms);

    let mut link = HostLink::open_serial(&cli.port, cli.baud)?;
    tracing::info!("Connected to {} at {} baud", cli.port, cli.baud);

    let mut failures = 0;
    for path in &cli.files {
        let command = match load_gesture(path) {
            Ok(command) => command,
            Err(e) => {
                tracing::error!("Skipping {}: {}", path.display(), e);
                failures += 1;
                continue;
            }
        };
        match link.send(&command, timeout).await {
            Ok(report) => {
                tracing::info!("{} acknowledged after {:?}", report.token, report.round_trip);
            }
            Err(HostError::Timeout { token, after }) => {
                tracing::warn!("{} not acknowledged within {:?}", token, after);
                failures += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    if failures > 0 {
        tracing::warn!("{} of {} gestures failed", failures, cli.files.len());
    }
    Ok(())
}

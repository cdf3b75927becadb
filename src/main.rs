// src/main.rs - Motion controller entry point
use clap::{Parser, ValueEnum};
use gesture_rs::communication::{serial::SerialLink, spawn_line_reader, LineWriter};
use gesture_rs::config::{self, Config};
use gesture_rs::controller::Controller;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    Hand,
    LeftArm,
}

#[derive(Parser, Debug)]
#[command(name = "gesture-controller", about = "Keyframe servo motion controller.")]
struct Cli {
    /// Path to the TOML configuration
    #[arg(short, long, default_value = "controller.toml")]
    config: PathBuf,

    /// Use a built-in layout instead of a configuration file
    #[arg(long, value_enum)]
    preset: Option<Preset>,

    /// Serve the line protocol on stdin/stdout instead of the serial port
    #[arg(long)]
    stdio: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout may be the wire.
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting gesture controller");

    let config = match cli.preset {
        Some(Preset::Hand) => Config::hand(),
        Some(Preset::LeftArm) => Config::left_arm(),
        None => {
            tracing::info!("Loading configuration from: {}", cli.config.display());
            config::load_config(&cli.config).map_err(|e| {
                tracing::error!("Failed to load config from '{}': {}", cli.config.display(), e);
                Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
            })?
        }
    };

    tracing::info!(
        "Groups: {}",
        config
            .groups
            .iter()
            .map(|g| format!("{}({})", g.name, g.pins.len()))
            .collect::<Vec<_>>()
            .join(" ")
    );
    tracing::info!(
        "Queue capacity {}, {:?} policy, {:?} execution",
        config.controller.queue_capacity,
        config.motion.policy,
        config.controller.execution
    );

    let mut controller = Controller::from_config(&config).await?;

    if cli.stdio {
        let lines = spawn_line_reader(tokio::io::stdin(), config.controller.max_command_len);
        let mut out = LineWriter::new(tokio::io::stdout());
        controller.boot(&mut out).await?;
        controller.run(lines, &mut out).await?;
    } else {
        let SerialLink { lines, mut writer } = SerialLink::open(
            &config.serial.port,
            config.serial.baud,
            config.controller.max_command_len,
        )
        .map_err(|e| {
            tracing::error!(
                "Available ports: {:?}",
                gesture_rs::communication::serial::available_ports()
            );
            e
        })?;
        controller.boot(&mut writer).await?;
        controller.run(lines, &mut writer).await?;
    }

    let stats = controller.stats();
    tracing::info!(
        "Received {}, dropped {}, executed {}, failed {}",
        stats.received,
        stats.dropped,
        stats.executed,
        stats.failed
    );
    Ok(())
}

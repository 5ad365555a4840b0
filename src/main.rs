//! CLI entry point for fusion-daq.
//!
//! Runs the acquisition scheduler against a simulated FXOS8700 and serves
//! telemetry frames over TCP. The pipeline is the same one a hardware
//! build would use; only the register bus is simulated.
//!
//! # Usage
//!
//! Run the acquisition loop:
//! ```bash
//! fusion_daq run
//! fusion_daq run --config config/fusion-daq.toml
//! ```
//!
//! Inspect the merged configuration:
//! ```bash
//! fusion_daq print-config
//! ```
//!
//! Watch the telemetry stream:
//! ```bash
//! nc 127.0.0.1 2323
//! ```

// Use mimalloc for the allocation-heavy acquisition path.
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::signal;
use tracing::{debug, info, warn};

use fusion_daq::config::Settings;
use fusion_daq::control::{ControlPort, NullControlPort, TcpControlPort};
use fusion_daq::device::Fxos8700;
use fusion_daq::fusion::PassthroughFusion;
use fusion_daq::mock::MockBus;
use fusion_daq::status::LogIndicator;
use fusion_daq::Scheduler;

#[derive(Parser)]
#[command(name = "fusion-daq")]
#[command(about = "Hybrid sensor acquisition and fusion scheduling daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the acquisition loop until interrupted
    Run {
        /// Optional config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the merged configuration and exit
    PrintConfig {
        /// Optional config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run(config).await,
        Commands::PrintConfig { config } => print_config(config),
    }
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config: Option<PathBuf>) -> Result<()> {
    let settings = Settings::load(config)?;
    init_tracing(&settings.application.log_level);
    info!(
        name = %settings.application.name,
        odr_hz = settings.rate().hertz(),
        fusion_hz = settings.sampling.fusion_hz,
        "starting acquisition service"
    );

    let bus = MockBus::new();
    bus.synthesize_at(settings.rate());
    let sensor = Fxos8700::new(bus, settings.device.bus_address, settings.rate());
    debug!(
        address = format_args!("{:#04x}", sensor.address()),
        odr_hz = sensor.rate().hertz(),
        "sensor driver constructed"
    );

    let port: Box<dyn ControlPort> = if settings.telemetry.enabled {
        Box::new(TcpControlPort::bind(&settings.telemetry.listen).await?)
    } else {
        info!("telemetry endpoint disabled");
        Box::new(NullControlPort)
    };

    let mut scheduler = Scheduler::new(
        &settings,
        Box::new(PassthroughFusion::new()),
        Box::new(LogIndicator),
        port,
    );
    scheduler.install(Box::new(sensor));
    scheduler
        .initialize_all()
        .await
        .context("Sensor initialization failed")?;

    let shutdown = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for shutdown signal");
        }
        info!("shutdown signal received");
    };

    tokio::select! {
        result = scheduler.run() => result?,
        () = shutdown => {}
    }

    scheduler.standby_all().await;
    info!("acquisition service stopped");
    Ok(())
}

fn print_config(config: Option<PathBuf>) -> Result<()> {
    let settings = Settings::load(config)?;
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

//! Shelly Cloud Logger binary.
//!
//! Polls the configured Shelly devices through Shelly Cloud and writes their
//! status to InfluxDB.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use shelly_cloud_logger::{
    AccountDevice, AppConfig, CloudClient, InfluxWriter, Poller, MEASUREMENT,
};
use std::path::PathBuf;
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tracing::{info, warn, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "shelly_cloud_logger")]
#[command(about = "Shelly Cloud API device status logger for InfluxDB")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "Polls Shelly devices via the Shelly Cloud API and logs their status to InfluxDB")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (defaults to $CONFIG_FILE, then config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll on the configured interval until interrupted (default)
    Run,

    /// Run a single poll cycle and exit
    Once,

    /// List every device registered to the Shelly Cloud account
    Devices(DevicesArgs),

    /// Validate the configuration and show the resolved device list
    Check,
}

#[derive(Args)]
struct DevicesArgs {
    /// Output format: json or pretty
    #[arg(short, long, default_value = "pretty")]
    format: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match &cli.command {
        Some(Commands::Run) | None => {
            print_banner();
            run_command(config).await?;
        }
        Some(Commands::Once) => {
            once_command(config).await?;
        }
        Some(Commands::Devices(args)) => {
            devices_command(config, args).await?;
        }
        Some(Commands::Check) => {
            check_command(config)?;
        }
    }

    Ok(())
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter(log_level(cli), &directives))
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn log_level(cli: &Cli) -> Level {
    if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    }
}

/// `RUST_LOG` directives, when set, take precedence over the command-line level.
fn log_filter(level: Level, directives: &str) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .parse_lossy(directives)
}

fn print_banner() {
    println!("=== Shelly Cloud API Status Logger ===");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
}

fn build_poller(config: &AppConfig) -> anyhow::Result<Poller<CloudClient, InfluxWriter>> {
    config.validate()?;
    let devices = config.resolve_devices()?;

    info!("Monitoring {} devices", devices.len());
    info!("Shelly Cloud: {}", config.shelly_cloud.server_uri);
    info!(
        "InfluxDB: {}, Bucket: {}",
        config.influxdb.url, config.influxdb.bucket
    );
    info!("Poll interval: {} minutes", config.poll_interval);
    info!("NOTE: Shelly Cloud API is rate-limited to 1 request/second");

    let client = CloudClient::new(&config.shelly_cloud)?;
    let writer = InfluxWriter::new(&config.influxdb)?;
    Ok(Poller::new(client, writer, devices)?)
}

async fn run_command(config: AppConfig) -> anyhow::Result<()> {
    let poller = build_poller(&config)?;

    let mut reports = poller
        .with_shutdown(spawn_shutdown_listener())
        .into_stream(config.poll_interval())?;

    while let Some(report) = reports.next().await {
        if report.succeeded == 0 && report.polled > 0 {
            warn!("No device answered this cycle");
        }
    }

    info!("Stopped");
    Ok(())
}

async fn once_command(config: AppConfig) -> anyhow::Result<()> {
    let report = build_poller(&config)?
        .with_shutdown(spawn_shutdown_listener())
        .run_once()
        .await;
    println!("{}", report);
    Ok(())
}

/// Flip a watch flag on Ctrl-C or SIGTERM.
fn spawn_shutdown_listener() -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutting down...");
        let _ = shutdown_tx.send(true);
    });
    shutdown_rx
}

async fn devices_command(config: AppConfig, args: &DevicesArgs) -> anyhow::Result<()> {
    config.validate_cloud()?;
    let client = CloudClient::new(&config.shelly_cloud)?;

    println!("Connecting to {}...", client.base_url());
    let devices = client
        .list_account_devices()
        .await
        .context("Failed to retrieve devices. Check the server URI and auth key")?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&devices)?),
        "pretty" => print_account_devices(&devices),
        other => anyhow::bail!("Unsupported format: {}. Use 'json' or 'pretty'", other),
    }

    Ok(())
}

fn check_command(config: AppConfig) -> anyhow::Result<()> {
    config.validate()?;
    let devices = config.resolve_devices()?;

    let shown = config.redacted();
    println!("Configuration OK");
    println!(
        "  Shelly Cloud: {} (auth key {})",
        shown.shelly_cloud.server_uri, shown.shelly_cloud.auth_key
    );
    println!(
        "  InfluxDB: {} (org {:?}, default bucket {})",
        shown.influxdb.url, shown.influxdb.org, shown.influxdb.bucket
    );
    println!("  Measurement: {}", MEASUREMENT);
    println!("  Poll interval: {} minutes", config.poll_interval);
    println!();
    println!("Devices (poll order):");
    for (i, device) in devices.iter().enumerate() {
        println!(
            "  {:>2}. {} [{}] type={} channel={} -> {}",
            i + 1,
            device.name,
            device.id,
            device.device_type,
            device.channel,
            device.bucket
        );
    }
    Ok(())
}

fn print_account_devices(devices: &[AccountDevice]) {
    if devices.is_empty() {
        println!("No devices found");
        return;
    }

    println!();
    println!("{}", "=".repeat(80));
    println!("YOUR SHELLY DEVICES");
    println!("{}", "=".repeat(80));
    println!("Total devices: {}", devices.len());
    println!();

    for device in devices {
        println!("Device ID: {}", device.id);
        println!("  Model: {}", device.model.as_deref().unwrap_or("Unknown"));
        println!("  Generation: {}", device.generation.as_deref().unwrap_or("Unknown"));
        println!("  Online: {}", device.online);
        if !device.components.is_empty() {
            println!("  Components: {}", device.components.join(", "));
        }
        println!();
    }

    println!("{}", "=".repeat(80));
    println!("Copy the device IDs above into your config.yaml, e.g.:");
    println!();
    println!("devices:");
    println!("  - name: \"my_device\"");
    println!("    id: \"{}\"", devices[0].id);
    println!("    type: \"plus1pm\"");
    println!("    channel: 0");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

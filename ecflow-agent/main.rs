use anyhow::{bail, Context};
use axum::{response::IntoResponse, routing::get, Router};
use clap::{Parser, Subcommand};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use ecflow::power::{register_kernel_fallback, register_restart_poweroff, ChainPolicy};
use ecflow::{
    classify, EcConfig, EcDevice, PowerChains, PowerSenseExporter, RestartMode, SubDeviceKind,
};

#[derive(Parser, Debug)]
#[command(name = "ecflow")]
#[command(about = "Embedded controller access for the Acer Iconia Tab A500")]
struct Args {
    #[arg(long, help = "JSON configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "I2C adapter device node (overrides the configuration)")]
    bus: Option<PathBuf>,

    #[arg(long, value_parser = parse_address, help = "Controller I2C address, e.g. 0x4c")]
    address: Option<u16>,

    #[arg(
        short,
        long,
        help = "Enable verbose logging (shows every register exchange and retry)"
    )]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print one battery snapshot
    Status,
    /// Print the instantaneous battery current
    Current,
    /// Read a named register
    Read { name: String },
    /// Power the machine off through the handler chain
    Poweroff {
        #[arg(long, help = "Required, the command cannot be undone")]
        force: bool,
        #[arg(long, help = "Also register the restart-based power-off fallback")]
        restart_poweroff: bool,
        #[arg(long, help = "Fall back to reboot(2) after the controller")]
        kernel_fallback: bool,
    },
    /// Restart the machine through the handler chain
    Reboot {
        #[arg(long, value_parser = parse_restart_mode, default_value = "cold")]
        mode: RestartMode,
        #[arg(long, help = "Required, the command cannot be undone")]
        force: bool,
        #[arg(long, help = "Fall back to reboot(2) after the controller")]
        kernel_fallback: bool,
    },
    /// Classify a firmware vendor string
    Classify { vendor: String },
    /// Serve battery metrics over HTTP
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[arg(long, default_value_t = 1000, help = "Collection period in milliseconds")]
        interval_ms: u64,
    },
}

fn parse_address(s: &str) -> std::result::Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid address {s}: {e}"))
}

fn parse_restart_mode(s: &str) -> std::result::Result<RestartMode, String> {
    RestartMode::from_name(s).ok_or_else(|| {
        let names: Vec<&str> = RestartMode::all().iter().map(|m| m.name()).collect();
        format!("unknown restart mode {s}, expected one of {}", names.join(", "))
    })
}

struct AppState {
    power_sense_exporter: Option<Arc<PowerSenseExporter>>,
}

async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    ecflow::gather_metrics!(buffer, encoder, state.power_sense_exporter, "power-sense");

    let content_type = encoder.format_type().to_string();
    (
        [("Content-Type", content_type)],
        String::from_utf8(buffer).unwrap_or_default(),
    )
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    tracing::info!("Installing signal handlers...");

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Ctrl+C received!");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("SIGTERM received!");
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::warn!("Shutdown triggered by Ctrl+C");
        },
        _ = terminate => {
            tracing::warn!("Shutdown triggered by SIGTERM");
        },
    }

    tracing::warn!("Shutdown signal received, initiating graceful shutdown...");
    cancel_token.cancel();
}

fn load_config(args: &Args) -> anyhow::Result<EcConfig> {
    let mut config = match &args.config {
        Some(path) => EcConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => EcConfig::default(),
    };

    if let Some(bus) = &args.bus {
        config.bus = bus.clone();
    }
    if let Some(address) = args.address {
        config.address = address;
    }
    config.validate()?;

    Ok(config)
}

fn open_device(config: &EcConfig, chains: &Arc<PowerChains>) -> anyhow::Result<EcDevice> {
    EcDevice::open(config, chains).with_context(|| {
        format!(
            "Failed to bring up the controller at 0x{:02x} on {}",
            config.address,
            config.bus.display()
        )
    })
}

fn open_readonly(config: &EcConfig) -> anyhow::Result<EcDevice> {
    EcDevice::open_readonly(config).with_context(|| {
        format!(
            "Failed to open the controller at 0x{:02x} on {}",
            config.address,
            config.bus.display()
        )
    })
}

fn print_status(device: &EcDevice) -> anyhow::Result<()> {
    let cell = device
        .cell(SubDeviceKind::PowerSense)
        .context("No power-sense sub-device")?;
    let readout = cell
        .as_readout()
        .context("Power-sense sub-device has no readout")?;
    let reading = readout.read()?;

    println!("device:    {}", cell.name());
    println!("capacity:  {} %", reading.capacity_percent);
    println!("voltage:   {} mV", reading.voltage_mv);
    println!(
        "current:   {} uA{}",
        reading.current.microamps(),
        if reading.current.is_discharging() {
            " (discharging)"
        } else {
            ""
        }
    );
    println!("status:    0x{:04x}", reading.status);
    Ok(())
}

fn arm_power_chain(
    chains: &Arc<PowerChains>,
    config: &EcConfig,
    force: bool,
    kernel_fallback: bool,
) -> anyhow::Result<EcDevice> {
    if !force {
        bail!("Refusing to change power state without --force");
    }
    if !config.system_power_controller {
        tracing::warn!("Controller is not the system power controller, only fallbacks will act");
    }

    let device = open_device(config, chains)?;
    if kernel_fallback {
        register_kernel_fallback(chains)?;
    }
    Ok(device)
}

async fn serve(
    config: EcConfig,
    chains: Arc<PowerChains>,
    port: u16,
    period: Duration,
) -> anyhow::Result<()> {
    let device = open_device(&config, &chains)?;
    let cancel_token = CancellationToken::new();

    let (power_sense_exporter, collection_handle) = match device.cell(SubDeviceKind::PowerSense) {
        Some(cell) => {
            let exporter = Arc::new(PowerSenseExporter::new(Arc::clone(cell))?);
            let handle = Arc::clone(&exporter).start(cancel_token.clone(), period);
            (Some(exporter), Some(handle))
        }
        None => {
            tracing::warn!("No power-sense sub-device, serving empty metrics");
            (None, None)
        }
    };

    let app_state = Arc::new(AppState {
        power_sense_exporter,
    });

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::warn!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel_token))
        .await?;

    tracing::info!("Server shutdown complete, waiting for collection loop to finish...");

    if let Some(handle) = collection_handle {
        let _ = handle.await;
    }

    device.remove();
    tracing::info!("All tasks completed, exiting");

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over -v
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_config(&args)?;
    let policy = if config.exclusive_priorities {
        ChainPolicy::Exclusive
    } else {
        ChainPolicy::Shared
    };
    let chains = Arc::new(PowerChains::with_policy(policy));

    match args.command {
        Command::Status => {
            let device = open_readonly(&config)?;
            print_status(&device)?;
        }
        Command::Current => {
            let device = open_readonly(&config)?;
            let current = device.controller().read_current()?;
            println!("{}", current.microamps());
        }
        Command::Read { ref name } => {
            let device = open_readonly(&config)?;
            let value = device.controller().read_register(name)?;
            println!("{name}: 0x{value:04x} ({value})");
        }
        Command::Poweroff {
            force,
            restart_poweroff,
            kernel_fallback,
        } => {
            let _device = arm_power_chain(&chains, &config, force, kernel_fallback)?;
            if restart_poweroff {
                register_restart_poweroff(&chains)?;
            }
            tracing::warn!("Powering off");
            let invoked = chains.dispatch_power_off();
            // Still running: nothing in the chain cut power
            bail!("Power-off returned after {invoked} handlers");
        }
        Command::Reboot {
            mode,
            force,
            kernel_fallback,
        } => {
            let _device = arm_power_chain(&chains, &config, force, kernel_fallback)?;
            tracing::warn!("Restarting ({})", mode);
            let invoked = chains.dispatch_restart(mode);
            bail!("Restart returned after {invoked} handlers");
        }
        Command::Classify { ref vendor } => {
            let class = classify(vendor);
            println!(
                "{} ({})",
                class,
                if class.is_supported() {
                    "supported"
                } else {
                    "not supported"
                }
            );
        }
        Command::Serve { port, interval_ms } => {
            serve(config, chains, port, Duration::from_millis(interval_ms)).await?;
        }
    }

    Ok(())
}

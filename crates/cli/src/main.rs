//! rgb-hub CLI: serve Corsair peripherals and LED strips to SDK clients.

use std::path::PathBuf;
use std::sync::{Arc, Weak};

use anyhow::Result;
use clap::{Parser, Subcommand};
use rgb_hub_core::client::HubClient;
use rgb_hub_core::color::Color;
use rgb_hub_core::config::{default_config_path, HubConfig};
use rgb_hub_core::controller::{Controller, ControllerRegistry, DeviceType};
use rgb_hub_core::corsair::ColorMode;
use rgb_hub_core::protocol::DEFAULT_PORT;
use rgb_hub_core::server::DistributionServer;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "rgb-hub",
    version,
    about = "Multi-vendor RGB lighting hub"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List connected Corsair RGB peripherals.
    ListDevices,
    /// Open every device and serve them over the SDK protocol.
    Serve {
        /// TCP port to listen on (overrides the config file).
        #[arg(long)]
        port: Option<u16>,
        /// Config file (defaults to the platform config directory).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Drive keyboards with the 9-bit color encoding.
        #[arg(long)]
        limited_color: bool,
    },
    /// Talk to a running hub.
    Client {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
        #[command(subcommand)]
        action: ClientAction,
    },
}

#[derive(Subcommand)]
enum ClientAction {
    /// Print the number of controllers.
    Count,
    /// Show one controller's metadata, zones and colors.
    Info {
        /// Controller index.
        index: u32,
    },
    /// Set every LED of a controller to one color.
    Set {
        /// Controller index.
        index: u32,
        /// Color as RRGGBB hex.
        color: String,
    },
}

fn load_config(path: Option<PathBuf>) -> Result<HubConfig> {
    let path = match path {
        Some(path) => path,
        None => match default_config_path() {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "No config location, using defaults");
                return Ok(HubConfig::default());
            }
        },
    };
    Ok(HubConfig::load_or_default(&path)?)
}

fn build_registry(config: &HubConfig, color_mode: ColorMode) -> Result<ControllerRegistry> {
    let registry = ControllerRegistry::new();

    for info in rgb_hub_core::device::discover_devices()? {
        let mut device = match info.open() {
            Ok(device) => device,
            Err(e) => {
                warn!(model = info.model.name(), path = %info.path, error = %e, "Failed to open device");
                continue;
            }
        };
        if device.device_type() == DeviceType::Unknown {
            warn!(model = info.model.name(), path = %info.path, "Device did not identify, skipping");
            continue;
        }
        device.set_color_mode(color_mode);
        let index = registry.push(Box::new(device));
        info!(index, model = info.model.name(), "Controller registered");
    }

    for strip in &config.strips {
        match strip.open() {
            Ok(controller) => {
                let index = registry.push(Box::new(controller));
                info!(index, strip = %strip.name, "Controller registered");
            }
            Err(e) => warn!(strip = %strip.name, error = %e, "Failed to open LED strip"),
        }
    }

    Ok(registry)
}

fn log_clients(server: &Weak<DistributionServer>) {
    let Some(server) = server.upgrade() else {
        return;
    };
    let count = server.client_count();
    info!(clients = count, "Client list changed");
    for i in 0..count {
        if let (Some(label), Some(addr)) = (server.client_label(i), server.client_addr(i)) {
            info!(index = i, label = %label, addr = %addr, "Client");
        }
    }
}

fn serve(port: Option<u16>, config: Option<PathBuf>, limited_color: bool) -> Result<()> {
    let config = load_config(config)?;
    let color_mode = if limited_color {
        ColorMode::Limited
    } else {
        config.keyboard_color_mode
    };

    let registry = build_registry(&config, color_mode)?;
    if registry.is_empty() {
        warn!("No controllers found; serving an empty registry");
    }

    let server = Arc::new(DistributionServer::new(Arc::new(registry)));
    server.set_port(port.unwrap_or(config.server.port))?;
    let weak = Arc::downgrade(&server);
    server.register_client_change_callback(move || log_clients(&weak));
    server.start()?;
    println!(
        "Serving {} controller(s) on port {}",
        server.registry().len(),
        server.port()
    );

    loop {
        std::thread::park();
    }
}

fn run_client(host: &str, port: u16, action: ClientAction) -> Result<()> {
    let mut client = HubClient::connect((host, port))?;
    client.set_name("rgb-hub cli")?;

    match action {
        ClientAction::Count => {
            println!("{}", client.controller_count()?);
        }
        ClientAction::Info { index } => {
            let info = client.controller_data(index)?;
            println!("{} ({})", info.name, info.device_type);
            println!("  Description: {}", info.description);
            println!("  Version: {}", info.version);
            println!("  Location: {}", info.location);
            for zone in &info.zones {
                println!("  Zone '{}': {} LED(s)", zone.name, zone.leds);
            }
            for (name, color) in info.leds.iter().zip(&info.colors) {
                println!("  {name}: {color}");
            }
        }
        ClientAction::Set { index, color } => {
            let parsed = Color::from_hex(&color)
                .ok_or_else(|| anyhow::anyhow!("Invalid color '{color}', expected RRGGBB"))?;
            let info = client.controller_data(index)?;
            client.update_leds(index, &vec![parsed; info.led_count()])?;
            // Round-trip so a failed update is reported before exiting.
            client.controller_count()?;
            println!("Set {} LED(s) of '{}' to {parsed}", info.led_count(), info.name);
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ListDevices => {
            let devices = rgb_hub_core::device::discover_devices()?;
            if devices.is_empty() {
                println!("No Corsair RGB devices found.");
                println!("Ensure the device is connected and you can access its hidraw node.");
            } else {
                for dev in &devices {
                    println!(
                        "{} (VID: 0x{:04X}, PID: 0x{:04X}, path: {})",
                        dev.model.name(),
                        dev.vid,
                        dev.pid,
                        dev.path
                    );
                }
            }
        }
        Commands::Serve {
            port,
            config,
            limited_color,
        } => serve(port, config, limited_color)?,
        Commands::Client { host, port, action } => run_client(&host, port, action)?,
    }

    Ok(())
}

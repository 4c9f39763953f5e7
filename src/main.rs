use std::env;
use std::error::Error;

use clap::Parser;

use crate::config::RelayConfig;
use crate::input::target::TargetGamepad;

mod config;
mod drivers;
mod input;
mod usb;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the controller configuration YAML
    #[arg(short, long, default_value = "relaypad.yaml")]
    config: String,
    /// Override the hidg device file path from the configuration
    #[arg(long)]
    device_path: Option<String>,
    /// Override the UDC name from the configuration
    #[arg(long)]
    udc: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let log_level = match env::var("LOG_LEVEL") {
        Ok(value) => value,
        Err(_) => "info".to_string(),
    };
    env::set_var("RUST_LOG", log_level);
    env_logger::init();
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    log::info!("Starting RelayPad v{}", VERSION);

    let args = Args::parse();
    let mut config = RelayConfig::from_yaml_file(args.config)?;
    if args.device_path.is_some() {
        config.device_path = args.device_path;
    }
    if args.udc.is_some() {
        config.udc = args.udc;
    }

    let mut gamepad = TargetGamepad::new(&config)?;
    gamepad.setup().await?;
    gamepad.start()?;
    gamepad.start_vibration_listener(|event| {
        log::info!(
            "vibration: strong {:.3} weak {:.3} for {}ms",
            event.strong_magnitude,
            event.weak_magnitude,
            event.duration_ms
        );
    });
    log::info!("Emulated controller running; press CTRL+C to stop");

    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down");
    gamepad.stop();

    Ok(())
}

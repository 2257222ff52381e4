use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use std::io::BufRead;
use std::path::PathBuf;
use std::thread;
use uwb_guidance::api::bus::JsonLinePublisher;
use uwb_guidance::api::types::VehicleStatus;
use uwb_guidance::core::constants::{DEFAULT_BAUD_RATE, DEFAULT_GRID_CONFIG, PARAM_REFRESH_INTERVAL};
use uwb_guidance::core::types::DriverMode;
use uwb_guidance::driver::{DriverHandle, UwbDriver};
use uwb_guidance::hardware::{SerialTransceiver, TransceiverConfig};
use uwb_guidance::utils::config::{DriverParameters, ParameterFile};
use uwb_guidance::utils::grid_file::load_grid_file;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Clone, Debug)]
pub struct Cli {
    #[clap(flatten)]
    verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Serial device of the UWB radio
    #[arg(short, long)]
    device: Option<String>,

    /// Serial baud rate
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    baudrate: u32,

    /// Log every computed relative position
    #[arg(short, long = "position-debug", default_value_t = false)]
    position_debug: bool,

    /// JSON parameter file, re-read when it changes. A new mode restarts
    /// the ranging session.
    #[arg(long)]
    params: Option<PathBuf>,

    /// Grid configuration file
    #[arg(long, default_value = DEFAULT_GRID_CONFIG)]
    grid: PathBuf,

    /// Operating mode, overrides the parameter file
    #[arg(long)]
    mode: Option<DriverMode>,
}

/// Stop the driver on SIGINT or SIGTERM
fn install_stop_handler(handle: DriverHandle) -> Result<()> {
    ctrlc::set_handler(move || {
        info!("Stop requested");
        handle.stop();
    })
    .context("Cannot install signal handler")
}

/// Push changed parameter files into the driver
fn spawn_parameter_watcher(mut file: ParameterFile, handle: DriverHandle) {
    thread::spawn(move || {
        while !handle.is_stopped() {
            match file.poll() {
                Some(Ok(params)) => {
                    if !handle.update_parameters(params) {
                        break;
                    }
                }
                Some(Err(e)) => warn!("{}", e),
                None => {}
            }
            thread::sleep(PARAM_REFRESH_INTERVAL);
        }
    });
}

/// Vehicle status arrives as JSON lines on stdin
fn spawn_status_reader(handle: DriverHandle) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<VehicleStatus>(&line) {
                Ok(status) => {
                    if !handle.update_vehicle_status(status) {
                        break;
                    }
                }
                Err(e) => warn!("Ignoring vehicle status '{}': {}", line, e),
            }
        }
    });
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let log_level = args.verbose.log_level_filter();
    env_logger::Builder::from_env(Env::default())
        .filter_level(log_level)
        .init();

    info!("uwb-guidance {} loglevel {}", VERSION, log_level);

    let mut param_file = args.params.clone().map(ParameterFile::new);
    let params = match param_file.as_mut().map(|file| file.poll()) {
        Some(Some(Ok(params))) => params,
        Some(Some(Err(e))) => {
            warn!("{}; using defaults", e);
            DriverParameters::default()
        }
        _ => DriverParameters::default(),
    };

    let device = args
        .device
        .clone()
        .or_else(|| params.serial_port.clone())
        .context("No serial device given (use --device or serial_port)")?;

    let mut link = SerialTransceiver::new(TransceiverConfig::serial(&device, args.baudrate))?;
    link.connect()
        .with_context(|| format!("Cannot open {}", device))?;

    let publisher = JsonLinePublisher::new(std::io::stdout());
    let (driver, handle) = UwbDriver::new(link, publisher, params);
    let mut driver = driver
        .with_mode_override(args.mode)
        .with_position_debug(args.position_debug);

    match load_grid_file(&args.grid) {
        Ok(frame) => {
            if let Err(e) = driver.load_grid(frame) {
                warn!("Grid '{}' refused: {}; running without grid", args.grid.display(), e);
            }
        }
        Err(e) => warn!("{}; running without grid", e),
    }

    install_stop_handler(handle.clone())?;
    if let Some(file) = param_file {
        spawn_parameter_watcher(file, handle.clone());
    }
    spawn_status_reader(handle.clone());

    driver.run();
    handle.stop();
    Ok(())
}

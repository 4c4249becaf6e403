//! NPK7 soil probe CLI
//!
//! A command-line interface (CLI) application for reading 7-in-1 NPK soil
//! probes over Modbus RTU (serial).
//!
//! This tool allows users to:
//! - Read all seven probe values once (moisture, temperature, conductivity,
//!   pH, nitrogen, phosphorus, potassium).
//! - Print a normalized soil reading as JSON, falling back to simulated data
//!   when the probe can't be reached.
//! - Run in a continuous daemon mode that polls the probe and reconnects
//!   automatically when the serial port fails.
//!
//! The CLI leverages the `npk7_lib` crate for protocol definitions and client operations.

use anyhow::{Context, Result};
use clap::Parser;
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use npk7_lib::{
    config::Config,
    daemon::{Daemon, Step},
    sensor::SoilSensor,
    serial::{self, SerialConnector},
    sync_client::Npk7,
};
use std::panic;

mod commandline;

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown_file>", 0, 0));

        let cause_str = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "<unknown_panic_cause>"
        };

        error!(
            target: "panic",
            "Thread '{}' panicked at '{}': {}:{} - Cause: {}",
            std::thread::current().name().unwrap_or("<unnamed>"),
            filename,
            line,
            column,
            cause_str
        );
    }));
    log_handle
}

fn load_config(args: &commandline::CliArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Cannot load configuration from {path:?}"))?,
        None => Config::default(),
    };
    args.apply(&mut config);
    trace!("Config: {config:?}");
    Ok(config)
}

fn handle_read(config: &Config) -> Result<()> {
    info!("Executing: Read probe registers");
    let port = serial::open(&config.serial)
        .with_context(|| format!("Cannot open serial port {}", config.serial.device))?;
    let mut client =
        Npk7::from_config(port, &config.serial).with_context(|| "Invalid serial settings")?;
    let registers = client
        .read_once()
        .with_context(|| "Cannot read soil sensor")?;
    println!("{registers}");
    Ok(())
}

fn handle_soil(config: &Config, offline: bool) -> Result<()> {
    info!("Executing: Read soil");
    let mut sensor = if offline {
        SoilSensor::simulated_from_config(config)
    } else {
        SoilSensor::from_config(config).with_context(|| "Invalid serial settings")?
    };
    let soil = sensor.read_soil()?;
    println!(
        "{}",
        serde_json::to_string_pretty(&soil).with_context(|| "Cannot serialize soil reading")?
    );
    Ok(())
}

fn handle_daemon(config: &Config) -> Result<()> {
    info!(
        "Starting daemon mode: interval={:?}",
        config.daemon.poll_interval
    );
    let connector =
        SerialConnector::new(config.serial.clone()).with_context(|| "Invalid serial settings")?;
    let mut daemon = Daemon::new(connector, config.serial.clone(), &config.daemon)
        .with_context(|| "Invalid serial settings")?;
    println!(
        "Soil NPK Sensor - USB Serial Reader (Modbus RTU)\nPort={}, {} 8N1, slave={:#04X}",
        config.serial.device, config.serial.baud_rate, config.serial.address
    );
    // Failures are already logged by the daemon.
    daemon.run(|step| {
        if let Step::Reading(_) = step {
            println!("{step}\n");
        }
    })
}

fn main() -> Result<()> {
    let args = commandline::CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());
    info!(
        "NPK7 CLI started. Log level: {}",
        args.verbose.log_level_filter()
    );

    let config = load_config(&args)?;

    match &args.command {
        commandline::CliCommands::Read => handle_read(&config)?,
        commandline::CliCommands::Soil { offline, .. } => handle_soil(&config, *offline)?,
        commandline::CliCommands::Daemon { .. } => handle_daemon(&config)?,
    }

    Ok(())
}

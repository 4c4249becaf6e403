use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use npk7_lib::{config::Config, protocol as proto};
use std::{path::PathBuf, time::Duration};

fn parse_address(s: &str) -> Result<proto::Address, String> {
    let address_val =
        clap_num::maybe_hex::<u8>(s).map_err(|e| format!("Invalid address format: {e}"))?;
    proto::Address::try_from(address_val).map_err(|e| e.to_string())
}

fn parse_baud_rate(s: &str) -> Result<proto::BaudRate, String> {
    let rate_val = s
        .parse::<u32>()
        .map_err(|e| format!("Invalid baud rate number format: {e}"))?;
    proto::BaudRate::try_from(rate_val).map_err(|e| e.to_string())
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Read and display all seven probe values once, including conductivity.
    Read,

    /// Print one normalized soil reading as JSON:
    /// {N, P, K, temperature, humidity, ph, rainfall}.
    /// Falls back to simulated data if the probe can't be read.
    #[clap(verbatim_doc_comment)]
    Soil {
        /// Fail instead of printing simulated data when the probe can't be read.
        #[arg(long, conflicts_with = "offline")]
        no_simulate: bool,

        /// Don't touch the serial port, print simulated data.
        #[arg(long)]
        offline: bool,
    },

    /// Run in daemon mode: continuously poll the probe and print every reading.
    /// The serial port is reopened automatically if it fails or disappears.
    #[clap(verbatim_doc_comment)]
    Daemon {
        /// Interval between readings (e.g., "5s", "1m").
        #[arg(value_parser = humantime::parse_duration, short, long)]
        poll_interval: Option<Duration>,

        /// Pause before reopening a failed serial port (e.g., "3s").
        #[arg(value_parser = humantime::parse_duration, long)]
        reconnect_delay: Option<Duration>,
    },
}

const fn about_text() -> &'static str {
    "NPK7 soil probe CLI - Read 7-in-1 NPK soil probes via Modbus RTU."
}

#[derive(Parser, Debug)]
#[command(name="soilprobe", author, version, about=about_text(), long_about = None, propagate_version = true)]
pub struct CliArgs {
    /// Configure verbosity of logging output.
    /// -v for info, -vv for debug, -vvv for trace. Default is warn.
    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    /// YAML configuration file. Command line options override its values.
    #[arg(global = true, short, long, verbatim_doc_comment)]
    pub config: Option<PathBuf>,

    /// Serial port device name.
    /// Examples: "/dev/ttyUSB0" (Linux), "COM3" (Windows).
    #[arg(global = true, short, long, verbatim_doc_comment)]
    pub device: Option<String>,

    /// Baud rate for serial communication.
    /// Supported values: 2400, 4800, 9600.
    #[arg(global = true, long, value_parser = parse_baud_rate, verbatim_doc_comment)]
    pub baud_rate: Option<proto::BaudRate>,

    /// The Modbus RTU address of the probe (1 to 247).
    /// Can be specified in decimal or hexadecimal (e.g., "0x01").
    #[arg(global = true, short, long, value_parser = parse_address, verbatim_doc_comment)]
    pub address: Option<proto::Address>,

    /// Deadline for one complete response.
    /// Examples: "300ms", "1s".
    #[arg(global = true, long, value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub timeout: Option<Duration>,

    /// Total attempts per reading.
    #[arg(global = true, long)]
    pub retries: Option<u32>,

    /// Pause after a malformed response before the next attempt.
    /// Examples: "50ms", "100ms".
    #[arg(global = true, long, value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub retry_delay: Option<Duration>,

    #[command(subcommand)]
    pub command: CliCommands,
}

impl CliArgs {
    /// Applies command line overrides on top of `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(device) = &self.device {
            config.serial.device = device.clone();
        }
        if let Some(baud_rate) = &self.baud_rate {
            config.serial.baud_rate = u32::from(baud_rate);
        }
        if let Some(address) = self.address {
            config.serial.address = *address;
        }
        if let Some(timeout) = self.timeout {
            config.serial.timeout = timeout;
        }
        if let Some(retries) = self.retries {
            config.serial.retries = retries;
        }
        if let Some(retry_delay) = self.retry_delay {
            config.serial.retry_delay = retry_delay;
        }
        match &self.command {
            CliCommands::Soil { no_simulate, .. } => {
                if *no_simulate {
                    config.sensor.simulate_on_fail = false;
                }
            }
            CliCommands::Daemon {
                poll_interval,
                reconnect_delay,
            } => {
                if let Some(poll_interval) = poll_interval {
                    config.daemon.poll_interval = *poll_interval;
                }
                if let Some(reconnect_delay) = reconnect_delay {
                    config.daemon.reconnect_delay = *reconnect_delay;
                }
            }
            CliCommands::Read => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides() {
        let args = CliArgs::parse_from([
            "soilprobe",
            "--device",
            "/dev/ttyAMA0",
            "--address",
            "0x0A",
            "--baud-rate",
            "9600",
            "--timeout",
            "500ms",
            "daemon",
            "--poll-interval",
            "10s",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.serial.device, "/dev/ttyAMA0");
        assert_eq!(config.serial.address, 10);
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.timeout, Duration::from_millis(500));
        assert_eq!(config.serial.retries, 3);
        assert_eq!(config.daemon.poll_interval, Duration::from_secs(10));
        assert_eq!(config.daemon.reconnect_delay, Duration::from_secs(3));
    }

    #[test]
    fn no_simulate() {
        let args = CliArgs::parse_from(["soilprobe", "soil", "--no-simulate"]);
        let mut config = Config::default();
        args.apply(&mut config);
        assert!(!config.sensor.simulate_on_fail);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(CliArgs::try_parse_from(["soilprobe", "--address", "0", "read"]).is_err());
        assert!(CliArgs::try_parse_from(["soilprobe", "--baud-rate", "19200", "read"]).is_err());
        assert!(
            CliArgs::try_parse_from(["soilprobe", "soil", "--no-simulate", "--offline"]).is_err()
        );
    }
}

//! Runtime configuration for the serial link, the polling daemon and the soil
//! sensor facade.
//!
//! A configuration is built once at startup and handed to whatever needs it.
//! With the `serde` feature it can be loaded from a YAML file; every key is
//! optional and falls back to the defaults below.
//!
//! ```yaml
//! serial:
//!   device: /dev/ttyUSB0
//!   baud_rate: 4800
//!   timeout: 300ms
//! daemon:
//!   poll_interval: 5s
//! sensor:
//!   simulate_on_fail: true
//! ```
use crate::protocol as proto;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct SerialConfig {
    #[cfg_attr(feature = "serde", serde(default = "default_device"))]
    pub device: String,
    #[cfg_attr(feature = "serde", serde(default = "default_baud_rate"))]
    pub baud_rate: u32,
    #[cfg_attr(feature = "serde", serde(default = "default_address"))]
    pub address: u8,
    /// Deadline for one complete response frame.
    #[cfg_attr(
        feature = "serde",
        serde(default = "default_timeout", with = "humantime_serde")
    )]
    pub timeout: Duration,
    /// Timeout of the serial port itself, independent of `timeout`.
    #[cfg_attr(
        feature = "serde",
        serde(default = "default_connect_timeout", with = "humantime_serde")
    )]
    pub connect_timeout: Duration,
    /// Total attempts per reading.
    #[cfg_attr(feature = "serde", serde(default = "default_retries"))]
    pub retries: u32,
    #[cfg_attr(
        feature = "serde",
        serde(default = "default_retry_delay", with = "humantime_serde")
    )]
    pub retry_delay: Duration,
}

fn default_device() -> String {
    if cfg!(target_os = "windows") {
        String::from("COM1")
    } else {
        String::from("/dev/ttyUSB0")
    }
}

fn default_baud_rate() -> u32 {
    u32::from(&proto::BaudRate::default())
}

fn default_address() -> u8 {
    *proto::Address::default()
}

fn default_timeout() -> Duration {
    Duration::from_millis(300)
}

fn default_connect_timeout() -> Duration {
    Duration::from_millis(300)
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(50)
}

impl SerialConfig {
    /// Validated probe address.
    pub fn address(&self) -> Result<proto::Address, proto::Error> {
        proto::Address::try_from(self.address)
    }

    /// Validated baud rate.
    pub fn baud_rate(&self) -> Result<proto::BaudRate, proto::Error> {
        proto::BaudRate::try_from(self.baud_rate)
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            baud_rate: default_baud_rate(),
            address: default_address(),
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            retries: default_retries(),
            retry_delay: default_retry_delay(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct DaemonConfig {
    #[cfg_attr(
        feature = "serde",
        serde(default = "default_poll_interval", with = "humantime_serde")
    )]
    pub poll_interval: Duration,
    /// Pause before reopening a port that failed or was lost.
    #[cfg_attr(
        feature = "serde",
        serde(default = "default_reconnect_delay", with = "humantime_serde")
    )]
    pub reconnect_delay: Duration,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_reconnect_delay() -> Duration {
    Duration::from_secs(3)
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            reconnect_delay: default_reconnect_delay(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct SensorConfig {
    /// Return simulated data instead of failing when the probe can't be read.
    #[cfg_attr(feature = "serde", serde(default = "default_simulate_on_fail"))]
    pub simulate_on_fail: bool,
    /// Rainfall in mm reported alongside physical readings; the probe has no rain gauge.
    #[cfg_attr(feature = "serde", serde(default = "default_rainfall"))]
    pub rainfall: f64,
}

fn default_simulate_on_fail() -> bool {
    true
}

fn default_rainfall() -> f64 {
    100.0
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            simulate_on_fail: default_simulate_on_fail(),
            rainfall: default_rainfall(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct Config {
    #[cfg_attr(feature = "serde", serde(default))]
    pub serial: SerialConfig,
    #[cfg_attr(feature = "serde", serde(default))]
    pub daemon: DaemonConfig,
    #[cfg_attr(feature = "serde", serde(default))]
    pub sensor: SensorConfig,
}

#[cfg(feature = "serde")]
impl Config {
    /// Loads a configuration from a YAML file.
    pub fn load(path: impl AsRef<std::path::Path>) -> crate::error::Result<Self> {
        let path = path.as_ref();
        log::debug!("Loading config file from {path:?}");
        let file = std::fs::File::open(path)?;
        Ok(serde_yaml::from_reader(file)?)
    }

    /// Parses a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

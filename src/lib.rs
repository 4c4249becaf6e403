//! A library for reading 7-in-1 NPK soil probes via Modbus RTU.
//!
//! The probe reports soil moisture, temperature, electrical conductivity, pH,
//! nitrogen, phosphorus and potassium in seven holding registers. This crate
//! polls it over a serial link and hands the rest of an application a
//! normalized [`sensor::SoilReading`].
//!
//! The crate is layered bottom-up:
//!
//! 1.  [`crc`] and [`protocol`]: Modbus CRC-16, request frames and response
//!     validation. Pure functions, no I/O.
//! 2.  [`transport`]: the [`transport::SensorTransport`] byte stream trait and
//!     a deadline-bounded exact reader.
//! 3.  [`sync_client::Npk7`]: one complete reading with bounded retries.
//! 4.  [`daemon::Daemon`]: a polling loop that owns the connection and
//!     reconnects after failures.
//! 5.  [`sensor::SoilSensor`]: the facade for application code, with a
//!     deterministic simulated fallback.
//!
//! ## Quick Start
//!
//! ```no_run
//! # #[cfg(feature = "serial")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use npk7_lib::{config::Config, sensor::SoilSensor};
//!
//! let config = Config::default();
//! let mut sensor = SoilSensor::from_config(&config)?;
//! let soil = sensor.read_soil()?;
//! println!("N={} P={} K={} pH={}", soil.nitrogen, soil.phosphorus, soil.potassium, soil.ph);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "serial"))]
//! # fn main() {}
//! ```

pub mod config;
pub mod crc;
pub mod daemon;
pub mod error;
pub mod protocol;
pub mod sensor;
pub mod sync_client;
pub mod transport;

#[cfg_attr(docsrs, doc(cfg(feature = "serial")))]
#[cfg(feature = "serial")]
pub mod serial;

pub use error::{AcquisitionError, Error};

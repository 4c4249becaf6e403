//! Soil sensor facade.
//!
//! This is the entry point for application code. [`SoilSensor::read_soil`]
//! returns a [`SoilReading`] in the canonical seven-field schema consumed by
//! crop recommendation and fertilizer advice. When the probe can't be read the
//! facade falls back to a fixed simulated reading, unless that is disabled.
use crate::{
    config::{Config, SensorConfig, SerialConfig},
    error::{AcquisitionError, Error, Result},
    protocol::{self as proto, RawRegisters},
    sync_client::Npk7,
    transport::{Connector, SensorTransport},
};
use log::*;
use std::io;

/// A normalized soil reading.
///
/// Serializes to `{"N", "P", "K", "temperature", "humidity", "ph", "rainfall"}`.
/// Electrical conductivity is read from the probe but is not part of this schema.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SoilReading {
    /// Nitrogen in mg/kg.
    #[cfg_attr(feature = "serde", serde(rename = "N"))]
    pub nitrogen: f64,
    /// Phosphorus in mg/kg.
    #[cfg_attr(feature = "serde", serde(rename = "P"))]
    pub phosphorus: f64,
    /// Potassium in mg/kg.
    #[cfg_attr(feature = "serde", serde(rename = "K"))]
    pub potassium: f64,
    /// Soil temperature in °C.
    pub temperature: f64,
    /// Soil moisture in percent.
    pub humidity: f64,
    pub ph: f64,
    /// Rainfall in mm. Never measured by the probe.
    pub rainfall: f64,
}

impl SoilReading {
    /// Values returned whenever simulated data is used.
    pub const SIMULATED: SoilReading = SoilReading {
        nitrogen: 40.0,
        phosphorus: 35.0,
        potassium: 30.0,
        temperature: 25.0,
        humidity: 55.0,
        ph: 6.5,
        rainfall: 100.0,
    };

    /// Normalizes a probe reading, adding the externally supplied `rainfall`.
    pub fn from_registers(registers: &RawRegisters, rainfall: f64) -> Self {
        Self {
            nitrogen: registers.nitrogen_mg_kg(),
            phosphorus: registers.phosphorus_mg_kg(),
            potassium: registers.potassium_mg_kg(),
            temperature: registers.temperature_c(),
            humidity: registers.moisture_pct(),
            ph: registers.ph(),
            rainfall,
        }
    }
}

/// Something that can deliver one probe reading.
pub trait SoilProbe {
    fn read_registers(&mut self) -> std::result::Result<RawRegisters, AcquisitionError>;
}

impl<T: SensorTransport> SoilProbe for Npk7<T> {
    fn read_registers(&mut self) -> std::result::Result<RawRegisters, AcquisitionError> {
        self.read_once()
    }
}

/// Opens a fresh connection for every reading and closes it afterwards.
///
/// Suits callers that read rarely and must not hold the serial port.
pub struct OnDemandProbe<C> {
    connector: C,
    serial: SerialConfig,
}

impl<C: Connector> OnDemandProbe<C> {
    pub fn new(connector: C, serial: SerialConfig) -> std::result::Result<Self, proto::Error> {
        serial.address()?;
        Ok(Self { connector, serial })
    }
}

impl<C: Connector> SoilProbe for OnDemandProbe<C> {
    fn read_registers(&mut self) -> std::result::Result<RawRegisters, AcquisitionError> {
        let transport = self.connector.connect()?;
        let mut client = Npk7::from_config(transport, &self.serial)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        client.read_once()
    }
}

/// The component application code reads soil data from.
pub struct SoilSensor {
    probe: Option<Box<dyn SoilProbe>>,
    config: SensorConfig,
}

impl SoilSensor {
    /// A sensor without hardware; every call takes the simulation path.
    pub fn simulated(config: SensorConfig) -> Self {
        Self {
            probe: None,
            config,
        }
    }

    /// A sensor backed by `probe`.
    pub fn new(probe: impl SoilProbe + 'static, config: SensorConfig) -> Self {
        Self {
            probe: Some(Box::new(probe)),
            config,
        }
    }

    /// A sensor reading through a persistent client.
    pub fn with_client<T: SensorTransport + 'static>(client: Npk7<T>, config: SensorConfig) -> Self {
        Self::new(client, config)
    }

    /// A sensor that opens the transport for each reading.
    pub fn with_connector<C: Connector + 'static>(
        connector: C,
        serial: SerialConfig,
        config: SensorConfig,
    ) -> std::result::Result<Self, proto::Error> {
        Ok(Self::new(OnDemandProbe::new(connector, serial)?, config))
    }

    /// A sensor on the serial port described by `config`.
    #[cfg(feature = "serial")]
    pub fn from_config(config: &Config) -> std::result::Result<Self, proto::Error> {
        let connector = crate::serial::SerialConnector::new(config.serial.clone())?;
        Self::with_connector(connector, config.serial.clone(), config.sensor.clone())
    }

    /// A simulated sensor configured from `config`.
    pub fn simulated_from_config(config: &Config) -> Self {
        Self::simulated(config.sensor.clone())
    }

    pub fn has_probe(&self) -> bool {
        self.probe.is_some()
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    /// Reads the soil.
    ///
    /// Tries the probe once (with the client's own retries). If that fails or
    /// there is no probe, returns [`SoilReading::SIMULATED`] when
    /// `simulate_on_fail` is set.
    ///
    /// # Errors
    ///
    /// [`Error::SensorUnavailable`] with the underlying cause, only when
    /// `simulate_on_fail` is disabled.
    pub fn read_soil(&mut self) -> Result<SoilReading> {
        let err = match self.probe.as_mut() {
            Some(probe) => match probe.read_registers() {
                Ok(registers) => {
                    debug!("Sensor registers: {registers:?}");
                    return Ok(SoilReading::from_registers(
                        &registers,
                        self.config.rainfall,
                    ));
                }
                Err(err) => {
                    warn!("[SoilSensor] Sensor read failed: {err}");
                    err
                }
            },
            None => AcquisitionError::TransportUnavailable(io::Error::new(
                io::ErrorKind::NotConnected,
                "no sensor transport configured",
            )),
        };

        if self.config.simulate_on_fail {
            warn!("[SoilSensor] Using simulated soil data");
            Ok(SoilReading::SIMULATED)
        } else {
            Err(Error::SensorUnavailable(err))
        }
    }
}

//! Serial port access for the probe.
//!
//! The probe talks 8N1 without flow control. Ports are opened synchronously and
//! polled with [`SerialPort::bytes_to_read`] so that the bounded reader never
//! blocks inside the driver.
use crate::{
    config::SerialConfig,
    protocol as proto,
    transport::{Connector, SensorTransport},
};
use log::*;
use std::io;
use std::time::Duration;
use tokio_serial::{ClearBuffer, SerialPort};

/// The parity used for serial communication.
pub const PARITY: &tokio_serial::Parity = &tokio_serial::Parity::None;
/// The number of stop bits used for serial communication.
pub const STOP_BITS: &tokio_serial::StopBits = &tokio_serial::StopBits::One;
/// The number of data bits used for serial communication.
pub const DATA_BITS: &tokio_serial::DataBits = &tokio_serial::DataBits::Eight;

/// Creates a `tokio_serial::SerialPortBuilder` with the probe's line settings.
///
/// # Arguments
///
/// * `device` - The path to the serial port device (e.g., `/dev/ttyUSB0`).
/// * `baud_rate` - The baud rate for the serial communication.
/// * `timeout` - Timeout of individual driver calls.
pub fn serial_port_builder(
    device: &str,
    baud_rate: &proto::BaudRate,
    timeout: Duration,
) -> tokio_serial::SerialPortBuilder {
    tokio_serial::new(device, u32::from(baud_rate))
        .parity(*PARITY)
        .stop_bits(*STOP_BITS)
        .data_bits(*DATA_BITS)
        .flow_control(tokio_serial::FlowControl::None)
        .timeout(timeout)
}

/// Opens the port described by `config`.
pub fn open(config: &SerialConfig) -> io::Result<Box<dyn SerialPort>> {
    let baud_rate = config
        .baud_rate()
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    info!("Opening {} at {baud_rate} baud, 8N1", config.device);
    let port = serial_port_builder(&config.device, &baud_rate, config.connect_timeout).open()?;
    Ok(port)
}

impl SensorTransport for dyn SerialPort {
    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        io::Write::write_all(self, frame)?;
        io::Write::flush(self)
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.bytes_to_read()? as usize;
        if available == 0 {
            return Ok(0);
        }
        let wanted = available.min(buf.len());
        io::Read::read(self, &mut buf[..wanted])
    }
}

/// Opens the configured serial port on every [`Connector::connect`].
#[derive(Debug, Clone)]
pub struct SerialConnector {
    config: SerialConfig,
}

impl SerialConnector {
    /// Checks the line settings up front so that reconnects can only fail on I/O.
    pub fn new(config: SerialConfig) -> Result<Self, proto::Error> {
        config.baud_rate()?;
        config.address()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }
}

impl Connector for SerialConnector {
    type Transport = Box<dyn SerialPort>;

    fn connect(&mut self) -> io::Result<Self::Transport> {
        open(&self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connector_rejects_bad_settings() {
        let config = SerialConfig {
            baud_rate: 115200,
            ..Default::default()
        };
        assert_eq!(
            SerialConnector::new(config).unwrap_err(),
            proto::Error::InvalidBaudRate(115200)
        );

        let config = SerialConfig {
            address: 0,
            ..Default::default()
        };
        assert_eq!(
            SerialConnector::new(config).unwrap_err(),
            proto::Error::AddressOutOfRange(0)
        );
    }

    #[test]
    fn missing_device() {
        let config = SerialConfig {
            device: String::from("/dev/this-port-does-not-exist"),
            ..Default::default()
        };
        let mut connector = SerialConnector::new(config).unwrap();
        assert!(connector.connect().is_err());
    }
}

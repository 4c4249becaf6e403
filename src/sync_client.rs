//! Blocking client for the 7-in-1 NPK soil probe.
//!
//! [`Npk7`] owns one [`SensorTransport`] and turns it into soil readings: it
//! sends the "Read Holding Registers" request, collects the 19 byte answer
//! within a deadline and validates it, retrying a bounded number of times.
//!
//! ## Example
//!
//! ```no_run
//! # #[cfg(feature = "serial")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use npk7_lib::{config::SerialConfig, serial, sync_client::Npk7};
//!
//! let config = SerialConfig::default();
//! let port = serial::open(&config)?;
//! let mut client = Npk7::from_config(port, &config)?;
//! let registers = client.read_once()?;
//! println!("{registers}");
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "serial"))]
//! # fn main() {}
//! ```
use crate::{
    config::SerialConfig,
    error::AcquisitionError,
    protocol::{self as proto, RawRegisters},
    transport::{self, SensorTransport},
};
use log::*;
use std::time::Duration;

/// Synchronous client for one probe on one transport.
///
/// All methods that talk to the probe block the current thread for a bounded
/// time, at most `retries × (timeout + retry_delay)`.
#[derive(Debug)]
pub struct Npk7<T> {
    transport: T,
    address: proto::Address,
    timeout: Duration,
    retries: u32,
    retry_delay: Duration,
}

impl<T: SensorTransport> Npk7<T> {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(300);
    pub const DEFAULT_RETRIES: u32 = 3;
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(50);

    /// Creates a client for the probe at the factory default address.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            address: proto::Address::default(),
            timeout: Self::DEFAULT_TIMEOUT,
            retries: Self::DEFAULT_RETRIES,
            retry_delay: Self::DEFAULT_RETRY_DELAY,
        }
    }

    /// Creates a client with address, timeout and retry policy taken from `config`.
    pub fn from_config(transport: T, config: &SerialConfig) -> Result<Self, proto::Error> {
        let mut client = Self::new(transport);
        client.set_address(config.address()?);
        client.set_timeout(config.timeout);
        client.set_retries(config.retries);
        client.set_retry_delay(config.retry_delay);
        Ok(client)
    }

    pub fn set_address(&mut self, address: proto::Address) {
        self.address = address;
    }

    pub fn address(&self) -> proto::Address {
        self.address
    }

    /// Sets the deadline for one complete response frame.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sets the total number of attempts per reading. Zero is treated as one.
    pub fn set_retries(&mut self, retries: u32) {
        self.retries = retries.max(1);
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Sets the pause after a malformed response before the next attempt.
    pub fn set_retry_delay(&mut self, retry_delay: Duration) {
        self.retry_delay = retry_delay;
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Consumes the client and returns the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Reads all seven registers from the probe.
    ///
    /// Each attempt flushes stale input, sends the request and waits for a
    /// full response. A missing or short response is retried right away; a
    /// malformed one after `retry_delay`. The first valid response is
    /// returned without further attempts.
    ///
    /// # Errors
    ///
    /// * [`AcquisitionError::NoResponse`] or [`AcquisitionError::Malformed`]
    ///   describing the last attempt once all attempts are used up.
    /// * [`AcquisitionError::TransportUnavailable`] as soon as the transport
    ///   itself fails; this is never retried.
    pub fn read_once(&mut self) -> Result<RawRegisters, AcquisitionError> {
        let request = proto::build_request(
            *self.address,
            RawRegisters::ADDRESS,
            RawRegisters::QUANTITY,
        );
        trace!("Request frame: {request:02X?}");

        let mut attempt = 1;
        loop {
            let last = attempt >= self.retries;
            match self.attempt(&request) {
                Ok(registers) => {
                    debug!("Attempt {attempt}/{}: {registers:?}", self.retries);
                    return Ok(registers);
                }
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if last => return Err(err),
                Err(err) => {
                    debug!("Attempt {attempt}/{} failed: {err}", self.retries);
                    if matches!(err, AcquisitionError::Malformed(_)) {
                        std::thread::sleep(self.retry_delay);
                    }
                }
            }
            attempt += 1;
        }
    }

    fn attempt(&mut self, request: &[u8]) -> Result<RawRegisters, AcquisitionError> {
        self.transport.discard_input()?;
        self.transport.write_frame(request)?;
        let response = transport::try_read_exact(
            &mut self.transport,
            RawRegisters::RESPONSE_LEN,
            self.timeout,
        )?
        .ok_or(AcquisitionError::NoResponse)?;
        trace!("Response frame: {response:02X?}");
        Ok(proto::decode_response(
            &response,
            *self.address,
            RawRegisters::BYTE_COUNT,
        )?)
    }
}

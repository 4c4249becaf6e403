//! Long-running polling of a single probe.
//!
//! The [`Daemon`] owns the connection: it opens the transport through a
//! [`Connector`], reads the probe every `poll_interval` and reopens the
//! transport after `reconnect_delay` whenever opening it fails or it breaks
//! during a read. It never stops on its own.
use crate::{
    config::{DaemonConfig, SerialConfig},
    error::AcquisitionError,
    protocol::{self as proto, RawRegisters},
    sync_client::Npk7,
    transport::Connector,
};
use log::*;
use std::{fmt, io, thread, time::Duration};

/// What a single [`Daemon::step`] did.
#[derive(Debug)]
pub enum Step {
    /// A new connection was opened.
    Connected,
    /// Opening the transport failed; the daemon will retry after `reconnect_delay`.
    ConnectFailed(io::Error),
    /// A complete reading.
    Reading(RawRegisters),
    /// The probe did not deliver a valid reading; the connection is kept.
    ReadFailed(AcquisitionError),
    /// The transport broke during the read and was dropped.
    ConnectionLost(AcquisitionError),
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Connected => write!(f, "Connected"),
            Step::ConnectFailed(err) => write!(f, "Serial open failed: {err}"),
            Step::Reading(registers) => write!(
                f,
                "---- Soil Sensor Readings ----\n{registers}\n--------------------------------"
            ),
            Step::ReadFailed(err) => write!(f, "Read failed: {err}"),
            Step::ConnectionLost(err) => write!(f, "Connection lost: {err}"),
        }
    }
}

/// Polling loop around one [`Npk7`] client.
pub struct Daemon<C: Connector> {
    connector: C,
    serial: SerialConfig,
    address: proto::Address,
    poll_interval: Duration,
    reconnect_delay: Duration,
    client: Option<Npk7<C::Transport>>,
}

impl<C: Connector> Daemon<C> {
    /// Creates a daemon; no connection is opened until the first [`step`](Self::step).
    pub fn new(
        connector: C,
        serial: SerialConfig,
        daemon: &DaemonConfig,
    ) -> Result<Self, proto::Error> {
        let address = serial.address()?;
        Ok(Self {
            connector,
            serial,
            address,
            poll_interval: daemon.poll_interval,
            reconnect_delay: daemon.reconnect_delay,
            client: None,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Performs one iteration: open the transport if needed, otherwise read once.
    pub fn step(&mut self) -> Step {
        let client = match self.client.as_mut() {
            Some(client) => client,
            None => return self.connect(),
        };

        match client.read_once() {
            Ok(registers) => Step::Reading(registers),
            Err(err) if err.is_retryable() => {
                warn!("Read failed: {err}");
                Step::ReadFailed(err)
            }
            Err(err) => {
                error!("Connection to {} lost: {err}", self.serial.device);
                self.client = None;
                Step::ConnectionLost(err)
            }
        }
    }

    fn connect(&mut self) -> Step {
        let client = self.connector.connect().and_then(|transport| {
            Npk7::from_config(transport, &self.serial)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))
        });
        match client {
            Ok(client) => {
                info!("Connected to {} (address {})", self.serial.device, self.address);
                self.client = Some(client);
                Step::Connected
            }
            Err(err) => {
                error!("Serial open failed on {}: {err}", self.serial.device);
                info!("Retrying in {:?}...", self.reconnect_delay);
                Step::ConnectFailed(err)
            }
        }
    }

    /// How long to wait after `step` before the next iteration.
    pub fn pause_after(&self, step: &Step) -> Duration {
        match step {
            Step::Connected => Duration::ZERO,
            Step::ConnectFailed(_) | Step::ConnectionLost(_) => self.reconnect_delay,
            Step::Reading(_) | Step::ReadFailed(_) => self.poll_interval,
        }
    }

    /// Polls forever, handing every step to `report`.
    pub fn run<F>(&mut self, mut report: F) -> !
    where
        F: FnMut(&Step),
    {
        info!(
            "Polling {} every {:?}",
            self.serial.device, self.poll_interval
        );
        loop {
            let step = self.step();
            report(&step);
            thread::sleep(self.pause_after(&step));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync_client::tests::{sample, Reply, ScriptedProbe};
    use assert_matches::assert_matches;
    use std::collections::VecDeque;

    fn settings() -> (SerialConfig, DaemonConfig) {
        let serial = SerialConfig {
            timeout: Duration::from_millis(10),
            retry_delay: Duration::from_millis(1),
            ..Default::default()
        };
        (serial, DaemonConfig::default())
    }

    fn good() -> Reply {
        Reply::Frame(proto::encode_response(0x01, &sample()))
    }

    /// Hands out the scripted connections in order; fails once they run out.
    fn connector(
        mut connections: VecDeque<io::Result<ScriptedProbe>>,
    ) -> impl FnMut() -> io::Result<ScriptedProbe> {
        move || {
            connections
                .pop_front()
                .unwrap_or_else(|| Err(io::ErrorKind::NotFound.into()))
        }
    }

    #[test]
    fn rejects_invalid_address() {
        let (mut serial, daemon) = settings();
        serial.address = 248;
        assert!(Daemon::new(connector(VecDeque::new()), serial, &daemon).is_err());
    }

    #[test]
    fn open_failure_backs_off() {
        let (serial, config) = settings();
        let mut daemon = Daemon::new(connector(VecDeque::new()), serial, &config).unwrap();
        let step = daemon.step();
        assert_matches!(step, Step::ConnectFailed(_));
        assert!(!daemon.is_connected());
        assert_eq!(daemon.pause_after(&step), Duration::from_secs(3));
    }

    #[test]
    fn connects_then_polls() {
        let (serial, config) = settings();
        let connections = VecDeque::from([Ok(ScriptedProbe::new([good(), good()]))]);
        let mut daemon = Daemon::new(connector(connections), serial, &config).unwrap();

        let step = daemon.step();
        assert_matches!(step, Step::Connected);
        assert_eq!(daemon.pause_after(&step), Duration::ZERO);

        for _ in 0..2 {
            let step = daemon.step();
            assert_matches!(&step, Step::Reading(registers) if *registers == sample());
            assert_eq!(daemon.pause_after(&step), Duration::from_secs(5));
        }
    }

    #[test]
    fn read_failure_keeps_connection() {
        let (serial, config) = settings();
        let connections = VecDeque::from([Ok(ScriptedProbe::default())]);
        let mut daemon = Daemon::new(connector(connections), serial, &config).unwrap();

        assert_matches!(daemon.step(), Step::Connected);
        assert_matches!(
            daemon.step(),
            Step::ReadFailed(AcquisitionError::NoResponse)
        );
        assert!(daemon.is_connected());
    }

    #[test]
    fn transport_failure_reconnects() {
        let (serial, config) = settings();
        let connections = VecDeque::from([
            Ok(ScriptedProbe::new([Reply::WriteFails])),
            Err(io::ErrorKind::PermissionDenied.into()),
            Ok(ScriptedProbe::new([good()])),
        ]);
        let mut daemon = Daemon::new(connector(connections), serial, &config).unwrap();

        assert_matches!(daemon.step(), Step::Connected);
        let step = daemon.step();
        assert_matches!(
            step,
            Step::ConnectionLost(AcquisitionError::TransportUnavailable(_))
        );
        assert_eq!(daemon.pause_after(&step), Duration::from_secs(3));
        assert!(!daemon.is_connected());

        assert_matches!(daemon.step(), Step::ConnectFailed(_));
        assert_matches!(daemon.step(), Step::Connected);
        assert_matches!(daemon.step(), Step::Reading(_));
    }

    #[test]
    fn broken_receive_side_reconnects() {
        let (serial, config) = settings();
        let connections = VecDeque::from([
            Ok(ScriptedProbe::new([Reply::ReadFails])),
            Ok(ScriptedProbe::new([good()])),
        ]);
        let mut daemon = Daemon::new(connector(connections), serial, &config).unwrap();

        assert_matches!(daemon.step(), Step::Connected);
        assert_matches!(
            daemon.step(),
            Step::ConnectionLost(AcquisitionError::TransportUnavailable(_))
        );
        assert!(!daemon.is_connected());
        assert_matches!(daemon.step(), Step::Connected);
        assert_matches!(&daemon.step(), Step::Reading(registers) if *registers == sample());
    }

    #[test]
    fn client_follows_serial_config() {
        let (mut serial, config) = settings();
        serial.address = 0x0A;
        serial.retries = 5;
        let connections = VecDeque::from([Ok(ScriptedProbe::default())]);
        let mut daemon = Daemon::new(connector(connections), serial, &config).unwrap();

        assert_matches!(daemon.step(), Step::Connected);
        let client = daemon.client.as_ref().unwrap();
        assert_eq!(*client.address(), 0x0A);
        assert_eq!(client.retries(), 5);
        assert_eq!(client.timeout(), Duration::from_millis(10));
        assert_eq!(client.retry_delay(), Duration::from_millis(1));
    }

    #[test]
    fn report_lines() {
        assert_eq!(Step::Connected.to_string(), "Connected");
        assert!(Step::Reading(sample())
            .to_string()
            .contains("N: 40  P: 35  K: 30 (mg/kg)"));
        assert_eq!(
            Step::ReadFailed(AcquisitionError::NoResponse).to_string(),
            "Read failed: No/short response from sensor"
        );
    }
}

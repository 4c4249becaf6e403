//! Error types shared by the acquisition path and the soil sensor facade.
use crate::protocol::{self as proto, MalformedReason};

/// Outcome of a failed acquisition.
///
/// `NoResponse` and `Malformed` are retried inside a single
/// [`Npk7::read_once`](crate::sync_client::Npk7::read_once) call;
/// `TransportUnavailable` is not and reaches the caller immediately.
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    /// The probe stayed silent or sent a truncated frame before the deadline.
    #[error("No/short response from sensor")]
    NoResponse,

    /// A complete frame arrived but failed validation.
    #[error("Malformed response: {0}")]
    Malformed(#[from] MalformedReason),

    /// The connection could not be opened or was lost.
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(#[from] std::io::Error),
}

impl AcquisitionError {
    /// True for failures that a further attempt on the same connection may fix.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AcquisitionError::TransportUnavailable(_))
    }
}

/// Represents all errors surfaced by this crate outside the acquisition path.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The sensor could not be read and simulation is disabled.
    #[error("Soil sensor unavailable: {0}")]
    SensorUnavailable(#[source] AcquisitionError),

    /// Wraps `proto::Error`.
    #[error(transparent)]
    ProtocolError(#[from] proto::Error),

    /// The configuration file could not be read.
    #[error("Cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid YAML for [`Config`](crate::config::Config).
    #[cfg(feature = "serde")]
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),
}

/// The result type for facade and configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Unified error type for the hall host.

use std::path::PathBuf;

use hall::HallError;
use hall_protocol::ProtocolError;
use hall_transport::TransportError;

/// Top-level error that wraps the errors of every layer below the host.
///
/// `#[from]` on the wrapped variants lets `?` convert them.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Accepting, reading or writing a connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame failed to encode or decode.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The hall core reported an error.
    #[error(transparent)]
    Hall(#[from] HallError),

    /// The config file couldn't be read.
    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The config file isn't valid JSON for [`crate::ServerConfig`].
    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A config value is unusable.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

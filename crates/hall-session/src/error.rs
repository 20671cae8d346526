//! Error types for the session registry.

use hall_protocol::ConnectionId;

/// Registry state mismatches and bad arguments.
///
/// Callers on the connection-lifecycle path log these and carry on: one
/// misbehaving connection must never take the server down for the others.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// `add_connection` for an id that is still registered.
    #[error("connection {0} already registered")]
    AlreadyExists(ConnectionId),

    /// The id was never registered, or has already disconnected.
    #[error("connection {0} not registered")]
    NotFound(ConnectionId),

    /// An empty id or token.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

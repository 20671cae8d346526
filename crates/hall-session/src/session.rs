//! The per-connection record kept by the registry.

use std::time::Instant;

use hall_protocol::ConnectionId;

/// One live connection.
///
/// Created on connect with an empty token, updated when a login
/// succeeds, dropped on disconnect.
#[derive(Debug, Clone)]
pub struct Session {
    /// Which connection this is.
    pub connection_id: ConnectionId,

    /// Account token set by a successful login. Empty until then.
    pub auth_token: String,

    /// When the connect event was observed.
    pub connected_at: Instant,
}

impl Session {
    pub(crate) fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            auth_token: String::new(),
            connected_at: Instant::now(),
        }
    }

    /// `true` once a login has attached a token.
    pub fn is_authenticated(&self) -> bool {
        !self.auth_token.is_empty()
    }
}

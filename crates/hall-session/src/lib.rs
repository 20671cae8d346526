//! Session registry for the hall service.
//!
//! Tracks every live connection from its connect event to its matching
//! disconnect event, and the auth token attached once the connection
//! logs in. The registry is the only shared mutable state in the hall;
//! the announcement pipeline snapshots it to pick recipients and the
//! login relay writes tokens into it.
//!
//! ```text
//! on_connect ──→ add_connection ──→ set_token (login) ──→ remove_connection ←── on_disconnect
//! ```

mod error;
mod registry;
mod session;

pub use error::RegistryError;
pub use registry::SessionRegistry;
pub use session::Session;

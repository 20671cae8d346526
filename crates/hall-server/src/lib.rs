//! WebSocket host for the hall service.
//!
//! Plays the dispatch layer the hall core expects: accepts client
//! connections, routes `Hall` frames into [`hall::HallModule`], writes
//! replies back, and pushes announcements to arbitrary connections
//! through the [`OutboundHub`]. Also provides the concrete collaborators
//! that need I/O: [`WsUserServiceClient`] and [`HmacSecretKey`].

mod config;
mod error;
mod handler;
mod outbound;
mod secret;
mod server;
mod user_client;

pub use config::{Cli, ServerConfig};
pub use error::ServerError;
pub use outbound::{OUTBOUND_BUFFER, OutboundHub};
pub use secret::HmacSecretKey;
pub use server::{HallServer, HallServerBuilder};
pub use user_client::WsUserServiceClient;

//! Wire protocol for the hall service.
//!
//! - **Frames** ([`Message`], [`ReplyEnvelope`]): the routed frame and
//!   the status wrapper nested inside it.
//! - **Payloads**: login ([`LoginCredentials`], [`UserInfoRequest`],
//!   [`UserProfile`]) and leaderboard ([`RankRequest`], [`RankResponse`]).
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): bytes in, values out.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (Message / ReplyEnvelope) → Hall (routes)
//! ```

mod codec;
mod error;
mod login;
mod rank;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use hall_transport::ConnectionId;
pub use login::{LoginCredentials, UserInfoRequest, UserProfile};
pub use rank::{MoneyItem, OnlineTimeItem, RankRequest, RankResponse, RankType};
pub use types::{CODE_SERVER_ERROR, CODE_SUCCESS, Message, ReplyEnvelope};

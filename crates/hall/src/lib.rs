//! Core of the hall service.
//!
//! The hall is the lobby of the game backend: it tracks who is connected,
//! relays logins to the user service, pushes announcements to everyone,
//! and serves leaderboards.
//!
//! - **[`HallModule`]**: the facade a host dispatches into.
//! - **Announcements** ([`announce`]): poll step, bounded queue, fanout.
//! - **Login** ([`LoginRelay`]): forward, reply verbatim, then enrich.
//! - **Leaderboards** ([`RankAggregator`]).
//! - **Collaborators** ([`services`]) as traits, with in-memory versions
//!   in [`memory`].
//!
//! The session registry itself lives in `hall-session`.

pub mod announce;
mod config;
mod context;
mod error;
pub mod login;
pub mod memory;
mod module;
pub mod rank;
pub mod services;

pub use announce::{
    ANNOUNCE_ROUTE, Announcement, AnnouncementPoller, PollOutcome, spawn_fanout,
};
pub use config::HallConfig;
pub use context::{Reply, ReplyReceiver, RequestContext};
pub use error::{HallError, UpstreamError};
pub use hall_session::{RegistryError, Session, SessionRegistry};
pub use login::{LoginOutcome, LoginRelay};
pub use module::{HallModule, HallServices, LOGIN_ROUTE, MODULE_NAME, RANK_ROUTE};
pub use rank::{RankAggregator, RankQuery};
pub use services::{
    AnnouncementSource, BalanceStore, ConnectionSender, LedgerStore, ProfileCache,
    SecretKeyDeriver, UserService,
};

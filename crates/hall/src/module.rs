//! The `Hall` module: the one object a host wires into its dispatch layer.

use std::sync::Arc;

use hall_protocol::ConnectionId;
use hall_session::SessionRegistry;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::announce::{self, Announcement, AnnouncementPoller, PollOutcome};
use crate::context::{RequestContext, log_reply_error};
use crate::login::LoginRelay;
use crate::rank::RankAggregator;
use crate::services::{
    AnnouncementSource, BalanceStore, LedgerStore, ProfileCache, SecretKeyDeriver, UserService,
};
use crate::{HallConfig, HallError};

/// Name the hall registers under.
pub const MODULE_NAME: &str = "Hall";
pub const LOGIN_ROUTE: &str = "login";
pub const RANK_ROUTE: &str = "rank";

const ROUTES: &[&str] = &[LOGIN_ROUTE, RANK_ROUTE];

/// Everything the hall needs from the outside world.
pub struct HallServices<U, S, B, L, P> {
    pub users: Arc<U>,
    pub announcements: Arc<S>,
    pub balances: Arc<B>,
    pub ledger: Arc<L>,
    pub profiles: Arc<P>,
    pub secret: Arc<dyn SecretKeyDeriver>,
}

/// Session registry, login relay, leaderboards and the announcement poll
/// step behind one facade.
///
/// Share it as `Arc<HallModule<…>>` between connection tasks and the
/// ticker that drives [`poll_announcements`](Self::poll_announcements).
pub struct HallModule<U, S, B, L, P> {
    registry: Arc<SessionRegistry>,
    login: LoginRelay<U, S>,
    rank: RankAggregator<B, L, P>,
    poller: AnnouncementPoller<S>,
}

impl<U, S, B, L, P> HallModule<U, S, B, L, P> {
    pub fn name(&self) -> &'static str {
        MODULE_NAME
    }

    /// Routes [`dispatch`](Self::dispatch) understands.
    pub fn routes(&self) -> &'static [&'static str] {
        ROUTES
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn login_relay(&self) -> &LoginRelay<U, S> {
        &self.login
    }

    pub fn rank_aggregator(&self) -> &RankAggregator<B, L, P> {
        &self.rank
    }

    /// Connection lifecycle hook: registers `id` with an empty token.
    pub fn on_connect(&self, id: &ConnectionId) {
        match self.registry.add_connection(id) {
            Ok(()) => info!(connection_id = %id, "client connected"),
            Err(e) => warn!(connection_id = %id, error = %e, "failed to register connection"),
        }
    }

    /// Connection lifecycle hook: forgets `id`.
    pub fn on_disconnect(&self, id: &ConnectionId) {
        match self.registry.remove_connection(id) {
            Ok(_) => info!(connection_id = %id, "client disconnected"),
            Err(e) => warn!(connection_id = %id, error = %e, "failed to unregister connection"),
        }
    }
}

impl<U, S, B, L, P> HallModule<U, S, B, L, P>
where
    U: UserService,
    S: AnnouncementSource,
    B: BalanceStore,
    L: LedgerStore,
    P: ProfileCache,
{
    /// Builds the module and returns the consuming end of its
    /// announcement queue, to be handed to [`spawn_fanout`](crate::spawn_fanout).
    ///
    /// Zero values in `config` fall back to their defaults.
    pub fn new(
        services: HallServices<U, S, B, L, P>,
        config: &HallConfig,
    ) -> (Self, mpsc::Receiver<Announcement>) {
        let HallServices {
            users,
            announcements,
            balances,
            ledger,
            profiles,
            secret,
        } = services;
        let config = config.clone().validated();

        let registry = Arc::new(SessionRegistry::new());
        let (queue_tx, queue_rx) = announce::announcement_queue(config.announce_queue_capacity);

        let module = Self {
            login: LoginRelay::new(
                users,
                Arc::clone(&announcements),
                Arc::clone(&registry),
                secret,
            ),
            rank: RankAggregator::new(balances, ledger, profiles)
                .with_default_page_size(config.default_page_size),
            poller: AnnouncementPoller::new(announcements, Arc::clone(&registry), queue_tx),
            registry,
        };
        (module, queue_rx)
    }

    /// Runs the handler for `route`. The handler replies through `ctx`;
    /// an unknown route gets a server-error reply.
    pub async fn dispatch(&self, route: &str, mut ctx: RequestContext) {
        match route {
            LOGIN_ROUTE => {
                self.login.handle(&mut ctx).await;
            }
            RANK_ROUTE => self.rank.handle(&mut ctx).await,
            other => {
                let err = HallError::InvalidArgument(format!("unknown route {other}"));
                warn!(connection_id = %ctx.connection_id(), error = %err, "request rejected");
                let result = ctx.server_error(&err);
                log_reply_error(ctx.connection_id(), result);
            }
        }
    }

    /// One announcement poll step; call it from a periodic ticker.
    pub async fn poll_announcements(&self) -> PollOutcome {
        self.poller.poll().await
    }
}

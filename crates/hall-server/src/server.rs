//! `HallServer` builder and server loop.
//!
//! This is the entry point for running the hall. It ties together all the
//! layers: transport → protocol → hall module, plus the two background
//! jobs (announcement poll loop and fanout).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hall::{
    Announcement, AnnouncementSource, BalanceStore, HallModule, HallServices, LedgerStore,
    ProfileCache, UserService,
};
use hall_protocol::JsonCodec;
use hall_ticker::{Ticker, TickerConfig};
use hall_transport::{Incoming, Transport, WebSocketTransport};
use tokio::sync::{mpsc, watch};
use tokio::time;

use crate::handler::handle_connection;
use crate::{OutboundHub, ServerConfig, ServerError};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<U, S, B, L, P> {
    pub(crate) hall: Arc<HallModule<U, S, B, L, P>>,
    pub(crate) outbound: Arc<OutboundHub>,
    pub(crate) codec: JsonCodec,
}

/// Builder for configuring and starting a hall server.
///
/// # Example
///
/// ```rust,ignore
/// let server = HallServerBuilder::new()
///     .config(config)
///     .build(services)
///     .await?;
/// server.run().await
/// ```
pub struct HallServerBuilder {
    config: ServerConfig,
    ticker: Option<TickerConfig>,
}

impl HallServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            ticker: None,
        }
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the bind address of the current config.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Replaces the poll-loop ticker settings. By default the ticker fires
    /// every `hall.announce_interval_ms`.
    pub fn ticker(mut self, ticker: TickerConfig) -> Self {
        self.ticker = Some(ticker);
        self
    }

    /// Binds the WebSocket listener and builds the hall module.
    pub async fn build<U, S, B, L, P>(
        self,
        services: HallServices<U, S, B, L, P>,
    ) -> Result<HallServer<U, S, B, L, P>, ServerError>
    where
        U: UserService,
        S: AnnouncementSource,
        B: BalanceStore,
        L: LedgerStore,
        P: ProfileCache,
    {
        let config = self.config.validated()?;
        let transport = WebSocketTransport::bind(&config.bind_addr).await?;
        let (hall, announcements) = HallModule::new(services, &config.hall);
        let ticker = self
            .ticker
            .unwrap_or_else(|| TickerConfig::every(config.hall.announce_interval()));

        let handshake_timeout = config.handshake_timeout();
        let state = Arc::new(ServerState {
            hall: Arc::new(hall),
            outbound: Arc::new(OutboundHub::new()),
            codec: JsonCodec,
        });

        Ok(HallServer {
            transport,
            state,
            announcements,
            ticker,
            handshake_timeout,
        })
    }
}

impl Default for HallServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound hall server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct HallServer<U, S, B, L, P> {
    transport: WebSocketTransport,
    state: Arc<ServerState<U, S, B, L, P>>,
    announcements: mpsc::Receiver<Announcement>,
    ticker: TickerConfig,
    handshake_timeout: Duration,
}

impl<U, S, B, L, P> HallServer<U, S, B, L, P>
where
    U: UserService,
    S: AnnouncementSource,
    B: BalanceStore,
    L: LedgerStore,
    P: ProfileCache,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    pub fn hall(&self) -> &Arc<HallModule<U, S, B, L, P>> {
        &self.state.hall
    }

    /// Runs until the process is terminated.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Starts the fanout task and the poll loop, then accepts connections
    /// until `shutdown` resolves.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!("hall server running");

        // The fanout stops by itself once the hall module, and with it the
        // queue's sender, is dropped.
        hall::spawn_fanout(self.announcements, Arc::clone(&self.state.outbound));

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let poll_loop = {
            let hall = Arc::clone(&self.state.hall);
            let mut ticker = Ticker::new(self.ticker.clone());
            tokio::spawn(async move {
                let stop = async move {
                    let _ = stop_rx.changed().await;
                };
                ticker
                    .run_until(stop, move |_tick| {
                        let hall = Arc::clone(&hall);
                        async move {
                            hall.poll_announcements().await;
                        }
                    })
                    .await;
                let stats = ticker.stats();
                tracing::debug!(
                    ticks = ticker.ticks(),
                    late = stats.late_ticks,
                    missed = stats.missed_ticks,
                    max_busy_ms = stats.max_busy.as_millis() as u64,
                    "announcement poll loop stopped"
                );
            })
        };

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(incoming) => {
                        let state = Arc::clone(&self.state);
                        let handshake_timeout = self.handshake_timeout;
                        tokio::spawn(async move {
                            let peer = incoming.peer_addr();
                            let handshake = time::timeout(handshake_timeout, incoming.handshake());
                            let conn = match handshake.await {
                                Ok(Ok(conn)) => conn,
                                Ok(Err(e)) => {
                                    tracing::debug!(%peer, error = %e, "handshake failed");
                                    return;
                                }
                                Err(_) => {
                                    tracing::debug!(%peer, "handshake timed out, dropping socket");
                                    return;
                                }
                            };
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => tracing::error!(error = %e, "accept failed"),
                },
            }
        }

        tracing::info!("hall server shutting down");
        self.transport.shutdown().await?;
        let _ = stop_tx.send(true);
        if let Err(e) = poll_loop.await {
            tracing::warn!(error = %e, "announcement poll loop panicked");
        }
        Ok(())
    }
}

use std::sync::Arc;

use clap::Parser;
use hall::HallServices;
use hall::memory::{AnnouncementLog, MemoryBalances, MemoryLedger, MemoryProfileCache};
use hall_server::{Cli, HallServerBuilder, HmacSecretKey, ServerError, WsUserServiceClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.debug { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.load_config()?;
    tracing::info!(
        bind = %config.bind_addr,
        user_service = %config.user_service_url,
        "starting hall server"
    );

    let services = HallServices {
        users: Arc::new(WsUserServiceClient::new(
            config.user_service_url.clone(),
            config.user_service_timeout(),
        )),
        announcements: Arc::new(AnnouncementLog::new()),
        balances: Arc::new(MemoryBalances::new()),
        ledger: Arc::new(MemoryLedger::new()),
        profiles: Arc::new(MemoryProfileCache::new()),
        secret: Arc::new(HmacSecretKey::new(config.secret.as_bytes())?),
    };

    let server = HallServerBuilder::new()
        .config(config)
        .build(services)
        .await?;
    tracing::info!(addr = ?server.local_addr().ok(), "listening");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
}

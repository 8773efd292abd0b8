use std::net::SocketAddr;

use helpday_backend::{config::Config, routes, services::identity, AppState};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::from_env()?;
    info!(config = ?config, "configuration loaded");

    if config.telegram_bot_token.is_none() {
        warn!("TELEGRAM_BOT_TOKEN not set; every login will fail with a configuration error");
    }

    let backend = identity::connect(&config).await?;
    let addr: SocketAddr = config.server_address.parse()?;
    let app = routes::router(AppState::new(config, backend));

    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_webhook_gateway::config::Config;
use chat_webhook_gateway::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load()?;
    info!("Loaded configuration: {:?}", config);

    let state = AppState::from_config(&config)?;
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("Server starting on {}", config.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}

//! Chat API server.

use std::sync::Arc;

use chat_api::{app, AppState, AuthProvider, Config, LocalStore, NoAuth, RemoteAuth};
use database::Database;
use llm_client::LlmClient;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(addr = %config.addr, "Starting chat API server");

    // Connect to database
    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;

    let llm = LlmClient::new(config.llm.clone())?;

    let auth: Arc<dyn AuthProvider> = match (&config.auth_url, &config.auth_api_key) {
        (Some(url), Some(key)) => {
            info!(url = %url, "Using remote auth provider");
            Arc::new(RemoteAuth::new(url, key)?)
        }
        _ => {
            warn!("AUTH_URL/AUTH_API_KEY not set; all requests are anonymous");
            Arc::new(NoAuth)
        }
    };

    let store = Arc::new(LocalStore::new(&config.storage_dir, &config.public_url).await?);

    // Build application state
    let addr = config.addr;
    let state = AppState::new(config, db.clone(), llm, auth, store);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Chat API server listening");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Chat API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
}

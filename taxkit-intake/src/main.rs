//! taxkit-intake - Tax-Year Intake Workflow Service
//!
//! HTTP service: REST + SSE for uploads, chat turns, and progress.

use anyhow::Result;
use std::sync::Arc;
use taxkit_common::config::ServiceConfig;
use taxkit_common::events::EventBus;
use taxkit_intake::analysis::ClaudeClient;
use taxkit_intake::AppState;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting taxkit-intake");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Resolve configuration (env → TOML → defaults) and prepare data folder
    let config = ServiceConfig::resolve().map_err(|e| anyhow::anyhow!("{}", e))?;
    config
        .ensure_data_folder()
        .map_err(|e| anyhow::anyhow!("Failed to initialize data folder: {}", e))?;

    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = taxkit_intake::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    let event_bus = EventBus::new(100);

    let provider = Arc::new(ClaudeClient::new(
        config.anthropic_api_key.clone(),
        config.anthropic_model.clone(),
    ));

    let state = AppState::new(db_pool, event_bus, provider, config.files_folder());
    let app = taxkit_intake::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("Listening on http://{}", config.bind_address);
    info!("Health check: http://{}/health", config.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}

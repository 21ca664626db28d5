//! SoleFeed Service - HTTP API, price monitor and alert delivery
//!
//! This is the main entry point for the solefeed service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use solefeed_service::config::StoreBackend;
use solefeed_service::{create_router, scheduler, AppState, ServiceConfig};
use solefeed_store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,solefeed=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting SoleFeed Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env()?;
    config.validate()?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        store_backend = ?config.store_backend,
        price_source = config.price_source.as_str(),
        classifier_configured = %config.classifier_url.is_some(),
        email_configured = %config.email.is_some(),
        rate_limit_backend = ?config.rate_limit_backend,
        "Service configuration loaded"
    );

    let store: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Postgres => {
            let url = config.database_url.as_deref().unwrap_or_default();
            tracing::info!("Connecting to PostgreSQL");
            let store = PgStore::connect(url, config.database_max_connections).await?;
            store.run_migrations().await?;
            tracing::info!("Database migrations applied");
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store - all data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Build app state
    let state = AppState::new(store, config.clone())?;

    let jobs = scheduler::spawn(Arc::new(state.clone()));
    tracing::info!(scheduled_jobs = jobs.len(), "Batch scheduler started");

    // Create the router
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

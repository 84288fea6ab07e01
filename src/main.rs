//! Taproom server binary

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use taproom::api::{create_router, AppState};
use taproom::config::{AppConfig, LogFormat};
use taproom::store::{create_store, TapStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;

    init_tracing(&config)?;

    let state = build_app_state(&config)?;
    let router = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    tracing::info!(%addr, "Listening for HTTP traffic");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn build_app_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let admin_secret = config.admin_secret();
    if admin_secret.is_none() {
        tracing::warn!("No admin secret configured; every request will be refused");
    }

    let store: Option<Arc<dyn TapStore>> = match config
        .store_runtime()
        .context("invalid store configuration")?
    {
        Some(store_config) => {
            let store = create_store(store_config).context("failed to create store client")?;
            Some(Arc::from(store))
        }
        None => {
            tracing::warn!("Store URL or service key missing; requests will fail until configured");
            None
        }
    };

    tracing::info!(
        backend = ?config.store.backend,
        table = %config.store.table,
        adjust_strategy = ?config.adjust.strategy,
        "Store initialised"
    );

    Ok(AppState::new(admin_secret, store).with_adjust_strategy(config.adjust.strategy))
}

fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.logging.level.clone()))
        .unwrap_or_else(|_| EnvFilter::new("taproom=info,tower_http=info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format {
        LogFormat::Json => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            registry.with(tracing_subscriber::fmt::layer()).init();
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

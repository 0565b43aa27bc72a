use anyhow::Context;
use api::{create_router, AppState};
use background_service::{BackgroundService, ScheduleConfig};
use database::Database;
use memefeed_core::{AppConfig, MemeSource};
use reddit_client::RedditClient;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new(
                    "memefeed=info,api=info,background_service=info,reddit_client=info,\
                     database=info,telegram_notifier=info,tower_http=info",
                )
            }),
        )
        .init();

    tracing::info!("Starting Memefeed");

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    tracing::info!(
        "Response cache {} ({} min), rate limit {}s",
        if config.cache_enabled { "enabled" } else { "disabled" },
        config.cache_expire_minutes,
        config.rate_limit_seconds
    );

    let database = Database::connect(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    database
        .init_schema()
        .await
        .context("Failed to create database schema")?;
    let database = Arc::new(database);

    let reddit = RedditClient::from_app_config(&config).context("Failed to create Reddit client")?;
    tracing::info!(
        "Reading r/{} ({})",
        reddit.subreddit(),
        if reddit.uses_oauth() { "OAuth" } else { "anonymous" }
    );
    let source: Arc<dyn MemeSource> = Arc::new(reddit);

    let scheduler = Arc::new(BackgroundService::new(
        source.clone(),
        database.clone(),
        ScheduleConfig::from_app_config(&config),
    ));
    scheduler
        .start()
        .await
        .context("Failed to start scheduled reports")?;

    let state = Arc::new(AppState::new(
        source,
        database,
        config.telegram_settings(),
    ));
    let app = create_router(state, &config.cors_origins());

    let bind_addr = config.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    scheduler.stop().await;
    tracing::info!("Memefeed stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

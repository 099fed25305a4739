mod app;
mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod import;
mod models;
mod pages;
mod recycle;
mod records;
mod spreadsheet;

use anyhow::Context;
use config::AppConfig;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "filetrack=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    info!(
        profile = ?config.profile,
        platform = %config.platform,
        database = %config.database_path,
        users = config.admin_users.len(),
        "starting file tracker"
    );

    let conn = db::connect_with_retry(
        &config.database_path,
        config.db_connect_retries,
        config.db_retry_delay,
    )
    .await
    .context("failed to establish database connection")?;
    auth::seed_users(&conn, &config.admin_users)
        .await
        .context("failed to seed users")?;

    let address = config.bind_address();
    let state = app::AppState {
        db: conn,
        config: Arc::new(config),
    };
    let router = app::router(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!("Server running on http://{}", address);
    axum::serve(listener, router).await?;
    Ok(())
}

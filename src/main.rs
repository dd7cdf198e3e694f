mod config;
mod db;
mod domain;
mod error;
mod middleware;
mod services;
mod state;
mod web;

use crate::config::Config;
use crate::db::seed;
use crate::state::{AppState, SharedState};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let pool = connect(&config).await?;

    match std::env::args().nth(1).as_deref() {
        Some("bootstrap") => bootstrap(&config, &pool).await,
        Some(other) => {
            anyhow::bail!("Unknown command '{other}'. Usage: employability_backend [bootstrap]")
        }
        None => serve(config, pool).await,
    }
}

async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to run database migrations: {}", e);
            e
        })?;
    tracing::info!("Database migrations completed");
    Ok(pool)
}

/// One-shot seeding, run at deployment time and never in production.
async fn bootstrap(config: &Config, pool: &PgPool) -> anyhow::Result<()> {
    if config.is_production() {
        anyhow::bail!("Refusing to seed sample data when APP_ENV=production");
    }
    seed::seed_all(pool, &config.bootstrap_password, &config.allowed_email_domain).await?;
    tracing::info!("Bootstrap completed");
    Ok(())
}

async fn serve(config: Config, pool: PgPool) -> anyhow::Result<()> {
    let addr = config.bind_addr.clone();
    let shared: SharedState = Arc::new(AppState {
        pool,
        session_key: config.session_key.clone(),
        config,
    });

    // Forget idle login rate-limit entries hourly.
    tokio::spawn(async {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            web::auth::LOGIN_RATE_LIMITER.cleanup().await;
        }
    });

    let app = Router::new()
        .merge(web::routes(shared))
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

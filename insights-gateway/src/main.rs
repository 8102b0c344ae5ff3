//! Insights gateway: JSON over HTTP in front of the insights engine.
//!
//! | Method | Path              |                                          |
//! |--------|-------------------|------------------------------------------|
//! | GET    | `/health`         | liveness                                 |
//! | POST   | `/insights`       | `{tenantId, locale, filter}` → one page  |
//! | DELETE | `/insights/cache` | `?tenantId=` (omit to clear all tenants) |
//!
//! # Environment variables
//! | Var                              | Default                   |
//! |----------------------------------|---------------------------|
//! | `INSIGHTS_LISTEN_ADDR`           | `0.0.0.0:8090`            |
//! | `DATABASE_URL`                   | required (or Bitwarden)   |
//! | `BWS_ACCESS_TOKEN`               | optional                  |
//! | `BWS_DATABASE_URL_ID`            | `insights-database-url`   |
//! | `INSIGHTS_REDIS_URL`             | optional, else in-memory  |
//! | `INSIGHTS_AMQP_URL`              | optional                  |
//! | `INSIGHTS_CACHE_TTL_SECS`        | `28800`                   |
//! | `INSIGHTS_CACHE_WORKERS`         | `10`                      |
//! | `INSIGHTS_CACHE_QUEUE_CAPACITY`  | `1024`                    |
//! | `INSIGHTS_DB_MAX_CONNECTIONS`    | `10`                      |

mod handlers;
mod invalidation;
mod models;
mod secrets;
mod settings;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    routing::{delete, get, post},
    Router,
};
use insights_core::{
    CacheStore, InsightsCache, InsightsService, MemoryCacheStore, PgQueryExecutor,
    RedisCacheStore, TaskQueue,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::settings::Settings;

// ------------------------------------------------------------------ //
//  Shared application state                                           //
// ------------------------------------------------------------------ //

pub struct AppState {
    pub service: InsightsService,
    /// Background cache writes; drained on shutdown.
    pub queue: Arc<TaskQueue>,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/insights", post(handlers::post_insights))
        .route("/insights/cache", delete(handlers::invalidate_cache))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ------------------------------------------------------------------ //
//  Entry point                                                        //
// ------------------------------------------------------------------ //

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("insights_gateway=info".parse()?)
                .add_directive("insights_core=info".parse()?),
        )
        .json()
        .init();

    let settings = Settings::from_env()?;

    let database_url = secrets::database_url().await?;
    let pool = PgPoolOptions::new()
        .max_connections(settings.db_max_connections)
        .connect(&database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    let store: Arc<dyn CacheStore> = match &settings.redis_url {
        Some(url) => {
            info!("Using RedisCacheStore");
            Arc::new(RedisCacheStore::connect(url).await?)
        }
        None => {
            info!("No Redis config; using MemoryCacheStore");
            Arc::new(MemoryCacheStore::new())
        }
    };

    let queue = Arc::new(TaskQueue::start(settings.task_queue()));
    let cache = InsightsCache::new(store, Arc::clone(&queue), settings.cache());
    let service = InsightsService::new(Arc::new(PgQueryExecutor::new(pool)), cache);
    let state = Arc::new(AppState {
        service,
        queue: Arc::clone(&queue),
    });

    if let Some(url) = &settings.amqp_url {
        invalidation::spawn(url, Arc::clone(&state)).await?;
    }

    let listener = tokio::net::TcpListener::bind(&settings.listen_addr).await?;
    info!(addr = %settings.listen_addr, "insights-gateway listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    queue.drain_and_stop().await;
    info!("insights-gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

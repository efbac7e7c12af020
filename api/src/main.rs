mod config;
mod constants;
mod domain;
mod models;
mod routes;
mod services;

use axum::http::{Method, header::CONTENT_TYPE};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use config::Config;
use services::cache::{DurationCache, RedisStore};
use services::duration_source::HttpDurationSource;
use services::scheduler::start_validation_scheduler;
use services::validation::ValidationEngine;

pub struct AppState {
    pub db: PgPool,
    pub cache: Arc<DurationCache<RedisStore>>,
    pub validation: ValidationEngine<PgPool, RedisStore>,
    pub durations: HttpDurationSource,
}

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    let store = RedisStore::connect(&config.redis_url)
        .await
        .expect("Failed to connect to Redis");
    let cache = Arc::new(DurationCache::new(store));

    let durations = HttpDurationSource::new(config.youtube_api_key.clone())
        .expect("Failed to build HTTP client");
    if !durations.has_youtube_key() {
        warn!("YOUTUBE_API_KEY not set, YouTube durations will stay unresolved");
    }

    let state = Arc::new(AppState {
        db: pool.clone(),
        cache: cache.clone(),
        validation: ValidationEngine::new(pool, cache, config.validation_concurrency),
        durations,
    });

    let scheduler = tokio::spawn(start_validation_scheduler(
        state.clone(),
        config.validation_interval_secs,
    ));

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let app = routes::build_routes().layer(cors).with_state(state.clone());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {}: {}", addr, e));

    info!("Listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server failed");

    scheduler.abort();
    info!("[scheduler] Validation scheduler stopped");
    info!("Server shut down");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

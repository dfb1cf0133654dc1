pub mod cli;
pub mod config;
pub mod coral;
pub mod db;
pub mod events;
pub mod handlers;
pub mod monitor;
pub mod test_utils;

use coral_shared::CoralError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};

use crate::config::{AppConfig, CorsOrigins};
use crate::coral::CoralSource;
use crate::events::MonitorEvent;

pub struct AppState {
    pub pool: SqlitePool,
    pub tx: broadcast::Sender<Arc<MonitorEvent>>,
    pub source: Arc<dyn CoralSource>,
    pub config: AppConfig,
}

#[derive(Debug)]
pub enum AppError {
    Coral(CoralError),
    Internal(anyhow::Error),
    NotFound(String),
    Validation(String),
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, err_type, message) = match self {
            AppError::Coral(e) => {
                let status = match &e {
                    CoralError::Timeout(_) => axum::http::StatusCode::GATEWAY_TIMEOUT,
                    CoralError::Config(_) => axum::http::StatusCode::BAD_REQUEST,
                    _ => axum::http::StatusCode::BAD_GATEWAY,
                };
                (status, "CoralError".to_string(), e.to_string())
            }
            AppError::Internal(e) => {
                // Full error stays in the server log
                tracing::error!("Internal error: {}", e);
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalError".to_string(),
                    "An internal error occurred".to_string(),
                )
            }
            AppError::NotFound(m) => (axum::http::StatusCode::NOT_FOUND, "NotFound".to_string(), m),
            AppError::Validation(m) => (
                axum::http::StatusCode::BAD_REQUEST,
                "ValidationError".to_string(),
                m,
            ),
        };

        let body = axum::Json(serde_json::json!({
            "status": "error",
            "error": {
                "type": err_type,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<CoralError> for AppError {
    fn from(err: CoralError) -> Self {
        AppError::Coral(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(anyhow::anyhow!(err))
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Open (creating if needed) the mirror database and run migrations.
pub async fn connect_pool(database_url: &str) -> anyhow::Result<SqlitePool> {
    if let Some(path_str) = database_url.strip_prefix("sqlite:") {
        let db_path = std::path::Path::new(path_str.trim_start_matches("//"));
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty()
                && parent != std::path::Path::new(".")
                && !path_str.starts_with(":memory:")
            {
                std::fs::create_dir_all(parent)?;
                tracing::info!("📁 Data directory: {}", parent.display());
            }
        }
    }

    let opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;
    db::init_db(&pool).await?;
    Ok(pool)
}

/// A migrated in-memory database. One connection, so every query sees the
/// same database.
pub async fn memory_pool() -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    db::init_db(&pool).await?;
    Ok(pool)
}

fn cors_layer(origins: &CorsOrigins) -> tower_http::cors::CorsLayer {
    use tower_http::cors::{AllowOrigin, Any, CorsLayer};

    let layer = CorsLayer::new()
        .allow_methods([axum::http::Method::GET])
        .allow_headers([axum::http::header::CONTENT_TYPE]);
    match origins {
        CorsOrigins::Any => layer.allow_origin(Any),
        CorsOrigins::List(list) => layer.allow_origin(AllowOrigin::list(list.clone())),
    }
}

/// Dashboard API under `/api`, the embedded dashboard everywhere else.
pub fn build_router(state: Arc<AppState>) -> axum::Router {
    use axum::{routing::get, Router};

    let api_routes = Router::new()
        .route("/agents", get(handlers::get_agents))
        .route("/threads", get(handlers::get_threads))
        .route("/messages", get(handlers::get_messages))
        .route("/stats", get(handlers::get_stats))
        .route("/check-coral-server", get(handlers::check_coral_server))
        .route("/system/version", get(handlers::version_handler))
        .route("/events", get(handlers::sse_handler));

    let cors = cors_layer(&state.config.cors_origins);
    Router::new()
        .nest("/api", api_routes.with_state(state))
        .fallback(handlers::assets::static_handler)
        .layer(cors)
}

/// Monitor entry point: mirror database, polling loop and dashboard server.
pub async fn run_monitor() -> anyhow::Result<()> {
    use tracing::info;

    info!("+---------------------------------------+");
    info!("|             Coral Monitor             |");
    info!(
        "|             Version {:<10}       |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+---------------------------------------+");

    let config = AppConfig::load()?;
    info!(
        "📍 Loaded Config: DB_URL={}, CORAL={}, SESSION={}",
        config.database_url,
        config.coral.origin(),
        config.coral.session_id
    );
    if !config.coral.devmode {
        tracing::warn!("CORAL_DEVMODE is off; the monitor only reads dev-mode REST endpoints");
    }

    let pool = connect_pool(&config.database_url).await?;
    let (tx, _rx) = broadcast::channel(config.event_channel_capacity);
    let source: Arc<dyn CoralSource> = Arc::new(coral::HttpCoralSource::new(
        config.coral.clone(),
        config.request_timeout(),
    )?);
    let shutdown = Arc::new(Notify::new());

    let monitor = Arc::new(monitor::Monitor::new(
        source.clone(),
        pool.clone(),
        tx.clone(),
        config.polling_interval(),
    ));
    let monitor_handle = monitor.spawn(shutdown.clone());

    let bind = format!("{}:{}", config.bind_address, config.port);
    let app_state = Arc::new(AppState {
        pool,
        tx,
        source,
        config,
    });
    let app = build_router(app_state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("🚀 Coral Monitor is listening on http://{}", bind);

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        signal.notify_waiters();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.notified().await;
            info!("🛑 Graceful shutdown signal received. Stopping server...");
        })
        .await?;

    if let Err(e) = monitor_handle.await {
        tracing::warn!("Monitor task ended abnormally: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use serde_json::Value;

    async fn render(err: AppError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_coral_errors_map_to_gateway_statuses() {
        let (status, body) = render(CoralError::Timeout("GET /agents".into()).into()).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"]["type"], "CoralError");

        let (status, _) = render(CoralError::Network("refused".into()).into()).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, _) = render(CoralError::Config("bad url".into()).into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let (status, body) =
            render(anyhow::anyhow!("disk I/O error at /var/lib/secret.db").into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["type"], "InternalError");
        assert_eq!(body["error"]["message"], "An internal error occurred");
        assert!(!body.to_string().contains("secret.db"));
    }

    #[tokio::test]
    async fn test_not_found_and_validation_bodies() {
        let (status, body) = render(AppError::NotFound("No API route for /api/x".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["type"], "NotFound");
        assert_eq!(body["error"]["message"], "No API route for /api/x");

        let (status, body) = render(AppError::Validation("limit must be at least 1".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "ValidationError");
    }
}

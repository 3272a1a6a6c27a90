//! Attention Monitor API Server
//!
//! HTTP surface of the attention monitor: the annotated MJPEG stream, live
//! session readings, session lifecycle and reports over stored sessions.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

pub mod config;
pub mod error;
pub mod overlay;
pub mod routes;
pub mod session;

pub use config::AppConfig;
pub use error::{ApiError, StatusResponse};
pub use session::{SessionCoordinator, SessionSnapshot, SessionTotals};

use attention::AttentionMonitor;
use config::LoggingConfig;
use storage::Repository;

/// Application state shared across handlers
pub struct AppState {
    /// Live session and frame loop
    pub session: SessionCoordinator,
    /// Stored session summaries
    pub repository: Repository,
    /// Prometheus recorder, when installed
    pub metrics: Option<PrometheusHandle>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(session: SessionCoordinator, repository: Repository) -> Self {
        Self {
            session,
            repository,
            metrics: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: ComponentStatus,
    pub session: SessionSnapshot,
    pub stored_sessions: Option<i64>,
}

/// Component status
#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub camera: ComponentHealth,
    pub database: ComponentHealth,
}

/// Individual component health
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ComponentHealth {
    fn new(status: &str, detail: Option<String>) -> Self {
        Self {
            status: status.to_string(),
            detail,
        }
    }
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/video_feed", get(routes::video::video_feed))
        .route("/video_feed_exit", post(routes::video::video_feed_exit))
        .route("/exit_video", get(routes::video::exit_video))
        .route("/get_emotion", get(routes::live::get_emotion))
        .route("/get_flag", get(routes::live::get_flag))
        .route("/get_attention", get(routes::reports::get_attention))
        .route("/get_emotions", get(routes::reports::get_emotions))
        .route("/quiz_result", get(routes::reports::quiz_result))
        .route("/sessions", get(routes::reports::sessions))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let session = state.session.snapshot();
    let (stored_sessions, database) = match state.repository.count().await {
        Ok(n) => (Some(n), ComponentHealth::new("ok", None)),
        Err(e) => (None, ComponentHealth::new("error", Some(e.to_string()))),
    };
    let camera = if session.streaming {
        ComponentHealth::new("streaming", None)
    } else {
        ComponentHealth::new("idle", None)
    };

    let status = if stored_sessions.is_some() { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        components: ComponentStatus { camera, database },
        session,
        stored_sessions,
    })
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level: Level = config.level.parse().unwrap_or_else(|_| {
        eprintln!("unknown log level {:?}, using info", config.level);
        Level::INFO
    });
    let builder = FmtSubscriber::builder().with_max_level(level).with_target(true);

    if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Build the shared state from configuration
pub async fn build_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let repository = Repository::connect(&config.storage.url, config.storage.max_connections).await?;
    let monitor = AttentionMonitor::new(config.attention.clone())?;
    let session = SessionCoordinator::new(
        Arc::new(config.camera.clone()),
        monitor,
        config.session.clone(),
    );

    let mut state = AppState::new(session, repository);
    if config.metrics.enabled {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => state = state.with_metrics(handle),
            Err(e) => warn!("Prometheus recorder not installed: {}", e),
        }
    }
    Ok(state)
}

/// Run the server until Ctrl-C
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let state = Arc::new(build_state(&config).await?);
    let app = create_router(Arc::clone(&state));

    let addr = config.server.addr();
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Ctrl-C handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown requested");
        })
        .await?;

    state.repository.close().await;
    Ok(())
}

//! Cockpit Monitor Service
//!
//! Runs the driver-monitoring session on its own thread and serves the
//! dashboard REST API, live tuning and Prometheus metrics.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use alerting::{AlertDispatcher, LogPlayer};
use camera_capture::{CameraError, DirectorySource};
use dms::{Detectors, DmsError, DmsModule, EventSink, TraceReplay};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use storage::{EventLogger, EventRepository, StatusSnapshot, StorageError, SystemStatus};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

mod routes;
pub mod session;
pub mod settings;

pub use routes::tuning::{Tuning, TuningUpdate};
pub use session::{SessionCommand, SessionHandle, SessionOutputs, SessionReport};
pub use settings::{AppSettings, ServerConfig, SessionConfig};

/// Service error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Processing session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Dms(#[from] DmsError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::SessionUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Application state shared across handlers
pub struct AppState {
    /// Recent events for the API
    pub repository: Arc<EventRepository>,
    /// Dashboard snapshot, written by the processing thread
    pub status: Arc<std::sync::RwLock<StatusSnapshot>>,
    /// Control channel into the processing thread
    pub commands: Option<mpsc::UnboundedSender<SessionCommand>>,
    /// Last applied live-tuning values
    pub tuning: Tuning,
    pub metrics: Option<PrometheusHandle>,
    pub version: String,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(repository: Arc<EventRepository>, status: Arc<std::sync::RwLock<StatusSnapshot>>) -> Self {
        Self {
            repository,
            status,
            commands: None,
            tuning: Tuning::default(),
            metrics: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn with_commands(mut self, commands: mpsc::UnboundedSender<SessionCommand>) -> Self {
        self.commands = Some(commands);
        self
    }

    pub fn with_tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn with_metrics(mut self, metrics: Option<PrometheusHandle>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Current processing state as seen by the dashboard
    pub fn system_status(&self) -> SystemStatus {
        self.status
            .read()
            .map(|status| status.system_status)
            .unwrap_or(SystemStatus::Error)
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub session: SystemStatus,
    pub event_count: usize,
}

/// Create the application router
pub fn create_router(state: Arc<RwLock<AppState>>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/status", get(routes::status::get_status))
        .route("/api/v1/events", get(routes::events::get_events))
        .route(
            "/api/v1/tuning",
            get(routes::tuning::get_tuning).put(routes::tuning::put_tuning),
        )
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<RwLock<AppState>>>) -> impl IntoResponse {
    let state = state.read().await;
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let session = state.system_status();
    let status = match session {
        SystemStatus::Error => "degraded",
        _ => "healthy",
    };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        session,
        event_count: state.repository.len(),
    })
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<Arc<RwLock<AppState>>>) -> Result<String, ApiError> {
    let state = state.read().await;
    state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .ok_or_else(|| ApiError::NotFound("metrics are disabled".into()))
}

/// Initialize logging
pub fn init_logging(json: bool) {
    let builder = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())
            .expect("Failed to set tracing subscriber");
    } else {
        tracing::subscriber::set_global_default(builder.finish())
            .expect("Failed to set tracing subscriber");
    }
}

/// Detector collaborators for the session; a missing trace disables detection
fn load_detectors(config: &SessionConfig) -> Detectors {
    let Some(path) = &config.trace_file else {
        warn!("No detector trace configured, running without detectors");
        return Detectors::default();
    };
    match TraceReplay::open(path) {
        Ok(trace) => Detectors::from_trace(trace),
        Err(e) => {
            warn!("Detectors unavailable: {}", e);
            Detectors::default()
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

/// Run the processing session and the API server until Ctrl-C
pub async fn run(settings: AppSettings) -> Result<(), ApiError> {
    let metrics = if settings.server.metrics {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Metrics disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    let repository = Arc::new(EventRepository::new(settings.storage.max_events));
    let status = Arc::new(std::sync::RwLock::new(StatusSnapshot::new(
        settings.storage.snapshot_events,
    )));

    let mut sinks: Vec<Arc<dyn EventSink>> = vec![repository.clone()];
    let logger_task = match EventLogger::spawn(&settings.storage.detection_log).await {
        Ok((logger, task)) => {
            sinks.push(Arc::new(logger));
            Some(task)
        }
        Err(e) => {
            warn!("Detection log disabled: {}", e);
            None
        }
    };

    let (alerts, alert_task) = AlertDispatcher::spawn(settings.alerts.clone(), Arc::new(LogPlayer));

    let dms = DmsModule::new(settings.dms.clone(), load_detectors(&settings.session))?;
    let outputs = SessionOutputs {
        sinks,
        alerts: Some(Arc::new(alerts)),
        status: status.clone(),
        status_file: Some(settings.storage.status_file.clone()),
        snapshot_every_frames: settings.storage.snapshot_every_frames,
    };
    let source = DirectorySource::from_config(&settings.camera);
    let session = session::start(source, dms, outputs, settings.session.clone(), &settings.camera)?;

    let state = AppState::new(repository, status)
        .with_commands(session.commands())
        .with_tuning(Tuning::from_settings(&settings))
        .with_metrics(metrics);
    let app = create_router(Arc::new(RwLock::new(state)));

    info!("Starting API server on {}", settings.server.addr);
    let listener = tokio::net::TcpListener::bind(&settings.server.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let report = tokio::task::spawn_blocking(move || session.stop())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    info!(
        "Session report: {} frames read, {} processed, {} events",
        report.frames_read, report.frames_processed, report.events
    );

    // The session owned the last senders, so both workers drain and exit
    if let Err(e) = alert_task.await {
        warn!("Alert worker ended abnormally: {}", e);
    }
    if let Some(task) = logger_task {
        if let Err(e) = task.await {
            warn!("Detection log writer ended abnormally: {}", e);
        }
    }
    Ok(())
}

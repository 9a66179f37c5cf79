pub mod forecast;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{Context, Result};
use aqf_config::AppConfig;
use aqf_core::ForecastRecord;
use aqf_pipeline::{forecast_is_stale, Pipeline, PipelineError, RunSummary};
use aqf_store::FileStatus;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use opentelemetry::metrics::{Counter, MeterProvider};
use opentelemetry::KeyValue;
use opentelemetry_prometheus::exporter;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Serialize;
use serde_json::json;

use crate::forecast::group_by_station;

/// Serving knobs taken from `[api]` and `[schedule]`
#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// How far back `GET /api/v1/forecast` reaches
    pub window: chrono::Duration,
    /// Forecast age that triggers a refresh before serving
    pub max_age: Duration,
}

impl ApiSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            window: chrono::Duration::hours(cfg.api.window_hours),
            max_age: cfg.schedule.max_age(),
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

pub struct AppState {
    ready: AtomicBool,
    registry: Registry,
    #[allow(dead_code)]
    provider: SdkMeterProvider,
    requests_total: Counter<u64>,
    pipeline_runs_total: Counter<u64>,
    pipeline: Arc<Pipeline>,
    settings: ApiSettings,
}

pub fn build_app(pipeline: Arc<Pipeline>, settings: ApiSettings) -> Result<(Router, Arc<AppState>)> {
    // Prometheus exporter via OpenTelemetry
    let registry = Registry::new();
    let reader = exporter()
        .with_registry(registry.clone())
        .build()
        .context("failed to build prometheus exporter")?;
    let provider = SdkMeterProvider::builder().with_reader(reader).build();
    let meter = provider.meter("aqf-cli");

    let requests_total = meter
        .u64_counter("aqf_requests_total")
        .with_description("Total HTTP requests served")
        .init();
    let pipeline_runs_total = meter
        .u64_counter("aqf_pipeline_runs_total")
        .with_description("Pipeline runs started by the API, by outcome")
        .init();

    let state = Arc::new(AppState {
        ready: AtomicBool::new(false),
        registry,
        provider,
        requests_total,
        pipeline_runs_total,
        pipeline,
        settings,
    });

    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/forecast", get(forecast))
        .route("/api/v1/forecast/status", get(status))
        .route("/api/v1/forecast/refresh", post(refresh))
        .with_state(Arc::clone(&state));

    Ok((router, state))
}

pub fn set_ready(state: &Arc<AppState>, is_ready: bool) {
    state.ready.store(is_ready, Ordering::Relaxed);
}

fn error_response(status: StatusCode, error: &str, details: impl ToString) -> Response {
    (
        status,
        Json(json!({ "error": error, "details": details.to_string() })),
    )
        .into_response()
}

async fn run_pipeline(state: &AppState) -> Result<RunSummary, PipelineError> {
    let result = state.pipeline.run().await;
    let outcome = match &result {
        Ok(_) => "ok",
        Err(PipelineError::AlreadyRunning) => "busy",
        Err(_) => "error",
    };
    state
        .pipeline_runs_total
        .add(1, &[KeyValue::new("outcome", outcome)]);
    if let Err(e) = &result {
        tracing::error!(error = %e, "pipeline run failed");
    }
    result
}

/// Forecast table, `None` when it was never written
async fn load_forecast(state: &AppState) -> Result<Option<Vec<ForecastRecord>>> {
    let store = state.pipeline.forecast_store().clone();
    let loaded = tokio::task::spawn_blocking(move || -> Result<Option<Vec<ForecastRecord>>> {
        if !FileStatus::of(store.path())?.exists {
            return Ok(None);
        }
        Ok(Some(store.load()?))
    })
    .await??;
    Ok(loaded)
}

async fn healthz(State(state): State<Arc<AppState>>) -> StatusCode {
    state.requests_total.add(1, &[]);
    StatusCode::OK
}

async fn readyz(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn metrics(
    State(state): State<Arc<AppState>>,
) -> (
    [(axum::http::header::HeaderName, axum::http::HeaderValue); 1],
    String,
) {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buf) {
        tracing::warn!(error=?e, "failed to encode metrics");
    }
    let body = String::from_utf8(buf).unwrap_or_default();
    let header = (
        header::CONTENT_TYPE,
        axum::http::HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );
    ([header], body)
}

async fn forecast(State(state): State<Arc<AppState>>) -> Response {
    state.requests_total.add(1, &[]);

    let path = state.pipeline.forecast_store().path().to_path_buf();
    let stale = match forecast_is_stale(&path, state.settings.max_age) {
        Ok(stale) => stale,
        Err(e) => {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read forecast", e)
        }
    };
    if stale {
        tracing::info!(path = %path.display(), "forecast stale, regenerating before serving");
        match run_pipeline(&state).await {
            Ok(_) | Err(PipelineError::AlreadyRunning) => {}
            Err(e) => {
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to update forecast",
                    e,
                )
            }
        }
    }

    let records = match load_forecast(&state).await {
        Ok(Some(records)) => records,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                "Forecast file not found",
                "The pipeline did not produce a forecast file",
            )
        }
        Err(e) => {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read forecast", e)
        }
    };

    let since = Utc::now().naive_utc() - state.settings.window;
    let labels = state.pipeline.stations().iter().map(|s| s.label.as_str());
    let grouped = group_by_station(&records, labels, since);

    let served: usize = grouped.values().map(Vec::len).sum();
    if served == 0 {
        tracing::warn!(rows = records.len(), "no forecast rows within the serving window");
    }
    (StatusCode::OK, Json(grouped)).into_response()
}

#[derive(Debug, Serialize)]
struct ForecastStatus {
    last_update: Option<DateTime<Utc>>,
    file_exists: bool,
    file_size: u64,
}

async fn status(State(state): State<Arc<AppState>>) -> Response {
    state.requests_total.add(1, &[]);
    match FileStatus::of(state.pipeline.forecast_store().path()) {
        Ok(file) => Json(ForecastStatus {
            last_update: file.modified,
            file_exists: file.exists,
            file_size: file.size,
        })
        .into_response(),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to read forecast status",
            e,
        ),
    }
}

async fn refresh(State(state): State<Arc<AppState>>) -> Response {
    state.requests_total.add(1, &[]);
    match run_pipeline(&state).await {
        Ok(summary) => Json(json!({
            "message": "Forecast updated",
            "timestamp": Utc::now().to_rfc3339(),
            "summary": summary,
        }))
        .into_response(),
        Err(e @ PipelineError::AlreadyRunning) => {
            error_response(StatusCode::CONFLICT, "Forecast update already running", e)
        }
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update forecast",
            e,
        ),
    }
}

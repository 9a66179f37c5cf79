use std::sync::Arc;

use aqf_cli::ApiSettings;
use aqf_forecast::{AdditiveModel, ModelConfig};
use aqf_ingest::SimulatedSource;
use aqf_pipeline::Pipeline;
use aqf_store::{ForecastStore, RawStore};
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use tower::ServiceExt;

fn pipeline(dir: &std::path::Path) -> Arc<Pipeline> {
    let source = SimulatedSource::new(
        vec!["E6".into(), "E7".into(), "E8".into()],
        chrono::Duration::hours(4),
        chrono::Duration::minutes(5),
    );
    let model = AdditiveModel::new(ModelConfig {
        uncertainty_samples: 20,
        ..ModelConfig::default()
    })
    .unwrap();
    Arc::new(Pipeline::new(
        Arc::new(source),
        Arc::new(model),
        RawStore::new(dir.join("realreg.parquet")),
        ForecastStore::new(dir.join("fcst_db.parquet")),
    ))
}

async fn call(app: &Router, method: Method, uri: &str) -> (StatusCode, String) {
    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = res.status();
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn health_ready_metrics_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = aqf_cli::build_app(pipeline(dir.path()), ApiSettings::default()).unwrap();

    // /healthz returns 200 and increments a counter
    let (status, _) = call(&app, Method::GET, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    // /readyz initially 503
    let (status, _) = call(&app, Method::GET, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    aqf_cli::set_ready(&state, true);
    let (status, _) = call(&app, Method::GET, "/readyz").await;
    assert_eq!(status, StatusCode::OK);

    // a run so the pipeline counter has a data point
    let (status, _) = call(&app, Method::POST, "/api/v1/forecast/refresh").await;
    assert_eq!(status, StatusCode::OK);

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let ct = res.headers().get("content-type").unwrap().to_str().unwrap();
    assert!(ct.starts_with("text/plain"));
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("aqf_requests_total"));
    assert!(text.contains("aqf_pipeline_runs_total"));
}

#[tokio::test]
async fn unknown_route_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = aqf_cli::build_app(pipeline(dir.path()), ApiSettings::default()).unwrap();
    let (status, _) = call(&app, Method::GET, "/api/v1/current").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

//! Full runs against a mocked measurement API and temporary Parquet files

use std::sync::Arc;
use std::time::Duration as StdDuration;

use aqf_config::AppConfig;
use aqf_core::{parse_timestamp, Reading, ReadingSource};
use aqf_forecast::{AdditiveModel, ModelConfig};
use aqf_pipeline::{Pipeline, PipelineError};
use aqf_store::{ForecastStore, RawStore};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde_json::json;
use tokio::sync::Notify;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STATIONS: [(&str, &str); 3] = [("E6", "Huara"), ("E7", "Victoria"), ("E8", "Colonia Pintados")];

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Six hours of 5-minute readings per station, as the API serves them
fn api_payload() -> serde_json::Value {
    let mut rows = Vec::new();
    for (idx, (code, _)) in STATIONS.iter().enumerate() {
        for i in 0..72 {
            let ts = start() + Duration::minutes(5 * i);
            let value = 20.0 + 5.0 * idx as f64 + (i as f64 / 6.0).sin();
            rows.push(json!({
                "timestamp": ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
                "station_name": code,
                "variable_name": "PM10",
                // the API serialises decimals as text
                "valor": format!("{value:.2}"),
            }));
        }
    }
    json!(rows)
}

fn config(dir: &std::path::Path, url: String) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.source.url = url;
    cfg.source.timeout_secs = 2;
    cfg.storage.dir = dir.join("databases");
    cfg.forecast.uncertainty_samples = 100;
    cfg
}

async fn serve(status: u16, body: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/datos-PM10"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn forecasts_48_future_buckets_per_station() {
    let dir = tempfile::tempdir().unwrap();
    let server = serve(200, api_payload()).await;
    let cfg = config(dir.path(), format!("{}/api/datos-PM10", server.uri()));

    let summary = Pipeline::from_config(&cfg).unwrap().run().await.unwrap();

    assert_eq!(summary.fetched, 3 * 72);
    assert_eq!(summary.raw_rows, 3 * 72);
    // 24 observed buckets plus 48 ahead
    for (_, label) in STATIONS {
        assert_eq!(summary.per_station[label], 24 + 48);
    }

    let last_observed = start() + Duration::minutes(5 * 71);
    let table = ForecastStore::new(cfg.storage.forecast_path()).load().unwrap();
    assert_eq!(table.len(), summary.forecast_rows);
    for (_, label) in STATIONS {
        let future: Vec<_> = table
            .iter()
            .filter(|r| r.station == label && r.ds > last_observed)
            .collect();
        assert_eq!(future.len(), 48, "{label}");
        assert!(future.iter().all(|r| r.y.is_none()));
        assert!(future.iter().all(|r| r.yhat_lower <= r.yhat && r.yhat <= r.yhat_upper));
        assert_eq!(future[47].ds, start() + Duration::minutes(5 * 69) + Duration::hours(12));
    }
}

#[tokio::test]
async fn failed_fetch_still_forecasts_from_stored_readings() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), String::new());

    // seed the raw table from an earlier successful fetch
    let seeded: Vec<Reading> = serde_json::from_value(api_payload()).unwrap();
    RawStore::new(cfg.storage.raw_path()).save(&seeded).unwrap();

    let server = serve(503, json!({"error": "db down"})).await;
    let cfg = AppConfig {
        source: aqf_config::SourceConfig {
            url: format!("{}/api/datos-PM10", server.uri()),
            ..cfg.source.clone()
        },
        ..cfg
    };

    let summary = Pipeline::from_config(&cfg).unwrap().run().await.unwrap();
    assert_eq!(summary.fetched, 0);
    assert_eq!(summary.raw_rows, seeded.len());
    assert_eq!(summary.per_station.len(), 3);
}

#[tokio::test]
async fn repeated_runs_are_idempotent_on_raw_rows() {
    let dir = tempfile::tempdir().unwrap();
    let server = serve(200, api_payload()).await;
    let cfg = config(dir.path(), format!("{}/api/datos-PM10", server.uri()));
    let pipeline = Pipeline::from_config(&cfg).unwrap();

    let first = pipeline.run().await.unwrap();
    let second = pipeline.run().await.unwrap();

    assert_eq!(first.raw_rows, second.raw_rows);
    // same ds keys, newer generation replaces the older one
    assert_eq!(first.forecast_rows, second.forecast_rows);
    let table = pipeline.forecast_store().load().unwrap();
    assert!(table.iter().all(|r| r.current_time == second.generated_at));

    let stored = pipeline.raw_store().load().unwrap();
    assert!(stored.iter().all(|r| parse_timestamp(&r.timestamp).is_ok()));
}

/// Blocks inside `fetch` until released
struct Gate {
    entered: Notify,
    release: Notify,
}

#[async_trait::async_trait]
impl ReadingSource for Gate {
    fn name(&self) -> &str {
        "gate"
    }

    async fn fetch(&self) -> Vec<Reading> {
        self.entered.notify_one();
        self.release.notified().await;
        serde_json::from_value(api_payload()).unwrap_or_default()
    }
}

#[tokio::test]
async fn concurrent_run_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let gate = Arc::new(Gate {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let model = AdditiveModel::new(ModelConfig {
        uncertainty_samples: 20,
        ..ModelConfig::default()
    })
    .unwrap();
    let pipeline = Arc::new(Pipeline::new(
        gate.clone(),
        Arc::new(model),
        RawStore::new(dir.path().join("realreg.parquet")),
        ForecastStore::new(dir.path().join("fcst_db.parquet")),
    ));

    let first = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.run().await }
    });
    gate.entered.notified().await;

    assert!(pipeline.is_running());
    assert!(matches!(
        pipeline.run().await,
        Err(PipelineError::AlreadyRunning)
    ));

    gate.release.notify_one();
    let summary = tokio::time::timeout(StdDuration::from_secs(60), first)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(summary.per_station.len(), 3);
    assert!(!pipeline.is_running());
}

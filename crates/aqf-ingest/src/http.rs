//! Measurement API fetcher

use std::time::Duration;

use aqf_core::{Reading, ReadingSource};
use reqwest::{Client, StatusCode};
use tracing::{debug, error, info, warn};

use crate::{IngestError, IngestResult};

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Pulls the current batch of readings from the measurement API with a
/// single GET request.
pub struct ApiFetcher {
    client: Client,
    url: String,
}

impl ApiFetcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> IngestResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IngestError::ClientError(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch and decode readings, surfacing the failure reason
    pub async fn try_fetch(&self) -> IngestResult<Vec<Reading>> {
        debug!(url = %self.url, "fetching readings");

        let response = self.client.get(&self.url).send().await.map_err(|e| {
            if e.is_timeout() {
                IngestError::Timeout
            } else {
                IngestError::CommunicationError(e.to_string())
            }
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(IngestError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                IngestError::Timeout
            } else {
                IngestError::CommunicationError(e.to_string())
            }
        })?;

        serde_json::from_slice(&body).map_err(|e| IngestError::InvalidPayload(e.to_string()))
    }
}

#[async_trait::async_trait]
impl ReadingSource for ApiFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self) -> Vec<Reading> {
        match self.try_fetch().await {
            Ok(readings) => {
                info!(count = readings.len(), "fetched readings");
                readings
            }
            Err(IngestError::Status(code)) => {
                warn!(url = %self.url, status = code, "failed to fetch readings");
                Vec::new()
            }
            Err(e) => {
                error!(url = %self.url, error = %e, "error fetching readings");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher_for(server: &MockServer, timeout: Duration) -> ApiFetcher {
        ApiFetcher::new(format!("{}/api/datos-PM10", server.uri()), timeout).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_decodes_readings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/datos-PM10"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"[{"timestamp":"2024-03-01T12:00:00.000Z","station_name":"E6","variable_name":"PM10","valor":"41.20"},
                    {"timestamp":"2024-03-01T12:01:00.000Z","station_name":"E7","variable_name":"PM10","valor":38}]"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server, DEFAULT_TIMEOUT);
        let readings = fetcher.fetch().await;

        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].station_name, "E6");
        assert_eq!(readings[0].value(), Some(41.2));
        assert_eq!(readings[1].valor.as_deref(), Some("38"));
    }

    #[tokio::test]
    async fn test_non_200_yields_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server, DEFAULT_TIMEOUT);
        assert!(matches!(fetcher.try_fetch().await, Err(IngestError::Status(503))));
        assert!(fetcher.fetch().await.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_yields_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("[]", "application/json")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server, Duration::from_millis(50));
        assert!(matches!(fetcher.try_fetch().await, Err(IngestError::Timeout)));
        assert!(fetcher.fetch().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_yields_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<html>", "text/html"))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server, DEFAULT_TIMEOUT);
        assert!(matches!(
            fetcher.try_fetch().await,
            Err(IngestError::InvalidPayload(_))
        ));
        assert!(fetcher.fetch().await.is_empty());
    }

    #[tokio::test]
    async fn test_connection_refused_yields_empty() {
        // Nothing listens on the discard port
        let fetcher = ApiFetcher::new("http://127.0.0.1:9/api/datos-PM10", DEFAULT_TIMEOUT).unwrap();
        assert!(fetcher.fetch().await.is_empty());
    }
}

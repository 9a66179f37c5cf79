//! Reading sources for the forecast pipeline
//!
//! The HTTP fetcher pulls the latest readings from the measurement API; the
//! simulator produces synthetic readings for offline runs.

pub mod http;
pub mod simulator;

pub use http::*;
pub use simulator::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("HTTP client error: {0}")]
    ClientError(String),

    #[error("Communication error: {0}")]
    CommunicationError(String),

    #[error("Unexpected status code: {0}")]
    Status(u16),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Timeout waiting for data")]
    Timeout,
}

pub type IngestResult<T> = Result<T, IngestError>;

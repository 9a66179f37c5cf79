//! Core data types and resampling for the air-quality forecast pipeline
//!
//! Readings are kept exactly as the measurement API delivers them; numeric
//! coercion and timestamp parsing happen when a series is resampled.

pub mod pipeline;
pub mod resample;
pub mod time;
pub mod types;

pub use pipeline::*;
pub use resample::*;
pub use time::*;
pub use types::*;

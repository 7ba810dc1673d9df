//! Error types for Flowsense
//!
//! Only lifecycle conditions surface as errors. Data-quality conditions
//! (invalid intervals, missing samples, uncalibrated baselines, zero
//! baseline values) are absorbed by fallbacks inside the scoring path and
//! never produce an `Err`.

use thiserror::Error;

/// Errors that can occur around the session lifecycle
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Session is no longer running")]
    SessionClosed,

    #[error("Session is not active")]
    SessionNotActive,

    #[error("Session runtime task failed: {0}")]
    RuntimeFailure(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid replay event: {0}")]
    InvalidReplayEvent(String),
}

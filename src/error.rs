//! # Error Handling
//!
//! Custom error types for the transcription proxy. Most failures in this
//! service are recovered locally (a malformed frame is logged and the
//! connection keeps running), so `AppError` exists mainly for the paths
//! that cross module boundaries: configuration loading, the upstream
//! provider calls, and session lifecycle operations.

use std::fmt;

/// Error categories used across the proxy.
///
/// ## Error Categories:
/// - **Internal**: unexpected failures inside the proxy itself
/// - **Config**: configuration file or environment variable problems
/// - **BadMessage**: a frame that failed to parse as the expected JSON
/// - **Upstream**: the transcription provider or bot platform is unreachable
///   or returned an error
/// - **Session**: a transcription-session operation was invalid for the
///   current session state (e.g. sending audio with no open socket)
#[derive(Debug)]
pub enum AppError {
    /// Unexpected internal failures
    Internal(String),

    /// Configuration file or environment variable problems
    Config(String),

    /// A frame that failed to parse as expected JSON
    BadMessage(String),

    /// The upstream provider or bot platform failed or is unreachable
    Upstream(String),

    /// A session operation was invalid for the current session state
    Session(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::BadMessage(msg) => write!(f, "Bad message: {}", msg),
            AppError::Upstream(msg) => write!(f, "Upstream error: {}", msg),
            AppError::Session(msg) => write!(f, "Session error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing failures are client/provider input problems, not proxy bugs.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadMessage(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// HTTP failures always involve one of the two upstream services.
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Upstream(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        AppError::Upstream(format!("WebSocket error: {}", err))
    }
}

/// Type alias for Results that use our custom error type.
pub type AppResult<T> = Result<T, AppError>;

//! Error types for scenario runs

use std::any::Any;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Navigation failed for {url}: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Identity API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejection surfaced by the application under test itself
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Browser driver error: {0}")]
    Driver(String),

    #[error("Suite setup failed: {0}")]
    Setup(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Panicked: {0}")]
    Panic(String),

    #[error("No captured artifact named '{0}'")]
    ArtifactMissing(String),

    #[error("Application health check failed after {0} attempts")]
    ServerHealthCheck(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl HarnessError {
    /// Stable label used in the results document
    pub fn kind(&self) -> &'static str {
        match self {
            HarnessError::Navigation { .. } => "navigation",
            HarnessError::Timeout(_) => "timeout",
            HarnessError::ElementNotFound(_) => "element_not_found",
            HarnessError::Assertion(_) => "assertion",
            HarnessError::Api { .. } => "api",
            HarnessError::NotFound(_) => "not_found",
            HarnessError::Validation(_) => "validation",
            HarnessError::Driver(_) => "driver",
            HarnessError::Setup(_) => "setup",
            HarnessError::Config(_) => "config",
            HarnessError::Panic(_) => "panic",
            HarnessError::ArtifactMissing(_) => "artifact_missing",
            HarnessError::ServerHealthCheck(_) => "server_health_check",
            HarnessError::Io(_) => "io",
            HarnessError::Json(_) => "json",
            HarnessError::Yaml(_) => "yaml",
            HarnessError::Http(_) => "http",
            HarnessError::Url(_) => "url",
            HarnessError::Token(_) => "token",
        }
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        HarnessError::Assertion(message.into())
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;

/// Turn a caught unwind payload into a `Panic` error
pub fn from_panic(payload: Box<dyn Any + Send>) -> HarnessError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    HarnessError::Panic(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(HarnessError::Timeout("x".into()).kind(), "timeout");
        assert_eq!(
            HarnessError::Api { status: 409, message: "conflict".into() }.kind(),
            "api"
        );
        assert_eq!(HarnessError::ArtifactMissing("url".into()).kind(), "artifact_missing");
    }

    #[test]
    fn test_panic_payloads_keep_their_message() {
        let err = from_panic(Box::new("boom"));
        assert_eq!(err.kind(), "panic");
        assert_eq!(err.to_string(), "Panicked: boom");

        let err = from_panic(Box::new(format!("step {}", 2)));
        assert_eq!(err.to_string(), "Panicked: step 2");

        let err = from_panic(Box::new(42u8));
        assert_eq!(err.to_string(), "Panicked: non-string panic payload");
    }

    #[test]
    fn test_api_error_display_carries_status() {
        let err = HarnessError::Api { status: 404, message: "no such user".into() };
        assert_eq!(err.to_string(), "Identity API returned 404: no such user");
    }
}

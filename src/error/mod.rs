//! Error types for tabletalk.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all tabletalk operations.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Model switch to '{model}' failed: {message}")]
    ModelSwitch { model: String, message: String },

    #[error("Tool registration failed: {0}")]
    Registration(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Render error: {0}")]
    Render(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl ChatError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::Network(_) | Self::Connection(_) => ErrorCategory::Network,
            Self::Protocol(_) => ErrorCategory::Protocol,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Configuration(_) | Self::Toml(_) | Self::ModelNotFound(_) => {
                ErrorCategory::Configuration
            }
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::Registration(_) | Self::ToolExecution { .. } => ErrorCategory::Tooling,
            Self::ModelSwitch { .. } => ErrorCategory::Configuration,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit
                | ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Server
        )
    }

    /// Whether this error ends the current turn.
    ///
    /// Only stream-level failures abort a turn; everything else is recovered
    /// locally.
    pub fn is_turn_fatal(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Network
                | ErrorCategory::Protocol
                | ErrorCategory::Timeout
                | ErrorCategory::Server
                | ErrorCategory::RateLimit
                | ErrorCategory::Authentication
                | ErrorCategory::Api
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Authentication => RecoverySuggestion::CheckCredentials,
            ErrorCategory::RateLimit | ErrorCategory::Network | ErrorCategory::Server => {
                RecoverySuggestion::RetryWithBackoff
            }
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::Tooling => RecoverySuggestion::CheckToolServer,
            _ => RecoverySuggestion::ReportIssue,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_failures_are_turn_fatal() {
        assert!(ChatError::Connection("reset".into()).is_turn_fatal());
        assert!(ChatError::Protocol("bad frame".into()).is_turn_fatal());
        assert!(ChatError::Timeout(500).is_turn_fatal());
        assert!(ChatError::api(503, "down").is_turn_fatal());
    }

    #[test]
    fn local_failures_are_not_turn_fatal() {
        assert!(!ChatError::Registration("spawn failed".into()).is_turn_fatal());
        assert!(!ChatError::Render("no rows".into()).is_turn_fatal());
        assert!(!ChatError::ModelSwitch {
            model: "x/y".into(),
            message: "nope".into()
        }
        .is_turn_fatal());
    }

    #[test]
    fn api_status_maps_to_category() {
        assert_eq!(ChatError::api(401, "").category(), ErrorCategory::Authentication);
        assert_eq!(ChatError::api(429, "").category(), ErrorCategory::RateLimit);
        assert_eq!(ChatError::api(502, "").category(), ErrorCategory::Server);
        assert_eq!(ChatError::api(400, "").category(), ErrorCategory::Api);
        assert!(ChatError::api(429, "").is_retryable());
        assert!(!ChatError::api(400, "").is_retryable());
    }
}

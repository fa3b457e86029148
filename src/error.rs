//! Error types for the context pruner
//!
//! Only configuration and setup problems are errors. Degraded scoring inputs
//! (empty contexts, messages missing from their corpus, zero budgets) resolve
//! to fallback values instead.

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, ContextError>;

/// Context pruner errors
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid strategy '{name}': {reason}")]
    InvalidStrategy { name: String, reason: String },

    #[error("Unknown scoring profile: {0}")]
    UnknownProfile(String),

    #[error("Token estimation failed: {0}")]
    Estimation(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for ContextError {
    fn from(err: config::ConfigError) -> Self {
        ContextError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_strategy_message() {
        let err = ContextError::InvalidStrategy {
            name: "custom".to_string(),
            reason: "preserve_ratio must be within [0, 1]".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid strategy 'custom': preserve_ratio must be within [0, 1]"
        );
    }

    #[test]
    fn test_config_error_conversion() {
        let err: ContextError = config::ConfigError::Message("missing field".to_string()).into();
        assert!(matches!(err, ContextError::Configuration(_)));
    }
}

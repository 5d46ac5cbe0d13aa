//! Error types for cohost.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CohostError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio decoder errors
    #[error("Failed to spawn audio decoder: {message}")]
    Spawn { message: String },

    // LLM provider errors (malformed output, quota, timeout)
    #[error("LLM provider error: {message}")]
    Provider { message: String },

    // Rejected operations (oversized reply, bad fact index)
    #[error("Validation failed: {message}")]
    Validation { message: String },

    // Fact file errors
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    // Chat boundary errors
    #[error("Chat error: {message}")]
    Chat { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CohostError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_file_not_found_display() {
        let error = CohostError::ConfigFileNotFound {
            path: "/path/to/config.toml".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Configuration file not found at /path/to/config.toml"
        );
    }

    #[test]
    fn test_config_invalid_value_display() {
        let error = CohostError::ConfigInvalidValue {
            key: "stream.url".to_string(),
            message: "must not be empty".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for stream.url: must not be empty"
        );
    }

    #[test]
    fn test_spawn_display() {
        let error = CohostError::Spawn {
            message: "ffmpeg: not found".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to spawn audio decoder: ffmpeg: not found"
        );
    }

    #[test]
    fn test_provider_display() {
        let error = CohostError::Provider {
            message: "timed out after 30s".to_string(),
        };
        assert_eq!(error.to_string(), "LLM provider error: timed out after 30s");
    }

    #[test]
    fn test_validation_display() {
        let error = CohostError::Validation {
            message: "reply is too long (612 > 500)".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Validation failed: reply is too long (612 > 500)"
        );
    }

    #[test]
    fn test_persistence_display() {
        let error = CohostError::Persistence {
            message: "disk full".to_string(),
        };
        assert_eq!(error.to_string(), "Persistence error: disk full");
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: CohostError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: CohostError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_source_chain_io() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error: CohostError = io_error.into();

        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<CohostError>();
        assert_sync::<CohostError>();
    }
}

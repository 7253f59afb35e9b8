use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Timed out after {millis}ms: {operation}")]
    Timeout { operation: String, millis: u64 },

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("Store {path} is unreadable: {source}")]
    StoreUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store {path} is malformed: {source}")]
    StoreCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Notification error: {channel}: {message}")]
    Notification { channel: String, message: String },

    #[error("Cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn browser(err: impl std::fmt::Display) -> Self {
        AppError::Browser(err.to_string())
    }

    /// Errors that abandon the current cycle but are expected to clear up by
    /// the next one.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Browser(_)
                | AppError::Timeout { .. }
                | AppError::ElementNotFound { .. }
                | AppError::Http(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

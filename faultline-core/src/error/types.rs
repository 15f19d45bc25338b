//! Core error type for faultline

use thiserror::Error;

/// Error type for faultline's own operations
#[derive(Error, Debug)]
pub enum FaultlineError {
    #[error("Configuration error in {component}: {message}")]
    ConfigurationError { component: String, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] Box<std::io::Error>),

    #[error("JSON error: {0}")]
    JsonError(#[from] Box<serde_json::Error>),

    #[error("HTTP error: {0}")]
    HttpError(#[from] Box<reqwest::Error>),

    #[error("Delivery to sink '{sink}' failed: {message}")]
    SinkError { sink: String, message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

pub type FaultlineResult<T> = std::result::Result<T, FaultlineError>;

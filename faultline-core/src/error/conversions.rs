//! From implementations for converting external errors into FaultlineError

use super::types::FaultlineError;

impl From<std::io::Error> for FaultlineError {
    fn from(err: std::io::Error) -> Self {
        FaultlineError::IoError(Box::new(err))
    }
}

impl From<serde_json::Error> for FaultlineError {
    fn from(err: serde_json::Error) -> Self {
        FaultlineError::JsonError(Box::new(err))
    }
}

impl From<reqwest::Error> for FaultlineError {
    fn from(err: reqwest::Error) -> Self {
        FaultlineError::HttpError(Box::new(err))
    }
}

impl From<toml::de::Error> for FaultlineError {
    fn from(err: toml::de::Error) -> Self {
        FaultlineError::ConfigurationError {
            component: "toml".to_string(),
            message: format!("Failed to parse TOML: {}", err),
        }
    }
}

impl From<toml::ser::Error> for FaultlineError {
    fn from(err: toml::ser::Error) -> Self {
        FaultlineError::Internal {
            message: format!("Failed to render TOML: {}", err),
        }
    }
}

impl From<url::ParseError> for FaultlineError {
    fn from(err: url::ParseError) -> Self {
        FaultlineError::ConfigurationError {
            component: "url".to_string(),
            message: format!("Invalid URL: {}", err),
        }
    }
}

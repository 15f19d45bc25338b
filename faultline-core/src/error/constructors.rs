//! Constructor helpers for FaultlineError

use super::types::FaultlineError;

impl FaultlineError {
    /// Create a configuration error for a specific component
    ///
    /// # Examples
    /// ```rust
    /// use faultline_core::error::FaultlineError;
    ///
    /// let err = FaultlineError::configuration("reporter.sample_rate", "must be within 0.0..=1.0");
    /// assert!(err.to_string().contains("reporter.sample_rate"));
    /// ```
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        FaultlineError::ConfigurationError {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a sink delivery error
    pub fn sink(sink: impl Into<String>, message: impl Into<String>) -> Self {
        FaultlineError::SinkError {
            sink: sink.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        FaultlineError::Internal {
            message: message.into(),
        }
    }

    /// Whether the error points at a deployment defect rather than a transient fault
    pub fn is_configuration(&self) -> bool {
        matches!(self, FaultlineError::ConfigurationError { .. })
    }
}

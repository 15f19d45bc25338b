//! Turning raw errors into taxonomy values

use std::error::Error as StdError;
use std::sync::Arc;

use super::kinds::*;
use super::{AppError, ErrorCategory, ErrorContext};

type BoxError = Box<dyn StdError + Send + Sync>;

/// Wrap a raw error into an [`AppError`]
///
/// An explicit `hint` wins. Without one the error is inspected structurally
/// (HTTP client errors, I/O errors, timeouts, JSON errors); anything that is
/// not recognised becomes a [`ErrorKind::System`] error. Values that already
/// are an `AppError` pass through untouched.
pub fn classify<E>(raw: E, hint: Option<ErrorCategory>, context: ErrorContext) -> AppError
where
    E: Into<BoxError>,
{
    let raw: BoxError = raw.into();
    let raw = match raw.downcast::<AppError>() {
        Ok(app_error) => return *app_error,
        Err(other) => other,
    };

    let message = raw.to_string();
    let kind = match hint {
        Some(category) => kind_for_category(category, raw.as_ref()),
        None => infer_kind(raw.as_ref()),
    };

    AppError::new(kind, message, context).with_shared_source(Arc::from(raw))
}

fn network_details(err: &(dyn StdError + 'static)) -> Option<NetworkDetails> {
    if let Some(http) = err.downcast_ref::<reqwest::Error>() {
        return Some(NetworkDetails {
            status_code: http.status().map(|s| s.as_u16()),
            endpoint: http.url().map(|u| u.path().to_string()),
            method: None,
            retry_after: None,
            timed_out: http.is_timeout(),
        });
    }

    if err.is::<tokio::time::error::Elapsed>() {
        return Some(NetworkDetails::timeout());
    }

    if let Some(io) = err.downcast_ref::<std::io::Error>() {
        use std::io::ErrorKind as Io;
        return match io.kind() {
            Io::TimedOut => Some(NetworkDetails::timeout()),
            Io::ConnectionRefused
            | Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::NotConnected
            | Io::BrokenPipe => Some(NetworkDetails::default()),
            _ => None,
        };
    }

    None
}

fn infer_kind(err: &(dyn StdError + 'static)) -> ErrorKind {
    if let Some(details) = network_details(err) {
        return ErrorKind::Network(details);
    }
    if err.is::<serde_json::Error>() {
        return ErrorKind::Data(DataDetails {
            entity_type: None,
            operation: Some("decode".to_string()),
        });
    }
    ErrorKind::System
}

fn kind_for_category(category: ErrorCategory, err: &(dyn StdError + 'static)) -> ErrorKind {
    match category {
        ErrorCategory::Authentication => ErrorKind::Authentication(AuthenticationDetails {
            status_code: network_details(err).and_then(|d| d.status_code),
        }),
        ErrorCategory::Authorization => ErrorKind::Authorization(AuthorizationDetails::default()),
        ErrorCategory::Network => ErrorKind::Network(network_details(err).unwrap_or_default()),
        ErrorCategory::Validation => ErrorKind::Validation(ValidationDetails::default()),
        ErrorCategory::Data => ErrorKind::Data(DataDetails::default()),
        ErrorCategory::State => ErrorKind::State(StateDetails::default()),
        ErrorCategory::Concurrency => ErrorKind::Concurrency(ConcurrencyDetails::default()),
        ErrorCategory::BusinessLogic => ErrorKind::BusinessLogic(BusinessRuleDetails::default()),
        ErrorCategory::Configuration => ErrorKind::Configuration(ConfigurationDetails::default()),
        ErrorCategory::System => ErrorKind::System,
    }
}

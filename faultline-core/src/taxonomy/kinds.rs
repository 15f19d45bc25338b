//! Per-kind payloads and the rules that derive severity, recoverability
//! and retryability from them

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ErrorCategory, Severity};

/// Status codes that indicate a transient server-side or throttling condition
fn is_transient_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Server-provided `Retry-After`, used as the rate-limit backoff base
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<Duration>,
    /// Set when the client gave up waiting rather than receiving a response
    #[serde(default)]
    pub timed_out: bool,
}

impl NetworkDetails {
    pub fn with_status(status_code: u16) -> Self {
        Self {
            status_code: Some(status_code),
            ..Default::default()
        }
    }

    pub fn timeout() -> Self {
        Self {
            timed_out: true,
            ..Default::default()
        }
    }

    pub fn endpoint(mut self, method: impl Into<String>, endpoint: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Retryable iff the status is absent, 5xx, 408 or 429
    pub fn is_retryable(&self) -> bool {
        self.status_code.map_or(true, is_transient_status)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcurrencyDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_version: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessRuleDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting: Option<String>,
}

/// Closed set of error kinds with their kind-specific payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication(AuthenticationDetails),
    Authorization(AuthorizationDetails),
    Network(NetworkDetails),
    Validation(ValidationDetails),
    Data(DataDetails),
    State(StateDetails),
    Concurrency(ConcurrencyDetails),
    BusinessLogic(BusinessRuleDetails),
    Configuration(ConfigurationDetails),
    System,
}

impl ErrorKind {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorKind::Authentication(_) => ErrorCategory::Authentication,
            ErrorKind::Authorization(_) => ErrorCategory::Authorization,
            ErrorKind::Network(_) => ErrorCategory::Network,
            ErrorKind::Validation(_) => ErrorCategory::Validation,
            ErrorKind::Data(_) => ErrorCategory::Data,
            ErrorKind::State(_) => ErrorCategory::State,
            ErrorKind::Concurrency(_) => ErrorCategory::Concurrency,
            ErrorKind::BusinessLogic(_) => ErrorCategory::BusinessLogic,
            ErrorKind::Configuration(_) => ErrorCategory::Configuration,
            ErrorKind::System => ErrorCategory::System,
        }
    }

    pub fn default_severity(&self) -> Severity {
        match self {
            ErrorKind::Authentication(_) => Severity::High,
            ErrorKind::Authorization(_) => Severity::Medium,
            ErrorKind::Network(details) => match details.status_code {
                Some(status) if status >= 500 => Severity::High,
                _ => Severity::Medium,
            },
            ErrorKind::Validation(_) => Severity::Low,
            ErrorKind::Data(_) => Severity::Medium,
            ErrorKind::State(_) => Severity::High,
            ErrorKind::Concurrency(_) => Severity::Medium,
            ErrorKind::BusinessLogic(_) => Severity::Medium,
            ErrorKind::Configuration(_) => Severity::Critical,
            ErrorKind::System => Severity::Medium,
        }
    }

    /// Configuration and unclassified errors have no automatic remedy
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ErrorKind::Configuration(_) | ErrorKind::System)
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ErrorKind::Network(details) => details.is_retryable(),
            ErrorKind::Authentication(details) => {
                details.status_code.map_or(false, is_transient_status)
            }
            ErrorKind::Concurrency(_) => true,
            ErrorKind::Authorization(_)
            | ErrorKind::Validation(_)
            | ErrorKind::Data(_)
            | ErrorKind::State(_)
            | ErrorKind::BusinessLogic(_)
            | ErrorKind::Configuration(_)
            | ErrorKind::System => false,
        }
    }
}

//! The application error value exchanged between recovery and reporting

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::kinds::*;
use super::strategy::{
    FallbackAction, RecoveryStrategy, RedirectAction, StateAction, ValidationAction,
};
use super::{ErrorCategory, ErrorContext, Severity};

/// Attempts allowed by [`AppError::should_retry`] unless the caller overrides it
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 9;

/// Generate `<prefix>_<unix millis>_<9 base36 chars>`
pub(crate) fn generate_error_id(prefix: &str, timestamp: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("{}_{}_{}", prefix, timestamp.timestamp_millis(), suffix)
}

/// A classified application error
///
/// Severity, recoverability and retryability are derived from the kind when
/// the value is built and never change afterwards, with the exception of an
/// explicit [`AppError::with_severity`] reclassification.
#[derive(Clone)]
pub struct AppError {
    kind: ErrorKind,
    message: String,
    severity: Severity,
    recoverable: bool,
    retryable: bool,
    context: ErrorContext,
    timestamp: DateTime<Utc>,
    error_id: String,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, context: ErrorContext) -> Self {
        let timestamp = Utc::now();
        let category = kind.category();
        Self {
            severity: kind.default_severity(),
            recoverable: kind.is_recoverable(),
            retryable: kind.is_retryable(),
            error_id: generate_error_id(category.id_prefix(), timestamp),
            message: message.into(),
            kind,
            context,
            timestamp,
            source: None,
        }
    }

    pub fn authentication(
        status_code: Option<u16>,
        message: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        Self::new(
            ErrorKind::Authentication(AuthenticationDetails { status_code }),
            message,
            context,
        )
    }

    pub fn authorization(
        required_role: impl Into<String>,
        actual_role: Option<String>,
        message: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        Self::new(
            ErrorKind::Authorization(AuthorizationDetails {
                required_role: Some(required_role.into()),
                actual_role,
            }),
            message,
            context,
        )
    }

    pub fn network(
        status_code: Option<u16>,
        message: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        Self::new(
            ErrorKind::Network(NetworkDetails {
                status_code,
                ..Default::default()
            }),
            message,
            context,
        )
    }

    /// Client-side timeout of a single attempt
    pub fn timeout(after: Duration, context: ErrorContext) -> Self {
        Self::new(
            ErrorKind::Network(NetworkDetails::timeout()),
            format!("Operation timed out after {:?}", after),
            context,
        )
    }

    pub fn validation(
        field: impl Into<String>,
        rule: impl Into<String>,
        message: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        Self::new(
            ErrorKind::Validation(ValidationDetails {
                field: Some(field.into()),
                rule: Some(rule.into()),
                received: None,
            }),
            message,
            context,
        )
    }

    pub fn data(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::new(ErrorKind::Data(DataDetails::default()), message, context)
    }

    pub fn state(
        store_name: impl Into<String>,
        action: Option<String>,
        message: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        Self::new(
            ErrorKind::State(StateDetails {
                store_name: Some(store_name.into()),
                action,
                snapshot: None,
            }),
            message,
            context,
        )
    }

    pub fn concurrency(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::new(
            ErrorKind::Concurrency(ConcurrencyDetails::default()),
            message,
            context,
        )
    }

    pub fn business_rule(
        rule: impl Into<String>,
        message: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        Self::new(
            ErrorKind::BusinessLogic(BusinessRuleDetails {
                rule: Some(rule.into()),
                ..Default::default()
            }),
            message,
            context,
        )
    }

    pub fn configuration(
        setting: impl Into<String>,
        message: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        Self::new(
            ErrorKind::Configuration(ConfigurationDetails {
                setting: Some(setting.into()),
            }),
            message,
            context,
        )
    }

    pub fn system(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::new(ErrorKind::System, message, context)
    }

    /// Attach the underlying error
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    pub(crate) fn with_shared_source(
        mut self,
        source: Arc<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        self.source = Some(source);
        self
    }

    /// Explicitly reclassify the severity
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn error_id(&self) -> &str {
        &self.error_id
    }

    /// Whether this is a client-side timeout rather than a server response
    pub fn is_timeout(&self) -> bool {
        matches!(&self.kind, ErrorKind::Network(details) if details.timed_out)
    }

    pub fn status_code(&self) -> Option<u16> {
        match &self.kind {
            ErrorKind::Network(details) => details.status_code,
            ErrorKind::Authentication(details) => details.status_code,
            _ => None,
        }
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        self.should_retry_with(attempt, DEFAULT_MAX_ATTEMPTS)
    }

    pub fn should_retry_with(&self, attempt: u32, max_attempts: u32) -> bool {
        self.retryable && attempt < max_attempts
    }

    /// Default remediation for this error, `None` when it is not recoverable
    pub fn recovery_strategy(&self) -> Option<RecoveryStrategy> {
        if !self.recoverable {
            return None;
        }

        let strategy = match &self.kind {
            ErrorKind::Network(details) => match details.status_code {
                Some(429) => RecoveryStrategy::rate_limit_backoff(details.retry_after),
                _ if details.is_retryable() => RecoveryStrategy::exponential_backoff(),
                Some(401) => RecoveryStrategy::Redirect {
                    action: RedirectAction::SignOut,
                    reason: Some(self.message.clone()),
                    required_role: None,
                },
                Some(403) => RecoveryStrategy::Redirect {
                    action: RedirectAction::AccessDenied,
                    reason: Some(self.message.clone()),
                    required_role: None,
                },
                _ => RecoveryStrategy::Fallback {
                    action: FallbackAction::ShowError,
                    message: self.message.clone(),
                },
            },
            ErrorKind::Authentication(_) => RecoveryStrategy::Redirect {
                action: if self.context.user_id.is_some() {
                    RedirectAction::SignOut
                } else {
                    RedirectAction::LoginRedirect
                },
                reason: Some(self.message.clone()),
                required_role: None,
            },
            ErrorKind::Authorization(details) => RecoveryStrategy::Redirect {
                action: RedirectAction::AccessDenied,
                reason: Some(self.message.clone()),
                required_role: details.required_role.clone(),
            },
            ErrorKind::Validation(details) => RecoveryStrategy::Validation {
                action: if details.field.is_some() {
                    ValidationAction::ShowFieldError
                } else {
                    ValidationAction::ResetForm
                },
                field: details.field.clone(),
                message: self.message.clone(),
            },
            ErrorKind::Data(_) => RecoveryStrategy::Fallback {
                action: if self.severity == Severity::Critical {
                    FallbackAction::ShowCriticalError
                } else {
                    FallbackAction::LoadFallbackData
                },
                message: self.message.clone(),
            },
            ErrorKind::State(details) => RecoveryStrategy::State {
                action: if details.snapshot.is_some() {
                    StateAction::RevertToCheckpoint
                } else {
                    StateAction::ResetStore
                },
                store_name: details
                    .store_name
                    .clone()
                    .or_else(|| self.context.store_name.clone()),
            },
            ErrorKind::Concurrency(_) => RecoveryStrategy::State {
                action: StateAction::RefreshState,
                store_name: self.context.store_name.clone(),
            },
            ErrorKind::BusinessLogic(_) => RecoveryStrategy::Fallback {
                action: FallbackAction::ShowError,
                message: self.message.clone(),
            },
            ErrorKind::Configuration(_) | ErrorKind::System => return None,
        };

        Some(strategy)
    }

    /// Rendered `source()` chain, outermost first
    pub fn stack(&self) -> Option<String> {
        let mut current: Option<&(dyn std::error::Error + 'static)> = self
            .source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static));
        let mut frames = Vec::new();
        while let Some(err) = current {
            frames.push(err.to_string());
            current = err.source();
        }
        if frames.is_empty() {
            None
        } else {
            Some(frames.join("\ncaused by: "))
        }
    }

    /// Flattened, serializable projection handed to reporting sinks
    pub fn to_reportable(&self) -> ReportableError {
        ReportableError {
            id: self.error_id.clone(),
            timestamp: self.timestamp,
            category: self.category(),
            severity: self.severity,
            message: self.message.clone(),
            stack: self.stack(),
            context: self.context.clone(),
            details: self.kind.clone(),
            resolved: false,
        }
    }

    /// Copy with a different context, keeping identity and derived fields
    pub(crate) fn with_context(&self, context: ErrorContext) -> Self {
        let mut copy = self.clone();
        copy.context = context;
        copy
    }
}

impl fmt::Debug for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppError")
            .field("error_id", &self.error_id)
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("severity", &self.severity)
            .field("recoverable", &self.recoverable)
            .field("retryable", &self.retryable)
            .field("context", &self.context)
            .field("source", &self.source.as_ref().map(|s| s.to_string()))
            .finish()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.category(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Serializable form of an [`AppError`] as delivered to sinks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportableError {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    pub context: ErrorContext,
    pub details: ErrorKind,
    pub resolved: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{RetryAction, StrategyKind};

    #[test]
    fn test_error_id_format() {
        let err = AppError::network(Some(503), "upstream down", ErrorContext::new());
        let parts: Vec<&str> = err.error_id().split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "net");
        assert_eq!(parts[1], err.timestamp().timestamp_millis().to_string());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_error_ids_are_unique() {
        let a = AppError::system("boom", ErrorContext::new());
        let b = AppError::system("boom", ErrorContext::new());
        assert_ne!(a.error_id(), b.error_id());
    }

    #[test]
    fn test_should_retry_bounds() {
        let err = AppError::network(Some(502), "bad gateway", ErrorContext::new());
        assert!(err.should_retry(1));
        assert!(err.should_retry(2));
        assert!(!err.should_retry(3));
        assert!(err.should_retry_with(4, 5));

        let invalid = AppError::validation("email", "format", "bad email", ErrorContext::new());
        assert!(!invalid.should_retry(1));
    }

    #[test]
    fn test_network_strategies() {
        let server = AppError::network(Some(500), "server", ErrorContext::new());
        assert_eq!(
            server.recovery_strategy(),
            Some(RecoveryStrategy::Retry {
                action: RetryAction::ExponentialBackoff,
                max_attempts: 3,
                base_delay: Duration::from_secs(1),
            })
        );

        let throttled = AppError::new(
            ErrorKind::Network(
                NetworkDetails::with_status(429).retry_after(Duration::from_secs(2)),
            ),
            "slow down",
            ErrorContext::new(),
        );
        assert_eq!(
            throttled.recovery_strategy(),
            Some(RecoveryStrategy::Retry {
                action: RetryAction::RateLimitBackoff,
                max_attempts: 3,
                base_delay: Duration::from_secs(2),
            })
        );

        let unauthorized = AppError::network(Some(401), "expired", ErrorContext::new());
        assert_eq!(
            unauthorized.recovery_strategy().map(|s| s.action_name()),
            Some("signOut")
        );

        let missing = AppError::network(Some(404), "no such listing", ErrorContext::new());
        assert_eq!(
            missing.recovery_strategy().map(|s| s.kind()),
            Some(StrategyKind::Fallback)
        );
    }

    #[test]
    fn test_authentication_strategy_depends_on_user() {
        let signed_in = AppError::authentication(
            Some(401),
            "token revoked",
            ErrorContext::new().with_user("u-1"),
        );
        let anonymous = AppError::authentication(Some(401), "no session", ErrorContext::new());

        assert_eq!(
            signed_in.recovery_strategy().map(|s| s.action_name()),
            Some("signOut")
        );
        assert_eq!(
            anonymous.recovery_strategy().map(|s| s.action_name()),
            Some("loginRedirect")
        );
    }

    #[test]
    fn test_validation_and_state_strategies() {
        let invalid = AppError::validation("price", "min", "too low", ErrorContext::new());
        assert_eq!(
            invalid.recovery_strategy(),
            Some(RecoveryStrategy::Validation {
                action: ValidationAction::ShowFieldError,
                field: Some("price".to_string()),
                message: "too low".to_string(),
            })
        );

        let broken = AppError::state("wallet", None, "inconsistent", ErrorContext::new());
        assert_eq!(
            broken.recovery_strategy(),
            Some(RecoveryStrategy::State {
                action: StateAction::ResetStore,
                store_name: Some("wallet".to_string()),
            })
        );
    }

    #[test]
    fn test_non_recoverable_has_no_strategy() {
        let cfg = AppError::configuration("API_URL", "missing", ErrorContext::new());
        assert!(cfg.recovery_strategy().is_none());
        assert!(AppError::system("?", ErrorContext::new())
            .recovery_strategy()
            .is_none());
    }

    #[test]
    fn test_reportable_form() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = AppError::network(None, "fetch failed", ErrorContext::new().with_store("calls"))
            .with_source(io);

        let reportable = err.to_reportable();
        assert_eq!(reportable.id, err.error_id());
        assert_eq!(reportable.category, ErrorCategory::Network);
        assert_eq!(reportable.stack.as_deref(), Some("reset by peer"));
        assert!(!reportable.resolved);

        let json = serde_json::to_value(&reportable).unwrap();
        assert_eq!(json["category"], "network");
        assert_eq!(json["context"]["storeName"], "calls");
        assert_eq!(json["details"]["kind"], "network");
    }

    #[test]
    fn test_display_includes_category() {
        let err = AppError::business_rule("min_balance", "insufficient credits", ErrorContext::new());
        assert_eq!(err.to_string(), "business_logic error: insufficient credits");
    }
}

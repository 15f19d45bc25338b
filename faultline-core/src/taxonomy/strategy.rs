//! Declarative recovery strategies
//!
//! A [`RecoveryStrategy`] is produced by [`super::AppError::recovery_strategy`]
//! and consumed by the recovery engine's handlers. Strategies are also
//! `Deserialize` so that a strategy decoded from a message can be applied
//! directly; actions this build does not know decode as `Unknown`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Base delay for the default exponential backoff strategy
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Base delay for rate-limited requests that carry no `Retry-After`
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RetryAction {
    ExponentialBackoff,
    RateLimitBackoff,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FallbackAction {
    ShowError,
    ShowCriticalError,
    LoadFallbackData,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RedirectAction {
    SignOut,
    AccessDenied,
    LoginRedirect,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationAction {
    ShowFieldError,
    ResetForm,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StateAction {
    ResetStore,
    RefreshState,
    RevertToCheckpoint,
    #[serde(other)]
    Unknown,
}

/// Remediation for a recoverable error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RecoveryStrategy {
    #[serde(rename_all = "camelCase")]
    Retry {
        action: RetryAction,
        max_attempts: u32,
        #[serde(with = "humantime_serde")]
        base_delay: Duration,
    },
    #[serde(rename_all = "camelCase")]
    Fallback {
        action: FallbackAction,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    Redirect {
        action: RedirectAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        required_role: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Validation {
        action: ValidationAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    State {
        action: StateAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        store_name: Option<String>,
    },
}

/// Discriminant of [`RecoveryStrategy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StrategyKind {
    Retry,
    Fallback,
    Redirect,
    Validation,
    State,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Retry => "retry",
            StrategyKind::Fallback => "fallback",
            StrategyKind::Redirect => "redirect",
            StrategyKind::Validation => "validation",
            StrategyKind::State => "state",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RecoveryStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            RecoveryStrategy::Retry { .. } => StrategyKind::Retry,
            RecoveryStrategy::Fallback { .. } => StrategyKind::Fallback,
            RecoveryStrategy::Redirect { .. } => StrategyKind::Redirect,
            RecoveryStrategy::Validation { .. } => StrategyKind::Validation,
            RecoveryStrategy::State { .. } => StrategyKind::State,
        }
    }

    /// Name of the action tag, as it appears on the wire
    pub fn action_name(&self) -> &'static str {
        match self {
            RecoveryStrategy::Retry { action, .. } => match action {
                RetryAction::ExponentialBackoff => "exponentialBackoff",
                RetryAction::RateLimitBackoff => "rateLimitBackoff",
                RetryAction::Unknown => "unknown",
            },
            RecoveryStrategy::Fallback { action, .. } => match action {
                FallbackAction::ShowError => "showError",
                FallbackAction::ShowCriticalError => "showCriticalError",
                FallbackAction::LoadFallbackData => "loadFallbackData",
                FallbackAction::Unknown => "unknown",
            },
            RecoveryStrategy::Redirect { action, .. } => match action {
                RedirectAction::SignOut => "signOut",
                RedirectAction::AccessDenied => "accessDenied",
                RedirectAction::LoginRedirect => "loginRedirect",
                RedirectAction::Unknown => "unknown",
            },
            RecoveryStrategy::Validation { action, .. } => match action {
                ValidationAction::ShowFieldError => "showFieldError",
                ValidationAction::ResetForm => "resetForm",
                ValidationAction::Unknown => "unknown",
            },
            RecoveryStrategy::State { action, .. } => match action {
                StateAction::ResetStore => "resetStore",
                StateAction::RefreshState => "refreshState",
                StateAction::RevertToCheckpoint => "revertToCheckpoint",
                StateAction::Unknown => "unknown",
            },
        }
    }

    pub(crate) fn exponential_backoff() -> Self {
        RecoveryStrategy::Retry {
            action: RetryAction::ExponentialBackoff,
            max_attempts: super::DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }

    pub(crate) fn rate_limit_backoff(retry_after: Option<Duration>) -> Self {
        RecoveryStrategy::Retry {
            action: RetryAction::RateLimitBackoff,
            max_attempts: super::DEFAULT_MAX_ATTEMPTS,
            base_delay: retry_after.unwrap_or(DEFAULT_RATE_LIMIT_DELAY),
        }
    }
}

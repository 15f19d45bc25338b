//! Error taxonomy for the marketplace client
//!
//! Every failure that reaches the recovery engine or the reporter is first
//! turned into an [`AppError`]: a closed set of kinds ([`ErrorKind`]) with a
//! per-kind payload, plus the derived severity, recoverability and
//! retryability that drive everything downstream.
//!
//! ```text
//! ┌──────────────────┬──────────┬─────────────┬──────────────────────────────┐
//! │ Kind             │ Severity │ Recoverable │ Retryable                    │
//! ├──────────────────┼──────────┼─────────────┼──────────────────────────────┤
//! │ authentication   │ high     │ yes         │ status ≥500, 408, 429        │
//! │ authorization    │ medium   │ yes         │ no                           │
//! │ network          │ med/high │ yes         │ no status, ≥500, 408, 429    │
//! │ validation       │ low      │ yes         │ no                           │
//! │ data             │ medium   │ yes         │ no                           │
//! │ state            │ high     │ yes         │ no                           │
//! │ concurrency      │ medium   │ yes         │ yes                          │
//! │ business_logic   │ medium   │ yes         │ no                           │
//! │ configuration    │ critical │ no          │ no                           │
//! │ system           │ medium   │ no          │ no                           │
//! └──────────────────┴──────────┴─────────────┴──────────────────────────────┘
//! ```
//!
//! This module performs no I/O and owns no timers.

pub mod app_error;
pub mod classify;
pub mod context;
pub mod kinds;
pub mod strategy;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use app_error::{AppError, ReportableError, DEFAULT_MAX_ATTEMPTS};
pub use classify::classify;
pub use context::ErrorContext;
pub use kinds::{
    AuthenticationDetails, AuthorizationDetails, BusinessRuleDetails, ConcurrencyDetails,
    ConfigurationDetails, DataDetails, ErrorKind, NetworkDetails, StateDetails,
    ValidationDetails,
};
pub use strategy::{
    FallbackAction, RecoveryStrategy, RedirectAction, RetryAction, StateAction, StrategyKind,
    ValidationAction,
};

/// How bad an error is for the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminant of [`ErrorKind`], used for grouping and fingerprinting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Authentication,
    Authorization,
    Network,
    Validation,
    Data,
    State,
    Concurrency,
    BusinessLogic,
    Configuration,
    System,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 10] = [
        ErrorCategory::Authentication,
        ErrorCategory::Authorization,
        ErrorCategory::Network,
        ErrorCategory::Validation,
        ErrorCategory::Data,
        ErrorCategory::State,
        ErrorCategory::Concurrency,
        ErrorCategory::BusinessLogic,
        ErrorCategory::Configuration,
        ErrorCategory::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Authorization => "authorization",
            ErrorCategory::Network => "network",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Data => "data",
            ErrorCategory::State => "state",
            ErrorCategory::Concurrency => "concurrency",
            ErrorCategory::BusinessLogic => "business_logic",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::System => "system",
        }
    }

    /// Prefix used in generated error ids
    pub(crate) fn id_prefix(&self) -> &'static str {
        match self {
            ErrorCategory::Authentication => "auth",
            ErrorCategory::Authorization => "authz",
            ErrorCategory::Network => "net",
            ErrorCategory::Validation => "val",
            ErrorCategory::Data => "data",
            ErrorCategory::State => "state",
            ErrorCategory::Concurrency => "conc",
            ErrorCategory::BusinessLogic => "biz",
            ErrorCategory::Configuration => "cfg",
            ErrorCategory::System => "sys",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s || (s == "business" && *c == ErrorCategory::BusinessLogic))
            .ok_or_else(|| format!("unknown error category: {}", s))
    }
}

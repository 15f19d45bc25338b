//! Strategy-kind handlers
//!
//! One stateless handler per [`StrategyKind`]. Handlers report whether the
//! remediation was carried out; they never fail for expected branches. An
//! action this build does not know logs a warning and yields `false`, which
//! the caller treats as "surface the original error".

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use super::notification::{NotificationSink, RecoveryEvent};
use crate::patterns::BackoffPolicy;
use crate::taxonomy::{
    ErrorContext, FallbackAction, RecoveryStrategy, RedirectAction, RetryAction, StateAction,
    StrategyKind, ValidationAction,
};

/// What a handler gets to work with besides the strategy itself
pub struct HandlerContext<'a> {
    pub error_context: &'a ErrorContext,
    pub notifier: &'a dyn NotificationSink,
    pub backoff: &'a BackoffPolicy,
}

/// Carries out one kind of recovery strategy
#[async_trait]
pub trait StrategyHandler: Send + Sync {
    async fn handle(&self, strategy: &RecoveryStrategy, ctx: &HandlerContext<'_>) -> bool;
}

fn kind_mismatch(expected: StrategyKind, strategy: &RecoveryStrategy) -> bool {
    warn!(
        "{} handler received a {} strategy ({})",
        expected,
        strategy.kind(),
        strategy.action_name()
    );
    false
}

fn unknown_action(kind: StrategyKind) -> bool {
    warn!("Unknown {} recovery action, escalating to caller", kind);
    false
}

/// Waits out the backoff delay, then signals that the caller should retry
#[derive(Debug, Default)]
pub struct RetryHandler;

impl RetryHandler {
    fn delay_for(
        action: RetryAction,
        base_delay: Duration,
        attempt: u32,
        backoff: &BackoffPolicy,
    ) -> Duration {
        match action {
            // Retry-After is a floor, never shortened by the local schedule
            RetryAction::RateLimitBackoff => base_delay.max(backoff.next_delay(attempt)),
            _ => backoff.with_base_delay(base_delay).next_delay(attempt),
        }
    }
}

#[async_trait]
impl StrategyHandler for RetryHandler {
    async fn handle(&self, strategy: &RecoveryStrategy, ctx: &HandlerContext<'_>) -> bool {
        let RecoveryStrategy::Retry {
            action,
            max_attempts,
            base_delay,
        } = strategy
        else {
            return kind_mismatch(StrategyKind::Retry, strategy);
        };

        if *action == RetryAction::Unknown {
            return unknown_action(StrategyKind::Retry);
        }

        let attempt = ctx.error_context.attempt_or_first();
        if attempt >= *max_attempts {
            debug!(
                attempt,
                max_attempts, "retry budget exhausted, not scheduling another attempt"
            );
            return false;
        }

        let delay = Self::delay_for(*action, *base_delay, attempt, ctx.backoff);
        debug!(attempt, ?delay, action = strategy.action_name(), "backing off before retry");
        tokio::time::sleep(delay).await;
        true
    }
}

/// Shows an error or loads fallback data
#[derive(Debug, Default)]
pub struct FallbackHandler;

#[async_trait]
impl StrategyHandler for FallbackHandler {
    async fn handle(&self, strategy: &RecoveryStrategy, ctx: &HandlerContext<'_>) -> bool {
        let RecoveryStrategy::Fallback { action, message } = strategy else {
            return kind_mismatch(StrategyKind::Fallback, strategy);
        };

        let event = match action {
            FallbackAction::ShowError => RecoveryEvent::Error {
                message: message.clone(),
            },
            FallbackAction::ShowCriticalError => RecoveryEvent::CriticalError {
                message: message.clone(),
            },
            FallbackAction::LoadFallbackData => RecoveryEvent::FallbackData {
                store_name: ctx.error_context.store_or_default().to_string(),
                action_name: ctx.error_context.action_name.clone(),
            },
            FallbackAction::Unknown => return unknown_action(StrategyKind::Fallback),
        };
        ctx.notifier.notify(event);
        true
    }
}

/// Signs out, denies access or sends the user to login
#[derive(Debug, Default)]
pub struct RedirectHandler;

#[async_trait]
impl StrategyHandler for RedirectHandler {
    async fn handle(&self, strategy: &RecoveryStrategy, ctx: &HandlerContext<'_>) -> bool {
        let RecoveryStrategy::Redirect {
            action,
            reason,
            required_role,
        } = strategy
        else {
            return kind_mismatch(StrategyKind::Redirect, strategy);
        };

        let event = match action {
            RedirectAction::SignOut => RecoveryEvent::SignOut {
                reason: reason.clone(),
            },
            RedirectAction::AccessDenied => RecoveryEvent::AccessDenied {
                required_role: required_role.clone(),
                reason: reason.clone(),
            },
            RedirectAction::LoginRedirect => RecoveryEvent::LoginRedirect {
                reason: reason.clone(),
            },
            RedirectAction::Unknown => return unknown_action(StrategyKind::Redirect),
        };
        ctx.notifier.notify(event);
        true
    }
}

/// Surfaces field-level feedback or resets the form
#[derive(Debug, Default)]
pub struct ValidationHandler;

#[async_trait]
impl StrategyHandler for ValidationHandler {
    async fn handle(&self, strategy: &RecoveryStrategy, ctx: &HandlerContext<'_>) -> bool {
        let RecoveryStrategy::Validation {
            action,
            field,
            message,
        } = strategy
        else {
            return kind_mismatch(StrategyKind::Validation, strategy);
        };

        let form = || ctx.error_context.component_name.clone();
        let event = match (action, field) {
            (ValidationAction::ShowFieldError, Some(field)) => RecoveryEvent::FieldError {
                field: field.clone(),
                message: message.clone(),
            },
            (ValidationAction::ShowFieldError, None) | (ValidationAction::ResetForm, _) => {
                RecoveryEvent::FormReset { form: form() }
            }
            (ValidationAction::Unknown, _) => return unknown_action(StrategyKind::Validation),
        };
        ctx.notifier.notify(event);
        true
    }
}

/// Resets, refreshes or reverts a store
#[derive(Debug, Default)]
pub struct StateHandler;

#[async_trait]
impl StrategyHandler for StateHandler {
    async fn handle(&self, strategy: &RecoveryStrategy, ctx: &HandlerContext<'_>) -> bool {
        let RecoveryStrategy::State { action, store_name } = strategy else {
            return kind_mismatch(StrategyKind::State, strategy);
        };

        let store_name = store_name
            .clone()
            .unwrap_or_else(|| ctx.error_context.store_or_default().to_string());
        let event = match action {
            StateAction::ResetStore => RecoveryEvent::StoreReset { store_name },
            StateAction::RefreshState => RecoveryEvent::StateRefresh { store_name },
            StateAction::RevertToCheckpoint => RecoveryEvent::RevertToCheckpoint { store_name },
            StateAction::Unknown => return unknown_action(StrategyKind::State),
        };
        ctx.notifier.notify(event);
        true
    }
}

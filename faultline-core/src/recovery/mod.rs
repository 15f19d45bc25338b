//! Recovery engine
//!
//! [`RecoveryManager`] owns the circuit breaker registry and the strategy
//! handlers. It offers two entry points:
//!
//! - [`RecoveryManager::recover`] applies the error's declarative recovery
//!   strategy, guarded by a breaker keyed on store and strategy kind.
//! - [`RecoveryManager::execute_with_retry`] drives a bounded retry loop
//!   with per-attempt timeouts around a caller-supplied async operation.
//!
//! Breaker bookkeeping is not held across awaits, so two concurrent calls on
//! one key may both pass the open check before either records its outcome.

pub mod handlers;
pub mod notification;
pub mod retry;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::config::RecoveryConfig;
use crate::patterns::{CircuitBreakerRegistry, CircuitBreakerSnapshot, CircuitState};
use crate::taxonomy::{AppError, ErrorContext, RecoveryStrategy, StrategyKind};

pub use handlers::{
    FallbackHandler, HandlerContext, RedirectHandler, RetryHandler, StateHandler,
    StrategyHandler, ValidationHandler,
};
pub use notification::{BroadcastNotifier, NotificationSink, RecoveryEvent, TracingNotifier};
pub use retry::{default_should_retry, RetryOverrides, RetryPredicate};

/// Counters describing what the manager has done so far
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryStats {
    pub recoveries_attempted: u64,
    pub recoveries_succeeded: u64,
    pub recoveries_failed: u64,
    pub rejected_by_circuit: u64,
    pub retry_attempts: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    attempted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retry_attempts: AtomicU64,
}

/// Applies recovery strategies and runs guarded retry loops
pub struct RecoveryManager {
    config: RecoveryConfig,
    breakers: CircuitBreakerRegistry,
    handlers: HashMap<StrategyKind, Arc<dyn StrategyHandler>>,
    notifier: Arc<dyn NotificationSink>,
    stats: StatsCounters,
}

impl RecoveryManager {
    /// Create a manager with the default handler for every strategy kind
    pub fn new(config: RecoveryConfig, notifier: Arc<dyn NotificationSink>) -> Self {
        let breakers = CircuitBreakerRegistry::new(config.circuit_breaker());
        let mut handlers: HashMap<StrategyKind, Arc<dyn StrategyHandler>> = HashMap::new();
        handlers.insert(StrategyKind::Retry, Arc::new(RetryHandler));
        handlers.insert(StrategyKind::Fallback, Arc::new(FallbackHandler));
        handlers.insert(StrategyKind::Redirect, Arc::new(RedirectHandler));
        handlers.insert(StrategyKind::Validation, Arc::new(ValidationHandler));
        handlers.insert(StrategyKind::State, Arc::new(StateHandler));

        Self {
            config,
            breakers,
            handlers,
            notifier,
            stats: StatsCounters::default(),
        }
    }

    /// Replace the handler for one strategy kind
    pub fn with_handler(mut self, kind: StrategyKind, handler: Arc<dyn StrategyHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    /// Breaker key used by [`recover`](Self::recover)
    pub fn breaker_key(context: &ErrorContext, kind: StrategyKind) -> String {
        format!("{}:{}", context.store_or_default(), kind)
    }

    pub fn breaker_state(&self, key: &str) -> CircuitState {
        self.breakers.state(key)
    }

    pub fn breaker_snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        self.breakers.snapshots()
    }

    /// Force a breaker closed; returns whether the key was known
    pub fn reset_breaker(&self, key: &str) -> bool {
        self.breakers.reset(key)
    }

    pub fn stats(&self) -> RecoveryStats {
        RecoveryStats {
            recoveries_attempted: self.stats.attempted.load(Ordering::Relaxed),
            recoveries_succeeded: self.stats.succeeded.load(Ordering::Relaxed),
            recoveries_failed: self.stats.failed.load(Ordering::Relaxed),
            rejected_by_circuit: self.breakers.rejected_calls(),
            retry_attempts: self.stats.retry_attempts.load(Ordering::Relaxed),
        }
    }

    /// Attempt structural recovery from `error`
    ///
    /// Returns `false` when the error has no strategy, when the breaker for
    /// this store and strategy kind is open, or when the handler declined.
    /// The call-site `context` takes precedence over the error's own context.
    pub async fn recover(&self, error: &AppError, context: &ErrorContext) -> bool {
        let context = context.merged_with(error.context());
        let Some(strategy) = error.with_context(context.clone()).recovery_strategy() else {
            debug!(
                error_id = error.error_id(),
                category = %error.category(),
                "no recovery strategy, surfacing error"
            );
            return false;
        };

        let key = Self::breaker_key(&context, strategy.kind());
        if !self.breakers.try_acquire(&key) {
            debug!(key = %key, "circuit open, skipping recovery");
            return false;
        }

        self.stats.attempted.fetch_add(1, Ordering::Relaxed);
        let recovered = self.dispatch(&strategy, &context).await;
        if recovered {
            self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
            self.breakers.record_success(&key);
        } else {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            self.breakers.record_failure(&key);
        }
        recovered
    }

    /// Run the handler for an already decoded strategy
    ///
    /// No breaker is consulted.
    pub async fn apply_strategy(&self, strategy: &RecoveryStrategy, context: &ErrorContext) -> bool {
        self.dispatch(strategy, context).await
    }

    async fn dispatch(&self, strategy: &RecoveryStrategy, context: &ErrorContext) -> bool {
        let Some(handler) = self.handlers.get(&strategy.kind()) else {
            debug!(kind = %strategy.kind(), "no handler registered");
            return false;
        };

        let ctx = HandlerContext {
            error_context: context,
            notifier: self.notifier.as_ref(),
            backoff: &self.config.backoff,
        };
        handler.handle(strategy, &ctx).await
    }

    fn count_retry_attempt(&self) {
        self.stats.retry_attempts.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for RecoveryManager {
    fn default() -> Self {
        Self::new(RecoveryConfig::default(), Arc::new(TracingNotifier))
    }
}

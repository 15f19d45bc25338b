//! Bounded retry loop with per-attempt timeouts
//!
//! Every attempt races the operation against `attempt_timeout`. A failed
//! attempt is retried while attempts remain and the retry predicate agrees;
//! the delay between attempts comes from the manager's [`BackoffPolicy`].
//! When the loop gives up it records a breaker failure and returns the last
//! error exactly as the operation produced it.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use super::RecoveryManager;
use crate::patterns::BackoffPolicy;
use crate::taxonomy::{AppError, ErrorCategory, ErrorContext};

/// Decides whether a failed attempt should be retried
///
/// Receives the error and the number of the attempt that just failed.
pub type RetryPredicate = Arc<dyn Fn(&AppError, u32) -> bool + Send + Sync>;

/// Default predicate: never retry validation or business-rule errors,
/// otherwise follow the error's own retryability
pub fn default_should_retry(error: &AppError, _attempt: u32) -> bool {
    match error.category() {
        ErrorCategory::Validation | ErrorCategory::BusinessLogic => false,
        _ => error.is_retryable(),
    }
}

/// Per-call adjustments to the manager's retry settings
#[derive(Clone, Default)]
pub struct RetryOverrides {
    pub max_attempts: Option<u32>,
    pub attempt_timeout: Option<Duration>,
    pub backoff: Option<BackoffPolicy>,
    pub should_retry: Option<RetryPredicate>,
}

impl RetryOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&AppError, u32) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }
}

impl fmt::Debug for RetryOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOverrides")
            .field("max_attempts", &self.max_attempts)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("backoff", &self.backoff)
            .field("should_retry", &self.should_retry.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl RecoveryManager {
    /// Breaker key used by [`execute_with_retry`](Self::execute_with_retry)
    pub fn operation_key(context: &ErrorContext) -> String {
        format!(
            "{}:{}",
            context.store_or_default(),
            context.action_name.as_deref().unwrap_or("operation")
        )
    }

    /// Run `operation` with timeout, retry and circuit breaking
    ///
    /// Fails fast with a system error when the breaker for this store and
    /// action is open.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        mut operation: F,
        context: &ErrorContext,
        overrides: Option<RetryOverrides>,
    ) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let overrides = overrides.unwrap_or_default();
        let max_attempts = overrides
            .max_attempts
            .unwrap_or(self.config().max_attempts)
            .max(1);
        let attempt_timeout = overrides
            .attempt_timeout
            .unwrap_or(self.config().attempt_timeout);
        let backoff = overrides
            .backoff
            .unwrap_or_else(|| self.config().backoff.clone());

        let key = Self::operation_key(context);
        if !self.breakers().try_acquire(&key) {
            warn!(key = %key, "circuit breaker open, failing fast");
            return Err(AppError::system(
                format!("circuit breaker open for '{}'", key),
                context.clone(),
            ));
        }

        let mut attempt = 1;
        loop {
            self.count_retry_attempt();
            let attempt_context = context.clone().with_attempt(attempt);

            let outcome = match timeout(attempt_timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(AppError::timeout(attempt_timeout, attempt_context)),
            };

            let error = match outcome {
                Ok(value) => {
                    self.breakers().record_success(&key);
                    if attempt > 1 {
                        debug!(key = %key, attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let retry = match &overrides.should_retry {
                Some(predicate) => predicate(&error, attempt),
                None => default_should_retry(&error, attempt),
            };

            if attempt < max_attempts && retry {
                let delay = backoff.next_delay(attempt);
                debug!(
                    key = %key,
                    attempt,
                    max_attempts,
                    ?delay,
                    error = %error,
                    "attempt failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
                continue;
            }

            warn!(
                key = %key,
                attempt,
                error_id = error.error_id(),
                "giving up: {}",
                error
            );
            self.breakers().record_failure(&key);
            return Err(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecoveryConfig;
    use crate::patterns::CircuitState;
    use crate::recovery::TracingNotifier;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn manager() -> RecoveryManager {
        let config = RecoveryConfig {
            backoff: BackoffPolicy::default().without_jitter(),
            ..Default::default()
        };
        RecoveryManager::new(config, Arc::new(TracingNotifier))
    }

    #[test]
    fn test_default_predicate() {
        let ctx = ErrorContext::new();
        assert!(default_should_retry(
            &AppError::network(Some(503), "unavailable", ctx.clone()),
            1
        ));
        assert!(!default_should_retry(
            &AppError::network(Some(404), "missing", ctx.clone()),
            1
        ));
        assert!(!default_should_retry(
            &AppError::validation("email", "format", "bad email", ctx.clone()),
            1
        ));
        assert!(!default_should_retry(
            &AppError::business_rule("limit", "over limit", ctx.clone()),
            1
        ));
        assert!(default_should_retry(&AppError::concurrency("stale", ctx), 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_produces_timeout_error() {
        let manager = manager();
        let calls = AtomicU32::new(0);
        let overrides = RetryOverrides::new()
            .max_attempts(2)
            .attempt_timeout(Duration::from_millis(100));

        let result: Result<(), AppError> = manager
            .execute_with_retry(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async {
                        sleep(Duration::from_secs(10)).await;
                        Ok(())
                    }
                },
                &ErrorContext::new().with_action("slow"),
                Some(overrides),
            )
            .await;

        let error = result.unwrap_err();
        assert!(error.is_timeout());
        assert_eq!(error.context().attempt, Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(manager.breakers().failures("global:slow"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_predicate_takes_precedence() {
        let manager = manager();
        let calls = AtomicU32::new(0);
        let overrides = RetryOverrides::new().should_retry(|_, attempt| attempt < 2);

        let result: Result<(), AppError> = manager
            .execute_with_retry(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(AppError::validation("name", "required", "empty", ErrorContext::new())) }
                },
                &ErrorContext::new(),
                Some(overrides),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_fails_fast() {
        let manager = manager();
        let context = ErrorContext::new().with_store("billing").with_action("charge");
        let key = RecoveryManager::operation_key(&context);
        for _ in 0..5 {
            manager.breakers().record_failure(&key);
        }
        assert_eq!(manager.breakers().state(&key), CircuitState::Open);

        let calls = AtomicU32::new(0);
        let result = manager
            .execute_with_retry(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, AppError>(42) }
                },
                &context,
                None,
            )
            .await;

        let error = result.unwrap_err();
        assert_eq!(error.category(), ErrorCategory::System);
        assert!(error.message().contains("circuit breaker open"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let manager = manager();
        let calls = AtomicU32::new(0);

        let result: Result<(), AppError> = manager
            .execute_with_retry(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        Err(AppError::network(
                            Some(502),
                            format!("bad gateway #{n}"),
                            ErrorContext::new(),
                        ))
                    }
                },
                &ErrorContext::new(),
                None,
            )
            .await;

        let error = result.unwrap_err();
        assert_eq!(error.message(), "bad gateway #3");
        assert_eq!(manager.stats().retry_attempts, 3);
    }
}

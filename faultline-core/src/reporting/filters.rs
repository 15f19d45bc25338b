//! Report filters and context transformers

use chrono::Utc;
use std::sync::Arc;

use crate::taxonomy::{AppError, ErrorCategory, ErrorContext};

/// Predicate over an error and its context; `false` drops the error
pub type ReportFilter = Arc<dyn Fn(&AppError, &ErrorContext) -> bool + Send + Sync>;

/// Pure enrichment of an error's context before it is cached
pub type Transformer = Arc<dyn Fn(ErrorContext) -> ErrorContext + Send + Sync>;

/// Keeps validation errors out of external delivery
pub fn exclude_validation() -> ReportFilter {
    Arc::new(|error, _| error.category() != ErrorCategory::Validation)
}

/// Keeps client-side network timeouts out of external delivery
pub fn exclude_network_timeouts() -> ReportFilter {
    Arc::new(|error, _| !error.is_timeout())
}

/// Filters applied before delivery to sinks
pub fn default_delivery_filters() -> Vec<ReportFilter> {
    vec![exclude_validation(), exclude_network_timeouts()]
}

/// Sets `userAgent` unless the caller already did
pub fn inject_user_agent(user_agent: impl Into<String>) -> Transformer {
    let user_agent = user_agent.into();
    Arc::new(move |context| {
        if context.field("userAgent").is_some() {
            context
        } else {
            context.with_field("userAgent", user_agent.clone())
        }
    })
}

/// Stamps `capturedAt` with the current time
pub fn inject_captured_at() -> Transformer {
    Arc::new(|context| context.with_field("capturedAt", Utc::now().to_rfc3339()))
}

pub fn default_transformers(user_agent: impl Into<String>) -> Vec<Transformer> {
    vec![inject_user_agent(user_agent), inject_captured_at()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_delivery_filters() {
        let ctx = ErrorContext::new();
        let filters = default_delivery_filters();
        let passes = |error: &AppError| filters.iter().all(|f| f(error, &ctx));

        assert!(!passes(&AppError::validation("email", "format", "bad", ctx.clone())));
        assert!(!passes(&AppError::timeout(Duration::from_secs(30), ctx.clone())));
        assert!(passes(&AppError::network(Some(503), "unavailable", ctx.clone())));
        assert!(passes(&AppError::system("boom", ctx.clone())));
    }

    #[test]
    fn test_transformers_enrich_context() {
        let ctx = default_transformers("faultline-test")
            .iter()
            .fold(ErrorContext::new(), |ctx, transform| transform(ctx));

        assert_eq!(
            ctx.field("userAgent").and_then(|v| v.as_str()),
            Some("faultline-test")
        );
        assert!(ctx.field("capturedAt").is_some());
    }

    #[test]
    fn test_user_agent_is_not_overwritten() {
        let transform = inject_user_agent("faultline");
        let ctx = transform(ErrorContext::new().with_field("userAgent", "browser/1.0"));
        assert_eq!(
            ctx.field("userAgent").and_then(|v| v.as_str()),
            Some("browser/1.0")
        );
    }
}

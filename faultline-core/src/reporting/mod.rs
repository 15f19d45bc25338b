//! Error reporter
//!
//! [`ErrorReporter`] keeps a bounded, deduplicated cache of reported errors
//! and forwards newly cached ones to its sinks in batches.
//!
//! Reporting flow for a new fingerprint:
//!
//! 1. custom `filters` may drop the error before it is cached
//! 2. the sample-rate gate may drop it
//! 3. `transformers` enrich its context
//! 4. it is cached, evicting the oldest entry when full
//! 5. if every `delivery_filter` passes it joins the pending batch, which is
//!    shipped once it reaches `batch_size`
//!
//! A fingerprint already in the cache only bumps its occurrence count.
//! Reporting never fails: sink errors are logged and dropped.

pub mod filters;
pub mod fingerprint;
pub mod report;
pub mod sink;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ReporterConfig;
use crate::error::FaultlineResult;
use crate::taxonomy::{AppError, ErrorContext, ReportableError};

pub use filters::{ReportFilter, Transformer};
pub use fingerprint::fingerprint;
pub use report::{ErrorEntry, ErrorReport, ErrorSummary, ErrorTrends, TopError, UserImpact};
pub use sink::{
    CrashLevel, CrashReporter, CrashReporterSink, ReportSink, TracingCrashReporter, WebhookSink,
};

#[derive(Default)]
struct ReporterState {
    entries: HashMap<String, ErrorEntry>,
    /// Fingerprints in first-seen order
    order: VecDeque<String>,
    pending: Vec<ReportableError>,
}

/// Deduplicating, sampling error reporter
pub struct ErrorReporter {
    config: ReporterConfig,
    filters: Vec<ReportFilter>,
    delivery_filters: Vec<ReportFilter>,
    transformers: Vec<Transformer>,
    sinks: Arc<Vec<Arc<dyn ReportSink>>>,
    state: Mutex<ReporterState>,
}

impl ErrorReporter {
    /// Reporter with default filters and transformers, plus a webhook sink
    /// when `webhook_url` is configured
    pub fn new(config: ReporterConfig) -> FaultlineResult<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ReporterConfig) -> ErrorReporterBuilder {
        ErrorReporterBuilder::new(config)
    }

    pub fn config(&self) -> &ReporterConfig {
        &self.config
    }

    /// Record `error`; never fails
    ///
    /// The call-site `context` takes precedence over the error's own context.
    pub fn report(&self, error: &AppError, context: &ErrorContext) {
        self.report_at(error, context, Utc::now());
    }

    fn report_at(&self, error: &AppError, context: &ErrorContext, now: DateTime<Utc>) {
        let context = context.merged_with(error.context());
        let key = fingerprint(error, &context);

        let batch = {
            let mut state = self.state.lock();
            if let Some(entry) = state.entries.get_mut(&key) {
                let context = self
                    .transformers
                    .iter()
                    .fold(context, |context, transform| transform(context));
                entry.record_occurrence(now, &context);
                debug!(
                    fingerprint = %key,
                    occurrences = entry.occurrence_count,
                    "duplicate error"
                );
                return;
            }

            if !self.filters.iter().all(|filter| filter(error, &context)) {
                debug!(error_id = error.error_id(), "error dropped by filter");
                return;
            }

            if self.config.sample_rate < 1.0
                && rand::thread_rng().gen::<f64>() >= self.config.sample_rate
            {
                debug!(error_id = error.error_id(), "error dropped by sampling");
                return;
            }

            let context = self
                .transformers
                .iter()
                .fold(context, |context, transform| transform(context));
            let error = error.with_context(context);
            let reportable = error.to_reportable();

            while state.order.len() >= self.config.max_cached_errors.max(1) {
                if let Some(oldest) = state.order.pop_front() {
                    state.entries.remove(&oldest);
                }
            }
            state.order.push_back(key.clone());
            state
                .entries
                .insert(key.clone(), ErrorEntry::new(key, reportable.clone(), now));

            if !self
                .delivery_filters
                .iter()
                .all(|filter| filter(&error, error.context()))
            {
                return;
            }

            state.pending.push(reportable);
            if state.pending.len() < self.config.batch_size.max(1) {
                return;
            }
            std::mem::take(&mut state.pending)
        };

        self.dispatch(batch);
    }

    /// Deliver whatever is pending now, waiting for the sinks
    pub async fn flush(&self) {
        let batch = std::mem::take(&mut self.state.lock().pending);
        if batch.is_empty() {
            return;
        }
        deliver(&self.sinks, &batch).await;
    }

    /// Drop every cached entry and any pending batch
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
        state.pending.clear();
    }

    pub fn cached_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Cached entries in first-seen order
    pub fn entries(&self) -> Vec<ErrorEntry> {
        let state = self.state.lock();
        state
            .order
            .iter()
            .filter_map(|key| state.entries.get(key).cloned())
            .collect()
    }

    pub fn generate_report(&self) -> ErrorReport {
        self.generate_report_at(Utc::now())
    }

    /// Report with trend buckets anchored at `now`
    pub fn generate_report_at(&self, now: DateTime<Utc>) -> ErrorReport {
        let state = self.state.lock();
        let entries = state.order.iter().filter_map(|key| state.entries.get(key));
        ErrorReport::from_entries(entries, now, self.config.top_errors)
    }

    /// Most errors held undelivered at once
    fn pending_capacity(&self) -> usize {
        self.config.max_cached_errors.max(self.config.batch_size).max(1)
    }

    fn dispatch(&self, batch: Vec<ReportableError>) {
        if self.sinks.is_empty() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let sinks = Arc::clone(&self.sinks);
                handle.spawn(async move { deliver(&sinks, &batch).await });
            }
            Err(_) => {
                warn!(
                    errors = batch.len(),
                    "no async runtime available, returning batch to pending"
                );
                let cap = self.pending_capacity();
                let mut state = self.state.lock();
                state.pending.extend(batch);
                if state.pending.len() > cap {
                    let excess = state.pending.len() - cap;
                    state.pending.drain(..excess);
                    warn!(dropped = excess, "pending errors over capacity, dropping oldest");
                }
            }
        }
    }
}

async fn deliver(sinks: &[Arc<dyn ReportSink>], batch: &[ReportableError]) {
    let results = join_all(sinks.iter().map(|sink| sink.deliver(batch))).await;
    for (sink, result) in sinks.iter().zip(results) {
        if let Err(e) = result {
            warn!(sink = sink.name(), errors = batch.len(), "Failed to deliver error batch: {}", e);
        }
    }
}

/// Builder for [`ErrorReporter`]
pub struct ErrorReporterBuilder {
    config: ReporterConfig,
    filters: Vec<ReportFilter>,
    delivery_filters: Vec<ReportFilter>,
    transformers: Vec<Transformer>,
    sinks: Vec<Arc<dyn ReportSink>>,
    webhook_from_config: bool,
}

impl ErrorReporterBuilder {
    fn new(config: ReporterConfig) -> Self {
        let transformers = filters::default_transformers(config.user_agent.clone());
        Self {
            config,
            filters: Vec::new(),
            delivery_filters: filters::default_delivery_filters(),
            transformers,
            sinks: Vec::new(),
            webhook_from_config: true,
        }
    }

    /// Add a filter that gates caching
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&AppError, &ErrorContext) -> bool + Send + Sync + 'static,
    {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Add a filter that gates delivery to sinks
    pub fn delivery_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&AppError, &ErrorContext) -> bool + Send + Sync + 'static,
    {
        self.delivery_filters.push(Arc::new(filter));
        self
    }

    /// Remove the default delivery filters
    pub fn without_default_delivery_filters(mut self) -> Self {
        self.delivery_filters.clear();
        self
    }

    pub fn transformer<F>(mut self, transformer: F) -> Self
    where
        F: Fn(ErrorContext) -> ErrorContext + Send + Sync + 'static,
    {
        self.transformers.push(Arc::new(transformer));
        self
    }

    /// Remove the default transformers
    pub fn without_default_transformers(mut self) -> Self {
        self.transformers.clear();
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Do not create a webhook sink from `webhook_url`
    pub fn without_config_webhook(mut self) -> Self {
        self.webhook_from_config = false;
        self
    }

    pub fn build(self) -> FaultlineResult<ErrorReporter> {
        let mut sinks = self.sinks;
        if self.webhook_from_config {
            if let Some(url) = &self.config.webhook_url {
                let webhook =
                    WebhookSink::new(url, self.config.delivery_timeout, &self.config.user_agent)?;
                sinks.push(Arc::new(webhook));
            }
        }

        Ok(ErrorReporter {
            config: self.config,
            filters: self.filters,
            delivery_filters: self.delivery_filters,
            transformers: self.transformers,
            sinks: Arc::new(sinks),
            state: Mutex::new(ReporterState::default()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    #[derive(Default)]
    struct CollectingSink {
        batches: Mutex<Vec<Vec<ReportableError>>>,
    }

    #[async_trait]
    impl ReportSink for CollectingSink {
        fn name(&self) -> &str {
            "collecting"
        }

        async fn deliver(&self, batch: &[ReportableError]) -> FaultlineResult<()> {
            self.batches.lock().push(batch.to_vec());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl ReportSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        async fn deliver(&self, _batch: &[ReportableError]) -> FaultlineResult<()> {
            Err(crate::error::FaultlineError::sink("failing", "unreachable"))
        }
    }

    fn config() -> ReporterConfig {
        ReporterConfig {
            batch_size: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_duplicate_increments_count() {
        let reporter = ErrorReporter::new(config()).unwrap();
        let ctx = ErrorContext::new();
        reporter.report(&AppError::data("bad row", ctx.clone()), &ctx);
        reporter.report(&AppError::data("bad row", ctx.clone()), &ctx);

        let entries = reporter.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].occurrence_count, 2);
        assert!(entries[0].last_seen >= entries[0].first_seen);
    }

    #[test]
    fn test_evicts_oldest_first_seen() {
        let reporter = ErrorReporter::new(ReporterConfig {
            max_cached_errors: 2,
            ..config()
        })
        .unwrap();
        let ctx = ErrorContext::new();
        for message in ["first", "second", "first", "third"] {
            reporter.report(&AppError::system(message, ctx.clone()), &ctx);
        }

        let messages: Vec<_> = reporter
            .entries()
            .into_iter()
            .map(|entry| entry.error.message)
            .collect();
        assert_eq!(messages, vec!["second", "third"]);
    }

    #[test]
    fn test_custom_filter_drops_before_caching() {
        let reporter = ErrorReporter::builder(config())
            .filter(|error, _| !error.message().contains("ignore"))
            .build()
            .unwrap();
        let ctx = ErrorContext::new();
        reporter.report(&AppError::system("please ignore", ctx.clone()), &ctx);
        reporter.report(&AppError::system("keep", ctx.clone()), &ctx);
        assert_eq!(reporter.cached_count(), 1);
    }

    #[test]
    fn test_zero_sample_rate_drops_everything() {
        let reporter = ErrorReporter::new(ReporterConfig {
            sample_rate: 0.0,
            ..config()
        })
        .unwrap();
        let ctx = ErrorContext::new();
        for i in 0..20 {
            reporter.report(&AppError::system(format!("e{i}"), ctx.clone()), &ctx);
        }
        assert_eq!(reporter.cached_count(), 0);
    }

    #[test]
    fn test_transformers_enrich_cached_context() {
        let reporter = ErrorReporter::builder(config())
            .transformer(|ctx| ctx.with_field("release", "1.2.3"))
            .build()
            .unwrap();
        let ctx = ErrorContext::new().with_store("cart");
        reporter.report(&AppError::system("boom", ErrorContext::new()), &ctx);

        let entry = &reporter.entries()[0];
        let context = &entry.error.context;
        assert_eq!(context.store_name.as_deref(), Some("cart"));
        assert!(context.field("userAgent").is_some());
        assert!(context.field("capturedAt").is_some());
        assert_eq!(context.field("release").and_then(|v| v.as_str()), Some("1.2.3"));
    }

    #[tokio::test]
    async fn test_batch_delivered_when_full() {
        let sink = Arc::new(CollectingSink::default());
        let reporter = ErrorReporter::builder(config())
            .sink(sink.clone())
            .build()
            .unwrap();
        let ctx = ErrorContext::new();

        reporter.report(&AppError::system("one", ctx.clone()), &ctx);
        reporter.report(&AppError::validation("email", "format", "bad", ctx.clone()), &ctx);
        assert_eq!(reporter.pending_count(), 1);
        reporter.report(&AppError::system("two", ctx.clone()), &ctx);
        assert_eq!(reporter.pending_count(), 0);

        for _ in 0..50 {
            if !sink.batches.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let batches = sink.batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(reporter.cached_count(), 3);
    }

    #[tokio::test]
    async fn test_flush_and_failures_are_swallowed() {
        let sink = Arc::new(CollectingSink::default());
        let reporter = ErrorReporter::builder(config())
            .sink(Arc::new(FailingSink))
            .sink(sink.clone())
            .build()
            .unwrap();
        let ctx = ErrorContext::new();
        reporter.report(&AppError::system("lonely", ctx.clone()), &ctx);

        reporter.flush().await;
        assert_eq!(sink.batches.lock().len(), 1);
        assert_eq!(reporter.pending_count(), 0);

        reporter.clear();
        assert_eq!(reporter.cached_count(), 0);
    }

    #[test]
    fn test_without_runtime_batch_stays_pending() {
        let reporter = ErrorReporter::builder(ReporterConfig {
            batch_size: 1,
            ..Default::default()
        })
        .sink(Arc::new(CollectingSink::default()))
        .build()
        .unwrap();
        let ctx = ErrorContext::new();
        reporter.report(&AppError::system("boom", ctx.clone()), &ctx);
        assert_eq!(reporter.pending_count(), 1);
    }

    #[test]
    fn test_without_runtime_pending_is_capped() {
        let reporter = ErrorReporter::builder(ReporterConfig {
            batch_size: 1,
            max_cached_errors: 10,
            ..Default::default()
        })
        .sink(Arc::new(CollectingSink::default()))
        .build()
        .unwrap();
        let ctx = ErrorContext::new();
        for i in 0..1000 {
            reporter.report(&AppError::system(format!("boom {i}"), ctx.clone()), &ctx);
        }

        assert_eq!(reporter.cached_count(), 10);
        assert_eq!(reporter.pending_count(), 10);
        let newest = reporter.state.lock().pending.last().map(|e| e.message.clone());
        assert_eq!(newest.as_deref(), Some("boom 999"));
    }
}

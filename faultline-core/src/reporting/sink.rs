//! Delivery sinks for cached errors
//!
//! A [`ReportSink`] receives batches of reportable errors. Failures are
//! returned to the reporter, which logs and drops them.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{FaultlineError, FaultlineResult};
use crate::taxonomy::{ReportableError, Severity};

/// Destination for batches of reportable errors
#[async_trait]
pub trait ReportSink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, batch: &[ReportableError]) -> FaultlineResult<()>;
}

/// POSTs each batch as a JSON array
pub struct WebhookSink {
    client: reqwest::Client,
    url: url::Url,
}

impl WebhookSink {
    pub fn new(url: &str, timeout: Duration, user_agent: &str) -> FaultlineResult<Self> {
        let url = url::Url::parse(url)?;
        let client = reqwest::ClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &url::Url {
        &self.url
    }
}

#[async_trait]
impl ReportSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, batch: &[ReportableError]) -> FaultlineResult<()> {
        let response = self
            .client
            .post(self.url.clone())
            .json(batch)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FaultlineError::sink(
                self.name(),
                format!("{} responded with {}", self.url, status),
            ));
        }

        debug!(url = %self.url, errors = batch.len(), "delivered error batch");
        Ok(())
    }
}

/// Level attached to an error forwarded to a crash reporter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashLevel {
    Info,
    Warning,
    Error,
    Fatal,
}

impl From<Severity> for CrashLevel {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Low => CrashLevel::Info,
            Severity::Medium => CrashLevel::Warning,
            Severity::High => CrashLevel::Error,
            Severity::Critical => CrashLevel::Fatal,
        }
    }
}

/// Crash-reporting client
pub trait CrashReporter: Send + Sync {
    fn capture(&self, error: &ReportableError, tags: &BTreeMap<String, String>, level: CrashLevel);
}

/// Crash reporter that writes to the tracing subscriber
#[derive(Debug, Default)]
pub struct TracingCrashReporter;

impl CrashReporter for TracingCrashReporter {
    fn capture(&self, report: &ReportableError, tags: &BTreeMap<String, String>, level: CrashLevel) {
        match level {
            CrashLevel::Fatal | CrashLevel::Error => {
                error!(id = %report.id, ?tags, "{}", report.message)
            }
            CrashLevel::Warning => warn!(id = %report.id, ?tags, "{}", report.message),
            CrashLevel::Info => info!(id = %report.id, ?tags, "{}", report.message),
        }
    }
}

/// Forwards each error to a [`CrashReporter`] tagged with severity and category
pub struct CrashReporterSink {
    reporter: Arc<dyn CrashReporter>,
}

impl CrashReporterSink {
    pub fn new(reporter: Arc<dyn CrashReporter>) -> Self {
        Self { reporter }
    }
}

impl Default for CrashReporterSink {
    fn default() -> Self {
        Self::new(Arc::new(TracingCrashReporter))
    }
}

#[async_trait]
impl ReportSink for CrashReporterSink {
    fn name(&self) -> &str {
        "crash-reporter"
    }

    async fn deliver(&self, batch: &[ReportableError]) -> FaultlineResult<()> {
        for report in batch {
            let mut tags = BTreeMap::new();
            tags.insert("severity".to_string(), report.severity.to_string());
            tags.insert("category".to_string(), report.category.to_string());
            self.reporter.capture(report, &tags, report.severity.into());
        }
        Ok(())
    }
}

//! Incident records replayed through the reporter

use faultline_core::taxonomy::{classify, AppError, ErrorCategory, ErrorContext};
use serde::Deserialize;

/// One line of an incident export
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentRecord {
    /// Category hint; unclassified incidents become system errors
    #[serde(default)]
    pub category: Option<ErrorCategory>,
    pub message: String,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub context: ErrorContext,
    /// How many times the incident was observed
    #[serde(default = "one")]
    pub occurrences: u32,
}

fn one() -> u32 {
    1
}

impl IncidentRecord {
    pub fn to_app_error(&self) -> AppError {
        let context = self.context.clone();
        match self.category {
            Some(ErrorCategory::Network) => {
                AppError::network(self.status_code, &self.message, context)
            }
            Some(ErrorCategory::Authentication) => {
                AppError::authentication(self.status_code, &self.message, context)
            }
            Some(ErrorCategory::Validation) if self.field.is_some() => AppError::validation(
                self.field.clone().unwrap_or_default(),
                "invalid",
                &self.message,
                context,
            ),
            hint => classify(self.message.clone(), hint, context),
        }
    }
}

/// Parse a JSON array of incident records
pub fn parse_incidents(json: &str) -> anyhow::Result<Vec<IncidentRecord>> {
    Ok(serde_json::from_str(json)?)
}

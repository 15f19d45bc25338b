//! Diagnostic context attached to every error

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Store name used when a context does not name one
pub const DEFAULT_STORE: &str = "global";

/// Free-form diagnostic fields attached to an error
///
/// The well-known fields are typed; anything else goes into `extra`, which is
/// flattened into the serialized form. Reporter transformers extend a copy of
/// the context before it is cached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(mut self, store: impl Into<String>) -> Self {
        self.store_name = Some(store.into());
        self
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component_name = Some(component.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action_name = Some(action.into());
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.extra.get(key)
    }

    /// Store name, falling back to [`DEFAULT_STORE`]
    pub fn store_or_default(&self) -> &str {
        self.store_name.as_deref().unwrap_or(DEFAULT_STORE)
    }

    /// Attempt number, treating a missing value as the first attempt
    pub fn attempt_or_first(&self) -> u32 {
        self.attempt.unwrap_or(1)
    }

    /// Copy of `self` with missing fields filled from `fallback`
    pub fn merged_with(&self, fallback: &ErrorContext) -> ErrorContext {
        let mut merged = self.clone();
        merged.store_name = merged.store_name.or_else(|| fallback.store_name.clone());
        merged.component_name = merged
            .component_name
            .or_else(|| fallback.component_name.clone());
        merged.action_name = merged.action_name.or_else(|| fallback.action_name.clone());
        merged.attempt = merged.attempt.or(fallback.attempt);
        merged.user_id = merged.user_id.or_else(|| fallback.user_id.clone());
        merged.timestamp = merged.timestamp.or(fallback.timestamp);
        for (key, value) in &fallback.extra {
            merged
                .extra
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        merged
    }
}

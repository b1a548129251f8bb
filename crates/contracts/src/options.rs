//! Options - per-call overrides attached to a payload

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Properties;

/// Key toggling every destination at once
pub const ALL_INTEGRATIONS_KEY: &str = "All";

/// Per-call overrides: destination toggles and extra context entries.
///
/// Merging never mutates either side; client-wide defaults stay untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Options {
    #[serde(default)]
    integrations: Properties,
    #[serde(default)]
    context: Properties,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable a destination (or [`ALL_INTEGRATIONS_KEY`]) for this call
    pub fn set_integration(mut self, key: impl Into<String>, enabled: bool) -> Self {
        self.integrations.insert(key.into(), Value::Bool(enabled));
        self
    }

    /// Attach an extra context entry for this call
    pub fn put_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn integrations(&self) -> &Properties {
        &self.integrations
    }

    pub fn context(&self) -> &Properties {
        &self.context
    }

    /// Layer `overrides` on top of `self`, returning a new value
    pub fn merged_with(&self, overrides: &Options) -> Options {
        let mut merged = self.clone();
        for (k, v) in &overrides.integrations {
            merged.integrations.insert(k.clone(), v.clone());
        }
        for (k, v) in &overrides.context {
            merged.context.insert(k.clone(), v.clone());
        }
        merged
    }
}

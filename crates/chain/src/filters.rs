//! Built-in middleware

use std::collections::HashSet;

use contracts::{PayloadType, PipelineError};
use tracing::debug;

use crate::engine::Chain;
use crate::middleware::Middleware;

/// Drops track events whose name matches one of the configured names
/// (case-insensitive). Everything else passes through unchanged.
#[derive(Debug, Clone, Default)]
pub struct DropEvents {
    names: HashSet<String>,
}

impl DropEvents {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| n.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    fn matches(&self, event: &str) -> bool {
        self.names.contains(&event.to_ascii_lowercase())
    }
}

impl Middleware for DropEvents {
    fn intercept(&self, chain: &mut Chain<'_>) -> Result<(), PipelineError> {
        let payload = chain.payload();
        if payload.kind() == PayloadType::Track {
            if let Some(event) = payload.event().filter(|e| self.matches(e)) {
                debug!(event, message_id = payload.message_id(), "Dropping filtered event");
                return Ok(());
            }
        }
        let payload = payload.clone();
        chain.proceed(payload)
    }
}

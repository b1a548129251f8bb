//! LogTransport - logs a payload summary via tracing

use contracts::{PipelineError, Transport};
use serde_json::Value;
use tracing::{info, instrument};

/// Transport that logs payload summaries; backs the built-in destination
pub struct LogTransport {
    name: String,
}

impl LogTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn log_payload_summary(&self, destination: &str, payload: &[u8]) {
        let value: Value = serde_json::from_slice(payload).unwrap_or(Value::Null);
        let field = |key: &str| value.get(key).and_then(Value::as_str).unwrap_or("-").to_string();

        info!(
            transport = %self.name,
            destination,
            kind = %field("type"),
            event = %field("event"),
            message_id = %field("messageId"),
            bytes = payload.len(),
            "Payload delivered"
        );
    }
}

impl Transport for LogTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&mut self, _settings: &Value) -> Result<(), PipelineError> {
        Ok(())
    }

    #[instrument(
        name = "log_transport_deliver",
        skip(self, payload),
        fields(transport = %self.name)
    )]
    async fn deliver(&mut self, destination: &str, payload: &[u8]) -> Result<(), PipelineError> {
        self.log_payload_summary(destination, payload);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), PipelineError> {
        // Nothing to flush for log transport
        Ok(())
    }

    async fn reset(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }

    #[instrument(name = "log_transport_close", skip(self))]
    async fn close(&mut self) -> Result<(), PipelineError> {
        info!(transport = %self.name, "LogTransport closed");
        Ok(())
    }
}

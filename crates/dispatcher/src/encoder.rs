//! Wire encoding of payloads

use chrono::{DateTime, SecondsFormat, Utc};
use contracts::{Payload, PipelineError};
use serde_json::Value;

/// Serializes payloads to JSON bytes for the transports
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadEncoder {
    nanosecond_timestamps: bool,
}

impl PayloadEncoder {
    pub fn new(nanosecond_timestamps: bool) -> Self {
        Self {
            nanosecond_timestamps,
        }
    }

    /// `2024-01-02T03:04:05.678Z`, or with nine fractional digits
    pub fn format_timestamp(&self, timestamp: DateTime<Utc>) -> String {
        let precision = if self.nanosecond_timestamps {
            SecondsFormat::Nanos
        } else {
            SecondsFormat::Millis
        };
        timestamp.to_rfc3339_opts(precision, true)
    }

    pub fn to_value(&self, payload: &Payload) -> Result<Value, PipelineError> {
        let mut value = serde_json::to_value(payload).map_err(|e| PipelineError::Encode {
            message_id: payload.message_id().to_string(),
            message: e.to_string(),
        })?;

        if let Some(object) = value.as_object_mut() {
            object.insert(
                "timestamp".to_string(),
                Value::String(self.format_timestamp(payload.timestamp())),
            );
        }
        Ok(value)
    }

    pub fn encode(&self, payload: &Payload) -> Result<Vec<u8>, PipelineError> {
        let value = self.to_value(payload)?;
        serde_json::to_vec(&value).map_err(|e| PipelineError::Encode {
            message_id: payload.message_id().to_string(),
            message: e.to_string(),
        })
    }
}

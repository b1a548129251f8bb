//! MemoryTransport - records deliveries in process

use contracts::{PipelineError, Transport};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct Recorded {
    deliveries: Vec<(String, Value)>,
    settings: Option<Value>,
    flush_count: usize,
    reset_count: usize,
    closed: bool,
}

/// Read side of a [`MemoryTransport`]; cheap to clone
#[derive(Debug, Clone, Default)]
pub struct MemoryRecorder {
    inner: Arc<Mutex<Recorded>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivered payloads, decoded, in delivery order
    pub fn payloads(&self) -> Vec<Value> {
        self.inner
            .lock()
            .deliveries
            .iter()
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// `(destination, payload)` pairs in delivery order
    pub fn deliveries(&self) -> Vec<(String, Value)> {
        self.inner.lock().deliveries.clone()
    }

    /// Track event names in delivery order
    pub fn events(&self) -> Vec<String> {
        self.inner
            .lock()
            .deliveries
            .iter()
            .filter_map(|(_, v)| v.get("event").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    /// Settings passed to `initialize`
    pub fn settings(&self) -> Option<Value> {
        self.inner.lock().settings.clone()
    }

    pub fn flush_count(&self) -> usize {
        self.inner.lock().flush_count
    }

    pub fn reset_count(&self) -> usize {
        self.inner.lock().reset_count
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn clear(&self) {
        self.inner.lock().deliveries.clear();
    }
}

/// Transport that keeps every delivered payload in memory.
///
/// Failure injection (`fail_first`, `fail_initialize`) and an artificial
/// delay make it usable for exercising retry and backpressure paths.
pub struct MemoryTransport {
    name: String,
    recorder: MemoryRecorder,
    fail_first: usize,
    failures: usize,
    init_error: Option<String>,
    delay: Option<Duration>,
}

impl MemoryTransport {
    /// Create a transport and the recorder observing it
    pub fn new(name: impl Into<String>) -> (Self, MemoryRecorder) {
        let recorder = MemoryRecorder::new();
        (Self::with_recorder(name, recorder.clone()), recorder)
    }

    /// Create a transport writing into an existing recorder
    pub fn with_recorder(name: impl Into<String>, recorder: MemoryRecorder) -> Self {
        Self {
            name: name.into(),
            recorder,
            fail_first: 0,
            failures: 0,
            init_error: None,
            delay: None,
        }
    }

    /// Reject the first `n` deliveries
    pub fn fail_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    /// Fail initialization with `message`
    pub fn fail_initialize(mut self, message: impl Into<String>) -> Self {
        self.init_error = Some(message.into());
        self
    }

    /// Sleep before every delivery
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&mut self, settings: &Value) -> Result<(), PipelineError> {
        self.recorder.inner.lock().settings = Some(settings.clone());
        match &self.init_error {
            Some(message) => Err(PipelineError::initialization(&self.name, message.clone())),
            None => Ok(()),
        }
    }

    async fn deliver(&mut self, destination: &str, payload: &[u8]) -> Result<(), PipelineError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failures < self.fail_first {
            self.failures += 1;
            return Err(PipelineError::delivery(destination, "injected failure"));
        }

        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| PipelineError::delivery(destination, e.to_string()))?;
        self.recorder
            .inner
            .lock()
            .deliveries
            .push((destination.to_string(), value));
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), PipelineError> {
        self.recorder.inner.lock().flush_count += 1;
        Ok(())
    }

    async fn reset(&mut self) -> Result<(), PipelineError> {
        self.recorder.inner.lock().reset_count += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PipelineError> {
        self.recorder.inner.lock().closed = true;
        Ok(())
    }
}

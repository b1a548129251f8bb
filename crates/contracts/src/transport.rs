//! Transport trait - destination delivery interface
//!
//! Defines the abstract interface behind every destination worker.

use serde_json::Value;

use crate::PipelineError;

/// Delivery trait
///
/// All transport implementations must implement this trait. A worker owns
/// exactly one transport and calls it sequentially.
#[trait_variant::make(Transport: Send)]
pub trait LocalTransport {
    /// Transport name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Prepare the transport with the destination's integration settings
    ///
    /// # Errors
    /// Failure marks the destination as failed in the readiness registry.
    async fn initialize(&mut self, settings: &Value) -> Result<(), PipelineError>;

    /// Deliver one serialized payload
    ///
    /// # Errors
    /// Returns a delivery error; the worker routes it to the retry path.
    async fn deliver(&mut self, destination: &str, payload: &[u8]) -> Result<(), PipelineError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), PipelineError>;

    /// Drop per-user state held by the transport
    async fn reset(&mut self) -> Result<(), PipelineError>;

    /// Close transport
    async fn close(&mut self) -> Result<(), PipelineError>;
}

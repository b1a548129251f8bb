//! Analytics client error types

use contracts::PipelineError;
use dispatcher::DispatcherError;
use thiserror::Error;

/// Errors returned by the client API
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// Invalid argument, bad configuration or use after shutdown
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Destination workers could not be set up
    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),

    /// `build` was called outside a Tokio runtime
    #[error("analytics client requires a Tokio runtime: {0}")]
    Runtime(String),
}

impl AnalyticsError {
    /// Client was used after `shutdown`
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Pipeline(PipelineError::ClientShutdown))
    }

    /// Caller passed a malformed event
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Pipeline(PipelineError::Validation { .. }))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Pipeline(e) if e.is_configuration())
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, AnalyticsError>;

//! Layered error definitions
//!
//! Categorized by source: config / payload / chain / delivery / lifecycle

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum PipelineError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Payload Errors =====
    /// Malformed payload or caller argument
    #[error("{message}")]
    Validation { message: String },

    /// Payload could not be serialized for delivery
    #[error("payload encode error for '{message_id}': {message}")]
    Encode { message_id: String, message: String },

    // ===== Chain Errors =====
    /// `proceed` called twice on the same chain
    #[error("chain at position {position} was already proceeded")]
    ChainReuse { position: usize },

    /// Interceptor refused or failed to process a payload
    #[error("interceptor failure: {reason}")]
    Interceptor { reason: String },

    // ===== Delivery Errors =====
    /// Transport rejected a payload
    #[error("delivery to '{destination}' failed: {message}")]
    Delivery {
        destination: String,
        message: String,
    },

    /// Transport could not be initialized
    #[error("destination '{destination}' failed to initialize: {message}")]
    Initialization {
        destination: String,
        message: String,
    },

    // ===== Lifecycle Errors =====
    /// Illegal destination state transition
    #[error("destination '{destination}' cannot move from {from} to {to}")]
    StateTransition {
        destination: String,
        from: String,
        to: String,
    },

    /// Client was used after shutdown
    #[error("Cannot enqueue messages after client is shutdown.")]
    ClientShutdown,

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create payload validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create interceptor failure
    pub fn interceptor(reason: impl Into<String>) -> Self {
        Self::Interceptor {
            reason: reason.into(),
        }
    }

    /// Create delivery error
    pub fn delivery(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Delivery {
            destination: destination.into(),
            message: message.into(),
        }
    }

    /// Create initialization error
    pub fn initialization(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Initialization {
            destination: destination.into(),
            message: message.into(),
        }
    }

    /// Whether this error is fatal at configure time
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ConfigParse { .. } | Self::ConfigValidation { .. }
        )
    }
}

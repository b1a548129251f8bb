//! AnalyticsConfig - Config Loader output
//!
//! Client configuration: batching, verbosity, feature flags, project
//! settings and destination routing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use validator::Validate;

use crate::{TrackingPlan, SEGMENT_DESTINATION};

/// Upper bound on `flush_queue_size`
pub const MAX_FLUSH_QUEUE_SIZE: usize = 250;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AnalyticsConfig {
    /// Source write key
    #[validate(length(min = 1, message = "writeKey must not be null or empty."))]
    pub write_key: String,

    /// Batch size that triggers a flush
    #[serde(default = "default_flush_queue_size")]
    #[validate(range(min = 1, max = 250, message = "flushQueueSize must be between 1 and 250"))]
    pub flush_queue_size: usize,

    /// Periodic flush interval in milliseconds (0 = disabled)
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Where threshold flushes run
    #[serde(default)]
    pub flush_mode: FlushMode,

    /// Logging verbosity
    #[serde(default)]
    pub log_level: LogLevel,

    /// Destination name -> settings handed to the transport at initialization
    #[serde(default)]
    pub default_integration_settings: Map<String, Value>,

    /// Track event routing rules
    #[serde(default)]
    pub tracking_plan: TrackingPlan,

    /// Emit `Application Installed/Updated/Opened/Backgrounded`
    #[serde(default)]
    pub track_application_lifecycle_events: bool,

    /// Attach attribution data captured by the host
    #[serde(default)]
    pub track_attribution_information: bool,

    /// Emit screen events for host-reported screen views
    #[serde(default)]
    pub record_screen_views: bool,

    /// Serialize timestamps with nanosecond precision
    #[serde(default)]
    pub experimental_nanosecond_timestamps: bool,

    /// Delivery retry policy
    #[serde(default)]
    #[validate(nested)]
    pub retry: RetryConfig,

    /// Destinations in routing order
    #[serde(default = "default_destinations")]
    #[validate(nested)]
    pub destinations: Vec<DestinationConfig>,
}

impl AnalyticsConfig {
    /// Configuration with defaults for everything but the write key
    pub fn new(write_key: impl Into<String>) -> Self {
        Self {
            write_key: write_key.into(),
            flush_queue_size: default_flush_queue_size(),
            flush_interval_ms: default_flush_interval_ms(),
            flush_mode: FlushMode::default(),
            log_level: LogLevel::default(),
            default_integration_settings: Map::new(),
            tracking_plan: TrackingPlan::default(),
            track_application_lifecycle_events: false,
            track_attribution_information: false,
            record_screen_views: false,
            experimental_nanosecond_timestamps: false,
            retry: RetryConfig::default(),
            destinations: default_destinations(),
        }
    }

    /// Periodic flush interval, `None` when disabled
    pub fn flush_interval(&self) -> Option<Duration> {
        (self.flush_interval_ms > 0).then(|| Duration::from_millis(self.flush_interval_ms))
    }

    /// Settings for one destination (`Value::Null` when absent)
    ///
    /// Segment.io always receives an object seeded with `apiKey` set to the
    /// write key; user supplied entries are layered on top.
    pub fn integration_settings(&self, destination: &str) -> Value {
        let configured = self.default_integration_settings.get(destination);
        if destination != SEGMENT_DESTINATION {
            return configured.cloned().unwrap_or(Value::Null);
        }

        let mut settings = Map::new();
        settings.insert("apiKey".into(), Value::String(self.write_key.clone()));
        if let Some(Value::Object(entries)) = configured {
            settings.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Value::Object(settings)
    }
}

fn default_flush_queue_size() -> usize {
    20
}

fn default_flush_interval_ms() -> u64 {
    30_000
}

fn default_destinations() -> Vec<DestinationConfig> {
    vec![DestinationConfig::builtin()]
}

/// Flush execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// Flush on the enqueuing caller
    Inline,
    /// Signal a background flusher task
    #[default]
    Background,
}

/// Logging verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// No logging
    #[default]
    None,
    /// Lifecycle and summaries
    Info,
    /// Per-event decisions
    Debug,
    /// Everything
    Verbose,
}

impl LogLevel {
    /// `tracing` filter directive
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::None => "off",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Verbose => "trace",
        }
    }

    pub fn enabled(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Delivery retry policy
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RetryConfig {
    /// Total attempts per payload, including the first
    #[serde(default = "default_max_attempts")]
    #[validate(range(min = 1, message = "max_attempts must be >= 1"))]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff cap (milliseconds)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Destination output configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DestinationConfig {
    /// Destination name (routing key, readiness key)
    #[validate(length(min = 1, message = "destination name cannot be empty"))]
    pub name: String,

    /// Transport type
    pub transport: TransportType,

    /// Worker queue capacity
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1, message = "queue_capacity must be >= 1"))]
    pub queue_capacity: usize,

    /// Transport-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl DestinationConfig {
    /// Create a destination with default capacity and no params
    pub fn new(name: impl Into<String>, transport: TransportType) -> Self {
        Self {
            name: name.into(),
            transport,
            queue_capacity: default_queue_capacity(),
            params: HashMap::new(),
        }
    }

    /// The built-in destination, logging every payload
    pub fn builtin() -> Self {
        Self::new(SEGMENT_DESTINATION, TransportType::Log)
    }

    /// Add a transport parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

fn default_queue_capacity() -> usize {
    1000
}

/// Transport type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    /// Log a summary line per payload
    Log,
    /// Append JSON lines to a file
    File,
    /// One UDP datagram per payload
    Network,
}

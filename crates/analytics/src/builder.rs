//! AnalyticsBuilder - assembles a client from configuration and plug-ins

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chain::{Middleware, MiddlewareRegistry};
use config_loader::ConfigLoader;
use contracts::{
    AnalyticsConfig, DestinationConfig, DestinationId, FlushMode, LogLevel, Options, RetryConfig,
    TrackingPlan, Transport, TransportType,
};
use dispatcher::{
    create_destination_handle, DestinationHandle, DestinationRouter, DispatchQueue,
    ExponentialBackoff, PayloadEncoder, RetryStrategy, RoutingPolicy, WorkerContext,
};
use readiness::ReadinessRegistry;
use serde_json::{Map, Value};
use tracing::{info, instrument};

use crate::client::Analytics;
use crate::context::{ContextProvider, DefaultContextProvider};
use crate::error::{AnalyticsError, Result};

/// Spawns the worker of a caller-supplied transport
type TransportSpawner =
    Box<dyn FnOnce(DestinationId, Value, WorkerContext, usize) -> DestinationHandle + Send>;

/// Builder for [`Analytics`].
///
/// Middleware is fixed once the client is built; registration order is
/// invocation order.
pub struct AnalyticsBuilder {
    config: AnalyticsConfig,
    middleware: MiddlewareRegistry,
    context_provider: Option<Arc<dyn ContextProvider>>,
    default_options: Options,
    retry_strategy: Option<Arc<dyn RetryStrategy>>,
    transports: HashMap<String, TransportSpawner>,
}

impl AnalyticsBuilder {
    /// Builder with default settings for `write_key`
    pub fn new(write_key: impl Into<String>) -> Self {
        Self::from_config(AnalyticsConfig::new(write_key))
    }

    /// Builder seeded from a loaded configuration
    pub fn from_config(config: AnalyticsConfig) -> Self {
        Self {
            config,
            middleware: MiddlewareRegistry::new(),
            context_provider: None,
            default_options: Options::default(),
            retry_strategy: None,
            transports: HashMap::new(),
        }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Number of queued events that triggers a flush (1..=250)
    pub fn flush_queue_size(mut self, size: usize) -> Self {
        self.config.flush_queue_size = size;
        self
    }

    /// Periodic flush interval; `Duration::ZERO` disables it
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn flush_mode(mut self, mode: FlushMode) -> Self {
        self.config.flush_mode = mode;
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log_level = level;
        self
    }

    /// Per-destination settings handed to each transport's `initialize`
    pub fn default_integration_settings(mut self, settings: Map<String, Value>) -> Self {
        self.config.default_integration_settings = settings;
        self
    }

    pub fn integration_settings(mut self, destination: impl Into<String>, settings: Value) -> Self {
        self.config
            .default_integration_settings
            .insert(destination.into(), settings);
        self
    }

    pub fn track_application_lifecycle_events(mut self) -> Self {
        self.config.track_application_lifecycle_events = true;
        self
    }

    pub fn track_attribution_information(mut self) -> Self {
        self.config.track_attribution_information = true;
        self
    }

    pub fn record_screen_views(mut self) -> Self {
        self.config.record_screen_views = true;
        self
    }

    pub fn experimental_nanosecond_timestamps(mut self) -> Self {
        self.config.experimental_nanosecond_timestamps = true;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Replace the backoff derived from `retry` with a custom strategy
    pub fn retry_strategy(mut self, strategy: impl RetryStrategy + 'static) -> Self {
        self.retry_strategy = Some(Arc::new(strategy));
        self
    }

    /// Add a destination, replacing one with the same name in place
    pub fn destination(mut self, destination: DestinationConfig) -> Self {
        match self
            .config
            .destinations
            .iter_mut()
            .find(|d| d.name == destination.name)
        {
            Some(existing) => *existing = destination,
            None => self.config.destinations.push(destination),
        }
        self
    }

    pub fn tracking_plan(mut self, plan: TrackingPlan) -> Self {
        self.config.tracking_plan = plan;
        self
    }

    /// Options merged under the options of every call
    pub fn default_options(mut self, options: Options) -> Self {
        self.default_options = options;
        self
    }

    pub fn context_provider(mut self, provider: impl ContextProvider + 'static) -> Self {
        self.context_provider = Some(Arc::new(provider));
        self
    }

    /// Runs on every payload before it is queued
    pub fn add_source_middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.add_source(Arc::new(middleware));
        self
    }

    /// Runs only on payloads routed to `destination`
    pub fn add_destination_middleware(
        mut self,
        destination: impl Into<String>,
        middleware: impl Middleware + 'static,
    ) -> Self {
        let destination: String = destination.into();
        self.middleware
            .add_destination(destination, Arc::new(middleware));
        self
    }

    /// Deliver `destination` through `transport`.
    ///
    /// A configured destination keeps its position and queue capacity; an
    /// unknown name is appended after the configured ones.
    pub fn transport<T: Transport + 'static>(
        mut self,
        destination: impl Into<String>,
        transport: T,
    ) -> Self {
        let name = destination.into();
        if !self.config.destinations.iter().any(|d| d.name == name) {
            self.config
                .destinations
                .push(DestinationConfig::new(name.clone(), TransportType::Log));
        }
        let spawner: TransportSpawner = Box::new(move |id, settings, context, capacity| {
            DestinationHandle::spawn(id, transport, settings, context, capacity)
        });
        self.transports.insert(name, spawner);
        self
    }

    /// Validate the configuration, start one worker per destination and
    /// the background flusher.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// - Configuration errors (`writeKey` empty, `flushQueueSize` out of range, ...)
    /// - Transport creation failures
    /// - No current Tokio runtime
    #[instrument(
        name = "analytics_build",
        skip(self),
        fields(destinations = self.config.destinations.len())
    )]
    pub fn build(mut self) -> Result<Analytics> {
        tokio::runtime::Handle::try_current()
            .map_err(|e| AnalyticsError::Runtime(e.to_string()))?;
        ConfigLoader::validate(&self.config)?;

        let config = self.config;
        let readiness = Arc::new(ReadinessRegistry::new());
        let retry = self
            .retry_strategy
            .unwrap_or_else(|| Arc::new(ExponentialBackoff::from(&config.retry)));
        let context = WorkerContext {
            readiness: Arc::clone(&readiness),
            encoder: PayloadEncoder::new(config.experimental_nanosecond_timestamps),
            retry,
        };

        let mut handles = Vec::with_capacity(config.destinations.len());
        for destination in &config.destinations {
            let settings = config.integration_settings(&destination.name);
            let handle = match self.transports.remove(&destination.name) {
                Some(spawn) => spawn(
                    DestinationId::new(&destination.name),
                    settings,
                    context.clone(),
                    destination.queue_capacity,
                ),
                None => create_destination_handle(destination, settings, context.clone())?,
            };
            handles.push(handle);
        }

        let source_middleware = self.middleware.source().to_vec();
        let router = DestinationRouter::new(
            handles,
            self.middleware,
            RoutingPolicy::new(config.tracking_plan.clone()),
        )?;
        let queue = Arc::new(DispatchQueue::new(
            Arc::new(router),
            config.flush_queue_size,
            config.flush_mode,
        ));

        let interval = config.flush_interval();
        let flusher = (config.flush_mode == FlushMode::Background || interval.is_some())
            .then(|| queue.spawn_flusher(interval));

        info!(
            flush_queue_size = config.flush_queue_size,
            flush_mode = ?config.flush_mode,
            flush_interval = ?interval,
            source_middleware = source_middleware.len(),
            "Analytics client started"
        );

        Ok(Analytics::new(
            config,
            source_middleware,
            self.context_provider
                .unwrap_or_else(|| Arc::new(DefaultContextProvider::default())),
            self.default_options,
            queue,
            readiness,
            flusher,
        ))
    }
}

impl std::fmt::Debug for AnalyticsBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsBuilder")
            .field("config", &self.config)
            .field("middleware", &self.middleware)
            .field("transports", &self.transports.keys().collect::<Vec<_>>())
            .finish()
    }
}

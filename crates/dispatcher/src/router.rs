//! DestinationRouter - fan-out of flushed payloads to destination workers

use std::cell::Cell;

use chain::{ChainOutcome, MiddlewareRegistry};
use contracts::{DestinationConfig, DestinationId, Payload, TransportType};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, instrument, trace};

use crate::error::DispatcherError;
use crate::handle::{DestinationController, DestinationHandle, WorkerContext};
use crate::metrics::MetricsSnapshot;
use crate::policy::RoutingPolicy;
use crate::transports::{FileTransport, LogTransport, NetworkTransport};

/// Per-payload (or per-batch, when summed) routing tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouteReport {
    /// Handed to a destination worker
    pub queued: usize,
    /// Disabled by options or tracking plan
    pub skipped: usize,
    /// Short-circuited by destination middleware
    pub dropped: usize,
    /// Destination middleware failed
    pub failed: usize,
    /// Worker queue was full
    pub overflowed: usize,
}

impl RouteReport {
    pub fn merge(&mut self, other: RouteReport) {
        self.queued += other.queued;
        self.skipped += other.skipped;
        self.dropped += other.dropped;
        self.failed += other.failed;
        self.overflowed += other.overflowed;
    }
}

/// Routes payloads through each destination's middleware chain to its worker
pub struct DestinationRouter {
    handles: RwLock<Vec<DestinationHandle>>,
    middleware: MiddlewareRegistry,
    policy: RoutingPolicy,
}

impl DestinationRouter {
    /// Destinations are routed to in the order given
    pub fn new(
        handles: Vec<DestinationHandle>,
        middleware: MiddlewareRegistry,
        policy: RoutingPolicy,
    ) -> Result<Self, DispatcherError> {
        for (i, handle) in handles.iter().enumerate() {
            if handles[..i].iter().any(|h| h.name() == handle.name()) {
                return Err(DispatcherError::DuplicateDestination(
                    handle.name().to_string(),
                ));
            }
        }

        Ok(Self {
            handles: RwLock::new(handles),
            middleware,
            policy,
        })
    }

    /// Destination names in routing order
    pub fn destinations(&self) -> Vec<DestinationId> {
        self.handles.read().iter().map(|h| h.name().clone()).collect()
    }

    /// Offer `payload` to every destination, in registration order.
    ///
    /// A drop or failure for one destination never affects the others.
    pub fn route(&self, payload: &Payload) -> RouteReport {
        let mut report = RouteReport::default();
        let handles = self.handles.read();

        for handle in handles.iter() {
            let name = handle.name();
            if !self.policy.is_enabled(name, payload) {
                trace!(destination = %name, message_id = payload.message_id(), "Destination disabled for payload");
                report.skipped += 1;
                continue;
            }

            let queued = Cell::new(false);
            let outcome = chain::run(
                payload.clone(),
                self.middleware.for_destination(name),
                &|p| queued.set(handle.try_send(p)),
            );

            match outcome {
                ChainOutcome::Delivered if queued.get() => report.queued += 1,
                ChainOutcome::Delivered => report.overflowed += 1,
                ChainOutcome::Dropped => {
                    debug!(destination = %name, message_id = payload.message_id(), "Dropped by destination middleware");
                    handle.metrics().inc_filtered_count();
                    observability::record_middleware_dropped(name);
                    report.dropped += 1;
                }
                ChainOutcome::Failed(_) => {
                    handle.metrics().inc_filtered_count();
                    observability::record_middleware_dropped(name);
                    report.failed += 1;
                }
            }
        }

        report
    }

    fn controllers(&self) -> Vec<DestinationController> {
        self.handles.read().iter().map(|h| h.controller()).collect()
    }

    /// Flush every transport and wait for each worker to drain
    #[instrument(name = "router_flush_destinations", skip(self))]
    pub async fn flush_destinations(&self) {
        for controller in self.controllers() {
            controller.flush().await;
        }
    }

    /// Broadcast a reset to every transport
    #[instrument(name = "router_reset_destinations", skip(self))]
    pub async fn reset_destinations(&self) {
        for controller in self.controllers() {
            controller.reset().await;
        }
    }

    /// Per-destination metrics in routing order
    pub fn metrics(&self) -> Vec<(DestinationId, MetricsSnapshot)> {
        self.handles
            .read()
            .iter()
            .map(|h| (h.name().clone(), h.metrics().snapshot()))
            .collect()
    }

    /// Stop every worker after it drains its queue. Later routes are no-ops.
    #[instrument(name = "router_shutdown", skip(self))]
    pub async fn shutdown(&self) {
        let handles = std::mem::take(&mut *self.handles.write());
        let count = handles.len();
        for handle in handles {
            handle.shutdown().await;
        }
        info!(destinations = count, "Destination workers stopped");
    }
}

/// Create a DestinationHandle from configuration
#[instrument(
    name = "router_create_destination_handle",
    skip(config, settings, context),
    fields(destination = %config.name, transport = ?config.transport)
)]
pub fn create_destination_handle(
    config: &DestinationConfig,
    settings: serde_json::Value,
    context: WorkerContext,
) -> Result<DestinationHandle, DispatcherError> {
    let name = DestinationId::new(&config.name);
    match config.transport {
        TransportType::Log => {
            let transport = LogTransport::new(&config.name);
            Ok(DestinationHandle::spawn(name, transport, settings, context, config.queue_capacity))
        }
        TransportType::File => {
            let transport = FileTransport::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::transport_creation(&config.name, e))?;
            Ok(DestinationHandle::spawn(name, transport, settings, context, config.queue_capacity))
        }
        TransportType::Network => {
            let transport = NetworkTransport::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::transport_creation(&config.name, e))?;
            Ok(DestinationHandle::spawn(name, transport, settings, context, config.queue_capacity))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::PayloadEncoder;
    use crate::retry::NoRetry;
    use crate::transports::{MemoryRecorder, MemoryTransport};
    use chain::from_fn;
    use contracts::{PipelineError, SEGMENT_DESTINATION};
    use readiness::ReadinessRegistry;
    use serde_json::Value;
    use std::sync::Arc;

    fn context() -> WorkerContext {
        WorkerContext {
            readiness: Arc::new(ReadinessRegistry::new()),
            encoder: PayloadEncoder::default(),
            retry: Arc::new(NoRetry),
        }
    }

    fn memory(name: &str, ctx: &WorkerContext) -> (DestinationHandle, MemoryRecorder) {
        let (transport, recorder) = MemoryTransport::new(name);
        let handle = DestinationHandle::spawn(name.into(), transport, Value::Null, ctx.clone(), 16);
        (handle, recorder)
    }

    #[tokio::test]
    async fn test_route_to_all_destinations() {
        let ctx = context();
        let (a, rec_a) = memory("A", &ctx);
        let (b, rec_b) = memory("B", &ctx);
        let router =
            DestinationRouter::new(vec![a, b], MiddlewareRegistry::new(), RoutingPolicy::default())
                .unwrap();

        let report = router.route(&Payload::track("foo").build().unwrap());
        router.flush_destinations().await;

        assert_eq!(report.queued, 2);
        assert_eq!(rec_a.events(), vec!["foo"]);
        assert_eq!(rec_b.events(), vec!["foo"]);
        router.shutdown().await;
    }

    #[tokio::test]
    async fn test_destination_isolation() {
        let ctx = context();
        let (a, rec_a) = memory("A", &ctx);
        let (b, rec_b) = memory("B", &ctx);
        let (c, rec_c) = memory("C", &ctx);

        let mut middleware = MiddlewareRegistry::new();
        middleware.add_destination(
            "A",
            Arc::new(from_fn(|_chain| Err(PipelineError::interceptor("A is broken")))),
        );
        middleware.add_destination("B", Arc::new(from_fn(|_chain| Ok(()))));

        let router =
            DestinationRouter::new(vec![a, b, c], middleware, RoutingPolicy::default()).unwrap();
        let report = router.route(&Payload::track("foo").build().unwrap());
        router.flush_destinations().await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.queued, 1);
        assert!(rec_a.payloads().is_empty());
        assert!(rec_b.payloads().is_empty());
        assert_eq!(rec_c.events(), vec!["foo"]);

        let metrics = router.metrics();
        assert_eq!(metrics[0].1.filtered_count, 1);
        router.shutdown().await;
    }

    #[tokio::test]
    async fn test_destination_middleware_modifies_only_its_copy() {
        let ctx = context();
        let (a, rec_a) = memory("A", &ctx);
        let (b, rec_b) = memory("B", &ctx);

        let mut middleware = MiddlewareRegistry::new();
        middleware.add_destination(
            "A",
            Arc::new(from_fn(|chain| {
                let payload = chain.payload().to_builder().property("only_a", true).build()?;
                chain.proceed(payload)
            })),
        );

        let router =
            DestinationRouter::new(vec![a, b], middleware, RoutingPolicy::default()).unwrap();
        router.route(&Payload::track("foo").build().unwrap());
        router.flush_destinations().await;

        assert_eq!(rec_a.payloads()[0]["properties"]["only_a"], true);
        assert!(rec_b.payloads()[0].get("properties").is_none());
        router.shutdown().await;
    }

    #[tokio::test]
    async fn test_policy_skips_disabled_destinations() {
        let ctx = context();
        let (builtin, rec_builtin) = memory(SEGMENT_DESTINATION, &ctx);
        let (mixpanel, rec_mixpanel) = memory("Mixpanel", &ctx);
        let router = DestinationRouter::new(
            vec![builtin, mixpanel],
            MiddlewareRegistry::new(),
            RoutingPolicy::default(),
        )
        .unwrap();

        let mut integrations = contracts::Properties::new();
        integrations.insert("All".into(), Value::Bool(false));
        let payload = Payload::track("foo").integrations(integrations).build().unwrap();

        let report = router.route(&payload);
        router.flush_destinations().await;

        assert_eq!(report.skipped, 1);
        assert_eq!(rec_builtin.events(), vec!["foo"]);
        assert!(rec_mixpanel.payloads().is_empty());
        router.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_destinations_rejected() {
        let ctx = context();
        let (a1, _) = memory("A", &ctx);
        let (a2, _) = memory("A", &ctx);
        let result = DestinationRouter::new(
            vec![a1, a2],
            MiddlewareRegistry::new(),
            RoutingPolicy::default(),
        );
        assert!(matches!(result, Err(DispatcherError::DuplicateDestination(_))));
    }

    #[tokio::test]
    async fn test_route_after_shutdown_is_noop() {
        let ctx = context();
        let (a, rec_a) = memory("A", &ctx);
        let router =
            DestinationRouter::new(vec![a], MiddlewareRegistry::new(), RoutingPolicy::default())
                .unwrap();
        router.shutdown().await;

        let report = router.route(&Payload::track("foo").build().unwrap());
        assert_eq!(report, RouteReport::default());
        assert!(rec_a.is_closed());
    }

    #[tokio::test]
    async fn test_create_handle_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let config = DestinationConfig::new("Archive", TransportType::File)
            .with_param("path", path.to_string_lossy());

        let ctx = context();
        let handle = create_destination_handle(&config, Value::Null, ctx.clone()).unwrap();
        handle.try_send(Payload::track("foo").build().unwrap());
        handle.shutdown().await;

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains(r#""event":"foo""#));

        let missing = DestinationConfig::new("Broken", TransportType::Network);
        assert!(matches!(
            create_destination_handle(&missing, Value::Null, ctx),
            Err(DispatcherError::TransportCreation { .. })
        ));
    }
}

//! Analytics - the client facade

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chain::{ChainOutcome, Middleware};
use contracts::{
    AnalyticsConfig, DestinationId, Options, Payload, PayloadBuilder, PipelineError, Properties,
};
use dispatcher::{DispatchQueue, FlushReport, MetricsSnapshot};
use observability::MetricsSummary;
use parking_lot::{Mutex, RwLock};
use readiness::{DestinationState, ReadinessRegistry, Registration};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::builder::AnalyticsBuilder;
use crate::context::ContextProvider;
use crate::error::Result;
use crate::identity::IdentityStore;
use crate::lifecycle::LifecycleEvent;

const SOURCE_SCOPE: &str = "source";

/// Point-in-time view of one destination
#[derive(Debug, Clone, Serialize)]
pub struct DestinationSnapshot {
    pub name: String,
    pub state: &'static str,
    pub metrics: MetricsSnapshot,
}

/// Point-in-time view of the client
#[derive(Debug, Clone, Serialize)]
pub struct ClientSnapshot {
    /// Events waiting for the next flush
    pub pending: usize,
    /// Non-empty flushes so far
    pub flushes: u64,
    /// Events handed to the router so far
    pub flushed: u64,
    pub opted_out: bool,
    pub destinations: Vec<DestinationSnapshot>,
}

/// Telemetry client.
///
/// Event calls are synchronous: they build the payload, run the source
/// middleware and queue the survivors. Delivery happens on per-destination
/// worker tasks. Share between tasks with `Arc<Analytics>`.
pub struct Analytics {
    config: AnalyticsConfig,
    source_middleware: Vec<Arc<dyn Middleware>>,
    context_provider: Arc<dyn ContextProvider>,
    default_options: Options,
    identity: IdentityStore,
    queue: Arc<DispatchQueue>,
    readiness: Arc<ReadinessRegistry>,
    flusher: Mutex<Option<(JoinHandle<()>, oneshot::Sender<()>)>>,
    opted_out: AtomicBool,
    shutdown: AtomicBool,
    /// Held shared while a payload is queued, exclusively while shutdown
    /// flips the flag. Nothing can be queued after the final drain.
    enqueue_gate: RwLock<()>,
    source_dropped: AtomicU64,
}

impl Analytics {
    /// Start building a client for `write_key`
    pub fn builder(write_key: impl Into<String>) -> AnalyticsBuilder {
        AnalyticsBuilder::new(write_key)
    }

    /// Start building a client from a loaded configuration
    pub fn from_config(config: AnalyticsConfig) -> AnalyticsBuilder {
        AnalyticsBuilder::from_config(config)
    }

    pub(crate) fn new(
        config: AnalyticsConfig,
        source_middleware: Vec<Arc<dyn Middleware>>,
        context_provider: Arc<dyn ContextProvider>,
        default_options: Options,
        queue: Arc<DispatchQueue>,
        readiness: Arc<ReadinessRegistry>,
        flusher: Option<(JoinHandle<()>, oneshot::Sender<()>)>,
    ) -> Self {
        Self {
            config,
            source_middleware,
            context_provider,
            default_options,
            identity: IdentityStore::new(),
            queue,
            readiness,
            flusher: Mutex::new(flusher),
            opted_out: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            enqueue_gate: RwLock::new(()),
            source_dropped: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn write_key(&self) -> &str {
        &self.config.write_key
    }

    pub fn anonymous_id(&self) -> String {
        self.identity.anonymous_id()
    }

    pub fn user_id(&self) -> Option<String> {
        self.identity.user_id()
    }

    /// Stored traits, as attached to `context.traits`
    pub fn traits(&self) -> Properties {
        self.identity.traits()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn is_opted_out(&self) -> bool {
        self.opted_out.load(Ordering::Relaxed)
    }

    // ===== Event calls =====

    /// Record an action the user performed
    pub fn track(
        &self,
        event: &str,
        properties: Properties,
        options: Option<&Options>,
    ) -> Result<()> {
        self.ensure_running()?;
        let builder = Payload::track(event).properties(properties);
        self.enqueue(builder, options)
    }

    /// Associate the current user with `user_id` and/or `traits`.
    ///
    /// Traits are merged into the stored identity before the payload is
    /// built, so the payload already carries them.
    pub fn identify(
        &self,
        user_id: Option<&str>,
        traits: Properties,
        options: Option<&Options>,
    ) -> Result<()> {
        self.ensure_running()?;
        if user_id.is_none_or(|id| id.trim().is_empty()) && traits.is_empty() {
            return Err(
                PipelineError::validation("Either userId or some traits must be provided.").into(),
            );
        }

        self.identity.identify(user_id, &traits);
        let builder = Payload::identify().traits(self.identity.traits());
        self.enqueue(builder, options)
    }

    /// Record a screen view. At least one of `category` and `name` is required.
    pub fn screen(
        &self,
        category: Option<&str>,
        name: Option<&str>,
        properties: Properties,
        options: Option<&Options>,
    ) -> Result<()> {
        self.ensure_running()?;
        let mut builder = Payload::screen().properties(properties);
        if let Some(category) = category {
            builder = builder.category(category);
        }
        if let Some(name) = name {
            builder = builder.name(name);
        }
        self.enqueue(builder, options)
    }

    /// Associate the current user with a group
    pub fn group(
        &self,
        group_id: &str,
        traits: Properties,
        options: Option<&Options>,
    ) -> Result<()> {
        self.ensure_running()?;
        let builder = Payload::group(group_id).traits(traits);
        self.enqueue(builder, options)
    }

    /// Link the current identity to `new_id`. `previousId` is the stored
    /// user id, or the anonymous id when none was identified.
    pub fn alias(&self, new_id: &str, options: Option<&Options>) -> Result<()> {
        self.ensure_running()?;
        let previous_id = self
            .identity
            .user_id()
            .unwrap_or_else(|| self.identity.anonymous_id());
        let builder = Payload::alias(new_id).previous_id(previous_id);
        self.enqueue(builder, options)
    }

    // ===== Host hooks =====

    /// Report a lifecycle transition. Ignored unless lifecycle tracking is on.
    pub fn application_lifecycle(&self, event: LifecycleEvent) -> Result<()> {
        self.ensure_running()?;
        if !self.config.track_application_lifecycle_events {
            return Ok(());
        }
        self.track(event.event_name(), event.properties(), None)
    }

    /// Report a screen shown by the host. Ignored unless screen recording is on.
    pub fn record_screen_view(&self, name: &str) -> Result<()> {
        self.ensure_running()?;
        if !self.config.record_screen_views {
            return Ok(());
        }
        self.screen(None, Some(name), Properties::new(), None)
    }

    /// Report install attribution captured by the host. Ignored unless
    /// attribution tracking is on.
    pub fn record_install_attribution(&self, attribution: Properties) -> Result<()> {
        self.ensure_running()?;
        if !self.config.track_attribution_information {
            return Ok(());
        }
        self.track("Install Attributed", attribution, None)
    }

    // ===== Control =====

    /// Stop (or resume) sending events. Opted-out calls succeed and are dropped.
    pub fn opt_out(&self, opt_out: bool) {
        self.opted_out.store(opt_out, Ordering::Relaxed);
        info!(opt_out, "Opt-out changed");
    }

    /// Forget the user: new anonymous id, no user id or traits, and a
    /// reset for every destination.
    #[instrument(name = "analytics_reset", skip(self))]
    pub async fn reset(&self) -> Result<()> {
        self.ensure_running()?;
        self.identity.reset();
        self.queue.router().reset_destinations().await;
        Ok(())
    }

    /// Route everything queued so far and wait until every destination
    /// worker has handled it.
    #[instrument(name = "analytics_flush", skip(self))]
    pub async fn flush(&self) -> Result<FlushReport> {
        self.ensure_running()?;
        let report = self.queue.flush();
        self.queue.router().flush_destinations().await;
        Ok(report)
    }

    /// Drain the queue and every destination, then stop all tasks.
    ///
    /// Later event calls fail with `ClientShutdown`; calling this again
    /// does nothing.
    #[instrument(name = "analytics_shutdown", skip(self))]
    pub async fn shutdown(&self) {
        {
            let _gate = self.enqueue_gate.write();
            if self.shutdown.swap(true, Ordering::AcqRel) {
                debug!("Client already shut down");
                return;
            }
        }

        let flusher = self.flusher.lock().take();
        match flusher {
            Some((handle, stop)) => {
                let _ = stop.send(());
                if let Err(e) = handle.await {
                    warn!(error = %e, "Flusher task failed");
                    self.queue.flush();
                }
            }
            None => {
                self.queue.flush();
            }
        }

        let router = self.queue.router();
        router.flush_destinations().await;
        router.shutdown().await;

        info!(
            flushes = self.queue.flush_count(),
            flushed = self.queue.flushed_count(),
            "Analytics client shut down"
        );
    }

    /// Current queue, flush and per-destination counters
    pub fn snapshot(&self) -> ClientSnapshot {
        let destinations = self
            .queue
            .router()
            .metrics()
            .into_iter()
            .map(|(name, metrics)| DestinationSnapshot {
                state: self.readiness.state(&name).as_str(),
                name: name.to_string(),
                metrics,
            })
            .collect();

        ClientSnapshot {
            pending: self.queue.len(),
            flushes: self.queue.flush_count(),
            flushed: self.queue.flushed_count(),
            opted_out: self.is_opted_out(),
            destinations,
        }
    }

    /// Flush and delivery totals, including events dropped by source
    /// middleware. Take it before `shutdown` to keep per-destination counts.
    pub fn summary(&self) -> MetricsSummary {
        let mut summary = self.queue.summary();
        summary.total_dropped += self.source_dropped.load(Ordering::Relaxed);
        summary
    }

    // ===== Readiness =====

    /// Run `callback` once `destination` has initialized; immediately if
    /// it already has.
    pub fn on_integration_ready<F>(&self, destination: &str, callback: F) -> Result<Registration>
    where
        F: FnOnce(&DestinationId) + Send + 'static,
    {
        Ok(self.readiness.on_ready(destination, callback)?)
    }

    /// Wait until `destination` has initialized
    pub async fn wait_integration_ready(&self, destination: &str) -> Result<()> {
        Ok(self.readiness.wait_ready(destination).await?)
    }

    pub fn integration_state(&self, destination: &str) -> DestinationState {
        self.readiness.state(destination)
    }

    // ===== Internals =====

    fn ensure_running(&self) -> Result<()> {
        if self.is_shutdown() {
            return Err(PipelineError::ClientShutdown.into());
        }
        Ok(())
    }

    /// Stamp identity, context and options, validate, then run the source
    /// chain with the dispatch queue as its sink.
    fn enqueue(&self, builder: PayloadBuilder, options: Option<&Options>) -> Result<()> {
        let options = match options {
            Some(options) => self.default_options.merged_with(options),
            None => self.default_options.clone(),
        };

        let mut context = self.context_provider.context();
        context.insert("traits".into(), Value::Object(self.identity.traits()));
        for (key, value) in options.context() {
            context.insert(key.clone(), value.clone());
        }

        let mut builder = builder
            .anonymous_id(self.identity.anonymous_id())
            .context(context)
            .integrations(options.integrations().clone());
        if !builder.has_user_id() {
            if let Some(user_id) = self.identity.user_id() {
                builder = builder.user_id(user_id);
            }
        }
        let payload = builder.build()?;

        if self.is_opted_out() {
            debug!(message_id = payload.message_id(), "Opted out, payload dropped");
            return Ok(());
        }

        // recursive: source middleware may call back into the client
        let _gate = self.enqueue_gate.read_recursive();
        if self.is_shutdown() {
            return Err(PipelineError::ClientShutdown.into());
        }

        let message_id = payload.message_id().to_string();
        let outcome = chain::run(payload, &self.source_middleware, &|p| self.queue.enqueue(p));
        match outcome {
            ChainOutcome::Delivered => {}
            ChainOutcome::Dropped => {
                debug!(message_id = %message_id, "Dropped by source middleware");
                self.source_dropped.fetch_add(1, Ordering::Relaxed);
                observability::record_middleware_dropped(SOURCE_SCOPE);
            }
            ChainOutcome::Failed(e) => {
                debug!(message_id = %message_id, error = %e, "Source middleware failed");
                self.source_dropped.fetch_add(1, Ordering::Relaxed);
                observability::record_middleware_dropped(SOURCE_SCOPE);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Analytics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analytics")
            .field("write_key", &self.config.write_key)
            .field("queue", &self.queue)
            .field("opted_out", &self.is_opted_out())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain::from_fn;
    use dispatcher::{MemoryRecorder, MemoryTransport};
    use serde_json::json;

    async fn client(flush_queue_size: usize) -> (Analytics, MemoryRecorder) {
        let (transport, recorder) = MemoryTransport::new("memory");
        let analytics = Analytics::builder("qaz")
            .flush_queue_size(flush_queue_size)
            .flush_interval(std::time::Duration::ZERO)
            .transport(contracts::SEGMENT_DESTINATION, transport)
            .build()
            .unwrap();
        (analytics, recorder)
    }

    fn props(value: serde_json::Value) -> Properties {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_track_reaches_destination() {
        let (analytics, recorder) = client(20).await;
        analytics
            .track("Button A Clicked", props(json!({ "color": "red" })), None)
            .unwrap();
        analytics.flush().await.unwrap();

        let payloads = recorder.payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["type"], "track");
        assert_eq!(payloads[0]["properties"]["color"], "red");
        assert_eq!(payloads[0]["anonymousId"], json!(analytics.anonymous_id()));
        assert_eq!(payloads[0]["context"]["library"]["name"], "analytics-rust");
        analytics.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_events_rejected() {
        let (analytics, _recorder) = client(20).await;
        let err = analytics.track("  ", Properties::new(), None).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "event must not be null or empty.");

        let err = analytics.identify(None, Properties::new(), None).unwrap_err();
        assert_eq!(err.to_string(), "Either userId or some traits must be provided.");

        let err = analytics.screen(None, None, Properties::new(), None).unwrap_err();
        assert_eq!(err.to_string(), "either category or name must be provided.");

        let err = analytics.group("", Properties::new(), None).unwrap_err();
        assert_eq!(err.to_string(), "groupId must not be null or empty.");

        let err = analytics.alias("", None).unwrap_err();
        assert_eq!(err.to_string(), "not allowed to pass null or empty alias");
        analytics.shutdown().await;
    }

    #[tokio::test]
    async fn test_identify_updates_context_traits() {
        let (analytics, recorder) = client(20).await;
        analytics
            .identify(Some("prateek"), props(json!({ "username": "f2prateek" })), None)
            .unwrap();
        analytics.track("foo", Properties::new(), None).unwrap();
        analytics.flush().await.unwrap();

        let payloads = recorder.payloads();
        assert_eq!(payloads[0]["userId"], "prateek");
        assert_eq!(payloads[0]["traits"]["username"], "f2prateek");
        assert_eq!(payloads[1]["userId"], "prateek");
        assert_eq!(payloads[1]["context"]["traits"]["userId"], "prateek");
        assert_eq!(payloads[1]["context"]["traits"]["username"], "f2prateek");
        analytics.shutdown().await;
    }

    #[tokio::test]
    async fn test_alias_previous_id() {
        let (analytics, recorder) = client(20).await;
        let anonymous_id = analytics.anonymous_id();

        analytics.alias("foo", None).unwrap();
        analytics
            .identify(Some("prayansh"), Properties::new(), None)
            .unwrap();
        analytics.alias("foo", None).unwrap();
        analytics.flush().await.unwrap();

        let payloads = recorder.payloads();
        assert_eq!(payloads[0]["previousId"], json!(anonymous_id));
        assert_eq!(payloads[0]["userId"], "foo");
        assert_eq!(payloads[2]["previousId"], "prayansh");
        assert_eq!(payloads[2]["userId"], "foo");
        analytics.shutdown().await;
    }

    #[tokio::test]
    async fn test_source_middleware_drop() {
        let (transport, recorder) = MemoryTransport::new("memory");
        let analytics = Analytics::builder("qaz")
            .flush_queue_size(1)
            .flush_mode(contracts::FlushMode::Inline)
            .transport(contracts::SEGMENT_DESTINATION, transport)
            .add_source_middleware(from_fn(|chain| {
                if chain.payload().is_event("Button B Clicked") {
                    return Ok(());
                }
                let payload = chain.payload().clone();
                chain.proceed(payload)
            }))
            .build()
            .unwrap();

        analytics.track("Button B Clicked", Properties::new(), None).unwrap();
        analytics.track("Button A Clicked", Properties::new(), None).unwrap();
        analytics.flush().await.unwrap();

        assert_eq!(recorder.events(), vec!["Button A Clicked"]);
        assert_eq!(analytics.summary().total_dropped, 1);
        analytics.shutdown().await;
    }

    #[tokio::test]
    async fn test_opt_out_drops_silently() {
        let (analytics, recorder) = client(1).await;
        analytics.opt_out(true);
        analytics.track("foo", Properties::new(), None).unwrap();
        analytics.flush().await.unwrap();
        assert!(recorder.payloads().is_empty());
        assert!(analytics.snapshot().opted_out);

        analytics.opt_out(false);
        analytics.track("bar", Properties::new(), None).unwrap();
        analytics.flush().await.unwrap();
        assert_eq!(recorder.events(), vec!["bar"]);
        analytics.shutdown().await;
    }

    #[tokio::test]
    async fn test_reset_clears_identity_and_resets_destinations() {
        let (analytics, recorder) = client(20).await;
        let before = analytics.anonymous_id();
        analytics.identify(Some("foo"), Properties::new(), None).unwrap();

        analytics.reset().await.unwrap();
        analytics.flush().await.unwrap();

        assert_ne!(analytics.anonymous_id(), before);
        assert_eq!(analytics.user_id(), None);
        assert_eq!(recorder.reset_count(), 1);
        analytics.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_semantics() {
        let (analytics, recorder) = client(20).await;
        analytics.track("foo", Properties::new(), None).unwrap();

        analytics.shutdown().await;
        assert_eq!(recorder.events(), vec!["foo"]);
        assert!(recorder.is_closed());

        let err = analytics.track("bar", Properties::new(), None).unwrap_err();
        assert!(err.is_shutdown());
        assert_eq!(err.to_string(), "Cannot enqueue messages after client is shutdown.");
        assert!(analytics.flush().await.unwrap_err().is_shutdown());

        // second shutdown is a no-op
        analytics.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_waits_for_in_flight_track() {
        use std::sync::mpsc;
        use std::time::Duration;

        let (entered_tx, entered_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);

        let (transport, recorder) = MemoryTransport::new("memory");
        let analytics = Analytics::builder("qaz")
            .flush_queue_size(100)
            .flush_mode(contracts::FlushMode::Inline)
            .flush_interval(Duration::ZERO)
            .transport(contracts::SEGMENT_DESTINATION, transport)
            .add_source_middleware(from_fn(move |chain| {
                let _ = entered_tx.send(());
                let _ = release_rx.lock().recv();
                let payload = chain.payload().clone();
                chain.proceed(payload)
            }))
            .build()
            .unwrap();
        let analytics = Arc::new(analytics);

        let tracker = {
            let analytics = analytics.clone();
            std::thread::spawn(move || analytics.track("Button A Clicked", Properties::new(), None))
        };
        entered_rx.recv().unwrap();

        let closer = {
            let analytics = analytics.clone();
            tokio::spawn(async move { analytics.shutdown().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!closer.is_finished());

        release_tx.send(()).unwrap();
        tracker.join().unwrap().unwrap();
        closer.await.unwrap();

        assert_eq!(recorder.events(), vec!["Button A Clicked"]);
        assert!(analytics.is_shutdown());
        let err = analytics.track("Button B Clicked", Properties::new(), None).unwrap_err();
        assert!(err.is_shutdown());
    }

    #[tokio::test]
    async fn test_gated_host_events() {
        let (analytics, recorder) = client(20).await;
        analytics
            .application_lifecycle(LifecycleEvent::Backgrounded)
            .unwrap();
        analytics.record_screen_view("Main").unwrap();
        analytics.record_install_attribution(Properties::new()).unwrap();
        analytics.flush().await.unwrap();
        assert!(recorder.payloads().is_empty());
        analytics.shutdown().await;

        let (transport, recorder) = MemoryTransport::new("memory");
        let analytics = Analytics::builder("qaz")
            .track_application_lifecycle_events()
            .record_screen_views()
            .transport(contracts::SEGMENT_DESTINATION, transport)
            .build()
            .unwrap();
        analytics
            .application_lifecycle(LifecycleEvent::Installed {
                version: "1.0.0".into(),
                build: "100".into(),
            })
            .unwrap();
        analytics.record_screen_view("Main").unwrap();
        analytics.flush().await.unwrap();

        let payloads = recorder.payloads();
        assert_eq!(payloads[0]["event"], "Application Installed");
        assert_eq!(payloads[0]["properties"]["version"], "1.0.0");
        assert_eq!(payloads[1]["type"], "screen");
        assert_eq!(payloads[1]["name"], "Main");
        analytics.shutdown().await;
    }

    #[tokio::test]
    async fn test_default_options_merged_per_call() {
        let (transport, recorder) = MemoryTransport::new("memory");
        let analytics = Analytics::builder("qaz")
            .default_options(Options::new().put_context("app", "sample"))
            .transport(contracts::SEGMENT_DESTINATION, transport)
            .build()
            .unwrap();

        let options = Options::new()
            .set_integration("Mixpanel", false)
            .put_context("screen_density", 2);
        analytics.track("foo", Properties::new(), Some(&options)).unwrap();
        analytics.flush().await.unwrap();

        let payload = &recorder.payloads()[0];
        assert_eq!(payload["context"]["app"], "sample");
        assert_eq!(payload["context"]["screen_density"], 2);
        assert_eq!(payload["integrations"]["Mixpanel"], false);
        analytics.shutdown().await;
    }

    #[tokio::test]
    async fn test_readiness_callbacks() {
        let (analytics, _recorder) = client(20).await;
        analytics
            .wait_integration_ready(contracts::SEGMENT_DESTINATION)
            .await
            .unwrap();

        let (tx, rx) = oneshot::channel();
        let registration = analytics
            .on_integration_ready(contracts::SEGMENT_DESTINATION, move |name| {
                let _ = tx.send(name.to_string());
            })
            .unwrap();
        assert_eq!(registration, Registration::Fired);
        assert_eq!(rx.await.unwrap(), contracts::SEGMENT_DESTINATION);

        let snapshot = analytics.snapshot();
        assert_eq!(snapshot.destinations[0].state, "ready");
        assert!(analytics.on_integration_ready("", |_| {}).is_err());
        analytics.shutdown().await;
    }
}

//! DispatchQueue - batches payloads and flushes them through the router
//!
//! The batch swap is the only shared mutable state on the enqueue path.
//! Flushes are serialized by `flush_lock`; enqueue never waits on a flush
//! unless it triggers one inline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{FlushMode, Payload};
use observability::{FlushStatsAggregator, MetricsSummary};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, info, instrument};

use crate::router::{DestinationRouter, RouteReport};

/// Result of one flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// Payloads swapped out of the batch
    pub payloads: usize,
    /// Routing tally over the whole batch
    pub routes: RouteReport,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.payloads == 0
    }
}

pub struct DispatchQueue {
    batch: Mutex<Vec<Payload>>,
    flush_lock: Mutex<()>,
    threshold: usize,
    mode: FlushMode,
    signal: Arc<Notify>,
    router: Arc<DestinationRouter>,
    flushes: AtomicU64,
    flushed: AtomicU64,
    stats: Mutex<FlushStatsAggregator>,
}

impl DispatchQueue {
    /// `threshold` is clamped to at least 1
    pub fn new(router: Arc<DestinationRouter>, threshold: usize, mode: FlushMode) -> Self {
        Self {
            batch: Mutex::new(Vec::with_capacity(threshold.max(1))),
            flush_lock: Mutex::new(()),
            threshold: threshold.max(1),
            mode,
            signal: Arc::new(Notify::new()),
            router,
            flushes: AtomicU64::new(0),
            flushed: AtomicU64::new(0),
            stats: Mutex::new(FlushStatsAggregator::new()),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn mode(&self) -> FlushMode {
        self.mode
    }

    pub fn router(&self) -> &Arc<DestinationRouter> {
        &self.router
    }

    /// Payloads waiting for the next flush
    pub fn len(&self) -> usize {
        self.batch.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of non-empty flushes so far
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Payloads handed to the router so far
    pub fn flushed_count(&self) -> u64 {
        self.flushed.load(Ordering::Relaxed)
    }

    /// Flush totals plus per-destination delivery counts.
    ///
    /// Destination counts are empty once the router has shut down.
    pub fn summary(&self) -> MetricsSummary {
        let mut stats = self.stats.lock().clone();
        for (name, metrics) in self.router.metrics() {
            stats.set_destination(
                &name,
                metrics.delivered_count,
                metrics.failure_count + metrics.dropped_count,
            );
        }
        stats.summary()
    }

    /// Append to the batch. Reaching the threshold flushes inline or wakes
    /// the background flusher, depending on the mode.
    pub fn enqueue(&self, payload: Payload) {
        let kind = payload.kind();
        let size = {
            let mut batch = self.batch.lock();
            batch.push(payload);
            batch.len()
        };
        observability::record_event_enqueued(kind.as_str());

        if size >= self.threshold {
            match self.mode {
                FlushMode::Inline => {
                    self.flush();
                }
                FlushMode::Background => self.signal.notify_one(),
            }
        }
    }

    /// Swap out the batch and route every payload, in enqueue order.
    #[instrument(name = "dispatch_queue_flush", skip(self))]
    pub fn flush(&self) -> FlushReport {
        let _guard = self.flush_lock.lock();
        let batch = std::mem::take(&mut *self.batch.lock());
        if batch.is_empty() {
            return FlushReport::default();
        }

        let mut report = FlushReport {
            payloads: batch.len(),
            routes: RouteReport::default(),
        };
        for payload in &batch {
            report.routes.merge(self.router.route(payload));
        }

        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.flushed.fetch_add(batch.len() as u64, Ordering::Relaxed);
        {
            let mut stats = self.stats.lock();
            stats.record_flush(batch.len());
            stats.record_dropped((report.routes.dropped + report.routes.failed) as u64);
        }
        observability::record_flush(batch.len());
        debug!(
            payloads = report.payloads,
            queued = report.routes.queued,
            skipped = report.routes.skipped,
            dropped = report.routes.dropped,
            "Batch flushed"
        );
        report
    }

    /// Spawn the background flusher: flushes when signalled by `enqueue`
    /// and every `interval` (if any). Firing `stop` flushes once more and
    /// ends the task.
    pub fn spawn_flusher(
        self: &Arc<Self>,
        interval: Option<Duration>,
    ) -> (JoinHandle<()>, oneshot::Sender<()>) {
        let (stop_tx, stop_rx) = oneshot::channel();
        let queue = Arc::clone(self);
        let handle = tokio::spawn(async move {
            queue.flusher_loop(interval, stop_rx).await;
        });
        (handle, stop_tx)
    }

    #[instrument(name = "dispatch_queue_flusher", skip(self, stop))]
    async fn flusher_loop(&self, interval: Option<Duration>, mut stop: oneshot::Receiver<()>) {
        let mut ticker = interval.map(|period| {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        info!(threshold = self.threshold, interval = ?interval, "Flusher started");

        loop {
            tokio::select! {
                _ = &mut stop => break,
                _ = self.signal.notified() => {
                    self.flush();
                }
                _ = next_tick(&mut ticker) => {
                    let report = self.flush();
                    if !report.is_empty() {
                        debug!(payloads = report.payloads, "Periodic flush");
                    }
                }
            }
        }

        self.flush();
        debug!("Flusher stopped");
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl std::fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("pending", &self.len())
            .field("threshold", &self.threshold)
            .field("mode", &self.mode)
            .finish()
    }
}

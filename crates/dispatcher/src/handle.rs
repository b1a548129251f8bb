//! DestinationHandle - one transport behind an isolated queue and worker task

use std::sync::Arc;
use std::time::Instant;

use contracts::{DestinationId, Payload, PipelineError, Transport};
use readiness::ReadinessRegistry;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::encoder::PayloadEncoder;
use crate::metrics::DestinationMetrics;
use crate::retry::RetryStrategy;

/// Message consumed by a destination worker
#[derive(Debug)]
pub enum DestinationCommand {
    /// Deliver one payload
    Deliver(Payload),
    /// Flush the transport; the sender fires once everything queued before
    /// it has been handled
    Flush(Option<oneshot::Sender<()>>),
    /// Drop per-user transport state
    Reset,
}

/// Collaborators shared by every destination worker of a client
#[derive(Clone)]
pub struct WorkerContext {
    pub readiness: Arc<ReadinessRegistry>,
    pub encoder: PayloadEncoder,
    pub retry: Arc<dyn RetryStrategy>,
}

/// Cloneable sender for control commands
#[derive(Debug, Clone)]
pub struct DestinationController {
    name: DestinationId,
    tx: mpsc::Sender<DestinationCommand>,
}

impl DestinationController {
    pub fn name(&self) -> &DestinationId {
        &self.name
    }

    /// Flush and wait until the worker has drained its queue
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .tx
            .send(DestinationCommand::Flush(Some(ack_tx)))
            .await
            .is_err()
        {
            debug!(destination = %self.name, "Worker already stopped, flush skipped");
            return;
        }
        let _ = ack_rx.await;
    }

    pub async fn reset(&self) {
        if self.tx.send(DestinationCommand::Reset).await.is_err() {
            debug!(destination = %self.name, "Worker already stopped, reset skipped");
        }
    }
}

/// Handle to a running destination worker
pub struct DestinationHandle {
    /// Destination name
    name: DestinationId,
    /// Channel to send commands to worker
    tx: mpsc::Sender<DestinationCommand>,
    /// Shared metrics
    metrics: Arc<DestinationMetrics>,
    /// Worker task handle
    worker_handle: JoinHandle<()>,
}

impl DestinationHandle {
    /// Spawn the worker task. The worker initializes `transport` with
    /// `settings` and reports the outcome to the readiness registry.
    pub fn spawn<T: Transport + 'static>(
        name: DestinationId,
        transport: T,
        settings: Value,
        context: WorkerContext,
        queue_capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(DestinationMetrics::new());

        if let Err(e) = context.readiness.mark_initializing(&name) {
            warn!(destination = %name, error = %e, "Unexpected readiness state");
        }

        let worker = Worker {
            name: name.clone(),
            metrics: Arc::clone(&metrics),
            context,
        };
        let worker_handle = tokio::spawn(async move {
            worker.run(transport, settings, rx).await;
        });

        Self {
            name,
            tx,
            metrics,
            worker_handle,
        }
    }

    pub fn name(&self) -> &DestinationId {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<DestinationMetrics> {
        &self.metrics
    }

    pub fn controller(&self) -> DestinationController {
        DestinationController {
            name: self.name.clone(),
            tx: self.tx.clone(),
        }
    }

    /// Queue a payload for delivery (non-blocking)
    ///
    /// Returns true if queued, false if the queue is full (payload dropped)
    pub fn try_send(&self, payload: Payload) -> bool {
        match self.tx.try_send(DestinationCommand::Deliver(payload)) {
            Ok(()) => {
                let depth = self.tx.max_capacity() - self.tx.capacity();
                self.metrics.set_queue_len(depth);
                observability::record_queue_depth(&self.name, depth);
                true
            }
            Err(mpsc::error::TrySendError::Full(cmd)) => {
                self.metrics.inc_dropped_count();
                observability::record_delivery_dropped(&self.name);
                if let DestinationCommand::Deliver(p) = cmd {
                    warn!(
                        destination = %self.name,
                        message_id = p.message_id(),
                        "Queue full, payload dropped"
                    );
                }
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(destination = %self.name, "Destination worker closed unexpectedly");
                false
            }
        }
    }

    /// Drain the queue, flush and close the transport
    #[instrument(name = "destination_handle_shutdown", skip(self), fields(destination = %self.name))]
    pub async fn shutdown(self) {
        // Drop sender to signal worker to stop
        drop(self.tx);
        if let Err(e) = self.worker_handle.await {
            error!(destination = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(destination = %self.name, "DestinationHandle shutdown complete");
    }
}

struct Worker {
    name: DestinationId,
    metrics: Arc<DestinationMetrics>,
    context: WorkerContext,
}

impl Worker {
    #[instrument(
        name = "destination_worker_loop",
        skip(self, transport, settings, rx),
        fields(destination = %self.name, transport = transport.name())
    )]
    async fn run<T: Transport>(
        self,
        mut transport: T,
        settings: Value,
        mut rx: mpsc::Receiver<DestinationCommand>,
    ) {
        let ready = self.initialize(&mut transport, &settings).await;

        while let Some(command) = rx.recv().await {
            self.metrics.set_queue_len(rx.len());

            match command {
                DestinationCommand::Deliver(payload) => {
                    if ready {
                        self.deliver(&mut transport, &payload).await;
                    } else {
                        self.metrics.inc_failure_count();
                        observability::record_delivery(&self.name, false);
                        debug!(
                            destination = %self.name,
                            message_id = payload.message_id(),
                            "Destination not initialized, payload discarded"
                        );
                    }
                }
                DestinationCommand::Flush(ack) => {
                    if ready {
                        if let Err(e) = transport.flush().await {
                            error!(destination = %self.name, error = %e, "Flush failed");
                        }
                    }
                    if let Some(ack) = ack {
                        let _ = ack.send(());
                    }
                }
                DestinationCommand::Reset => {
                    if ready {
                        if let Err(e) = transport.reset().await {
                            error!(destination = %self.name, error = %e, "Reset failed");
                        }
                    }
                }
            }
        }

        // Cleanup
        if ready {
            if let Err(e) = transport.flush().await {
                error!(destination = %self.name, error = %e, "Flush failed on shutdown");
            }
        }
        if let Err(e) = transport.close().await {
            error!(destination = %self.name, error = %e, "Close failed on shutdown");
        }

        debug!(destination = %self.name, "Destination worker stopped");
    }

    async fn initialize<T: Transport>(&self, transport: &mut T, settings: &Value) -> bool {
        match transport.initialize(settings).await {
            Ok(()) => {
                if let Err(e) = self.context.readiness.mark_ready(&self.name) {
                    warn!(destination = %self.name, error = %e, "Unexpected readiness state");
                }
                true
            }
            Err(e) => {
                error!(destination = %self.name, error = %e, "Transport initialization failed");
                if let Err(e) = self.context.readiness.mark_failed(&self.name) {
                    warn!(destination = %self.name, error = %e, "Unexpected readiness state");
                }
                false
            }
        }
    }

    async fn deliver<T: Transport>(&self, transport: &mut T, payload: &Payload) {
        let bytes = match self.context.encoder.encode(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.metrics.inc_failure_count();
                observability::record_delivery(&self.name, false);
                error!(destination = %self.name, error = %e, "Encode failed");
                return;
            }
        };

        let started = Instant::now();
        let mut failures = 0u32;
        loop {
            match transport.deliver(&self.name, &bytes).await {
                Ok(()) => {
                    self.metrics.inc_delivered_count();
                    observability::record_delivery(&self.name, true);
                    observability::record_delivery_latency_ms(
                        &self.name,
                        started.elapsed().as_secs_f64() * 1000.0,
                    );
                    return;
                }
                Err(e) => {
                    failures += 1;
                    match self.context.retry.next_delay(failures) {
                        Some(delay) => {
                            self.metrics.inc_retry_count();
                            observability::record_delivery_retry(&self.name);
                            warn!(
                                destination = %self.name,
                                message_id = payload.message_id(),
                                attempt = failures,
                                delay_ms = delay.as_millis() as u64,
                                error = %e,
                                "Delivery failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            self.fail(payload, failures, &e);
                            return;
                        }
                    }
                }
            }
        }
    }

    fn fail(&self, payload: &Payload, attempts: u32, e: &PipelineError) {
        self.metrics.inc_failure_count();
        observability::record_delivery(&self.name, false);
        info!(
            destination = %self.name,
            message_id = payload.message_id(),
            attempts,
            error = %e,
            "Delivery abandoned"
        );
    }
}

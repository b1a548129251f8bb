//! Pipeline orchestrator - drives one analytics client through a replay.

use std::time::{Duration, Instant};

use analytics::{Analytics, AnalyticsConfig, DropEvents};
use anyhow::{Context, Result};
use tracing::{info, warn};

use super::{PipelineStats, ReplayRecord};

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Validated client configuration
    pub config: AnalyticsConfig,

    /// Calls to replay, in order
    pub events: Vec<ReplayRecord>,

    /// Track event names dropped by a source middleware
    pub drop_events: Vec<String>,

    /// Replay timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Replay every event, flush, collect statistics and shut the client down
    pub async fn run(self) -> Result<PipelineStats> {
        let start_time = Instant::now();

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let mut builder = Analytics::from_config(self.config.config.clone());
        if !self.config.drop_events.is_empty() {
            info!(events = ?self.config.drop_events, "Source filter enabled");
            builder = builder.add_source_middleware(DropEvents::new(&self.config.drop_events));
        }
        let analytics = builder.build().context("Failed to build analytics client")?;

        for destination in &self.config.config.destinations {
            analytics
                .on_integration_ready(&destination.name, |name| {
                    info!(destination = %name, "Destination ready");
                })
                .with_context(|| format!("Invalid destination name '{}'", destination.name))?;
        }

        let mut stats = PipelineStats {
            events_read: self.config.events.len() as u64,
            ..Default::default()
        };

        let replay = async {
            for record in &self.config.events {
                match record.dispatch(&analytics) {
                    Ok(()) => stats.events_sent += 1,
                    Err(e) if e.is_validation() => {
                        warn!(error = %e, "Event rejected");
                        stats.events_rejected += 1;
                    }
                    Err(e) => return Err(e),
                }
                // let background flushes and workers make progress
                tokio::task::yield_now().await;
            }
            Ok(())
        };

        match self.config.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, replay).await {
                Ok(result) => result.context("Replay failed")?,
                Err(_) => warn!(timeout_secs = timeout.as_secs(), "Replay timed out"),
            },
            None => replay.await.context("Replay failed")?,
        }

        info!("Flushing pending events...");
        let report = analytics.flush().await.context("Final flush failed")?;
        info!(payloads = report.payloads, "Final flush complete");

        stats.summary = analytics.summary();
        stats.snapshot = Some(analytics.snapshot());

        info!("Shutting down client...");
        analytics.shutdown().await;

        stats.duration = start_time.elapsed();
        info!(
            duration_secs = stats.duration.as_secs_f64(),
            events_per_sec = format!("{:.2}", stats.events_per_sec()),
            "Replay complete"
        );

        Ok(stats)
    }
}

//! Replay statistics.

use std::time::Duration;

use analytics::ClientSnapshot;
use observability::MetricsSummary;

/// Statistics from a replay run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Lines read from the event file
    pub events_read: u64,

    /// Calls accepted by the client
    pub events_sent: u64,

    /// Calls rejected as malformed
    pub events_rejected: u64,

    /// Total duration of the run
    pub duration: Duration,

    /// Flush and delivery totals, taken before shutdown
    pub summary: MetricsSummary,

    /// Per-destination state and counters, taken before shutdown
    pub snapshot: Option<ClientSnapshot>,
}

impl PipelineStats {
    /// Accepted calls per second
    pub fn events_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.events_sent as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Replay Statistics ===\n");

        println!("Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Events read: {}", self.events_read);
        println!("   ├─ Events sent: {}", self.events_sent);
        println!("   ├─ Events rejected: {}", self.events_rejected);
        println!("   └─ Events/s: {:.2}", self.events_per_sec());

        println!();
        print!("{}", self.summary);

        if let Some(snapshot) = &self.snapshot {
            println!("\nDestinations");
            for (i, destination) in snapshot.destinations.iter().enumerate() {
                let prefix = if i + 1 == snapshot.destinations.len() {
                    "└─"
                } else {
                    "├─"
                };
                println!(
                    "   {} {} [{}] retries={}, queue_full={}, filtered={}",
                    prefix,
                    destination.name,
                    destination.state,
                    destination.metrics.retry_count,
                    destination.metrics.dropped_count,
                    destination.metrics.filtered_count
                );
            }
        }

        println!();
    }
}

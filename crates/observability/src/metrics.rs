//! Pipeline 指标收集模块
//!
//! 入队、flush、投递与中间件丢弃的指标记录，以及进程内聚合统计。

use metrics::{counter, gauge, histogram};
use std::collections::HashMap;

/// 记录事件入队
pub fn record_event_enqueued(kind: &str) {
    counter!(
        "analytics_events_enqueued_total",
        "type" => kind.to_string()
    )
    .increment(1);
}

/// 记录一次 flush 及其批大小
pub fn record_flush(batch_size: usize) {
    counter!("analytics_flushes_total").increment(1);
    histogram!("analytics_flush_batch_size").record(batch_size as f64);
}

/// 记录单次投递结果
pub fn record_delivery(destination: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "analytics_deliveries_total",
        "destination" => destination.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录投递重试
pub fn record_delivery_retry(destination: &str) {
    counter!(
        "analytics_delivery_retries_total",
        "destination" => destination.to_string()
    )
    .increment(1);
}

/// 记录因目的地队列满而丢弃的事件
pub fn record_delivery_dropped(destination: &str) {
    counter!(
        "analytics_delivery_dropped_total",
        "destination" => destination.to_string()
    )
    .increment(1);
}

/// 记录投递耗时
pub fn record_delivery_latency_ms(destination: &str, latency_ms: f64) {
    histogram!(
        "analytics_delivery_latency_ms",
        "destination" => destination.to_string()
    )
    .record(latency_ms);
}

/// 记录被中间件丢弃的事件 (`scope` = "source" 或目的地名)
pub fn record_middleware_dropped(scope: &str) {
    counter!(
        "analytics_middleware_dropped_total",
        "scope" => scope.to_string()
    )
    .increment(1);
}

/// 记录目的地队列深度
pub fn record_queue_depth(destination: &str, depth: usize) {
    gauge!(
        "analytics_destination_queue_depth",
        "destination" => destination.to_string()
    )
    .set(depth as f64);
}

/// Pipeline 指标聚合器
///
/// 在内存中聚合 flush 统计，便于命令行输出摘要。
#[derive(Debug, Clone, Default)]
pub struct FlushStatsAggregator {
    /// flush 次数
    pub total_flushes: u64,

    /// flush 出去的事件总数
    pub total_payloads: u64,

    /// 被中间件丢弃的事件数
    pub total_dropped: u64,

    /// 批大小统计
    pub batch_stats: RunningStats,

    /// 各目的地成功投递数
    pub delivered: HashMap<String, u64>,

    /// 各目的地失败数
    pub failed: HashMap<String, u64>,
}

impl FlushStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次 flush
    pub fn record_flush(&mut self, batch_size: usize) {
        self.total_flushes += 1;
        self.total_payloads += batch_size as u64;
        self.batch_stats.push(batch_size as f64);
    }

    pub fn record_dropped(&mut self, count: u64) {
        self.total_dropped += count;
    }

    /// 覆盖某目的地的累计投递结果
    pub fn set_destination(&mut self, destination: &str, delivered: u64, failed: u64) {
        self.delivered.insert(destination.to_string(), delivered);
        self.failed.insert(destination.to_string(), failed);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let total_delivered: u64 = self.delivered.values().sum();
        let total_failed: u64 = self.failed.values().sum();
        let attempts = total_delivered + total_failed;

        MetricsSummary {
            total_flushes: self.total_flushes,
            total_payloads: self.total_payloads,
            total_dropped: self.total_dropped,
            failure_rate: if attempts > 0 {
                total_failed as f64 / attempts as f64 * 100.0
            } else {
                0.0
            },
            batch_size: StatsSummary::from(&self.batch_stats),
            delivered: self.delivered.clone(),
            failed: self.failed.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_flushes: u64,
    pub total_payloads: u64,
    pub total_dropped: u64,
    pub failure_rate: f64,
    pub batch_size: StatsSummary,
    pub delivered: HashMap<String, u64>,
    pub failed: HashMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Pipeline Summary ===")?;
        writeln!(f, "Flushes: {}", self.total_flushes)?;
        writeln!(f, "Payloads flushed: {}", self.total_payloads)?;
        writeln!(f, "Dropped by middleware: {}", self.total_dropped)?;
        writeln!(f, "Delivery failure rate: {:.2}%", self.failure_rate)?;
        writeln!(f, "Batch size: {}", self.batch_size)?;

        if !self.delivered.is_empty() {
            let mut names: Vec<_> = self.delivered.keys().collect();
            names.sort();
            writeln!(f, "Destinations:")?;
            for name in names {
                let failed = self.failed.get(name).copied().unwrap_or(0);
                writeln!(
                    f,
                    "  {}: delivered={}, failed={}",
                    name, self.delivered[name], failed
                )?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.0}, max={:.0}, mean={:.2} (n={})",
                self.min, self.max, self.mean, self.count
            )
        }
    }
}

/// 在线统计 (增量均值)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
            self.mean += (value - self.mean) / self.count as f64;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

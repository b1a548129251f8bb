//! # Dispatcher
//!
//! 事件分发模块。
//!
//! 负责：
//! - 批量缓冲事件 (`DispatchQueue`)，达到阈值或显式 flush 时整体换出
//! - 按注册顺序路由到各目的地，逐目的地重放中间件链 (`DestinationRouter`)
//! - 每个目的地独立队列与 worker，隔离慢目的地与失败目的地
//! - 投递失败按 `RetryStrategy` 重试

pub mod encoder;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod policy;
pub mod queue;
pub mod retry;
pub mod router;
pub mod transports;

pub use encoder::PayloadEncoder;
pub use error::DispatcherError;
pub use handle::{DestinationCommand, DestinationController, DestinationHandle, WorkerContext};
pub use metrics::{DestinationMetrics, MetricsSnapshot};
pub use policy::RoutingPolicy;
pub use queue::{DispatchQueue, FlushReport};
pub use retry::{ExponentialBackoff, NoRetry, RetryStrategy};
pub use router::{create_destination_handle, DestinationRouter, RouteReport};
pub use transports::{
    FileTransport, FileTransportConfig, LogTransport, MemoryRecorder, MemoryTransport,
    NetworkTransport, NetworkTransportConfig,
};

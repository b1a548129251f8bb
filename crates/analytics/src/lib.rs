//! # Analytics
//!
//! 客户端门面：构建、身份、事件调用与生命周期。
//!
//! 数据流：
//! 1. `track` / `identify` / `screen` / `group` / `alias` 构建不可变 Payload
//! 2. 经 source 中间件链后进入 `DispatchQueue`
//! 3. flush 时由 `DestinationRouter` 逐目的地重放 destination 中间件链
//! 4. 各目的地 worker 编码并投递到 transport，初始化结果写入 readiness 注册表
//!
//! # Example
//!
//! ```no_run
//! use analytics::Analytics;
//! use analytics::Properties;
//!
//! # async fn demo() -> analytics::Result<()> {
//! let analytics = Analytics::builder("write-key")
//!     .flush_queue_size(1)
//!     .record_screen_views()
//!     .build()?;
//!
//! analytics.track("Button A Clicked", Properties::new(), None)?;
//! analytics.flush().await?;
//! analytics.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod builder;
mod client;
mod context;
mod error;
mod identity;
mod lifecycle;

pub use builder::AnalyticsBuilder;
pub use client::{Analytics, ClientSnapshot, DestinationSnapshot};
pub use context::{ContextProvider, DefaultContextProvider};
pub use error::{AnalyticsError, Result};
pub use identity::IdentityStore;
pub use lifecycle::LifecycleEvent;

pub use chain::{from_fn, Chain, DropEvents, Middleware};
pub use contracts::{
    AnalyticsConfig, DestinationConfig, FlushMode, LogLevel, Options, Payload, PayloadType,
    Properties, RetryConfig, TrackingPlan, TransportType, SEGMENT_DESTINATION,
};
pub use dispatcher::{FlushReport, MemoryRecorder, MemoryTransport};
pub use readiness::{DestinationState, Registration};

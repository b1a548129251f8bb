//! # Chain
//!
//! Middleware chain engine.
//!
//! 负责：
//! - 按注册顺序调用拦截器
//! - 显式 `proceed` 续传，未续传即静默丢弃
//! - 单个拦截器失败（错误或 panic）只影响当前链
//!
//! ## 使用示例
//!
//! ```
//! use std::sync::Arc;
//! use chain::{from_fn, run, Middleware};
//! use contracts::Payload;
//!
//! let middleware: Vec<Arc<dyn Middleware>> = vec![Arc::new(from_fn(|chain| {
//!     let payload = chain.payload().clone();
//!     chain.proceed(payload)
//! }))];
//!
//! let payload = Payload::track("Signed Up").build().unwrap();
//! let outcome = run(payload, &middleware, &|delivered| {
//!     assert_eq!(delivered.event(), Some("Signed Up"));
//! });
//! assert!(outcome.is_delivered());
//! ```

mod engine;
mod filters;
mod middleware;
mod registry;

pub use engine::{run, Chain, ChainOutcome};
pub use filters::DropEvents;
pub use middleware::{from_fn, FnMiddleware, Middleware};
pub use registry::{MiddlewareRegistry, MiddlewareScope};

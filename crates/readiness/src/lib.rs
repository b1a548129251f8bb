//! # Readiness
//!
//! Integration readiness registry.
//!
//! Tracks per-destination initialization state and notifies callbacks
//! exactly once when a destination becomes ready.
//!
//! State machine: `Unknown -> Initializing -> {Ready, Failed}`. Both
//! `Ready` and `Failed` are terminal; a new client builds a new registry.

mod registry;
mod state;

pub use registry::{ReadinessRegistry, ReadyCallback, Registration};
pub use state::DestinationState;

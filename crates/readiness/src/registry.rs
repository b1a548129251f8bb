//! ReadinessRegistry 实现
//!
//! 注册与状态迁移在同一把锁下串行化；回调在锁外执行。

use std::collections::HashMap;
use std::fmt;

use contracts::{DestinationId, PipelineError};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::state::DestinationState;

/// Callback fired once when a destination becomes ready
pub type ReadyCallback = Box<dyn FnOnce(&DestinationId) + Send>;

/// What `on_ready` did with a callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Destination was already ready; callback ran before returning
    Fired,
    /// Stored until the destination becomes ready
    Pending,
    /// Destination failed to initialize; callback dropped without running
    Discarded,
}

#[derive(Default)]
struct Entry {
    state: DestinationState,
    pending: Vec<ReadyCallback>,
}

/// Per-destination readiness state and pending callbacks
#[derive(Default)]
pub struct ReadinessRegistry {
    entries: Mutex<HashMap<DestinationId, Entry>>,
}

impl ReadinessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of `name`
    pub fn state(&self, name: &str) -> DestinationState {
        self.entries
            .lock()
            .get(name)
            .map(|e| e.state)
            .unwrap_or_default()
    }

    /// Number of callbacks waiting on `name`
    pub fn pending(&self, name: &str) -> usize {
        self.entries.lock().get(name).map_or(0, |e| e.pending.len())
    }

    /// Register `callback` for `name`.
    ///
    /// Runs it immediately when `name` is already ready, otherwise stores it
    /// until [`mark_ready`](Self::mark_ready). Every callback runs at most once.
    ///
    /// # Errors
    /// [`PipelineError::Validation`] when `name` is empty
    pub fn on_ready<F>(&self, name: &str, callback: F) -> Result<Registration, PipelineError>
    where
        F: FnOnce(&DestinationId) + Send + 'static,
    {
        if name.is_empty() {
            return Err(PipelineError::validation("key cannot be null or empty."));
        }

        let id = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(DestinationId::new(name)).or_default();
            match entry.state {
                DestinationState::Ready => {}
                DestinationState::Failed => {
                    debug!(destination = name, "Destination failed, callback discarded");
                    return Ok(Registration::Discarded);
                }
                DestinationState::Unknown | DestinationState::Initializing => {
                    entry.pending.push(Box::new(callback));
                    return Ok(Registration::Pending);
                }
            }
            DestinationId::new(name)
        };

        callback(&id);
        Ok(Registration::Fired)
    }

    /// Wait until `name` becomes ready
    ///
    /// # Errors
    /// - [`PipelineError::Validation`] when `name` is empty
    /// - [`PipelineError::Initialization`] when the destination fails
    pub async fn wait_ready(&self, name: &str) -> Result<(), PipelineError> {
        let (tx, rx) = oneshot::channel();
        let registration = self.on_ready(name, move |_| {
            let _ = tx.send(());
        })?;

        if registration == Registration::Discarded {
            return Err(PipelineError::initialization(name, "destination failed"));
        }

        // The sender is dropped with the pending list on failure
        rx.await
            .map_err(|_| PipelineError::initialization(name, "destination failed"))
    }

    /// `Unknown -> Initializing`
    ///
    /// # Errors
    /// [`PipelineError::StateTransition`] from any other state
    pub fn mark_initializing(&self, name: &str) -> Result<(), PipelineError> {
        let mut entries = self.entries.lock();
        let entry = entries.entry(DestinationId::new(name)).or_default();
        transition(name, entry, DestinationState::Initializing)?;
        debug!(destination = name, "Destination initializing");
        Ok(())
    }

    /// Move `name` to `Ready` and fire its pending callbacks in
    /// registration order. Returns how many callbacks ran.
    ///
    /// # Errors
    /// [`PipelineError::StateTransition`] when `name` is already terminal
    pub fn mark_ready(&self, name: &str) -> Result<usize, PipelineError> {
        let callbacks = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(DestinationId::new(name)).or_default();
            transition(name, entry, DestinationState::Ready)?;
            std::mem::take(&mut entry.pending)
        };

        let id = DestinationId::new(name);
        let fired = callbacks.len();
        for callback in callbacks {
            callback(&id);
        }

        info!(destination = name, callbacks = fired, "Destination ready");
        Ok(fired)
    }

    /// Move `name` to `Failed`, discarding pending callbacks.
    /// Returns how many were discarded.
    ///
    /// # Errors
    /// [`PipelineError::StateTransition`] when `name` is already terminal
    pub fn mark_failed(&self, name: &str) -> Result<usize, PipelineError> {
        let discarded = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(DestinationId::new(name)).or_default();
            transition(name, entry, DestinationState::Failed)?;
            std::mem::take(&mut entry.pending)
        };

        let count = discarded.len();
        warn!(destination = name, discarded = count, "Destination failed to initialize");
        Ok(count)
    }

    /// All known destinations with their state
    pub fn states(&self) -> Vec<(DestinationId, DestinationState)> {
        let entries = self.entries.lock();
        let mut states: Vec<_> = entries.iter().map(|(k, e)| (k.clone(), e.state)).collect();
        states.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        states
    }
}

fn transition(name: &str, entry: &mut Entry, next: DestinationState) -> Result<(), PipelineError> {
    if !entry.state.can_transition_to(next) {
        return Err(PipelineError::StateTransition {
            destination: name.to_string(),
            from: entry.state.to_string(),
            to: next.to_string(),
        });
    }
    entry.state = next;
    Ok(())
}

impl fmt::Debug for ReadinessRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadinessRegistry")
            .field("states", &self.states())
            .finish()
    }
}

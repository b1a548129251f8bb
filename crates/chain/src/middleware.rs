//! Middleware trait and closure adapter

use contracts::PipelineError;

use crate::engine::Chain;

/// An interceptor in a source or destination chain.
///
/// Implementations either call [`Chain::proceed`] exactly once (optionally
/// with a modified payload) or return without proceeding to drop the
/// payload for this chain. Returning an error also drops it, and is logged.
pub trait Middleware: Send + Sync {
    fn intercept(&self, chain: &mut Chain<'_>) -> Result<(), PipelineError>;
}

/// [`Middleware`] backed by a closure
pub struct FnMiddleware<F> {
    f: F,
}

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&mut Chain<'_>) -> Result<(), PipelineError> + Send + Sync,
{
    fn intercept(&self, chain: &mut Chain<'_>) -> Result<(), PipelineError> {
        (self.f)(chain)
    }
}

/// Wrap a closure as middleware
pub fn from_fn<F>(f: F) -> FnMiddleware<F>
where
    F: Fn(&mut Chain<'_>) -> Result<(), PipelineError> + Send + Sync,
{
    FnMiddleware { f }
}

impl<F> std::fmt::Debug for FnMiddleware<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnMiddleware").finish_non_exhaustive()
    }
}

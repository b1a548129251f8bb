//! Chain traversal engine.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use contracts::{Payload, PipelineError};
use tracing::{trace, warn};

use crate::middleware::Middleware;

/// Shared state of one traversal
struct Traversal<'a> {
    middleware: &'a [Arc<dyn Middleware>],
    sink: &'a dyn Fn(Payload),
    delivered: Cell<bool>,
    failed_at: Cell<Option<usize>>,
}

impl Traversal<'_> {
    /// Hand `payload` to the interceptor at `index`, or to the sink past the end
    fn invoke(&self, index: usize, payload: Payload) -> Result<(), PipelineError> {
        let Some(middleware) = self.middleware.get(index) else {
            (self.sink)(payload);
            self.delivered.set(true);
            return Ok(());
        };

        let mut chain = Chain {
            payload,
            next: index + 1,
            traversal: self,
            proceeded: false,
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| middleware.intercept(&mut chain)))
            .unwrap_or_else(|panic| {
                Err(PipelineError::interceptor(format!(
                    "interceptor panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });

        if let Err(ref e) = result {
            // Errors bubble through every upstream proceed; log the origin once
            if self.failed_at.get().is_none() {
                self.failed_at.set(Some(index));
                warn!(position = index, error = %e, "Interceptor failed, payload dropped for this chain");
            }
        } else if !chain.is_proceeded() {
            trace!(position = index, "Interceptor short-circuited");
        }

        result
    }
}

/// One step of a traversal, handed to an interceptor.
///
/// A chain can be proceeded at most once and cannot outlive the
/// `intercept` call it was passed to.
pub struct Chain<'a> {
    payload: Payload,
    next: usize,
    traversal: &'a Traversal<'a>,
    proceeded: bool,
}

impl Chain<'_> {
    /// Payload as received by this interceptor
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Number of interceptors entered so far, including the current one
    pub fn position(&self) -> usize {
        self.next
    }

    /// Whether `proceed` has already been called
    pub fn is_proceeded(&self) -> bool {
        self.proceeded
    }

    /// Forward `payload` to the next interceptor, or the terminal sink when
    /// none remain.
    ///
    /// # Errors
    /// - [`PipelineError::ChainReuse`] on a second call; nothing is forwarded
    /// - Any error raised further down the chain
    pub fn proceed(&mut self, payload: Payload) -> Result<(), PipelineError> {
        if self.proceeded {
            return Err(PipelineError::ChainReuse {
                position: self.position(),
            });
        }
        self.proceeded = true;
        self.traversal.invoke(self.next, payload)
    }
}

/// Result of one traversal
#[derive(Debug)]
pub enum ChainOutcome {
    /// The terminal sink received the payload
    Delivered,
    /// An interceptor returned without proceeding
    Dropped,
    /// An interceptor failed before the payload reached the sink
    Failed(PipelineError),
}

impl ChainOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, Self::Dropped)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Run `payload` through `middleware` in order, ending at `sink`.
///
/// The sink is invoked at most once. Interceptor failures never propagate
/// past this call.
pub fn run(payload: Payload, middleware: &[Arc<dyn Middleware>], sink: &dyn Fn(Payload)) -> ChainOutcome {
    let traversal = Traversal {
        middleware,
        sink,
        delivered: Cell::new(false),
        failed_at: Cell::new(None),
    };

    let result = traversal.invoke(0, payload);

    match (traversal.delivered.get(), result) {
        (true, Ok(())) => ChainOutcome::Delivered,
        (true, Err(e)) => {
            warn!(error = %e, "Interceptor failed after payload was delivered");
            ChainOutcome::Delivered
        }
        (false, Ok(())) => ChainOutcome::Dropped,
        (false, Err(e)) => ChainOutcome::Failed(e),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::from_fn;
    use std::cell::RefCell;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pass_through() -> Arc<dyn Middleware> {
        Arc::new(from_fn(|chain| {
            let payload = chain.payload().clone();
            chain.proceed(payload)
        }))
    }

    fn track(event: &str) -> Payload {
        Payload::track(event)
            .property("plan", "pro")
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_chain_delivers_unchanged() {
        let received = RefCell::new(Vec::new());
        let payload = track("Signed Up");

        let outcome = run(payload.clone(), &[], &|p| received.borrow_mut().push(p));

        assert!(outcome.is_delivered());
        assert_eq!(received.into_inner(), vec![payload]);
    }

    #[test]
    fn test_pass_through_is_identity_preserving() {
        let received = RefCell::new(Vec::new());
        let payload = track("Signed Up");
        let middleware = vec![pass_through(), pass_through(), pass_through()];

        let outcome = run(payload.clone(), &middleware, &|p| received.borrow_mut().push(p));

        assert!(outcome.is_delivered());
        assert_eq!(received.into_inner(), vec![payload]);
    }

    #[test]
    fn test_invocation_follows_registration_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let middleware: Vec<Arc<dyn Middleware>> = (0..3)
            .map(|i| {
                let order = Arc::clone(&order);
                Arc::new(from_fn(move |chain| {
                    order.lock().unwrap().push(i);
                    let payload = chain.payload().clone();
                    chain.proceed(payload)
                })) as Arc<dyn Middleware>
            })
            .collect();

        run(track("a"), &middleware, &|_| {});
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_omitted_proceed_drops_silently() {
        let delivered = Cell::new(0);
        let later_calls = Arc::new(AtomicUsize::new(0));
        let later = Arc::clone(&later_calls);

        let middleware: Vec<Arc<dyn Middleware>> = vec![
            pass_through(),
            Arc::new(from_fn(|_chain| Ok(()))),
            Arc::new(from_fn(move |chain| {
                later.fetch_add(1, Ordering::SeqCst);
                let payload = chain.payload().clone();
                chain.proceed(payload)
            })),
        ];

        let outcome = run(track("a"), &middleware, &|_| delivered.set(delivered.get() + 1));

        assert!(outcome.is_dropped());
        assert_eq!(delivered.get(), 0);
        assert_eq!(later_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_double_proceed_is_rejected() {
        let delivered = Cell::new(0);
        let second = Arc::new(std::sync::Mutex::new(None));
        let captured = Arc::clone(&second);

        let middleware: Vec<Arc<dyn Middleware>> = vec![Arc::new(from_fn(move |chain| {
            let payload = chain.payload().clone();
            chain.proceed(payload.clone())?;
            let again = chain.proceed(payload);
            *captured.lock().unwrap() = Some(again);
            Ok(())
        }))];

        let outcome = run(track("a"), &middleware, &|_| delivered.set(delivered.get() + 1));

        assert!(outcome.is_delivered());
        assert_eq!(delivered.get(), 1);
        let again = second.lock().unwrap().take().unwrap();
        assert!(matches!(again, Err(PipelineError::ChainReuse { position: 1 })));
    }

    #[test]
    fn test_chain_reports_position_and_proceed_state() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let middleware: Vec<Arc<dyn Middleware>> = (0..3)
            .map(|_| {
                let seen = Arc::clone(&seen);
                Arc::new(from_fn(move |chain| {
                    let before = chain.is_proceeded();
                    let payload = chain.payload().clone();
                    chain.proceed(payload)?;
                    seen.lock().unwrap().push((chain.position(), before, chain.is_proceeded()));
                    Ok(())
                })) as Arc<dyn Middleware>
            })
            .collect();

        run(track("a"), &middleware, &|_| {});

        // innermost interceptor returns first
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(3, false, true), (2, false, true), (1, false, true)]
        );
    }

    #[test]
    fn test_modified_payload_reaches_sink() {
        let received = RefCell::new(None);
        let middleware: Vec<Arc<dyn Middleware>> = vec![Arc::new(from_fn(|chain| {
            let payload = chain
                .payload()
                .to_builder()
                .property("enriched", true)
                .build()?;
            chain.proceed(payload)
        }))];

        let original = track("a");
        run(original.clone(), &middleware, &|p| *received.borrow_mut() = Some(p));

        let received = received.into_inner().unwrap();
        assert_eq!(received.properties()["enriched"], serde_json::json!(true));
        assert!(original.properties().get("enriched").is_none());
    }

    #[test]
    fn test_failing_interceptor_is_contained() {
        let delivered = Cell::new(0);
        let middleware: Vec<Arc<dyn Middleware>> = vec![
            pass_through(),
            Arc::new(from_fn(|_chain| Err(PipelineError::interceptor("boom")))),
        ];

        let outcome = run(track("a"), &middleware, &|_| delivered.set(delivered.get() + 1));

        assert!(matches!(
            outcome,
            ChainOutcome::Failed(PipelineError::Interceptor { .. })
        ));
        assert_eq!(delivered.get(), 0);

        // Next payload through a healthy chain is unaffected
        let outcome = run(track("b"), &[pass_through()], &|_| delivered.set(delivered.get() + 1));
        assert!(outcome.is_delivered());
        assert_eq!(delivered.get(), 1);
    }

    #[test]
    fn test_panicking_interceptor_is_contained() {
        let middleware: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(from_fn(|_chain| panic!("interceptor bug")))];

        let outcome = run(track("a"), &middleware, &|_| {});

        match outcome {
            ChainOutcome::Failed(PipelineError::Interceptor { reason }) => {
                assert!(reason.contains("interceptor bug"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_upstream_sees_downstream_failure() {
        let saw_error = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&saw_error);
        let middleware: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(from_fn(move |chain| {
                let payload = chain.payload().clone();
                if chain.proceed(payload).is_err() {
                    flag.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            })),
            Arc::new(from_fn(|_chain| Err(PipelineError::interceptor("nope")))),
        ];

        let outcome = run(track("a"), &middleware, &|_| {});

        assert!(outcome.is_dropped());
        assert_eq!(saw_error.load(Ordering::SeqCst), 1);
    }
}

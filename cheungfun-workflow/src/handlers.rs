//! Handler decorators and middleware.
//!
//! Every decorator returns a [`BoxedHandler`], so decorated handlers can be
//! registered and decorated again like any other handler.

use std::{sync::Arc, time::Instant};
use tracing::{debug, warn};

use crate::{
    error::WorkflowError,
    event::Event,
    step::{BoxedHandler, handler_fn, invoke_catching_panics},
};

/// Run `handler` only for events matching `predicate`; others yield nothing
pub fn when<P>(predicate: P, handler: BoxedHandler) -> BoxedHandler
where
    P: Fn(&Event) -> bool + Send + Sync + 'static,
{
    handler_fn(move |ctx, event| {
        let handler = Arc::clone(&handler);
        let matches = predicate(&event);
        async move {
            if matches {
                handler.handle(ctx, event).await
            } else {
                Ok(Vec::new())
            }
        }
    })
}

/// Run `handlers` in sequence on the same event and concatenate their output.
///
/// Stops at the first error, discarding the output gathered so far.
pub fn chain(handlers: Vec<BoxedHandler>) -> BoxedHandler {
    let handlers: Arc<[BoxedHandler]> = handlers.into();
    handler_fn(move |ctx, event| {
        let handlers = Arc::clone(&handlers);
        async move {
            let mut emitted = Vec::new();
            for handler in handlers.iter() {
                emitted.extend(handler.handle(Arc::clone(&ctx), event.clone()).await?);
            }
            Ok(emitted)
        }
    })
}

/// Run `primary`; when it fails, run `secondary` on the same event instead
pub fn fallback(primary: BoxedHandler, secondary: BoxedHandler) -> BoxedHandler {
    handler_fn(move |ctx, event| {
        let primary = Arc::clone(&primary);
        let secondary = Arc::clone(&secondary);
        async move {
            match primary.handle(Arc::clone(&ctx), event.clone()).await {
                Ok(events) => Ok(events),
                Err(err) => {
                    debug!("Primary handler failed, falling back: {err}");
                    secondary.handle(ctx, event).await
                }
            }
        }
    })
}

/// Run `handler` and keep only the emitted events matching `predicate`
pub fn filter<P>(handler: BoxedHandler, predicate: P) -> BoxedHandler
where
    P: Fn(&Event) -> bool + Send + Sync + 'static,
{
    let predicate = Arc::new(predicate);
    handler_fn(move |ctx, event| {
        let handler = Arc::clone(&handler);
        let predicate = Arc::clone(&predicate);
        async move {
            let events = handler.handle(ctx, event).await?;
            let kept: Vec<Event> = events.into_iter().filter(|e| predicate(e)).collect();
            Ok(kept)
        }
    })
}

/// A handler-to-handler transformation
pub type Middleware = Arc<dyn Fn(BoxedHandler) -> BoxedHandler + Send + Sync>;

/// Wrap a closure as [`Middleware`]
pub fn middleware<F>(f: F) -> Middleware
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap `handler` in `middlewares`; the first middleware is the outermost.
///
/// `apply_middleware(h, &[m1, m2])` behaves like `m1(m2(h))`.
pub fn apply_middleware(handler: BoxedHandler, middlewares: &[Middleware]) -> BoxedHandler {
    middlewares.iter().rev().fold(handler, |inner, wrap| wrap(inner))
}

/// Middleware turning a panic in the inner handler into a
/// [`WorkflowError::Panic`] carrying the panic message
pub fn recovery() -> Middleware {
    middleware(|inner| {
        handler_fn(move |ctx, event| {
            let inner = Arc::clone(&inner);
            async move {
                match invoke_catching_panics(inner.as_ref(), ctx, event).await {
                    Ok(result) => result,
                    Err(message) => {
                        warn!("Recovered from handler panic: {message}");
                        Err(WorkflowError::panic(message))
                    }
                }
            }
        })
    })
}

/// Middleware tracing entry, exit and elapsed time of each invocation
pub fn logging() -> Middleware {
    middleware(|inner| {
        handler_fn(move |ctx, event| {
            let inner = Arc::clone(&inner);
            async move {
                let kind = event.kind().clone();
                let started = Instant::now();
                debug!("Handling '{kind}' in run {}", ctx.run_id());
                let result = inner.handle(ctx, event).await;
                match &result {
                    Ok(events) => debug!(
                        "Handled '{kind}' in {:?}, emitted {} event(s)",
                        started.elapsed(),
                        events.len()
                    ),
                    Err(err) => warn!("Handling '{kind}' failed after {:?}: {err}", started.elapsed()),
                }
                result
            }
        })
    })
}

//! Middleware chain engine.
//!
//! A [`Chain`] is an ordered, append-only list of [`Middleware`] handlers over
//! a single value type. Each call to [`Chain::process`] walks the handlers in
//! registration order, handing every handler the current value and a [`Next`]
//! continuation for the rest of the chain:
//!
//! - calling `next.run(value)` resumes the remaining handlers with `value` and
//!   yields their eventual result, which the handler may further transform;
//! - returning without calling `next` short-circuits: the returned value is the
//!   result of the whole invocation and no later handler runs;
//! - returning an error aborts the invocation with that error.
//!
//! Invocations never share state. `process` snapshots the handler list when it
//! is called and the cursor lives inside [`Next`], so the same chain can serve
//! any number of concurrent invocations, and handlers registered while an
//! invocation is running only apply to later invocations.
//!
//! # Example
//!
//! ```
//! use futures_util::FutureExt;
//! use restloader_core::{Chain, Next};
//!
//! let chain = Chain::<String>::new();
//! chain
//!     .map(|value| Ok(format!("{value}-first")))
//!     .use_fn(|value: String, next: Next<String>| async move {
//!         let value = next.run(format!("{value}-second")).await?;
//!         Ok(value.to_uppercase())
//!     });
//!
//! let value = chain
//!     .process("start".to_string())
//!     .now_or_never()
//!     .expect("no suspension point")
//!     .expect("process");
//! assert_eq!(value, "START-FIRST-SECOND");
//! ```

use std::fmt;
use std::future::{self, Future};
use std::sync::{Arc, PoisonError, RwLock};

use futures_util::future::BoxFuture;

use crate::Result;

/// A handler registered in a [`Chain`].
///
/// Closures are turned into middleware with [`middleware_fn`]; types that hold
/// configuration (tokens, log levels) implement the trait directly.
pub trait Middleware<T>: Send + Sync + 'static {
    /// Handle `value`, optionally resuming the rest of the chain through `next`.
    fn handle<'a>(&'a self, value: T, next: Next<T>) -> BoxFuture<'a, Result<T>>;
}

type Handler<T> = Arc<dyn Middleware<T>>;

/// Continuation over the handlers that follow the current one.
///
/// Each invocation owns its own `Next` values; running it consumes it, so a
/// handler can resume the remainder of the chain at most once.
pub struct Next<T> {
    handlers: Arc<[Handler<T>]>,
    cursor: usize,
}

impl<T: Send + 'static> Next<T> {
    /// Run the remaining handlers with `value`.
    ///
    /// Resolves to `value` itself when no handler is left.
    pub fn run(self, value: T) -> BoxFuture<'static, Result<T>> {
        let Some(handler) = self.handlers.get(self.cursor).cloned() else {
            return Box::pin(future::ready(Ok(value)));
        };

        let next = Self {
            handlers: self.handlers,
            cursor: self.cursor + 1,
        };
        Box::pin(async move { handler.handle(value, next).await })
    }
}

impl<T> Next<T> {
    /// Number of handlers left to run.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.handlers.len().saturating_sub(self.cursor)
    }
}

impl<T> fmt::Debug for Next<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("cursor", &self.cursor)
            .field("remaining", &self.remaining())
            .finish()
    }
}

// ============================================================================
// Chain
// ============================================================================

/// Ordered, append-only middleware pipeline over values of type `T`.
pub struct Chain<T> {
    handlers: RwLock<Vec<Handler<T>>>,
}

impl<T> Default for Chain<T> {
    fn default() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }
}

impl<T> fmt::Debug for Chain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("handlers", &self.len())
            .finish()
    }
}

impl<T> Chain<T> {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends a shared handler.
    pub fn use_shared(&self, middleware: Arc<dyn Middleware<T>>) -> &Self {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(middleware);
        self
    }
}

impl<T: Send + 'static> Chain<T> {
    /// Appends a handler.
    pub fn use_middleware(&self, middleware: impl Middleware<T>) -> &Self {
        self.use_shared(Arc::new(middleware))
    }

    /// Appends an async closure handler, see [`middleware_fn`].
    pub fn use_fn<F, Fut>(&self, f: F) -> &Self
    where
        F: Fn(T, Next<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.use_middleware(middleware_fn(f))
    }

    /// Appends a synchronous transform whose output is forwarded to the rest
    /// of the chain.
    pub fn map<F>(&self, f: F) -> &Self
    where
        F: Fn(T) -> Result<T> + Send + Sync + 'static,
    {
        self.use_middleware(Map { f })
    }

    /// Runs a fresh invocation of the chain over `value`.
    ///
    /// The handler list is captured when this method is called, not when the
    /// returned future is first polled.
    pub fn process(&self, value: T) -> BoxFuture<'static, Result<T>> {
        let snapshot: Arc<[Handler<T>]> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();

        Next {
            handlers: snapshot,
            cursor: 0,
        }
        .run(value)
    }
}

// ============================================================================
// Closure adapters
// ============================================================================

/// Middleware built from an async closure, see [`middleware_fn`].
#[derive(Clone, Copy)]
pub struct MiddlewareFn<F> {
    f: F,
}

impl<F> fmt::Debug for MiddlewareFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareFn").finish_non_exhaustive()
    }
}

/// Turns an async closure `(value, next) -> Result<value>` into a [`Middleware`].
pub fn middleware_fn<F>(f: F) -> MiddlewareFn<F> {
    MiddlewareFn { f }
}

impl<T, F, Fut> Middleware<T> for MiddlewareFn<F>
where
    T: Send + 'static,
    F: Fn(T, Next<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    fn handle<'a>(&'a self, value: T, next: Next<T>) -> BoxFuture<'a, Result<T>> {
        Box::pin((self.f)(value, next))
    }
}

struct Map<F> {
    f: F,
}

impl<T, F> Middleware<T> for Map<F>
where
    T: Send + 'static,
    F: Fn(T) -> Result<T> + Send + Sync + 'static,
{
    fn handle<'a>(&'a self, value: T, next: Next<T>) -> BoxFuture<'a, Result<T>> {
        match (self.f)(value) {
            Ok(value) => next.run(value),
            Err(err) => Box::pin(future::ready(Err(err))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert2::{check, let_assert};
    use futures_util::future::join;

    use super::*;
    use crate::Error;

    fn push(tag: &'static str) -> impl Fn(Vec<&'static str>) -> Result<Vec<&'static str>> {
        move |mut trail| {
            trail.push(tag);
            Ok(trail)
        }
    }

    #[tokio::test]
    async fn empty_chain_returns_input() {
        let chain = Chain::<u32>::new();
        check!(chain.is_empty());
        check!(chain.process(7).await.ok() == Some(7));
    }

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let chain = Chain::new();
        chain.map(push("h1")).map(push("h2")).map(push("h3"));

        let trail = chain.process(Vec::new()).await.expect("process");
        assert_eq!(trail, vec!["h1", "h2", "h3"]);
    }

    #[tokio::test]
    async fn later_handler_observes_rewritten_value() {
        let chain = Chain::new();
        chain
            .map(|value: String| Ok(format!("{value}+h1")))
            .use_fn(|value: String, next: Next<String>| async move {
                assert_eq!(value, "v+h1");
                next.run(value).await
            });

        assert_eq!(chain.process("v".to_string()).await.expect("process"), "v+h1");
    }

    #[tokio::test]
    async fn handler_without_next_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = Chain::new();
        chain.use_fn(|_: u32, _next: Next<u32>| async move { Ok(42) });
        {
            let calls = Arc::clone(&calls);
            chain.map(move |value: u32| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(value + 1)
            });
        }

        assert_eq!(chain.process(1).await.expect("process"), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn handler_can_transform_downstream_result() {
        let chain = Chain::new();
        chain
            .use_fn(|value: u32, next: Next<u32>| async move {
                let downstream = next.run(value).await?;
                Ok(downstream * 10)
            })
            .use_fn(|value: u32, next: Next<u32>| async move {
                tokio::task::yield_now().await;
                next.run(value + 1).await
            });

        assert_eq!(chain.process(1).await.expect("process"), 20);
    }

    #[tokio::test]
    async fn handler_error_aborts_invocation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = Chain::new();
        chain.map(|_: u32| Err(Error::middleware("rejected")));
        {
            let calls = Arc::clone(&calls);
            chain.map(move |value: u32| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(value)
            });
        }

        let_assert!(Err(Error::Middleware(message)) = chain.process(1).await);
        check!(message == "rejected");
        check!(calls.load(Ordering::SeqCst) == 0);
    }

    #[tokio::test]
    async fn concurrent_invocations_do_not_share_state() {
        let chain = Chain::new();
        chain
            .use_fn(|value: String, next: Next<String>| async move {
                tokio::task::yield_now().await;
                next.run(format!("{value}/a")).await
            })
            .use_fn(|value: String, next: Next<String>| async move {
                tokio::task::yield_now().await;
                next.run(format!("{value}/b")).await
            });

        let (left, right) = join(
            chain.process("left".to_string()),
            chain.process("right".to_string()),
        )
        .await;

        assert_eq!(left.expect("left"), "left/a/b");
        assert_eq!(right.expect("right"), "right/a/b");
    }

    #[tokio::test]
    async fn running_invocation_ignores_late_registrations() {
        let chain = Chain::new();
        chain.map(push("early"));

        let pending = chain.process(Vec::new());
        chain.map(push("late"));

        assert_eq!(pending.await.expect("process"), vec!["early"]);
        assert_eq!(
            chain.process(Vec::new()).await.expect("process"),
            vec!["early", "late"]
        );
    }

    #[test]
    fn next_reports_remaining_handlers() {
        let chain = Chain::<u32>::new();
        chain.map(Ok).map(Ok);
        let next = Next {
            handlers: chain.handlers.read().expect("lock").iter().cloned().collect(),
            cursor: 1,
        };
        assert_eq!(next.remaining(), 1);
    }
}

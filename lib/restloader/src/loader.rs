//! Deduplicating, batching request cache.
//!
//! A [`Loader`] memoizes the result of every distinct [`Descriptor`] it is
//! asked for. Descriptors are keyed with [`Descriptor::cache_key`]; a key that
//! is already present (pending or settled) is served from the stored shared
//! future, so the underlying fetch never runs twice for the same key.
//!
//! New keys are queued on the current *batch window*. The window stays open
//! while the caller keeps issuing loads and closes when any future returned by
//! [`Loader::load`] is first polled: that poll drains the window and hands all
//! queued descriptors to the [`BatchFn`] in a single call. Loads issued back to
//! back and awaited together therefore form one batch, whatever the runtime
//! flavor. Every descriptor of the batch is resolved on its own: a failing item
//! only fails its own entry.
//!
//! Entries are never evicted automatically; use [`Loader::invalidate`] or
//! [`Loader::clear`] to force a new fetch.
//!
//! Polling a load requires a running Tokio runtime, each batch item is settled
//! by a spawned task so that dropping one waiter never stalls the others.

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::{Descriptor, Error, Response, Result};

/// Dispatches one batch window.
///
/// Receives the distinct new descriptors of a window and returns one future
/// per descriptor, in the same order.
pub trait BatchFn: Send + Sync + 'static {
    /// Start fetching every descriptor of the batch.
    fn dispatch(&self, batch: Vec<Descriptor>) -> Vec<BoxFuture<'static, Result<Response>>>;
}

impl<F> BatchFn for F
where
    F: Fn(Vec<Descriptor>) -> Vec<BoxFuture<'static, Result<Response>>> + Send + Sync + 'static,
{
    fn dispatch(&self, batch: Vec<Descriptor>) -> Vec<BoxFuture<'static, Result<Response>>> {
        self(batch)
    }
}

type Entry = Shared<BoxFuture<'static, Result<Response>>>;

struct Queued {
    key: String,
    descriptor: Descriptor,
    sender: oneshot::Sender<Result<Response>>,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    window: Vec<Queued>,
}

struct Inner<B> {
    batch_fn: B,
    state: Mutex<State>,
}

impl<B> Inner<B> {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B: BatchFn> Inner<B> {
    /// Close the current window and dispatch it, if anything is queued.
    fn flush(&self) {
        let queued = mem::take(&mut self.state().window);
        if queued.is_empty() {
            return;
        }

        let batch_size = queued.len();
        let (descriptors, waiters): (Vec<_>, Vec<_>) = queued
            .into_iter()
            .map(|item| (item.descriptor, (item.key, item.sender)))
            .unzip();

        debug!(batch_size, "dispatching batch");
        let results = self.batch_fn.dispatch(descriptors);
        if results.len() != batch_size {
            warn!(
                batch_size,
                results = results.len(),
                "batch function returned a mismatched number of results"
            );
        }

        let mut results = results.into_iter();
        for (key, sender) in waiters {
            let Some(fetch) = results.next() else {
                let _ = sender.send(Err(Error::batch(format!("no result dispatched for {key}"))));
                continue;
            };

            tokio::spawn(async move {
                let outcome = fetch.await;
                trace!(%key, ok = outcome.is_ok(), "batch item settled");
                // The entry may have been invalidated and dropped meanwhile
                let _ = sender.send(outcome);
            });
        }
    }
}

/// Deduplicating, batching cache in front of a [`BatchFn`].
///
/// Cloning a `Loader` yields another handle on the same cache.
pub struct Loader<B> {
    inner: Arc<Inner<B>>,
}

impl<B> Clone for Loader<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B> fmt::Debug for Loader<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state();
        f.debug_struct("Loader")
            .field("entries", &state.entries.len())
            .field("queued", &state.window.len())
            .finish_non_exhaustive()
    }
}

impl<B: BatchFn> Loader<B> {
    /// Create a loader dispatching through `batch_fn`.
    #[must_use]
    pub fn new(batch_fn: B) -> Self {
        Self {
            inner: Arc::new(Inner {
                batch_fn,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Load the response for `descriptor`.
    ///
    /// The descriptor is registered when this method is called; the window it
    /// joined is dispatched when the first future of the window is polled.
    ///
    /// # Panics
    ///
    /// The returned future panics if it dispatches a window outside of a
    /// Tokio runtime.
    pub fn load(&self, descriptor: Descriptor) -> BoxFuture<'static, Result<Response>> {
        let key = match descriptor.cache_key() {
            Ok(key) => key,
            Err(err) => return Box::pin(async move { Err(err) }),
        };

        let entry = {
            let mut state = self.inner.state();
            if let Some(entry) = state.entries.get(&key) {
                debug!(%key, "cache hit");
                entry.clone()
            } else {
                debug!(%key, "cache miss");
                let (sender, receiver) = oneshot::channel();
                let pending: BoxFuture<'static, Result<Response>> = Box::pin(async move {
                    receiver.await.unwrap_or_else(|_| Err(Error::Canceled))
                });
                let entry = pending.shared();

                state.entries.insert(key.clone(), entry.clone());
                state.window.push(Queued {
                    key,
                    descriptor,
                    sender,
                });
                entry
            }
        };

        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            inner.flush();
            entry.await
        })
    }
}

impl<B> Loader<B> {
    /// Drop the entry for `descriptor`; the next load fetches again.
    ///
    /// Returns `true` if an entry was removed.
    pub fn invalidate(&self, descriptor: &Descriptor) -> bool {
        descriptor
            .cache_key()
            .is_ok_and(|key| self.invalidate_key(&key))
    }

    /// Drop the entry stored under `key`.
    pub fn invalidate_key(&self, key: &str) -> bool {
        let removed = self.inner.state().entries.remove(key).is_some();
        if removed {
            debug!(key, "cache entry invalidated");
        }
        removed
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut state = self.inner.state();
        debug!(entries = state.entries.len(), "cache cleared");
        state.entries.clear();
    }

    /// Returns `true` if an entry exists for `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.state().entries.contains_key(key)
    }

    /// Number of cached entries, pending ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state().entries.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

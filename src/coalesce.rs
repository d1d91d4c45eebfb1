//! Request coalescing with a short burst window.
//!
//! UI code routinely issues the same logical query from several places in
//! one render cascade (a list view and a detail panel hydrating the same
//! rows). [`RequestCoalescer`] keys every call by its [`QueryKey`] and makes
//! sure that:
//!
//! - while a call for a key is in flight, every other caller for that key
//!   awaits the same result instead of issuing a second request;
//! - for a short window after success (500 ms by default) the value is
//!   handed out again without any request;
//! - failures are never cached: the entry is cleared and the next call
//!   starts from scratch.
//!
//! # Entry lifecycle
//!
//! ```text
//!  (absent) ──coalesce──▶ Pending ──ok──▶ Cached ──window elapses──▶ (stale → replaced)
//!                            │
//!                            └──err/abort──▶ (absent)
//! ```
//!
//! The supplied `perform` future is spawned onto the tokio runtime, so it
//! runs to completion even if every caller awaiting it is dropped. Stale
//! entries are not swept by a timer; they are ignored and replaced on the
//! next lookup, or removed by [`RequestCoalescer::purge_expired`].

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use tokio::time::Instant;

use admin_resilience_core::models::QueryKey;

/// Default burst window.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(500);

/// A failure shared by every caller attached to one in-flight request.
///
/// Cloning is cheap and all clones point at the same underlying error, so
/// callers can confirm they observed the identical failure with
/// [`SharedError::ptr_eq`].
#[derive(Clone)]
pub struct SharedError(Arc<anyhow::Error>);

impl SharedError {
    pub fn new(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    /// Whether two errors came from the same failed request.
    pub fn ptr_eq(a: &SharedError, b: &SharedError) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for SharedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

pub type SharedResult<T> = Result<T, SharedError>;

type PendingFuture<T> = Shared<BoxFuture<'static, SharedResult<T>>>;

enum Entry<T> {
    Pending { id: u64, future: PendingFuture<T> },
    Cached { value: T, recorded_at: Instant },
}

/// Counters for how lookups were served.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CoalescerStats {
    /// Served from a fresh cached value.
    pub hits: u64,
    /// Attached to an in-flight request.
    pub joins: u64,
    /// Started a new request.
    pub misses: u64,
}

struct Inner<T> {
    window: Duration,
    entries: Mutex<HashMap<QueryKey, Entry<T>>>,
    stats: Mutex<CoalescerStats>,
    next_id: AtomicU64,
}

impl<T: Clone> Inner<T> {
    fn entries(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, update: impl FnOnce(&mut CoalescerStats)) {
        update(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }

    fn is_fresh(&self, recorded_at: Instant) -> bool {
        recorded_at.elapsed() < self.window
    }

    /// Move the entry started as `id` out of `Pending`. Entries that were
    /// invalidated or replaced in the meantime are left alone.
    fn settle(&self, key: &QueryKey, id: u64, outcome: Option<&anyhow::Result<T>>) {
        let mut entries = self.entries();
        let owns_entry = matches!(
            entries.get(key),
            Some(Entry::Pending { id: pending, .. }) if *pending == id
        );
        if !owns_entry {
            return;
        }

        match outcome {
            Some(Ok(value)) => {
                entries.insert(
                    key.clone(),
                    Entry::Cached {
                        value: value.clone(),
                        recorded_at: Instant::now(),
                    },
                );
            }
            Some(Err(err)) => {
                tracing::warn!(key = %key, error = %err, "coalesced request failed; not caching");
                entries.remove(key);
            }
            None => {
                tracing::warn!(key = %key, "coalesced request aborted; clearing entry");
                entries.remove(key);
            }
        }
    }
}

/// Clears a pending entry if the request task unwinds before settling.
struct AbortGuard<T: Clone> {
    inner: Arc<Inner<T>>,
    key: QueryKey,
    id: u64,
    armed: bool,
}

impl<T: Clone> AbortGuard<T> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<T: Clone> Drop for AbortGuard<T> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.settle(&self.key, self.id, None);
        }
    }
}

enum Lookup<T> {
    Hit(T),
    Join(PendingFuture<T>),
}

/// Deduplicates concurrent identical requests and absorbs repeat bursts.
///
/// Cloning a coalescer yields another handle to the same registry.
pub struct RequestCoalescer<T = Value> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for RequestCoalescer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for RequestCoalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl<T> RequestCoalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(window: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                window,
                entries: Mutex::new(HashMap::new()),
                stats: Mutex::new(CoalescerStats::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Run `perform` for `key`, unless an identical request is already in
    /// flight or finished within the burst window.
    ///
    /// `perform` is only invoked on a miss. Its future is spawned onto the
    /// current tokio runtime, so this must be called from within one.
    pub async fn coalesce<F, Fut>(&self, key: impl Into<QueryKey>, perform: F) -> SharedResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        match self.lookup_or_start(key.into(), perform) {
            Lookup::Hit(value) => Ok(value),
            Lookup::Join(future) => future.await,
        }
    }

    /// Serve `key` from the registry, or start `perform` as its pending
    /// request. The miss check and the call to `perform` happen under one
    /// lock, so `perform` runs at most once per pending entry. It must not
    /// call back into this coalescer synchronously.
    fn lookup_or_start<F, Fut>(&self, key: QueryKey, perform: F) -> Lookup<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let mut entries = self.inner.entries();
        match entries.get(&key) {
            Some(Entry::Cached { value, recorded_at }) if self.inner.is_fresh(*recorded_at) => {
                tracing::debug!(key = %key, "coalescer hit");
                self.inner.record(|s| s.hits += 1);
                return Lookup::Hit(value.clone());
            }
            Some(Entry::Pending { future, .. }) => {
                tracing::debug!(key = %key, "joining in-flight request");
                self.inner.record(|s| s.joins += 1);
                return Lookup::Join(future.clone());
            }
            _ => {}
        }

        tracing::debug!(key = %key, "starting request");
        self.inner.record(|s| s.misses += 1);
        let work = perform();

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut guard = AbortGuard {
            inner: Arc::clone(&self.inner),
            key: key.clone(),
            id,
            armed: true,
        };
        let handle = tokio::spawn(async move {
            let outcome = work.await;
            guard.inner.settle(&guard.key, guard.id, Some(&outcome));
            guard.disarm();
            outcome.map_err(SharedError::new)
        });

        let task_key = key.clone();
        let future = async move {
            match handle.await {
                Ok(result) => result,
                Err(join_err) => Err(SharedError::new(anyhow::anyhow!(
                    "request for `{}` aborted: {}",
                    task_key,
                    join_err
                ))),
            }
        }
        .boxed()
        .shared();

        entries.insert(
            key,
            Entry::Pending {
                id,
                future: future.clone(),
            },
        );
        Lookup::Join(future)
    }

    /// The cached value for `key` if it is still inside the window.
    pub fn peek(&self, key: &QueryKey) -> Option<T> {
        match self.inner.entries().get(key) {
            Some(Entry::Cached { value, recorded_at }) if self.inner.is_fresh(*recorded_at) => {
                Some(value.clone())
            }
            _ => None,
        }
    }

    /// Whether a request for `key` is currently in flight.
    pub fn is_pending(&self, key: &QueryKey) -> bool {
        matches!(self.inner.entries().get(key), Some(Entry::Pending { .. }))
    }

    /// Forget `key`, cached or pending. Callers already awaiting a pending
    /// request still receive its result, but it is not cached.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        self.inner.entries().remove(key).is_some()
    }

    /// Drop every cached entry whose window has elapsed. Returns how many
    /// were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.inner.entries();
        let before = entries.len();
        entries.retain(|_, entry| match entry {
            Entry::Cached { recorded_at, .. } => self.inner.is_fresh(*recorded_at),
            Entry::Pending { .. } => true,
        });
        before - entries.len()
    }

    /// Number of tracked entries, stale ones included.
    pub fn len(&self) -> usize {
        self.inner.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CoalescerStats {
        *self
            .inner
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

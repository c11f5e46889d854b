mod builder;
mod error;
mod mutations;
mod queries;
mod store;

pub use builder::{BuiltResource, GENERATED_ID_PREFIX, ResourceBuilder};
pub use error::ResourceError;
pub use store::ResourceStore;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Instant;

use reqwest::Client;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::config::ResourceConfig;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability;
use crate::source::ResourceSource;

// ── Fetch state ──────────────────────────────────────────

/// Everything a fetch touches. Lives behind one mutex that is never held
/// across an `.await`, so a full reset can't interleave with an add/remove.
struct FetchState {
    /// Bumped by every fetch and reset. Completions carrying an older
    /// generation are stale.
    generation: u64,
    initiated: bool,
    resolved: bool,
    /// Whether a load ever completed, to tell `Set` from `Reset`.
    has_been_set: bool,
    range: Option<DateRange>,
    /// Waiters for the in-flight generation, in registration order.
    pending: Vec<oneshot::Sender<Vec<Resource>>>,
    store: ResourceStore,
}

impl FetchState {
    fn new() -> Self {
        Self {
            generation: 0,
            initiated: false,
            resolved: false,
            has_been_set: false,
            range: None,
            pending: Vec::new(),
            store: ResourceStore::new(),
        }
    }

    fn begin_fetch(&mut self, range: Option<DateRange>) -> (u64, PendingResources) {
        self.supersede();
        self.initiated = true;
        self.range = range;
        (self.generation, self.enqueue())
    }

    /// Start a new generation. Waiters of an in-flight fetch are dropped;
    /// waiters queued while idle carry over to the next fetch.
    fn supersede(&mut self) {
        if self.initiated && !self.pending.is_empty() {
            debug!(
                "dropping {} waiters of superseded fetch generation {}",
                self.pending.len(),
                self.generation
            );
            self.pending.clear();
        }
        self.generation += 1;
        self.resolved = false;
    }

    fn enqueue(&mut self) -> PendingResources {
        let (tx, rx) = oneshot::channel();
        if self.resolved {
            let _ = tx.send(self.store.top_level());
        } else {
            self.pending.push(tx);
        }
        PendingResources {
            generation: self.generation,
            rx,
        }
    }

    fn reset(&mut self) {
        self.supersede();
        self.initiated = false;
        self.store.clear();
    }
}

/// Top-level resources of a fetch, once it completes.
///
/// Resolves to [`ResourceError::Superseded`] when a newer fetch (or a
/// reset) replaced the one this was waiting on. The fetch itself runs
/// whether or not this future is polled.
#[derive(Debug)]
pub struct PendingResources {
    generation: u64,
    rx: oneshot::Receiver<Vec<Resource>>,
}

impl PendingResources {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Future for PendingResources {
    type Output = Result<Vec<Resource>, ResourceError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let generation = self.generation;
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.map_err(|_| ResourceError::Superseded(generation)))
    }
}

// ── Manager ──────────────────────────────────────────────

struct Inner {
    state: Mutex<FetchState>,
    builder: ResourceBuilder,
    source: ResourceSource,
    config: ResourceConfig,
    client: Client,
    notify: Arc<NotifyHub>,
    loading: AtomicUsize,
}

/// Resource cache for one calendar. Clones are handles onto the same cache.
///
/// Function and remote sources are resolved on a spawned task, so fetching
/// from them needs a tokio runtime.
#[derive(Clone)]
pub struct ResourceManager {
    inner: Arc<Inner>,
}

struct LoadingGuard<'a>(&'a AtomicUsize);

impl<'a> LoadingGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ResourceManager {
    pub fn new(source: ResourceSource, config: ResourceConfig, notify: Arc<NotifyHub>) -> Self {
        Self::with_client(source, config, notify, Client::new())
    }

    pub fn with_client(
        source: ResourceSource,
        config: ResourceConfig,
        notify: Arc<NotifyHub>,
        client: Client,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(FetchState::new()),
                builder: ResourceBuilder::new(),
                source,
                config,
                client,
                notify,
                loading: AtomicUsize::new(0),
            }),
        }
    }

    pub fn notify(&self) -> &Arc<NotifyHub> {
        &self.inner.notify
    }

    pub fn config(&self) -> &ResourceConfig {
        &self.inner.config
    }

    fn state(&self) -> MutexGuard<'_, FetchState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve from the cache when the range matches the last fetch,
    /// otherwise start a new fetch.
    pub fn get_or_fetch(&self, range: Option<DateRange>) -> PendingResources {
        let mut state = self.state();
        if state.initiated && state.range == range {
            return state.enqueue();
        }
        let (generation, pending) = state.begin_fetch(range);
        drop(state);
        self.resolve(generation, range);
        pending
    }

    /// Ready now if resolved, otherwise when the in-flight fetch completes.
    pub fn when_resolved(&self) -> PendingResources {
        self.state().enqueue()
    }

    /// Always start a new fetch generation.
    pub fn fetch(&self, range: Option<DateRange>) -> PendingResources {
        let (generation, pending) = self.state().begin_fetch(range);
        self.resolve(generation, range);
        pending
    }

    fn resolve(&self, generation: u64, range: Option<DateRange>) {
        metrics::counter!(observability::FETCHES_TOTAL).increment(1);
        if let Some(inputs) = self.inner.source.resolve_now() {
            self.complete_fetch(generation, inputs);
            return;
        }

        let manager = self.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let inputs = {
                let _loading = LoadingGuard::new(&manager.inner.loading);
                manager
                    .inner
                    .source
                    .resolve(&manager.inner.client, range, &manager.inner.config)
                    .await
            };
            metrics::histogram!(observability::FETCH_DURATION_SECONDS)
                .record(started.elapsed().as_secs_f64());
            manager.complete_fetch(generation, inputs);
        });
    }

    /// Apply a finished fetch, unless a newer one has started since.
    fn complete_fetch(&self, generation: u64, inputs: Vec<RawResource>) {
        let mut state = self.state();
        if generation != state.generation {
            debug!(
                "discarding stale fetch generation {generation} (current {})",
                state.generation
            );
            metrics::counter!(observability::STALE_FETCHES_TOTAL).increment(1);
            return;
        }

        state.store.set_resources(&self.inner.builder, &inputs);
        state.resolved = true;
        let resources = state.store.top_level();
        for tx in state.pending.drain(..) {
            let _ = tx.send(resources.clone());
        }

        let first_load = !state.has_been_set;
        state.has_been_set = true;
        metrics::gauge!(observability::RESOURCES_INDEXED).set(state.store.len() as f64);
        info!(
            "fetch generation {generation} loaded {} resources ({} top-level)",
            state.store.len(),
            resources.len()
        );

        let event = if first_load {
            ResourceEvent::Set {
                resources: resources.clone(),
            }
        } else {
            ResourceEvent::Reset {
                resources: resources.clone(),
            }
        };
        self.inner.notify.send(&event);
        self.inner
            .notify
            .send(&ResourceEvent::ResourcesSet { resources });
    }

    /// Wait ticket for the current fetch, `None` if nothing was ever fetched.
    fn gate(&self) -> Option<PendingResources> {
        let mut state = self.state();
        if !state.initiated {
            return None;
        }
        Some(state.enqueue())
    }
}

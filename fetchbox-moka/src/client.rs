//! Moka-backed query client.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use fetchbox_core::{
    AbortController, AbortSignal, ActiveQuery, Error, FetchOptions, FetchStatus, InfiniteData,
    ObserverId, Outcome, PagedQuery, Query, QueryCache, QueryContext, QueryData, QueryKey,
    QueryState, QueryStatus, Result,
};
use futures::future::{BoxFuture, FutureExt, Shared, TryFutureExt, join_all};
use moka::future::Cache;
use smol_str::SmolStr;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::builder::MokaQueryClientBuilder;
use crate::entry::CachedQuery;

type SharedFetch = Shared<BoxFuture<'static, Result<QueryData>>>;

/// Last published state per key, shared with the cache's eviction listener.
pub(crate) type StateMap = DashMap<QueryKey, watch::Sender<QueryState>>;

/// Cache-wide fallbacks for [`FetchOptions`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct QueryDefaults {
    pub(crate) stale_time: Duration,
    pub(crate) gc_time: Duration,
}

/// A fetch that callers of the same key join instead of starting their own.
#[derive(Clone)]
struct InFlight {
    id: u64,
    future: SharedFetch,
    controller: AbortController,
}

struct Inner {
    cache: Cache<QueryKey, CachedQuery>,
    defaults: QueryDefaults,
    name: SmolStr,
    in_flight: DashMap<QueryKey, InFlight>,
    observers: DashMap<QueryKey, Vec<(ObserverId, ActiveQuery)>>,
    states: Arc<StateMap>,
    next_fetch: AtomicU64,
    next_observer: AtomicU64,
}

/// How a paged fetch builds on the stored pages.
enum PageFetch {
    /// Fetch the initial page only.
    First,
    /// Fetch from the initial page up to this many pages.
    Refetch(usize),
    /// Fetch page `param` and append it to `current`.
    Append {
        current: Arc<InfiniteData>,
        param: u64,
    },
}

/// In-memory [`QueryCache`] powered by Moka.
///
/// Clones share the same cache, in-flight fetches and observers.
///
/// # Examples
///
/// ```
/// use fetchbox_core::{Method, Outcome, Query, QueryCache, QueryKey, query_fn};
/// use fetchbox_moka::MokaQueryClient;
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let client = MokaQueryClient::new(1_000);
/// let query = Query {
///     key: QueryKey::new("/config/prompt/list", Method::Get, None),
///     query_fn: query_fn(|_| async { Ok(Outcome::Data(json!([1, 2]))) }),
///     options: Default::default(),
/// };
/// assert_eq!(client.fetch_query(query).await, Ok(Outcome::Data(json!([1, 2]))));
/// # }
/// ```
#[derive(Clone)]
pub struct MokaQueryClient {
    inner: Arc<Inner>,
}

impl MokaQueryClient {
    /// Creates a client with default options holding at most `max_capacity` queries.
    pub fn new(max_capacity: u64) -> Self {
        Self::builder(max_capacity).build()
    }

    /// Creates a new builder with the specified maximum capacity.
    pub fn builder(max_capacity: u64) -> MokaQueryClientBuilder {
        MokaQueryClientBuilder::new(max_capacity)
    }

    pub(crate) fn from_parts(
        cache: Cache<QueryKey, CachedQuery>,
        defaults: QueryDefaults,
        name: SmolStr,
        states: Arc<StateMap>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                defaults,
                name,
                in_flight: DashMap::new(),
                observers: DashMap::new(),
                states,
                next_fetch: AtomicU64::new(0),
                next_observer: AtomicU64::new(0),
            }),
        }
    }

    /// Number of stored queries, including entries Moka has not evicted yet.
    pub fn entry_count(&self) -> u64 {
        self.inner.cache.entry_count()
    }

    /// Runs Moka's pending maintenance, evicting expired entries now.
    pub async fn run_pending_tasks(&self) {
        self.inner.cache.run_pending_tasks().await;
    }

    /// Returns `true` while a fetch for `key` is in flight.
    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.inner.in_flight.contains_key(key)
    }

    /// Number of observers mounted for `key`.
    pub fn observer_count(&self, key: &QueryKey) -> usize {
        self.inner.observers.get(key).map_or(0, |observers| observers.len())
    }

    fn stale_time(&self, options: &FetchOptions) -> Duration {
        options.stale_time.unwrap_or(self.inner.defaults.stale_time)
    }

    fn gc_time(&self, options: &FetchOptions) -> Duration {
        options.gc_time.unwrap_or(self.inner.defaults.gc_time)
    }

    /// Joins the in-flight fetch for `key` or starts a new one.
    ///
    /// With `replace`, a running fetch is aborted and superseded.
    fn dispatch<F>(&self, key: &QueryKey, gc_time: Duration, replace: bool, fetch: F) -> SharedFetch
    where
        F: FnOnce(AbortSignal) -> BoxFuture<'static, Result<QueryData>>,
    {
        match self.inner.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) if !replace => {
                trace!(?key, "joining in-flight fetch");
                entry.get().future.clone()
            }
            Entry::Occupied(mut entry) => {
                debug!(?key, "superseding in-flight fetch");
                let flight = self.start(key, gc_time, fetch);
                let future = flight.future.clone();
                entry.insert(flight).controller.abort();
                future
            }
            Entry::Vacant(entry) => {
                debug!(?key, "starting fetch");
                let flight = self.start(key, gc_time, fetch);
                let future = flight.future.clone();
                entry.insert(flight);
                future
            }
        }
    }

    /// Spawns the fetch on its own task so it settles even when every caller
    /// stops waiting.
    fn start<F>(&self, key: &QueryKey, gc_time: Duration, fetch: F) -> InFlight
    where
        F: FnOnce(AbortSignal) -> BoxFuture<'static, Result<QueryData>>,
    {
        let id = self.inner.next_fetch.fetch_add(1, Ordering::Relaxed);
        let controller = AbortController::new();
        let signal = controller.signal();
        let fetch = fetch(signal.clone());
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner
            .publish(key, |state| state.fetch_status = FetchStatus::Fetching);

        let task = {
            let inner = inner.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let result = tokio::select! {
                    result = fetch => match result {
                        Ok(_) if signal.is_aborted() => Err(Error::Cancelled),
                        result => result,
                    },
                    _ = signal.aborted() => Err(Error::Cancelled),
                };
                if let Some(inner) = inner.upgrade() {
                    inner.settle(&key, id, &result, gc_time).await;
                }
                result
            })
        };

        let key = key.clone();
        let future = async move {
            let result = match task.await {
                Ok(result) => result,
                Err(error) => {
                    warn!(?key, %error, "fetch task failed");
                    if let Some(inner) = inner.upgrade() {
                        inner.abandon(&key, id);
                    }
                    Err(Error::Cancelled)
                }
            };
            // Callers of a superseded fetch get the replacement's result.
            let replacement = match &result {
                Err(Error::Cancelled) => inner
                    .upgrade()
                    .and_then(|inner| inner.superseding(&key, id)),
                _ => None,
            };
            match replacement {
                Some(replacement) => {
                    trace!(?key, "following superseding fetch");
                    replacement.await
                }
                None => result,
            }
        }
        .boxed()
        .shared();

        InFlight {
            id,
            future,
            controller,
        }
    }

    fn fetch_single(&self, query: &Query, replace: bool) -> SharedFetch {
        let query_fn = query.query_fn.clone();
        let key = query.key.clone();
        let meta = query.options.meta.clone();
        self.dispatch(&query.key, self.gc_time(&query.options), replace, move |signal| {
            let context = QueryContext {
                key,
                signal,
                meta,
                page_param: None,
            };
            query_fn(context).map_ok(QueryData::Single).boxed()
        })
    }

    async fn fetch_pages(
        &self,
        query: &PagedQuery,
        mode: PageFetch,
        replace: bool,
    ) -> Result<Arc<InfiniteData>> {
        let paged = query.clone();
        let data = self
            .dispatch(&query.key, self.gc_time(&query.options), replace, move |signal| {
                load_pages(paged, signal, mode).boxed()
            })
            .await?;
        Ok(match data {
            QueryData::Pages(pages) => pages,
            QueryData::Single(outcome) => Arc::new(InfiniteData {
                pages: vec![outcome],
                page_params: vec![query.initial_page_param],
            }),
        })
    }

    async fn stored_pages(&self, key: &QueryKey) -> Option<Arc<InfiniteData>> {
        self.inner
            .cache
            .get(key)
            .await
            .and_then(|entry| entry.data.as_pages().cloned())
    }

    /// Refetches one active query, superseding any running fetch.
    async fn refetch(&self, query: ActiveQuery) -> Result<()> {
        match query {
            ActiveQuery::Single(query) => self.fetch_single(&query, true).await.map(drop),
            ActiveQuery::Paged(query) => {
                let count = self
                    .stored_pages(&query.key)
                    .await
                    .map_or(1, |pages| pages.pages.len());
                self.fetch_pages(&query, PageFetch::Refetch(count), true)
                    .await
                    .map(drop)
            }
        }
    }

    /// One registered query per active key matching `filter`.
    fn active_queries(&self, filter: &QueryKey) -> Vec<ActiveQuery> {
        self.inner
            .observers
            .iter()
            .filter(|entry| entry.key().matches(filter))
            .filter_map(|entry| entry.value().first().map(|(_, query)| query.clone()))
            .collect()
    }

    fn cached_keys(&self, filter: &QueryKey) -> Vec<QueryKey> {
        self.inner
            .cache
            .iter()
            .filter(|(key, _)| key.matches(filter))
            .map(|(key, _)| QueryKey::clone(&key))
            .collect()
    }
}

impl Inner {
    fn publish(&self, key: &QueryKey, update: impl FnOnce(&mut QueryState)) {
        if let Some(sender) = self.states.get(key) {
            sender.send_modify(update);
        }
    }

    /// The fetch that replaced fetch `id` for `key`, if any.
    fn superseding(&self, key: &QueryKey, id: u64) -> Option<SharedFetch> {
        self.in_flight
            .get(key)
            .filter(|flight| flight.id > id)
            .map(|flight| flight.future.clone())
    }

    /// Forgets fetch `id` when its task died before settling.
    fn abandon(&self, key: &QueryKey, id: u64) {
        if self
            .in_flight
            .remove_if(key, |_, flight| flight.id == id)
            .is_some()
        {
            self.publish(key, |state| state.fetch_status = FetchStatus::Idle);
        }
    }

    async fn snapshot(&self, key: &QueryKey) -> QueryState {
        let mut state = QueryState::default();
        if let Some(entry) = self.cache.get(key).await {
            state.status = QueryStatus::Success;
            state.data = Some(entry.data);
            state.data_updated_at = Some(entry.updated_at);
            state.is_invalidated = entry.invalidated;
        }
        if self.in_flight.contains_key(key) {
            state.fetch_status = FetchStatus::Fetching;
        }
        state
    }

    /// Stores the result of fetch `id` and publishes the new state.
    async fn settle(&self, key: &QueryKey, id: u64, result: &Result<QueryData>, gc_time: Duration) {
        match result {
            Ok(data) => {
                let entry = CachedQuery::new(data.clone(), gc_time);
                let updated_at = entry.updated_at;
                self.cache.insert(key.clone(), entry).await;
                self.in_flight.remove_if(key, |_, flight| flight.id == id);
                debug!(cache = %self.name, ?key, "stored fetch result");
                self.publish(key, |state| {
                    state.status = QueryStatus::Success;
                    state.fetch_status = FetchStatus::Idle;
                    state.data = Some(data.clone());
                    state.error = None;
                    state.data_updated_at = Some(updated_at);
                    state.is_invalidated = false;
                });
            }
            Err(error) => {
                // A superseded fetch leaves the state to its replacement.
                if self
                    .in_flight
                    .remove_if(key, |_, flight| flight.id == id)
                    .is_none()
                {
                    return;
                }
                debug!(cache = %self.name, ?key, %error, "fetch did not complete");
                self.publish(key, |state| {
                    state.fetch_status = FetchStatus::Idle;
                    if *error != Error::Cancelled {
                        state.status = QueryStatus::Error;
                        state.error = Some(error.clone());
                    }
                });
            }
        }
    }
}

/// Clears the published state of an entry Moka evicted.
///
/// Unwatched states are dropped. Watched ones are reset unless they already
/// show data written after the evicted entry.
pub(crate) fn forget_evicted(states: &StateMap, key: &QueryKey, evicted: &CachedQuery) {
    states.remove_if(key, |_, sender| sender.receiver_count() == 0);
    if let Some(sender) = states.get(key) {
        sender.send_if_modified(|state| {
            if state
                .data_updated_at
                .is_none_or(|updated_at| updated_at > evicted.updated_at)
            {
                return false;
            }
            *state = QueryState {
                fetch_status: state.fetch_status,
                ..QueryState::default()
            };
            true
        });
    }
}

/// Fetches pages one by one until `mode` is satisfied or no next page exists.
async fn load_pages(query: PagedQuery, signal: AbortSignal, mode: PageFetch) -> Result<QueryData> {
    let (mut data, mut param, target) = match mode {
        PageFetch::First => (InfiniteData::default(), Some(query.initial_page_param), 1),
        PageFetch::Refetch(count) => (
            InfiniteData::default(),
            Some(query.initial_page_param),
            count.max(1),
        ),
        PageFetch::Append { current, param } => {
            let target = current.pages.len() + 1;
            (InfiniteData::clone(&current), Some(param), target)
        }
    };

    while data.pages.len() < target {
        let Some(page) = param else {
            break;
        };
        let context = QueryContext {
            key: query.key.clone(),
            signal: signal.clone(),
            meta: query.options.meta.clone(),
            page_param: Some(page),
        };
        let outcome = (query.query_fn)(context).await?;
        trace!(key = ?query.key, page, "fetched page");
        data.pages.push(outcome);
        data.page_params.push(page);
        param = query.next_page(&data);
    }
    Ok(QueryData::from(data))
}

#[async_trait]
impl QueryCache for MokaQueryClient {
    async fn fetch_query(&self, query: Query) -> Result<Outcome> {
        if let Some(entry) = self.inner.cache.get(&query.key).await
            && !entry.is_stale(self.stale_time(&query.options))
            && let QueryData::Single(outcome) = entry.data
        {
            trace!(key = ?query.key, "serving fresh data");
            return Ok(outcome);
        }
        self.fetch_single(&query, false)
            .await
            .map(QueryData::into_outcome)
    }

    async fn prefetch_query(&self, query: Query) {
        let key = query.key.clone();
        if let Err(error) = self.fetch_query(query).await {
            debug!(?key, %error, "prefetch failed");
        }
    }

    async fn ensure_query_data(&self, query: Query) -> Result<Outcome> {
        if let Some(entry) = self.inner.cache.get(&query.key).await
            && let QueryData::Single(outcome) = &entry.data
        {
            if query.options.revalidate_if_stale && entry.is_stale(self.stale_time(&query.options)) {
                debug!(key = ?query.key, "revalidating stale data in background");
                // The fetch runs on its own task.
                let _ = self.fetch_single(&query, false);
            }
            return Ok(outcome.clone());
        }
        self.fetch_single(&query, false)
            .await
            .map(QueryData::into_outcome)
    }

    async fn fetch_infinite_query(&self, query: PagedQuery) -> Result<Arc<InfiniteData>> {
        if let Some(entry) = self.inner.cache.get(&query.key).await
            && let QueryData::Pages(pages) = &entry.data
        {
            if !entry.is_stale(self.stale_time(&query.options)) {
                trace!(key = ?query.key, "serving fresh pages");
                return Ok(pages.clone());
            }
            let count = pages.pages.len();
            return self
                .fetch_pages(&query, PageFetch::Refetch(count), false)
                .await;
        }
        self.fetch_pages(&query, PageFetch::First, false).await
    }

    async fn fetch_next_page(&self, query: PagedQuery) -> Result<Arc<InfiniteData>> {
        let Some(current) = self.stored_pages(&query.key).await else {
            return self.fetch_pages(&query, PageFetch::First, false).await;
        };
        let Some(param) = query.next_page(&current) else {
            trace!(key = ?query.key, "no next page");
            return Ok(current);
        };
        self.fetch_pages(&query, PageFetch::Append { current, param }, false)
            .await
    }

    async fn get_query_data(&self, key: &QueryKey) -> Option<QueryData> {
        self.inner.cache.get(key).await.map(|entry| entry.data)
    }

    async fn set_query_data(&self, key: &QueryKey, data: QueryData) {
        let gc_time = match self.inner.cache.get(key).await {
            Some(entry) => entry.gc_time,
            None => self.inner.defaults.gc_time,
        };
        let entry = CachedQuery::new(data.clone(), gc_time);
        let updated_at = entry.updated_at;
        self.inner.cache.insert(key.clone(), entry).await;
        trace!(?key, "data set manually");
        self.inner.publish(key, |state| {
            state.status = QueryStatus::Success;
            state.data = Some(data);
            state.error = None;
            state.data_updated_at = Some(updated_at);
            state.is_invalidated = false;
        });
    }

    async fn invalidate_queries(&self, filter: &QueryKey) {
        let keys = self.cached_keys(filter);
        debug!(?filter, count = keys.len(), "invalidating queries");
        for key in keys {
            if let Some(mut entry) = self.inner.cache.get(&key).await {
                entry.invalidated = true;
                self.inner.cache.insert(key.clone(), entry).await;
            }
            self.inner.publish(&key, |state| state.is_invalidated = true);
        }
        self.refetch_queries(filter).await;
    }

    async fn refetch_queries(&self, filter: &QueryKey) {
        let active = self.active_queries(filter);
        if active.is_empty() {
            return;
        }
        debug!(?filter, count = active.len(), "refetching active queries");
        let results = join_all(active.into_iter().map(|query| self.refetch(query))).await;
        for error in results.into_iter().filter_map(Result::err) {
            debug!(?filter, %error, "refetch did not complete");
        }
    }

    async fn remove_queries(&self, filter: &QueryKey) {
        self.cancel_queries(filter);
        let keys = self.cached_keys(filter);
        debug!(?filter, count = keys.len(), "removing queries");
        for key in keys {
            self.inner.cache.invalidate(&key).await;
            self.inner
                .publish(&key, |state| *state = QueryState::default());
            self.inner
                .states
                .remove_if(&key, |_, sender| sender.receiver_count() == 0);
        }
    }

    fn cancel_queries(&self, filter: &QueryKey) {
        for entry in self.inner.in_flight.iter() {
            if entry.key().matches(filter) {
                debug!(key = ?entry.key(), "cancelling fetch");
                entry.value().controller.abort();
            }
        }
    }

    fn mount(&self, query: ActiveQuery) -> ObserverId {
        let id = ObserverId(self.inner.next_observer.fetch_add(1, Ordering::Relaxed));
        trace!(key = ?query.key(), ?id, "observer mounted");
        self.inner
            .observers
            .entry(query.key().clone())
            .or_default()
            .push((id, query));
        id
    }

    fn unmount(&self, key: &QueryKey, id: ObserverId) {
        if let Some(mut observers) = self.inner.observers.get_mut(key) {
            observers.retain(|(observer, _)| *observer != id);
        }
        self.inner
            .observers
            .remove_if(key, |_, observers| observers.is_empty());
        trace!(?key, ?id, "observer unmounted");
    }

    async fn subscribe(&self, key: &QueryKey) -> watch::Receiver<QueryState> {
        if let Some(sender) = self.inner.states.get(key)
            && sender.receiver_count() > 0
        {
            return sender.subscribe();
        }
        // Nobody watched the last state, so it may predate an eviction.
        let current = self.inner.snapshot(key).await;
        match self.inner.states.entry(key.clone()) {
            Entry::Occupied(entry) => {
                let sender = entry.get();
                if sender.receiver_count() == 0 {
                    sender.send_replace(current);
                }
                sender.subscribe()
            }
            Entry::Vacant(entry) => entry.insert(watch::channel(current).0).subscribe(),
        }
    }
}

impl fmt::Debug for MokaQueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MokaQueryClient")
            .field("name", &self.inner.name)
            .field("cache", &self.inner.cache)
            .field("defaults", &self.inner.defaults)
            .field("in_flight", &self.inner.in_flight.len())
            .field("observers", &self.inner.observers.len())
            .field("states", &self.inner.states.len())
            .finish()
    }
}

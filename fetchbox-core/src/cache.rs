//! Query cache contract.
//!
//! A [`QueryCache`] stores fetch results keyed by [`QueryKey`] and decides
//! when a fetch closure actually runs. Request builders only hand it a key and
//! a [`QueryFn`]; staleness, in-flight deduplication, invalidation and
//! observer bookkeeping all live behind this trait.
//!
//! ## Query shapes
//!
//! - [`Query`]: a single fetch whose result is one [`Outcome`]
//! - [`PagedQuery`]: a page-numbered fetch whose result is [`InfiniteData`]
//!
//! Both end up in the cache as [`QueryData`].
//!
//! ## Observers
//!
//! A query with at least one mounted observer is *active*. Invalidation
//! refetches active queries; inactive ones are only marked stale and fetched
//! again on next use.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::{Value, json};
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::key::QueryKey;
use crate::outcome::Outcome;
use crate::params::Params;
use crate::signal::AbortSignal;

/// Future returned by a [`QueryFn`].
pub type QueryFuture = BoxFuture<'static, Result<Outcome>>;

/// Fetch closure handed to the cache.
pub type QueryFn = Arc<dyn Fn(QueryContext) -> QueryFuture + Send + Sync>;

/// Computes the page after `last`, given every page fetched so far.
///
/// Returning `None` means there is no next page.
pub type NextPageFn = Arc<dyn Fn(&Outcome, &[Outcome]) -> Option<u64> + Send + Sync>;

/// Wraps an async closure as a [`QueryFn`].
///
/// ```
/// use fetchbox_core::{Outcome, QueryContext, query_fn};
/// use serde_json::json;
///
/// let list = query_fn(|context: QueryContext| async move {
///     Ok(Outcome::Data(json!({ "page": context.page_param })))
/// });
/// # let _ = list;
/// ```
pub fn query_fn<F, Fut>(f: F) -> QueryFn
where
    F: Fn(QueryContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Outcome>> + Send + 'static,
{
    Arc::new(move |context| f(context).boxed())
}

/// Context passed to a [`QueryFn`] on every invocation.
#[derive(Debug, Clone)]
pub struct QueryContext {
    /// Key of the query being fetched.
    pub key: QueryKey,
    /// Signal aborted when the cache cancels this fetch.
    pub signal: AbortSignal,
    /// Metadata from the query options.
    pub meta: Option<Params>,
    /// Page number for paged queries, `None` for single queries.
    pub page_param: Option<u64>,
}

/// Per-fetch cache options.
///
/// Unset fields fall back to the cache's own defaults.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// How long a stored result counts as fresh.
    pub stale_time: Option<Duration>,
    /// How long an unused result stays in the cache.
    pub gc_time: Option<Duration>,
    /// Refetch in the background when `ensure_query_data` returns stale data.
    pub revalidate_if_stale: bool,
    /// Metadata forwarded into [`QueryContext::meta`].
    pub meta: Option<Params>,
}

/// A single-result query.
#[derive(Clone)]
pub struct Query {
    /// Cache key.
    pub key: QueryKey,
    /// Fetch closure.
    pub query_fn: QueryFn,
    /// Cache options.
    pub options: FetchOptions,
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("key", &self.key)
            .field("query_fn", &"...")
            .field("options", &self.options)
            .finish()
    }
}

/// A page-numbered query.
#[derive(Clone)]
pub struct PagedQuery {
    /// Cache key.
    pub key: QueryKey,
    /// Fetch closure, invoked once per page with [`QueryContext::page_param`] set.
    pub query_fn: QueryFn,
    /// Page requested by the first fetch.
    pub initial_page_param: u64,
    /// Decides whether and which page follows.
    pub next_page_param: NextPageFn,
    /// Cache options.
    pub options: FetchOptions,
}

impl PagedQuery {
    /// Page that would follow `data`, if any.
    pub fn next_page(&self, data: &InfiniteData) -> Option<u64> {
        data.pages
            .last()
            .and_then(|last| (self.next_page_param)(last, &data.pages))
    }
}

impl fmt::Debug for PagedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagedQuery")
            .field("key", &self.key)
            .field("initial_page_param", &self.initial_page_param)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Query registered by a mounted observer.
#[derive(Debug, Clone)]
pub enum ActiveQuery {
    /// Single-result query.
    Single(Query),
    /// Page-numbered query.
    Paged(PagedQuery),
}

impl ActiveQuery {
    /// Key of the registered query.
    pub fn key(&self) -> &QueryKey {
        match self {
            ActiveQuery::Single(query) => &query.key,
            ActiveQuery::Paged(query) => &query.key,
        }
    }
}

/// Pages fetched by a [`PagedQuery`], in fetch order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfiniteData {
    /// One outcome per page.
    pub pages: Vec<Outcome>,
    /// Page number each outcome was fetched with.
    pub page_params: Vec<u64>,
}

impl InfiniteData {
    /// JSON view in `{ "pages": [...], "pageParams": [...] }` form.
    pub fn to_value(&self) -> Value {
        let pages: Vec<Value> = self.pages.iter().map(|page| page.body().clone()).collect();
        json!({ "pages": pages, "pageParams": self.page_params })
    }
}

/// Value stored in the cache under a [`QueryKey`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryData {
    /// Result of a single query.
    Single(Outcome),
    /// Pages of a paged query.
    Pages(Arc<InfiniteData>),
}

impl QueryData {
    /// Returns the outcome of a single query.
    pub fn as_single(&self) -> Option<&Outcome> {
        match self {
            QueryData::Single(outcome) => Some(outcome),
            QueryData::Pages(_) => None,
        }
    }

    /// Returns the pages of a paged query.
    pub fn as_pages(&self) -> Option<&Arc<InfiniteData>> {
        match self {
            QueryData::Pages(pages) => Some(pages),
            QueryData::Single(_) => None,
        }
    }

    /// Converts to a single outcome; pages become their JSON view.
    pub fn into_outcome(self) -> Outcome {
        match self {
            QueryData::Single(outcome) => outcome,
            QueryData::Pages(pages) => Outcome::Data(pages.to_value()),
        }
    }
}

impl From<Outcome> for QueryData {
    fn from(outcome: Outcome) -> Self {
        QueryData::Single(outcome)
    }
}

impl From<Value> for QueryData {
    fn from(value: Value) -> Self {
        QueryData::Single(Outcome::Data(value))
    }
}

impl From<InfiniteData> for QueryData {
    fn from(pages: InfiniteData) -> Self {
        QueryData::Pages(Arc::new(pages))
    }
}

/// Whether a query has produced a result yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryStatus {
    /// No result yet.
    #[default]
    Pending,
    /// A result is stored.
    Success,
    /// The last fetch failed with an [`Error`].
    Error,
}

/// Whether a fetch is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStatus {
    /// No fetch in progress.
    #[default]
    Idle,
    /// A fetch is in flight.
    Fetching,
}

/// Snapshot of a cached query, published to subscribers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryState {
    /// Result status.
    pub status: QueryStatus,
    /// Fetch status.
    pub fetch_status: FetchStatus,
    /// Stored data.
    pub data: Option<QueryData>,
    /// Error of the last failed fetch.
    pub error: Option<Error>,
    /// When `data` was last written.
    pub data_updated_at: Option<Instant>,
    /// Whether the data was explicitly invalidated.
    pub is_invalidated: bool,
}

impl QueryState {
    /// Returns `true` while a fetch is in flight.
    #[inline]
    pub fn is_fetching(&self) -> bool {
        self.fetch_status == FetchStatus::Fetching
    }
}

/// Identifies a mounted observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

/// Storage and fetch orchestration for query results.
///
/// Operations that take a `filter` address every stored or active query whose
/// key [matches](QueryKey::matches) the filter.
#[async_trait]
pub trait QueryCache: Send + Sync {
    /// Returns fresh cached data or runs the fetch and stores its result.
    ///
    /// Concurrent callers for one key share a single fetch. When that fetch
    /// is superseded by a refetch, its callers receive the replacement's
    /// result; when it is cancelled, they receive [`Error::Cancelled`].
    async fn fetch_query(&self, query: Query) -> Result<Outcome>;

    /// Like [`fetch_query`](Self::fetch_query), but discards the result and
    /// any error.
    async fn prefetch_query(&self, query: Query);

    /// Returns cached data regardless of staleness, fetching only when
    /// nothing is stored.
    async fn ensure_query_data(&self, query: Query) -> Result<Outcome>;

    /// Returns fresh cached pages or fetches the first page.
    ///
    /// Stale pages are refetched from the initial page onwards, keeping the
    /// same number of pages where the next-page rule allows.
    async fn fetch_infinite_query(&self, query: PagedQuery) -> Result<Arc<InfiniteData>>;

    /// Appends the next page to the stored pages, if there is one.
    async fn fetch_next_page(&self, query: PagedQuery) -> Result<Arc<InfiniteData>>;

    /// Returns stored data without fetching.
    async fn get_query_data(&self, key: &QueryKey) -> Option<QueryData>;

    /// Stores data without fetching.
    async fn set_query_data(&self, key: &QueryKey, data: QueryData);

    /// Marks matching queries stale and refetches the active ones.
    async fn invalidate_queries(&self, filter: &QueryKey);

    /// Refetches matching active queries.
    async fn refetch_queries(&self, filter: &QueryKey);

    /// Drops matching queries from the cache.
    async fn remove_queries(&self, filter: &QueryKey);

    /// Aborts matching in-flight fetches.
    fn cancel_queries(&self, filter: &QueryKey);

    /// Registers an active query.
    fn mount(&self, query: ActiveQuery) -> ObserverId;

    /// Unregisters an observer added by [`mount`](Self::mount).
    fn unmount(&self, key: &QueryKey, id: ObserverId);

    /// Subscribes to state changes of a query.
    async fn subscribe(&self, key: &QueryKey) -> watch::Receiver<QueryState>;
}

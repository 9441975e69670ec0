//! Layered per-call options.
//!
//! Every adapter resolves its options in three layers, highest first:
//!
//! 1. options passed at the call site
//! 2. defaults stored on the [`Descriptor`](crate::Descriptor)
//! 3. defaults of the query cache or the process-wide registry
//!
//! Layers are combined field by field with `merge`: a field set on a higher
//! layer wins, an unset field falls through to the next one.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use fetchbox_core::{
    AbortSignal, Error, FetchOptions, Outcome, Params, QueryCache, QueryKey, Transport,
};
use http::header::{HeaderMap, HeaderName, HeaderValue};

/// Per-call request configuration.
///
/// Passed to [`RequestBuilder::request`](crate::RequestBuilder::request) and
/// [`RequestBuilder::request_with_config`](crate::RequestBuilder::request_with_config).
#[derive(Clone, Default)]
pub struct RequestConfig {
    /// Query-string parameters.
    pub params: Option<Params>,
    /// Body parameters.
    pub data: Option<Params>,
    /// Headers applied on top of the transport's defaults.
    pub headers: HeaderMap,
    /// Cancellation signal forwarded to the transport.
    pub signal: Option<AbortSignal>,
    /// Metadata forwarded to the transport.
    pub meta: Option<Params>,
    /// Transport for this call only.
    pub transport: Option<Arc<dyn Transport>>,
}

impl RequestConfig {
    /// Empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets query-string parameters.
    pub fn params(mut self, params: Params) -> Self {
        self.params = Some(params);
        self
    }

    /// Sets body parameters.
    pub fn data(mut self, data: Params) -> Self {
        self.data = Some(data);
        self
    }

    /// Adds a header, replacing any previous value.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the cancellation signal.
    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Sets metadata.
    pub fn meta(mut self, meta: Params) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Uses `transport` for this call.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Uses an already shared transport for this call.
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }
}

impl fmt::Debug for RequestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestConfig")
            .field("params", &self.params)
            .field("data", &self.data)
            .field("headers", &self.headers)
            .field("signal", &self.signal)
            .field("meta", &self.meta)
            .field("transport", &self.transport.as_ref().map(|_| "..."))
            .finish()
    }
}

/// Options of the query adapters.
#[derive(Clone, Default)]
pub struct QueryOptions {
    /// How long a fetched result counts as fresh.
    pub stale_time: Option<Duration>,
    /// How long an unused result stays cached.
    pub gc_time: Option<Duration>,
    /// Whether an observer fetches on creation. Defaults to `true`.
    pub enabled: Option<bool>,
    /// Refetch in the background when `ensure_query_data` returns stale data.
    pub revalidate_if_stale: Option<bool>,
    /// Metadata forwarded to the fetch closure and the transport.
    pub meta: Option<Params>,
    /// Transport used by the fetch closure.
    pub transport: Option<Arc<dyn Transport>>,
    /// Query cache to use instead of the descriptor's or the process default.
    pub query_client: Option<Arc<dyn QueryCache>>,
}

impl QueryOptions {
    /// Options with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stale time.
    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    /// Sets the garbage-collection time.
    pub fn gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = Some(gc_time);
        self
    }

    /// Enables or disables the initial fetch of observers.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Enables background revalidation in `ensure_query_data`.
    pub fn revalidate_if_stale(mut self, revalidate: bool) -> Self {
        self.revalidate_if_stale = Some(revalidate);
        self
    }

    /// Sets metadata.
    pub fn meta(mut self, meta: Params) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Sets the transport used by the fetch closure.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Sets an already shared transport.
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the query cache.
    pub fn query_client(mut self, query_client: Arc<dyn QueryCache>) -> Self {
        self.query_client = Some(query_client);
        self
    }

    /// Fills every unset field from `base`.
    ///
    /// ```
    /// use std::time::Duration;
    /// use fetchbox::QueryOptions;
    ///
    /// let base = QueryOptions::new()
    ///     .stale_time(Duration::from_secs(30))
    ///     .enabled(false);
    /// let merged = QueryOptions::new().enabled(true).merge(&base);
    ///
    /// assert_eq!(merged.stale_time, Some(Duration::from_secs(30)));
    /// assert_eq!(merged.enabled, Some(true));
    /// ```
    pub fn merge(self, base: &QueryOptions) -> QueryOptions {
        QueryOptions {
            stale_time: self.stale_time.or(base.stale_time),
            gc_time: self.gc_time.or(base.gc_time),
            enabled: self.enabled.or(base.enabled),
            revalidate_if_stale: self.revalidate_if_stale.or(base.revalidate_if_stale),
            meta: self.meta.or_else(|| base.meta.clone()),
            transport: self.transport.or_else(|| base.transport.clone()),
            query_client: self.query_client.or_else(|| base.query_client.clone()),
        }
    }

    /// Returns `false` only when explicitly disabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub(crate) fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            stale_time: self.stale_time,
            gc_time: self.gc_time,
            revalidate_if_stale: self.revalidate_if_stale.unwrap_or(false),
            meta: self.meta.clone(),
        }
    }
}

impl fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("stale_time", &self.stale_time)
            .field("gc_time", &self.gc_time)
            .field("enabled", &self.enabled)
            .field("revalidate_if_stale", &self.revalidate_if_stale)
            .field("meta", &self.meta)
            .field("transport", &self.transport.as_ref().map(|_| "..."))
            .field("query_client", &self.query_client.as_ref().map(|_| "..."))
            .finish()
    }
}

/// Callback receiving the outcome of a mutation and its parameters.
pub type OutcomeCallback = Arc<dyn Fn(&Outcome, Option<&Params>) + Send + Sync>;

/// Callback receiving the error of a mutation and its parameters.
pub type ErrorCallback = Arc<dyn Fn(&Error, Option<&Params>) + Send + Sync>;

/// Callback invoked once a mutation finished either way.
pub type SettledCallback = Arc<dyn Fn(Result<&Outcome, &Error>, Option<&Params>) + Send + Sync>;

/// Options of the mutation adapter.
///
/// The request-related fields flow into the [`RequestConfig`] of every
/// mutation call.
#[derive(Clone, Default)]
pub struct MutationOptions {
    /// Headers applied to each mutation request.
    pub headers: HeaderMap,
    /// Metadata forwarded to the transport.
    pub meta: Option<Params>,
    /// Transport used by the mutation.
    pub transport: Option<Arc<dyn Transport>>,
    /// Query cache used for `invalidates`.
    pub query_client: Option<Arc<dyn QueryCache>>,
    /// Keys invalidated after each mutation returning [`Outcome::Data`].
    pub invalidates: Vec<QueryKey>,
    /// Called with every outcome the transport returned, rejected and failed
    /// ones included.
    pub on_success: Option<OutcomeCallback>,
    /// Called when the mutation could not run, see [`Error`].
    pub on_error: Option<ErrorCallback>,
    /// Called after every mutation.
    pub on_settled: Option<SettledCallback>,
}

impl MutationOptions {
    /// Options with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header, replacing any previous value.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets metadata.
    pub fn meta(mut self, meta: Params) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Sets the transport.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Sets an already shared transport.
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the query cache.
    pub fn query_client(mut self, query_client: Arc<dyn QueryCache>) -> Self {
        self.query_client = Some(query_client);
        self
    }

    /// Adds a key to invalidate after each mutation returning data.
    pub fn invalidates(mut self, key: QueryKey) -> Self {
        self.invalidates.push(key);
        self
    }

    /// Sets the success callback.
    pub fn on_success(
        mut self,
        f: impl Fn(&Outcome, Option<&Params>) + Send + Sync + 'static,
    ) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    /// Sets the error callback.
    pub fn on_error(
        mut self,
        f: impl Fn(&Error, Option<&Params>) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Sets the settled callback.
    pub fn on_settled(
        mut self,
        f: impl Fn(Result<&Outcome, &Error>, Option<&Params>) + Send + Sync + 'static,
    ) -> Self {
        self.on_settled = Some(Arc::new(f));
        self
    }

    /// Fills every unset field from `base`.
    ///
    /// Headers are merged per name with `self` winning; `invalidates` lists
    /// are concatenated.
    pub fn merge(self, base: &MutationOptions) -> MutationOptions {
        let mut headers = base.headers.clone();
        for name in self.headers.keys() {
            headers.remove(name);
        }
        for (name, value) in &self.headers {
            headers.append(name.clone(), value.clone());
        }
        let mut invalidates = base.invalidates.clone();
        invalidates.extend(self.invalidates);

        MutationOptions {
            headers,
            meta: self.meta.or_else(|| base.meta.clone()),
            transport: self.transport.or_else(|| base.transport.clone()),
            query_client: self.query_client.or_else(|| base.query_client.clone()),
            invalidates,
            on_success: self.on_success.or_else(|| base.on_success.clone()),
            on_error: self.on_error.or_else(|| base.on_error.clone()),
            on_settled: self.on_settled.or_else(|| base.on_settled.clone()),
        }
    }
}

impl From<&MutationOptions> for RequestConfig {
    fn from(options: &MutationOptions) -> Self {
        RequestConfig {
            headers: options.headers.clone(),
            meta: options.meta.clone(),
            transport: options.transport.clone(),
            ..RequestConfig::default()
        }
    }
}

impl fmt::Debug for MutationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationOptions")
            .field("headers", &self.headers)
            .field("meta", &self.meta)
            .field("transport", &self.transport.as_ref().map(|_| "..."))
            .field("query_client", &self.query_client.as_ref().map(|_| "..."))
            .field("invalidates", &self.invalidates)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use fetchbox_core::{Method, params};
    use http::header::{AUTHORIZATION, CONTENT_TYPE};

    use super::*;

    #[test]
    fn test_query_options_caller_wins_per_field() {
        let base = QueryOptions::new()
            .stale_time(Duration::from_secs(30))
            .gc_time(Duration::from_secs(60))
            .meta(params! { "from": "builder" });
        let merged = QueryOptions::new()
            .gc_time(Duration::from_secs(1))
            .merge(&base);

        assert_eq!(merged.stale_time, Some(Duration::from_secs(30)));
        assert_eq!(merged.gc_time, Some(Duration::from_secs(1)));
        assert_eq!(merged.meta, Some(params! { "from": "builder" }));
        assert!(merged.is_enabled());
    }

    #[test]
    fn test_mutation_headers_merge_per_name() {
        let base = MutationOptions::new()
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(AUTHORIZATION, HeaderValue::from_static("base"))
            .invalidates(QueryKey::new("/items", Method::Get, None));
        let merged = MutationOptions::new()
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded"),
            )
            .invalidates(QueryKey::new("/users", Method::Get, None))
            .merge(&base);

        assert_eq!(
            merged.headers[CONTENT_TYPE],
            "application/x-www-form-urlencoded"
        );
        assert_eq!(merged.headers[AUTHORIZATION], "base");
        assert_eq!(merged.invalidates.len(), 2);
    }

    #[test]
    fn test_mutation_options_flow_into_request_config() {
        let options = MutationOptions::new()
            .header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
            .meta(params! { "audit": true });
        let config = RequestConfig::from(&options);

        assert_eq!(config.headers[CONTENT_TYPE], "text/plain");
        assert_eq!(config.meta, Some(params! { "audit": true }));
        assert!(config.params.is_none());
        assert!(config.data.is_none());
    }
}

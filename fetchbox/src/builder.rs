//! Request builder: invocation, key derivation and cache adapters.

use std::sync::Arc;

use fetchbox_core::{
    Error, InfiniteData, InvocationConfig, Method, Outcome, PagedQuery, Params, Query, QueryCache,
    QueryContext, QueryData, QueryFn, QueryKey, Result, Transport, query_fn,
};
use tracing::{debug, trace};

use crate::defaults;
use crate::descriptor::Descriptor;
use crate::infinite::{self, InfiniteQuery};
use crate::mutation::Mutation;
use crate::observer::QueryObserver;
use crate::options::{MutationOptions, QueryOptions, RequestConfig};
use crate::path::substitute_path;

/// Binds one [`Descriptor`] to a transport and a query cache.
///
/// Cloning is cheap; clones share the descriptor.
///
/// # Examples
///
/// ```
/// use fetchbox::{Descriptor, InvocationConfig, Outcome, RequestBuilder, RequestConfig, params, transport_fn};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let echo = transport_fn(|call: InvocationConfig| async move {
///     Outcome::Data(json!({ "url": call.url, "params": call.params }))
/// });
/// let detail = RequestBuilder::new(
///     Descriptor::new("/config/prompt/{id}")
///         .url_path_params(["id"])
///         .transport(echo),
/// );
///
/// let outcome = detail
///     .request(Some(params! { "id": 5, "lang": "en" }), RequestConfig::default())
///     .await
///     .unwrap();
/// assert_eq!(
///     outcome,
///     Outcome::Data(json!({ "url": "/config/prompt/5", "params": { "lang": "en" } })),
/// );
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    descriptor: Arc<Descriptor>,
}

impl RequestBuilder {
    /// Creates a builder owning `descriptor`.
    pub fn new(descriptor: Descriptor) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
        }
    }

    /// The endpoint configuration.
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// URL template of the endpoint.
    pub fn url(&self) -> &str {
        &self.descriptor.url
    }

    /// HTTP method of the endpoint.
    pub fn method(&self) -> Method {
        self.descriptor.method
    }

    /// Cache key for `params`.
    ///
    /// `None` yields the two-element key `[url, method]`, which differs from
    /// the key of an empty parameter set and selects every key of this
    /// endpoint when used as a filter.
    pub fn query_key(&self, params: Option<Params>) -> QueryKey {
        QueryKey::new(self.descriptor.url.as_str(), self.descriptor.method, params)
    }

    /// Sends a request, placing `params` by method.
    ///
    /// `GET`, `HEAD` and `OPTIONS` send them as query parameters, every other
    /// method as the body. Any params or data already in `config` are
    /// replaced.
    pub async fn request(&self, params: Option<Params>, config: RequestConfig) -> Result<Outcome> {
        let config = if self.descriptor.method.sends_query() {
            RequestConfig {
                params,
                data: None,
                ..config
            }
        } else {
            RequestConfig {
                params: None,
                data: params,
                ..config
            }
        };
        self.request_with_config(config).await
    }

    /// Sends a request with explicit query parameters and body.
    ///
    /// The transport is taken from `config`, then the descriptor, then the
    /// process default. Path placeholders are filled from `config.params`
    /// first and `config.data` second.
    ///
    /// # Errors
    ///
    /// [`Error::TransportUndefined`] when no transport resolves; nothing is
    /// sent in that case. Network and application failures are returned as
    /// [`Outcome`] values.
    pub async fn request_with_config(&self, config: RequestConfig) -> Result<Outcome> {
        let transport = self.resolve_transport(config.transport.as_ref())?;
        let RequestConfig {
            mut params,
            mut data,
            headers,
            signal,
            meta,
            ..
        } = config;
        let url = substitute_path(
            &self.descriptor.url,
            &self.descriptor.url_path_params,
            &mut params,
            &mut data,
        );
        trace!(%url, method = %self.descriptor.method, "invoking transport");
        Ok(transport
            .call(InvocationConfig {
                url,
                method: self.descriptor.method,
                params,
                data,
                headers,
                signal,
                meta,
            })
            .await)
    }

    fn resolve_transport(
        &self,
        call_site: Option<&Arc<dyn Transport>>,
    ) -> Result<Arc<dyn Transport>> {
        call_site
            .cloned()
            .or_else(|| self.descriptor.transport.clone())
            .or_else(defaults::transport)
            .ok_or(Error::TransportUndefined)
    }

    /// Resolves the query cache: call options, then descriptor, then process default.
    ///
    /// # Errors
    ///
    /// [`Error::QueryClientUndefined`] when none is configured.
    pub fn ensure_query_client(&self, options: &QueryOptions) -> Result<Arc<dyn QueryCache>> {
        options
            .query_client
            .clone()
            .or_else(|| self.descriptor.query_client.clone())
            .or_else(defaults::query_client)
            .ok_or(Error::QueryClientUndefined)
    }

    /// Layers caller options over the descriptor defaults and resolves the
    /// query cache from the result.
    fn prepare(&self, options: QueryOptions) -> Result<(Arc<dyn QueryCache>, QueryOptions)> {
        let options = options.merge(&self.descriptor.query_options);
        let client = self.ensure_query_client(&options)?;
        Ok((client, options))
    }

    /// Fetch closure requesting with the key's params, signal and meta.
    pub(crate) fn query_fn(&self, transport: Option<Arc<dyn Transport>>) -> QueryFn {
        let builder = self.clone();
        query_fn(move |context: QueryContext| {
            let builder = builder.clone();
            let transport = transport.clone();
            async move {
                let config = RequestConfig {
                    signal: Some(context.signal),
                    meta: context.meta,
                    transport,
                    ..RequestConfig::default()
                };
                builder.request(context.key.params().cloned(), config).await
            }
        })
    }

    pub(crate) fn query(&self, params: Option<Params>, options: &QueryOptions) -> Query {
        Query {
            key: self.query_key(params),
            query_fn: self.query_fn(options.transport.clone()),
            options: options.fetch_options(),
        }
    }

    /// Creates an observer of the query for `params`.
    ///
    /// The observer registers the query as active, so invalidation refetches
    /// it, and fetches once unless `enabled` is `false`. Fetch errors end up
    /// in [`QueryObserver::state`].
    ///
    /// # Errors
    ///
    /// [`Error::QueryClientUndefined`] when no query cache resolves.
    pub async fn use_query(
        &self,
        params: Option<Params>,
        options: QueryOptions,
    ) -> Result<QueryObserver> {
        let (client, options) = self.prepare(options)?;
        let query = self.query(params, &options);
        QueryObserver::mount(client, query, options.is_enabled()).await
    }

    /// Fetches into the cache, discarding the result and any error.
    pub async fn prefetch_query(&self, params: Option<Params>, options: QueryOptions) -> Result<()> {
        let (client, options) = self.prepare(options)?;
        client.prefetch_query(self.query(params, &options)).await;
        Ok(())
    }

    /// Returns fresh cached data or fetches it.
    pub async fn fetch_query(&self, params: Option<Params>, options: QueryOptions) -> Result<Outcome> {
        let (client, options) = self.prepare(options)?;
        client.fetch_query(self.query(params, &options)).await
    }

    /// Returns cached data even if stale, fetching only when nothing is cached.
    pub async fn ensure_query_data(
        &self,
        params: Option<Params>,
        options: QueryOptions,
    ) -> Result<Outcome> {
        let (client, options) = self.prepare(options)?;
        client.ensure_query_data(self.query(params, &options)).await
    }

    /// Returns cached data without fetching.
    pub async fn get_query_data(
        &self,
        params: Option<Params>,
        options: QueryOptions,
    ) -> Result<Option<QueryData>> {
        let (client, _) = self.prepare(options)?;
        Ok(client.get_query_data(&self.query_key(params)).await)
    }

    /// Stores data without fetching.
    pub async fn set_query_data(
        &self,
        params: Option<Params>,
        data: impl Into<QueryData>,
        options: QueryOptions,
    ) -> Result<()> {
        let (client, _) = self.prepare(options)?;
        client
            .set_query_data(&self.query_key(params), data.into())
            .await;
        Ok(())
    }

    /// Marks matching queries stale and refetches the active ones.
    ///
    /// With `params` set to `None` every query of this endpoint matches.
    pub async fn invalidate_query(&self, params: Option<Params>, options: QueryOptions) -> Result<()> {
        let (client, _) = self.prepare(options)?;
        let key = self.query_key(params);
        debug!(?key, "invalidating");
        client.invalidate_queries(&key).await;
        Ok(())
    }

    /// Refetches matching active queries.
    pub async fn refetch_queries(&self, params: Option<Params>, options: QueryOptions) -> Result<()> {
        let (client, _) = self.prepare(options)?;
        client.refetch_queries(&self.query_key(params)).await;
        Ok(())
    }

    /// Drops matching queries from the cache.
    pub async fn remove_queries(&self, params: Option<Params>, options: QueryOptions) -> Result<()> {
        let (client, _) = self.prepare(options)?;
        client.remove_queries(&self.query_key(params)).await;
        Ok(())
    }

    /// Aborts matching in-flight fetches.
    pub fn cancel_queries(&self, params: Option<Params>, options: QueryOptions) -> Result<()> {
        let (client, _) = self.prepare(options)?;
        client.cancel_queries(&self.query_key(params));
        Ok(())
    }

    pub(crate) fn paged_query(&self, params: Option<Params>, options: &QueryOptions) -> PagedQuery {
        let page_size = infinite::page_size(params.as_ref());
        let initial_page_param = infinite::initial_page(params.as_ref());
        PagedQuery {
            key: self.query_key(params),
            query_fn: self.page_query_fn(options.transport.clone()),
            initial_page_param,
            next_page_param: infinite::next_page_param(page_size),
            options: options.fetch_options(),
        }
    }

    /// Fetch closure requesting page `context.page_param`.
    fn page_query_fn(&self, transport: Option<Arc<dyn Transport>>) -> QueryFn {
        let builder = self.clone();
        query_fn(move |context: QueryContext| {
            let builder = builder.clone();
            let transport = transport.clone();
            async move {
                let mut params = context.key.params().cloned().unwrap_or_default();
                let page = context
                    .page_param
                    .unwrap_or_else(|| infinite::initial_page(Some(&params)));
                params.remove(infinite::PAGE_NUM);
                params.insert(infinite::PAGE_NUM, page);
                let config = RequestConfig {
                    signal: Some(context.signal),
                    meta: context.meta,
                    transport,
                    ..RequestConfig::default()
                };
                builder.request(Some(params), config).await
            }
        })
    }

    /// Creates a paginated observer and fetches the first page unless disabled.
    ///
    /// Pages are numbered from `params.pageNum` (default 1); each page asks
    /// for `pageSize` items (default 10) and a short page ends pagination.
    pub async fn use_infinite_query(
        &self,
        params: Option<Params>,
        options: QueryOptions,
    ) -> Result<InfiniteQuery> {
        let (client, options) = self.prepare(options)?;
        let query = self.paged_query(params, &options);
        InfiniteQuery::mount(client, query, options.is_enabled()).await
    }

    /// Returns fresh cached pages or fetches the first page.
    pub async fn fetch_infinite_query(
        &self,
        params: Option<Params>,
        options: QueryOptions,
    ) -> Result<Arc<InfiniteData>> {
        let (client, options) = self.prepare(options)?;
        client
            .fetch_infinite_query(self.paged_query(params, &options))
            .await
    }

    /// Creates a mutation sending `request(params, options)`.
    ///
    /// Caller options are layered over the descriptor's mutation defaults.
    pub fn use_mutation(&self, options: MutationOptions) -> Mutation {
        let options = options.merge(&self.descriptor.mutation_options);
        Mutation::new(self.clone(), options)
    }
}

impl From<Descriptor> for RequestBuilder {
    fn from(descriptor: Descriptor) -> Self {
        Self::new(descriptor)
    }
}

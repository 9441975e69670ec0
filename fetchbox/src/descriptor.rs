//! Per-endpoint configuration.

use std::fmt;
use std::sync::Arc;

use fetchbox_core::{Method, QueryCache, Transport};

use crate::options::{MutationOptions, QueryOptions};

/// Immutable configuration of one endpoint.
///
/// `url` may contain `{name}` placeholders; list their names with
/// [`url_path_params`](Self::url_path_params) so requests substitute them.
///
/// ```
/// use fetchbox::{Descriptor, Method};
///
/// let descriptor = Descriptor::new("/config/prompt/{id}")
///     .method(Method::Delete)
///     .url_path_params(["id"]);
/// assert_eq!(descriptor.url(), "/config/prompt/{id}");
/// ```
#[derive(Clone)]
pub struct Descriptor {
    pub(crate) url: String,
    pub(crate) method: Method,
    pub(crate) transport: Option<Arc<dyn Transport>>,
    pub(crate) url_path_params: Vec<String>,
    pub(crate) query_client: Option<Arc<dyn QueryCache>>,
    pub(crate) query_options: QueryOptions,
    pub(crate) mutation_options: MutationOptions,
}

impl Descriptor {
    /// Descriptor for `url` using [`Method::Get`].
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::default(),
            transport: None,
            url_path_params: Vec::new(),
            query_client: None,
            query_options: QueryOptions::default(),
            mutation_options: MutationOptions::default(),
        }
    }

    /// Sets the HTTP method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the transport used when a call does not bring its own.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Sets an already shared transport.
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Names of the `{name}` placeholders in the URL, in substitution order.
    pub fn url_path_params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.url_path_params = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the query cache used when a call does not name one.
    pub fn query_client(mut self, query_client: Arc<dyn QueryCache>) -> Self {
        self.query_client = Some(query_client);
        self
    }

    /// Sets the query option defaults of this endpoint.
    pub fn query_options(mut self, options: QueryOptions) -> Self {
        self.query_options = options;
        self
    }

    /// Sets the mutation option defaults of this endpoint.
    pub fn mutation_options(mut self, options: MutationOptions) -> Self {
        self.mutation_options = options;
        self
    }

    /// URL template.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// HTTP method.
    pub fn http_method(&self) -> Method {
        self.method
    }

    /// Placeholder names.
    pub fn path_params(&self) -> &[String] {
        &self.url_path_params
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("transport", &self.transport.as_ref().map(|_| "..."))
            .field("url_path_params", &self.url_path_params)
            .field("query_client", &self.query_client.as_ref().map(|_| "..."))
            .field("query_options", &self.query_options)
            .field("mutation_options", &self.mutation_options)
            .finish()
    }
}

//! reqwest-backed transport.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fetchbox_core::{ErrorResponse, InvocationConfig, Outcome, Params, Transport};
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::credentials::{CredentialSource, NoCredentials};
use crate::response::classify;

/// Overall timeout applied to every call unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// `Content-Type` of JSON request bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// `Content-Type` of form request bodies.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// HTTP transport with a fixed base URL, default headers and an injected
/// authorization header.
///
/// Header precedence for each call, lowest to highest:
///
/// 1. headers configured on the builder
/// 2. headers of the [`InvocationConfig`]
/// 3. the token of the [`CredentialSource`], which always overwrites the
///    authorization header (or removes it when there is no token)
///
/// Responses are classified into an [`Outcome`]; `call` never fails.
///
/// # Examples
///
/// ```
/// use fetchbox_reqwest::{HttpClient, SharedToken};
///
/// let token = SharedToken::default();
/// let http = HttpClient::builder()
///     .base_url("http://localhost:8080/api/admin")
///     .credentials(token.clone())
///     .build()
///     .unwrap();
///
/// let form = HttpClient::form()
///     .base_url("http://localhost:8080/api/admin")
///     .credentials(token)
///     .build()
///     .unwrap();
/// # let _ = (http, form);
/// ```
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<HttpClientInner>,
}

struct HttpClientInner {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    headers: HeaderMap,
    credentials: Arc<dyn CredentialSource>,
    authorization: HeaderName,
}

impl HttpClient {
    /// Builder for a client sending JSON bodies.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Alias of [`builder`](Self::builder).
    pub fn json() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Builder for a client sending `application/x-www-form-urlencoded` bodies.
    pub fn form() -> HttpClientBuilder {
        HttpClientBuilder::new().header(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE))
    }

    /// Base URL that relative request URLs are appended to.
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Default headers of this client.
    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    /// Resolves a request URL against the base URL.
    ///
    /// Absolute URLs are used unchanged.
    pub fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_owned();
        }
        let base = self.inner.base_url.trim_end_matches('/');
        match url.strip_prefix('/') {
            Some(path) => format!("{base}/{path}"),
            None if url.is_empty() => base.to_owned(),
            None => format!("{base}/{url}"),
        }
    }

    /// Final headers for a call.
    fn headers_for(&self, overrides: HeaderMap) -> HeaderMap {
        let mut headers = merge_headers(self.inner.headers.clone(), overrides);
        let authorization = &self.inner.authorization;
        match self.inner.credentials.token() {
            Some(token) => match HeaderValue::from_str(&token) {
                Ok(value) => {
                    trace!(header = %authorization, "injecting authorization header");
                    headers.insert(authorization.clone(), value);
                }
                Err(_) => {
                    warn!(header = %authorization, "credential token is not a valid header value");
                    headers.remove(authorization);
                }
            },
            None => {
                headers.remove(authorization);
            }
        }
        headers
    }

    async fn send(&self, request: InvocationConfig) -> Outcome {
        let url = self.resolve_url(&request.url);
        let headers = self.headers_for(request.headers);
        let form = is_form(&headers);

        let mut builder = self
            .inner
            .client
            .request(request.method.into(), &url)
            .timeout(self.inner.timeout)
            .headers(headers);
        if let Some(params) = request.params.filter(|params| !params.is_empty()) {
            builder = builder.query(&query_pairs(&params));
        }
        if let Some(data) = request.data {
            builder = if form {
                builder.form(&query_pairs(&data))
            } else {
                builder.json(&data)
            };
        }

        debug!(method = %request.method, %url, "sending request");
        match builder.send().await {
            Ok(response) => classify(response).await,
            Err(error) => {
                debug!(%url, %error, "request failed without a response");
                Outcome::Failed(ErrorResponse::network(error.to_string()))
            }
        }
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn call(&self, mut request: InvocationConfig) -> Outcome {
        match request.signal.take() {
            Some(signal) => {
                if signal.is_aborted() {
                    return Outcome::Failed(ErrorResponse::aborted());
                }
                tokio::select! {
                    outcome = self.send(request) => outcome,
                    _ = signal.aborted() => Outcome::Failed(ErrorResponse::aborted()),
                }
            }
            None => self.send(request).await,
        }
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.inner.base_url)
            .field("timeout", &self.inner.timeout)
            .field("headers", &self.inner.headers)
            .field("authorization", &self.inner.authorization)
            .finish_non_exhaustive()
    }
}

/// Builder for [`HttpClient`].
pub struct HttpClientBuilder {
    base_url: String,
    timeout: Duration,
    headers: HeaderMap,
    credentials: Arc<dyn CredentialSource>,
    authorization: HeaderName,
    client: Option<reqwest::Client>,
}

impl HttpClientBuilder {
    /// Builder with a JSON `Content-Type`, no base URL and no credentials.
    pub fn new() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        Self {
            base_url: String::new(),
            timeout: DEFAULT_TIMEOUT,
            headers,
            credentials: Arc::new(NoCredentials),
            authorization: AUTHORIZATION,
            client: None,
        }
    }

    /// Sets the base URL prepended to relative request URLs.
    pub fn base_url(self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..self
        }
    }

    /// Sets the overall timeout of each call.
    pub fn timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Sets a default header, replacing any previous value.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replaces all default headers.
    pub fn headers(self, headers: HeaderMap) -> Self {
        Self { headers, ..self }
    }

    /// Sets the source of the authorization token.
    pub fn credentials(self, credentials: impl CredentialSource + 'static) -> Self {
        Self {
            credentials: Arc::new(credentials),
            ..self
        }
    }

    /// Sets an already shared source of the authorization token.
    pub fn shared_credentials(self, credentials: Arc<dyn CredentialSource>) -> Self {
        Self {
            credentials,
            ..self
        }
    }

    /// Sets the header the token is written to. Defaults to `Authorization`.
    pub fn authorization_header(self, authorization: HeaderName) -> Self {
        Self {
            authorization,
            ..self
        }
    }

    /// Uses a preconfigured reqwest client instead of building one.
    pub fn client(self, client: reqwest::Client) -> Self {
        Self {
            client: Some(client),
            ..self
        }
    }

    /// Builds the client.
    ///
    /// Fails only if reqwest cannot initialize its TLS backend.
    pub fn build(self) -> Result<HttpClient, reqwest::Error> {
        let client = match self.client {
            Some(client) => client,
            None => reqwest::Client::builder().build()?,
        };
        Ok(HttpClient {
            inner: Arc::new(HttpClientInner {
                client,
                base_url: self.base_url,
                timeout: self.timeout,
                headers: self.headers,
                credentials: self.credentials,
                authorization: self.authorization,
            }),
        })
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies `overrides` on top of `base`, keeping multi-valued overrides intact.
fn merge_headers(mut base: HeaderMap, overrides: HeaderMap) -> HeaderMap {
    let mut current: Option<HeaderName> = None;
    for (name, value) in overrides {
        match name {
            Some(name) => {
                base.insert(name.clone(), value);
                current = Some(name);
            }
            None => {
                if let Some(name) = &current {
                    base.append(name.clone(), value);
                }
            }
        }
    }
    base
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with(FORM_CONTENT_TYPE))
}

/// Flattens parameters into string pairs; `null` values are skipped.
fn query_pairs(params: &Params) -> Vec<(String, String)> {
    params
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

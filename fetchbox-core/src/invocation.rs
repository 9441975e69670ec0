//! Per-call request configuration.

use http::HeaderMap;

use crate::method::Method;
use crate::params::Params;
use crate::signal::AbortSignal;

/// Fully marshaled call handed to a [`Transport`](crate::Transport).
///
/// Built fresh for every invocation: path placeholders are already
/// substituted into `url`, and parameters are split into `params` (query
/// string) and `data` (body) according to the method.
#[derive(Debug, Clone, Default)]
pub struct InvocationConfig {
    /// Request URL, relative to the transport's base URL unless absolute.
    pub url: String,
    /// Request method.
    pub method: Method,
    /// Query string parameters.
    pub params: Option<Params>,
    /// Request body.
    pub data: Option<Params>,
    /// Per-call headers, applied over the transport's defaults.
    pub headers: HeaderMap,
    /// Cancellation signal forwarded from the query cache.
    pub signal: Option<AbortSignal>,
    /// Free-form metadata forwarded from query or mutation options.
    pub meta: Option<Params>,
}

//! The transport seam between request builders and HTTP clients.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;

use crate::invocation::InvocationConfig;
use crate::outcome::Outcome;

/// Performs the network call for an invocation.
///
/// Implementations must not fail: every problem, including network errors and
/// aborts, is reported as [`Outcome::Failed`].
///
/// # Examples
///
/// ```
/// use fetchbox_core::{InvocationConfig, Outcome, Transport, transport_fn};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let echo = transport_fn(|call: InvocationConfig| async move {
///     Outcome::Data(json!({ "url": call.url }))
/// });
///
/// let outcome = echo.call(InvocationConfig { url: "/ping".into(), ..Default::default() }).await;
/// assert_eq!(outcome, Outcome::Data(json!({ "url": "/ping" })));
/// # }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request and classifies the response.
    async fn call(&self, request: InvocationConfig) -> Outcome;
}

/// Transport backed by an async closure. See [`transport_fn`].
#[derive(Clone)]
pub struct TransportFn<F> {
    f: F,
}

/// Wraps an async closure as a [`Transport`].
pub fn transport_fn<F, Fut>(f: F) -> TransportFn<F>
where
    F: Fn(InvocationConfig) -> Fut + Send + Sync,
    Fut: Future<Output = Outcome> + Send,
{
    TransportFn { f }
}

#[async_trait]
impl<F, Fut> Transport for TransportFn<F>
where
    F: Fn(InvocationConfig) -> Fut + Send + Sync,
    Fut: Future<Output = Outcome> + Send,
{
    async fn call(&self, request: InvocationConfig) -> Outcome {
        (self.f)(request).await
    }
}

impl<F> fmt::Debug for TransportFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportFn").finish_non_exhaustive()
    }
}

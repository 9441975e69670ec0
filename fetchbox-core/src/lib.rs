#![warn(missing_docs)]
//! # fetchbox-core
//!
//! Core traits and types for the fetchbox declarative request layer.
//!
//! fetchbox binds URL templates and HTTP methods to a query cache. This crate
//! holds everything the other members agree on:
//!
//! - **Describe** a call ([`Method`], [`Params`], [`InvocationConfig`])
//! - **Identify** a cacheable fetch ([`QueryKey`])
//! - **Perform** the network call ([`Transport`]) and classify it ([`Outcome`])
//! - **Store** results keyed by query ([`QueryCache`])
//! - **Cancel** in-flight work ([`AbortController`], [`AbortSignal`])
//!
//! Transport and application failures are values ([`Outcome::Failed`],
//! [`Outcome::Rejected`]), never errors. [`Error`] is reserved for
//! configuration problems and cancellation.

pub mod cache;
pub mod error;
pub mod invocation;
pub mod key;
pub mod method;
pub mod outcome;
pub mod params;
pub mod signal;
pub mod transport;

pub use cache::{
    ActiveQuery, FetchOptions, FetchStatus, InfiniteData, NextPageFn, ObserverId, PagedQuery,
    Query, QueryCache, QueryContext, QueryData, QueryFn, QueryFuture, QueryState, QueryStatus,
    query_fn,
};
pub use error::{Error, Result};
pub use invocation::InvocationConfig;
pub use key::QueryKey;
pub use method::{Method, ParseMethodError};
pub use outcome::{ErrorResponse, Outcome};
pub use params::Params;
pub use signal::{AbortController, AbortSignal};
pub use transport::{Transport, TransportFn, transport_fn};

#[doc(hidden)]
pub use serde_json;
#[doc(hidden)]
pub use smol_str::SmolStr;

/// Builds [`Params`] from JSON object syntax.
///
/// ```
/// use fetchbox_core::params;
///
/// let params = params! { "id": 5, "name": "x" };
/// assert_eq!(params.len(), 2);
/// ```
///
/// The body is always parsed as the inside of a JSON object, so anything
/// other than `key: value` pairs fails to compile:
///
/// ```compile_fail
/// use fetchbox_core::params;
///
/// let params = params! { [1, 2] };
/// ```
#[macro_export]
macro_rules! params {
    ($($body:tt)*) => {
        $crate::Params::try_from($crate::serde_json::json!({ $($body)* })).unwrap_or_default()
    };
}

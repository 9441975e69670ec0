#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

mod builder;
pub mod defaults;
mod descriptor;
mod infinite;
mod mutation;
mod observer;
mod options;
mod path;

pub use builder::RequestBuilder;
pub use descriptor::Descriptor;
pub use infinite::{DEFAULT_PAGE_SIZE, InfiniteQuery, PAGE_NUM, PAGE_SIZE};
pub use mutation::{Mutation, MutationState, MutationStatus};
pub use observer::QueryObserver;
pub use options::{
    ErrorCallback, MutationOptions, OutcomeCallback, QueryOptions, RequestConfig, SettledCallback,
};

pub use fetchbox_core::{
    AbortController, AbortSignal, Error, ErrorResponse, FetchStatus, InfiniteData,
    InvocationConfig, Method, Outcome, Params, QueryCache, QueryData, QueryKey, QueryState,
    QueryStatus, Result, Transport, params, transport_fn,
};

/// The fetchbox prelude.
pub mod prelude {
    pub use crate::{
        Descriptor, MutationOptions, Outcome, Params, QueryOptions, RequestBuilder, RequestConfig,
        params,
    };
}

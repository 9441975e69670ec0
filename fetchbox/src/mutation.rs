//! Mutation adapter.

use std::fmt;
use std::sync::Arc;

use fetchbox_core::{Error, Outcome, Params, QueryCache, Result};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::builder::RequestBuilder;
use crate::options::{MutationOptions, QueryOptions, RequestConfig};

/// Lifecycle of a [`Mutation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutationStatus {
    /// Never run.
    #[default]
    Idle,
    /// A call is in flight.
    Pending,
    /// The last call returned an outcome.
    Success,
    /// The last call could not run.
    Error,
}

/// Snapshot of a [`Mutation`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationState {
    /// Current status.
    pub status: MutationStatus,
    /// Outcome of the last call.
    pub data: Option<Outcome>,
    /// Error of the last call.
    pub error: Option<Error>,
    /// Parameters of the last call.
    pub variables: Option<Params>,
}

/// A reusable write operation bound to one endpoint.
///
/// Every [`mutate`](Self::mutate) sends `params` through
/// [`RequestBuilder::request`] with the headers, meta and transport of the
/// mutation options.
pub struct Mutation {
    builder: RequestBuilder,
    options: MutationOptions,
    state: watch::Sender<MutationState>,
}

impl Mutation {
    pub(crate) fn new(builder: RequestBuilder, options: MutationOptions) -> Self {
        Self {
            builder,
            options,
            state: watch::Sender::new(MutationState::default()),
        }
    }

    /// Sends the request and runs the callbacks.
    ///
    /// # Errors
    ///
    /// [`Error::TransportUndefined`] when no transport resolves.
    pub async fn mutate(&self, params: Option<Params>) -> Result<Outcome> {
        self.state.send_replace(MutationState {
            status: MutationStatus::Pending,
            variables: params.clone(),
            ..MutationState::default()
        });

        let config = RequestConfig::from(&self.options);
        let result = self.builder.request(params.clone(), config).await;

        match &result {
            Ok(outcome) => {
                if outcome.is_data() {
                    self.invalidate().await;
                }
                if let Some(on_success) = &self.options.on_success {
                    on_success(outcome, params.as_ref());
                }
            }
            Err(error) => {
                debug!(url = self.builder.url(), %error, "mutation failed");
                if let Some(on_error) = &self.options.on_error {
                    on_error(error, params.as_ref());
                }
            }
        }
        if let Some(on_settled) = &self.options.on_settled {
            on_settled(result.as_ref(), params.as_ref());
        }

        self.state.send_replace(match &result {
            Ok(outcome) => MutationState {
                status: MutationStatus::Success,
                data: Some(outcome.clone()),
                error: None,
                variables: params,
            },
            Err(error) => MutationState {
                status: MutationStatus::Error,
                data: None,
                error: Some(error.clone()),
                variables: params,
            },
        });
        result
    }

    async fn invalidate(&self) {
        if self.options.invalidates.is_empty() {
            return;
        }
        let client = match self.query_client() {
            Ok(client) => client,
            Err(error) => {
                warn!(url = self.builder.url(), %error, "cannot invalidate after mutation");
                return;
            }
        };
        for key in &self.options.invalidates {
            client.invalidate_queries(key).await;
        }
    }

    fn query_client(&self) -> Result<Arc<dyn QueryCache>> {
        let mut options = QueryOptions::new();
        options.query_client = self.options.query_client.clone();
        self.builder.ensure_query_client(&options)
    }

    /// Current state snapshot.
    pub fn state(&self) -> MutationState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<MutationState> {
        self.state.subscribe()
    }

    /// Clears the state back to [`MutationStatus::Idle`].
    pub fn reset(&self) {
        self.state.send_replace(MutationState::default());
    }
}

impl fmt::Debug for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutation")
            .field("url", &self.builder.url())
            .field("options", &self.options)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

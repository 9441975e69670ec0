//! Mounted single-query observer.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use fetchbox_core::{
    ActiveQuery, ObserverId, Outcome, Query, QueryCache, QueryKey, QueryState, Result,
};
use tokio::sync::watch;
use tracing::debug;

/// Live view of one cached query.
///
/// While an observer exists its query is active: invalidating a matching key
/// refetches it. Dropping the observer unmounts it; the cached data stays
/// until garbage-collected.
pub struct QueryObserver {
    client: Arc<dyn QueryCache>,
    query: Query,
    id: ObserverId,
    state: watch::Receiver<QueryState>,
}

impl QueryObserver {
    pub(crate) async fn mount(
        client: Arc<dyn QueryCache>,
        query: Query,
        enabled: bool,
    ) -> Result<Self> {
        let id = client.mount(ActiveQuery::Single(query.clone()));
        let state = client.subscribe(&query.key).await;
        let observer = Self {
            client,
            query,
            id,
            state,
        };
        if enabled && let Err(error) = observer.client.fetch_query(observer.query.clone()).await {
            debug!(key = ?observer.query.key, %error, "initial fetch did not complete");
        }
        Ok(observer)
    }

    /// Key of the observed query.
    pub fn key(&self) -> &QueryKey {
        &self.query.key
    }

    /// Current state snapshot.
    pub fn state(&self) -> QueryState {
        self.state.borrow().clone()
    }

    /// Current result, if one is stored.
    pub fn data(&self) -> Option<Outcome> {
        self.state
            .borrow()
            .data
            .as_ref()
            .and_then(|data| data.as_single())
            .cloned()
    }

    /// Fetches again regardless of staleness.
    pub async fn refetch(&self) -> Result<Outcome> {
        let mut query = self.query.clone();
        query.options.stale_time = Some(Duration::ZERO);
        self.client.fetch_query(query).await
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<QueryState> {
        self.state.clone()
    }

    /// Waits for the next state change.
    ///
    /// Returns `None` once the query was dropped from the cache's bookkeeping.
    pub async fn changed(&mut self) -> Option<QueryState> {
        self.state.changed().await.ok()?;
        Some(self.state.borrow_and_update().clone())
    }
}

impl Drop for QueryObserver {
    fn drop(&mut self) {
        self.client.unmount(&self.query.key, self.id);
    }
}

impl fmt::Debug for QueryObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryObserver")
            .field("key", &self.query.key)
            .field("id", &self.id)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

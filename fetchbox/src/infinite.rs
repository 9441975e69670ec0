//! Page-numbered queries.
//!
//! Pages are numbered from 1 unless the parameters carry a `pageNum`. Each
//! page is expected to return `{ "result": [...] }`; a page holding fewer than
//! `pageSize` items is the last one.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use fetchbox_core::{
    ActiveQuery, InfiniteData, NextPageFn, ObserverId, Outcome, PagedQuery, Params, QueryCache,
    QueryKey, QueryState, Result,
};
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

/// Parameter carrying the page number.
pub const PAGE_NUM: &str = "pageNum";

/// Parameter carrying the page size.
pub const PAGE_SIZE: &str = "pageSize";

/// Page size used when the parameters do not set one.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

pub(crate) fn page_size(params: Option<&Params>) -> u64 {
    params
        .and_then(|params| params.get(PAGE_SIZE))
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_PAGE_SIZE)
}

pub(crate) fn initial_page(params: Option<&Params>) -> u64 {
    params
        .and_then(|params| params.get(PAGE_NUM))
        .and_then(Value::as_u64)
        .unwrap_or(1)
}

fn page_items(page: &Outcome) -> Option<&Vec<Value>> {
    page.data()?.get("result")?.as_array()
}

/// Next page is `all.len() + 1` while the last page is full.
pub(crate) fn next_page_param(page_size: u64) -> NextPageFn {
    Arc::new(move |last: &Outcome, all: &[Outcome]| {
        let items = page_items(last)?;
        if (items.len() as u64) < page_size {
            return None;
        }
        Some(all.len() as u64 + 1)
    })
}

fn flatten(data: &InfiniteData) -> Vec<Value> {
    data.pages
        .iter()
        .filter_map(page_items)
        .flatten()
        .cloned()
        .collect()
}

type Memo = Option<(Arc<InfiniteData>, Arc<Vec<Value>>)>;

/// Live view of a paginated query.
///
/// Like [`QueryObserver`](crate::QueryObserver), the query stays active until
/// this value is dropped.
pub struct InfiniteQuery {
    client: Arc<dyn QueryCache>,
    query: PagedQuery,
    id: ObserverId,
    state: watch::Receiver<QueryState>,
    flattened: Mutex<Memo>,
}

impl InfiniteQuery {
    pub(crate) async fn mount(
        client: Arc<dyn QueryCache>,
        query: PagedQuery,
        enabled: bool,
    ) -> Result<Self> {
        let id = client.mount(ActiveQuery::Paged(query.clone()));
        let state = client.subscribe(&query.key).await;
        let infinite = Self {
            client,
            query,
            id,
            state,
            flattened: Mutex::new(None),
        };
        if enabled
            && let Err(error) = infinite
                .client
                .fetch_infinite_query(infinite.query.clone())
                .await
        {
            debug!(key = ?infinite.query.key, %error, "initial page fetch did not complete");
        }
        Ok(infinite)
    }

    /// Key of the observed query.
    pub fn key(&self) -> &QueryKey {
        &self.query.key
    }

    /// Current state snapshot.
    pub fn state(&self) -> QueryState {
        self.state.borrow().clone()
    }

    /// Pages fetched so far.
    pub fn raw_data(&self) -> Option<Arc<InfiniteData>> {
        self.state
            .borrow()
            .data
            .as_ref()
            .and_then(|data| data.as_pages())
            .cloned()
    }

    /// Items of every page's `result` array, in page order.
    ///
    /// The list is rebuilt only when the stored pages change.
    pub fn data(&self) -> Arc<Vec<Value>> {
        let Some(raw) = self.raw_data() else {
            return Arc::default();
        };
        let mut memo = self.flattened.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((source, items)) = memo.as_ref()
            && Arc::ptr_eq(source, &raw)
        {
            return items.clone();
        }
        let items = Arc::new(flatten(&raw));
        *memo = Some((raw, items.clone()));
        items
    }

    /// Whether the last fetched page was full.
    pub fn has_next_page(&self) -> bool {
        self.raw_data()
            .is_some_and(|raw| self.query.next_page(&raw).is_some())
    }

    /// Fetches and appends the next page, if there is one.
    pub async fn fetch_next_page(&self) -> Result<Arc<InfiniteData>> {
        self.client.fetch_next_page(self.query.clone()).await
    }

    /// Refetches every loaded page from the first one.
    pub async fn refetch(&self) -> Result<Arc<InfiniteData>> {
        let mut query = self.query.clone();
        query.options.stale_time = Some(Duration::ZERO);
        self.client.fetch_infinite_query(query).await
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<QueryState> {
        self.state.clone()
    }
}

impl Drop for InfiniteQuery {
    fn drop(&mut self) {
        self.client.unmount(&self.query.key, self.id);
    }
}

impl fmt::Debug for InfiniteQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfiniteQuery")
            .field("query", &self.query)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use fetchbox_core::params;
    use serde_json::json;

    use super::*;

    fn page(len: usize) -> Outcome {
        Outcome::Data(json!({ "result": vec![0; len] }))
    }

    #[test]
    fn test_page_size_and_start_page_come_from_params() {
        let params = params! { "pageSize": 2, "pageNum": 3, "q": "x" };

        assert_eq!(page_size(Some(&params)), 2);
        assert_eq!(initial_page(Some(&params)), 3);
        assert_eq!(page_size(None), DEFAULT_PAGE_SIZE);
        assert_eq!(initial_page(None), 1);
    }

    #[test]
    fn test_full_page_offers_next() {
        let next = next_page_param(2);
        let pages = vec![page(2), page(2)];

        assert_eq!(next(&pages[1], &pages), Some(3));
    }

    #[test]
    fn test_short_page_ends_pagination() {
        let next = next_page_param(2);
        let pages = vec![page(2), page(1)];

        assert_eq!(next(&pages[1], &pages), None);
    }

    #[test]
    fn test_page_without_result_ends_pagination() {
        let next = next_page_param(2);
        let pages = vec![Outcome::Data(json!({ "items": [1, 2] }))];

        assert_eq!(next(&pages[0], &pages), None);
        assert_eq!(next(&Outcome::Rejected(json!({})), &pages), None);
    }

    #[test]
    fn test_flatten_concatenates_in_page_order() {
        let data = InfiniteData {
            pages: vec![
                Outcome::Data(json!({ "result": [1, 2] })),
                Outcome::Data(json!({ "result": [3] })),
            ],
            page_params: vec![1, 2],
        };

        assert_eq!(flatten(&data), vec![json!(1), json!(2), json!(3)]);
    }
}

//! Integration tests for MokaQueryClient.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use fetchbox_core::{
    ActiveQuery, Error, FetchOptions, FetchStatus, Method, Outcome, PagedQuery, Query, QueryCache,
    QueryData, QueryKey, QueryStatus, params, query_fn,
};
use fetchbox_moka::MokaQueryClient;
use serde_json::json;

/// Query whose closure counts its invocations and returns the count.
fn counting_query(key: QueryKey, calls: Arc<AtomicUsize>, delay: Duration) -> Query {
    Query {
        key,
        query_fn: query_fn(move |_| {
            let calls = calls.clone();
            async move {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(delay).await;
                Ok(Outcome::Data(json!({ "call": call })))
            }
        }),
        options: FetchOptions::default(),
    }
}

/// Paged query returning `sizes[page - 1]` items per page; next page while pages are full.
fn paged_query(key: QueryKey, sizes: Vec<usize>, calls: Arc<AtomicUsize>) -> PagedQuery {
    PagedQuery {
        key,
        query_fn: query_fn(move |context| {
            let sizes = sizes.clone();
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let page = context.page_param.unwrap_or(1) as usize;
                let size = sizes.get(page - 1).copied().unwrap_or(0);
                Ok(Outcome::Data(json!({ "result": vec![page; size] })))
            }
        }),
        initial_page_param: 1,
        next_page_param: Arc::new(|last: &Outcome, all: &[Outcome]| {
            let len = last.data()?.get("result")?.as_array()?.len();
            (len >= 2).then(|| all.len() as u64 + 1)
        }),
        options: FetchOptions::default(),
    }
}

fn key(url: &str) -> QueryKey {
    QueryKey::new(url, Method::Get, None)
}

fn fresh(mut query: Query) -> Query {
    query.options.stale_time = Some(Duration::from_secs(60));
    query
}

#[tokio::test]
async fn test_fresh_data_is_served_from_cache() {
    let client = MokaQueryClient::new(100);
    let calls = Arc::new(AtomicUsize::new(0));
    let query = fresh(counting_query(key("/items"), calls.clone(), Duration::ZERO));

    let first = client.fetch_query(query.clone()).await.unwrap();
    let second = client.fetch_query(query).await.unwrap();

    assert_eq!(first, Outcome::Data(json!({ "call": 1 })));
    assert_eq!(second, first);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stale_data_is_refetched() {
    let client = MokaQueryClient::new(100);
    let calls = Arc::new(AtomicUsize::new(0));
    let query = counting_query(key("/items"), calls.clone(), Duration::ZERO);

    client.fetch_query(query.clone()).await.unwrap();
    let second = client.fetch_query(query).await.unwrap();

    assert_eq!(second, Outcome::Data(json!({ "call": 2 })));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_concurrent_fetches_share_one_call() {
    let client = MokaQueryClient::new(100);
    let calls = Arc::new(AtomicUsize::new(0));
    let query = counting_query(key("/items"), calls.clone(), Duration::from_millis(50));

    let (a, b, c) = tokio::join!(
        client.fetch_query(query.clone()),
        client.fetch_query(query.clone()),
        client.fetch_query(query),
    );

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(a, b);
    assert_eq!(b, c);
}

#[tokio::test]
async fn test_failed_outcome_is_stored_as_data() {
    let client = MokaQueryClient::new(100);
    let query = Query {
        key: key("/broken"),
        query_fn: query_fn(|_| async { Ok(Outcome::Rejected(json!({ "success": false }))) }),
        options: FetchOptions::default(),
    };

    let outcome = client.fetch_query(query).await.unwrap();

    assert!(outcome.is_rejected());
    assert_eq!(
        client.get_query_data(&key("/broken")).await,
        Some(QueryData::Single(outcome))
    );
}

#[tokio::test]
async fn test_ensure_returns_stale_data_without_fetching() {
    let client = MokaQueryClient::new(100);
    let calls = Arc::new(AtomicUsize::new(0));
    let query = counting_query(key("/items"), calls.clone(), Duration::ZERO);

    client
        .set_query_data(&key("/items"), QueryData::from(json!("seeded")))
        .await;
    let outcome = client.ensure_query_data(query).await.unwrap();

    assert_eq!(outcome, Outcome::Data(json!("seeded")));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_ensure_fetches_when_empty() {
    let client = MokaQueryClient::new(100);
    let calls = Arc::new(AtomicUsize::new(0));
    let query = counting_query(key("/items"), calls.clone(), Duration::ZERO);

    let outcome = client.ensure_query_data(query).await.unwrap();

    assert_eq!(outcome, Outcome::Data(json!({ "call": 1 })));
}

#[tokio::test]
async fn test_ensure_revalidates_stale_data_in_background() {
    let client = MokaQueryClient::new(100);
    let calls = Arc::new(AtomicUsize::new(0));
    let mut query = counting_query(key("/items"), calls.clone(), Duration::ZERO);
    query.options.revalidate_if_stale = true;

    client
        .set_query_data(&key("/items"), QueryData::from(json!("seeded")))
        .await;
    let outcome = client.ensure_query_data(query).await.unwrap();
    assert_eq!(outcome, Outcome::Data(json!("seeded")));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        client.get_query_data(&key("/items")).await,
        Some(QueryData::from(json!({ "call": 1 })))
    );
}

#[tokio::test]
async fn test_prefetch_swallows_cancellation() {
    let client = MokaQueryClient::new(100);
    let calls = Arc::new(AtomicUsize::new(0));
    let query = counting_query(key("/slow"), calls.clone(), Duration::from_secs(5));

    let canceller = client.clone();
    let cancel = async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel_queries(&key("/slow"));
    };
    tokio::join!(client.prefetch_query(query), cancel);

    assert_eq!(client.get_query_data(&key("/slow")).await, None);
    assert!(!client.is_fetching(&key("/slow")));
}

#[tokio::test]
async fn test_cancelled_fetch_returns_error() {
    let client = MokaQueryClient::new(100);
    let calls = Arc::new(AtomicUsize::new(0));
    let query = counting_query(key("/slow"), calls, Duration::from_secs(5));

    let canceller = client.clone();
    let cancel = async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel_queries(&QueryKey::new("/slow", Method::Get, None));
    };
    let (result, ()) = tokio::join!(client.fetch_query(query), cancel);

    assert_eq!(result, Err(Error::Cancelled));
}

#[tokio::test]
async fn test_fetch_settles_after_caller_gives_up() {
    let client = MokaQueryClient::new(100);
    let calls = Arc::new(AtomicUsize::new(0));
    let query = fresh(counting_query(
        key("/slow"),
        calls.clone(),
        Duration::from_millis(50),
    ));

    let gave_up =
        tokio::time::timeout(Duration::from_millis(10), client.fetch_query(query.clone())).await;
    assert!(gave_up.is_err());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!client.is_fetching(&key("/slow")));
    assert_eq!(
        client.subscribe(&key("/slow")).await.borrow().fetch_status,
        FetchStatus::Idle
    );
    assert_eq!(
        client.get_query_data(&key("/slow")).await,
        Some(QueryData::from(json!({ "call": 1 })))
    );

    let served = client.fetch_query(query).await;
    assert_eq!(served, Ok(Outcome::Data(json!({ "call": 1 }))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancel_reaches_fetch_nobody_awaits() {
    let client = MokaQueryClient::new(100);
    let calls = Arc::new(AtomicUsize::new(0));
    let slow = counting_query(key("/slow"), calls.clone(), Duration::from_secs(5));

    let gave_up = tokio::time::timeout(Duration::from_millis(10), client.fetch_query(slow)).await;
    assert!(gave_up.is_err());
    assert!(client.is_fetching(&key("/slow")));

    client.cancel_queries(&key("/slow"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!client.is_fetching(&key("/slow")));
    assert_eq!(client.get_query_data(&key("/slow")).await, None);

    let quick = counting_query(key("/slow"), calls.clone(), Duration::ZERO);
    assert_eq!(
        client.fetch_query(quick).await,
        Ok(Outcome::Data(json!({ "call": 2 })))
    );
}

#[tokio::test]
async fn test_superseded_fetch_hands_over_replacement_result() {
    let client = MokaQueryClient::new(100);
    let calls = Arc::new(AtomicUsize::new(0));
    let query = counting_query(key("/items"), calls.clone(), Duration::from_millis(50));
    let id = client.mount(ActiveQuery::Single(query.clone()));

    let refetcher = client.clone();
    let refetch = async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        refetcher.refetch_queries(&key("/items")).await;
    };
    let (result, ()) = tokio::join!(client.fetch_query(query), refetch);

    assert_eq!(result, Ok(Outcome::Data(json!({ "call": 2 }))));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    client.unmount(&key("/items"), id);
}

#[tokio::test]
async fn test_invalidate_marks_matching_queries_stale() {
    let client = MokaQueryClient::new(100);
    let calls = Arc::new(AtomicUsize::new(0));
    let page_one = QueryKey::new("/items", Method::Get, Some(params! { "pageNum": 1 }));
    let other = key("/users");

    let query = fresh(counting_query(page_one.clone(), calls.clone(), Duration::ZERO));
    client.fetch_query(query.clone()).await.unwrap();
    client
        .fetch_query(fresh(counting_query(other.clone(), calls.clone(), Duration::ZERO)))
        .await
        .unwrap();

    client.invalidate_queries(&key("/items")).await;

    let mut users = client.subscribe(&other).await;
    assert!(!users.borrow_and_update().is_invalidated);

    let refetched = client.fetch_query(query).await.unwrap();
    assert_eq!(refetched, Outcome::Data(json!({ "call": 3 })));
}

#[tokio::test]
async fn test_invalidate_refetches_active_queries() {
    let client = MokaQueryClient::new(100);
    let calls = Arc::new(AtomicUsize::new(0));
    let query = fresh(counting_query(key("/items"), calls.clone(), Duration::ZERO));

    client.fetch_query(query.clone()).await.unwrap();
    let id = client.mount(ActiveQuery::Single(query));
    client.invalidate_queries(&key("/items")).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        client.get_query_data(&key("/items")).await,
        Some(QueryData::from(json!({ "call": 2 })))
    );

    client.unmount(&key("/items"), id);
    assert_eq!(client.observer_count(&key("/items")), 0);
    client.invalidate_queries(&key("/items")).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_refetch_only_touches_active_queries() {
    let client = MokaQueryClient::new(100);
    let calls = Arc::new(AtomicUsize::new(0));
    let query = fresh(counting_query(key("/items"), calls.clone(), Duration::ZERO));

    client.fetch_query(query).await.unwrap();
    client.refetch_queries(&key("/items")).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_remove_drops_matching_queries() {
    let client = MokaQueryClient::new(100);
    client
        .set_query_data(&key("/items"), QueryData::from(json!(1)))
        .await;
    client
        .set_query_data(&key("/users"), QueryData::from(json!(2)))
        .await;

    client.remove_queries(&key("/items")).await;

    assert_eq!(client.get_query_data(&key("/items")).await, None);
    assert_eq!(
        client.get_query_data(&key("/users")).await,
        Some(QueryData::from(json!(2)))
    );
}

#[tokio::test]
async fn test_subscribe_follows_fetch_lifecycle() {
    let client = MokaQueryClient::new(100);
    let calls = Arc::new(AtomicUsize::new(0));
    let query = counting_query(key("/items"), calls, Duration::from_millis(20));

    let mut state = client.subscribe(&key("/items")).await;
    assert_eq!(state.borrow_and_update().status, QueryStatus::Pending);

    client.fetch_query(query).await.unwrap();

    let snapshot = state.borrow_and_update().clone();
    assert_eq!(snapshot.status, QueryStatus::Success);
    assert_eq!(snapshot.fetch_status, FetchStatus::Idle);
    assert_eq!(snapshot.data, Some(QueryData::from(json!({ "call": 1 }))));
    assert!(snapshot.data_updated_at.is_some());
}

#[tokio::test]
async fn test_gc_time_expires_entries() {
    let client = MokaQueryClient::builder(100)
        .gc_time(Duration::from_millis(50))
        .build();
    client
        .set_query_data(&key("/items"), QueryData::from(json!(1)))
        .await;
    assert!(client.get_query_data(&key("/items")).await.is_some());

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(client.get_query_data(&key("/items")).await, None);
}

#[tokio::test]
async fn test_new_subscriber_does_not_see_expired_data() {
    let client = MokaQueryClient::builder(100)
        .gc_time(Duration::from_millis(50))
        .build();
    {
        let state = client.subscribe(&key("/items")).await;
        client
            .set_query_data(&key("/items"), QueryData::from(json!("old")))
            .await;
        assert_eq!(state.borrow().status, QueryStatus::Success);
    }

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(client.get_query_data(&key("/items")).await, None);

    let state = client.subscribe(&key("/items")).await;
    assert_eq!(state.borrow().status, QueryStatus::Pending);
    assert_eq!(state.borrow().data, None);
}

#[tokio::test]
async fn test_eviction_resets_watched_state() {
    let client = MokaQueryClient::builder(100)
        .gc_time(Duration::from_millis(50))
        .build();
    let mut state = client.subscribe(&key("/items")).await;
    client
        .set_query_data(&key("/items"), QueryData::from(json!("old")))
        .await;
    assert!(state.borrow_and_update().data.is_some());

    tokio::time::sleep(Duration::from_millis(150)).await;
    client.run_pending_tasks().await;

    assert!(state.has_changed().unwrap());
    let snapshot = state.borrow_and_update().clone();
    assert_eq!(snapshot.status, QueryStatus::Pending);
    assert_eq!(snapshot.data, None);
    assert_eq!(snapshot.data_updated_at, None);
}

#[tokio::test]
async fn test_infinite_query_pages() {
    let client = MokaQueryClient::new(100);
    let calls = Arc::new(AtomicUsize::new(0));
    let mut query = paged_query(key("/items"), vec![2, 2, 1], calls.clone());
    query.options.stale_time = Some(Duration::from_secs(60));

    let first = client.fetch_infinite_query(query.clone()).await.unwrap();
    assert_eq!(first.page_params, vec![1]);
    assert_eq!(query.next_page(&first), Some(2));

    let second = client.fetch_next_page(query.clone()).await.unwrap();
    let third = client.fetch_next_page(query.clone()).await.unwrap();
    assert_eq!(third.page_params, vec![1, 2, 3]);
    assert_eq!(second.pages.len(), 2);
    assert_eq!(query.next_page(&third), None);

    let unchanged = client.fetch_next_page(query.clone()).await.unwrap();
    assert_eq!(unchanged.page_params, vec![1, 2, 3]);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let cached = client.fetch_infinite_query(query).await.unwrap();
    assert!(Arc::ptr_eq(&cached, &unchanged));
}

#[tokio::test]
async fn test_stale_infinite_query_refetches_all_pages() {
    let client = MokaQueryClient::new(100);
    let calls = Arc::new(AtomicUsize::new(0));
    let query = paged_query(key("/items"), vec![2, 2, 1], calls.clone());

    client.fetch_infinite_query(query.clone()).await.unwrap();
    client.fetch_next_page(query.clone()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let refetched = client.fetch_infinite_query(query).await.unwrap();
    assert_eq!(refetched.page_params, vec![1, 2]);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

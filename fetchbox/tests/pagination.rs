//! Paginated adapter tests.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::MockTransport;
use fetchbox::{Descriptor, Method, Outcome, QueryOptions, RequestBuilder, params};
use fetchbox_moka::MokaQueryClient;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

/// Serves pages of the given lengths; items are `"p{page}-{n}"`.
fn paged_transport(lengths: &'static [usize]) -> MockTransport {
    MockTransport::responding(move |call| {
        let page = call
            .params
            .as_ref()
            .and_then(|params| params.get("pageNum"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let len = usize::try_from(page)
            .ok()
            .and_then(|page| lengths.get(page.wrapping_sub(1)))
            .copied()
            .unwrap_or(0);
        let items: Vec<Value> = (0..len).map(|n| json!(format!("p{page}-{n}"))).collect();
        Outcome::Data(json!({ "result": items, "total": 5 }))
    })
}

fn requested_pages(transport: &MockTransport) -> Vec<u64> {
    transport
        .calls()
        .iter()
        .filter_map(|call| call.params.as_ref()?.get("pageNum")?.as_u64())
        .collect()
}

fn list_builder(transport: &MockTransport) -> RequestBuilder {
    RequestBuilder::new(
        Descriptor::new("/config/prompt/list")
            .transport(transport.clone())
            .query_client(Arc::new(MokaQueryClient::new(100))),
    )
}

#[tokio::test]
async fn test_pages_until_short_page() {
    let transport = paged_transport(&[2, 2, 1]);
    let builder = list_builder(&transport);

    let list = builder
        .use_infinite_query(Some(params! { "pageSize": 2 }), QueryOptions::default())
        .await
        .unwrap();
    assert!(list.has_next_page());
    list.fetch_next_page().await.unwrap();
    assert!(list.has_next_page());
    list.fetch_next_page().await.unwrap();

    assert!(!list.has_next_page());
    assert_eq!(requested_pages(&transport), vec![1, 2, 3]);
    assert_eq!(list.data().len(), 5);
    assert_eq!(list.data()[4], json!("p3-0"));
    assert_eq!(list.raw_data().unwrap().page_params, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_fetch_next_page_after_last_page_is_a_no_op() {
    let transport = paged_transport(&[2, 1]);
    let builder = list_builder(&transport);

    let list = builder
        .use_infinite_query(Some(params! { "pageSize": 2 }), QueryOptions::default())
        .await
        .unwrap();
    list.fetch_next_page().await.unwrap();
    let data = list.fetch_next_page().await.unwrap();

    assert_eq!(data.pages.len(), 2);
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn test_page_params_keep_other_params() {
    let transport = paged_transport(&[2]);
    let builder = list_builder(&transport);

    let _list = builder
        .use_infinite_query(
            Some(params! { "pageNum": 3, "pageSize": 2, "q": "x" }),
            QueryOptions::default(),
        )
        .await
        .unwrap();

    let call = &transport.calls()[0];
    assert_eq!(call.method, Method::Get);
    assert_eq!(
        call.params,
        Some(params! { "pageSize": 2, "q": "x", "pageNum": 3 })
    );
}

#[tokio::test]
async fn test_data_is_memoized_until_pages_change() {
    let transport = paged_transport(&[2, 2]);
    let builder = list_builder(&transport);

    let list = builder
        .use_infinite_query(Some(params! { "pageSize": 2 }), QueryOptions::default())
        .await
        .unwrap();
    let first = list.data();
    let same = list.data();
    list.fetch_next_page().await.unwrap();
    let grown = list.data();

    assert!(Arc::ptr_eq(&first, &same));
    assert!(!Arc::ptr_eq(&first, &grown));
    assert_eq!(grown.len(), 4);
}

#[tokio::test]
async fn test_disabled_infinite_query_waits() {
    let transport = paged_transport(&[2]);
    let builder = list_builder(&transport);

    let list = builder
        .use_infinite_query(None, QueryOptions::new().enabled(false))
        .await
        .unwrap();

    assert_eq!(transport.call_count(), 0);
    assert!(list.data().is_empty());
    assert!(!list.has_next_page());
}

#[tokio::test]
async fn test_refetch_reloads_loaded_pages() {
    let transport = paged_transport(&[2, 2, 2]);
    let builder = list_builder(&transport);

    let list = builder
        .use_infinite_query(
            Some(params! { "pageSize": 2 }),
            QueryOptions::new().stale_time(Duration::from_secs(60)),
        )
        .await
        .unwrap();
    list.fetch_next_page().await.unwrap();
    let data = list.refetch().await.unwrap();

    assert_eq!(data.page_params, vec![1, 2]);
    assert_eq!(requested_pages(&transport), vec![1, 2, 1, 2]);
}

#[tokio::test]
async fn test_fetch_infinite_query_serves_fresh_pages() {
    let transport = paged_transport(&[2, 2]);
    let builder = list_builder(&transport);
    let options = QueryOptions::new().stale_time(Duration::from_secs(60));

    let first = builder
        .fetch_infinite_query(Some(params! { "pageSize": 2 }), options.clone())
        .await
        .unwrap();
    let cached = builder
        .fetch_infinite_query(Some(params! { "pageSize": 2 }), options)
        .await
        .unwrap();

    assert_eq!(first.pages.len(), 1);
    assert!(Arc::ptr_eq(&first, &cached));
    assert_eq!(transport.call_count(), 1);
}

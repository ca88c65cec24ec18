//! Integration Tests for Query Lifecycle
//!
//! Exercises the public client and observer API end to end with a paused
//! clock: deduplication, freshness, garbage collection, error handling and
//! the enabled switch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use catalog_query::{
    fetch_fn, query_key, FetchFn, Query, QueryClient, QueryError, QueryKey, QueryOptions,
    QueryStatus,
};
use futures::future::join_all;

// == Helper Functions ==

#[derive(Debug, Clone, PartialEq)]
struct Product {
    id: String,
    name: String,
}

/// Fetch that counts calls and resolves after `delay`.
fn counting_fetch(calls: Arc<AtomicUsize>, delay: Duration) -> FetchFn {
    fetch_fn(move |key: QueryKey| {
        let calls = calls.clone();
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            Ok(format!("{}#{}", key, n))
        }
    })
}

fn options(stale_ms: u64, gc_ms: u64) -> QueryOptions {
    QueryOptions::default()
        .stale_time(Duration::from_millis(stale_ms))
        .gc_time(Duration::from_millis(gc_ms))
}

// == Deduplication ==

#[tokio::test(start_paused = true)]
async fn test_concurrent_reads_share_one_fetch() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = counting_fetch(calls.clone(), Duration::from_millis(50));
    let key = query_key!["products", "all"];
    let opts = QueryOptions::default();

    let reads = (0..16).map(|_| client.ensure_fresh(&key, &fetch, &opts));
    let results = join_all(reads).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let first = results[0].as_ref().unwrap().clone().unwrap();
    for result in &results {
        let value = result.as_ref().unwrap().clone().unwrap();
        assert!(Arc::ptr_eq(&first, &value), "all waiters see the same value");
    }
    assert_eq!(client.stats().deduplicated, 15);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_reads_share_one_error() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let fetch = fetch_fn(move |_| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            Err::<String, _>(QueryError::http_status(503, "unavailable"))
        }
    });
    let key = query_key!["products", "all"];
    let opts = QueryOptions::default();

    let results = join_all((0..4).map(|_| client.ensure_fresh(&key, &fetch, &opts))).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for result in results {
        assert_eq!(result.unwrap_err(), QueryError::http_status(503, "unavailable"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_two_mounts_one_network_call() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = counting_fetch(calls.clone(), Duration::from_millis(10));
    let key = query_key!["products", "all"];

    let mut first: Query<String> =
        Query::observe(&client, Some(key.clone()), fetch.clone(), QueryOptions::default());
    let mut second: Query<String> =
        Query::observe(&client, Some(key), fetch, QueryOptions::default());

    let a = first.settled().await.unwrap();
    let b = second.settled().await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(a.data.as_ref().unwrap(), b.data.as_ref().unwrap()));
}

// == Freshness ==

#[tokio::test(start_paused = true)]
async fn test_fresh_within_stale_time_refetch_after() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = counting_fetch(calls.clone(), Duration::ZERO);
    let key = query_key!["product", "42"];
    let opts = options(1_000, 60_000);

    client.ensure_fresh(&key, &fetch, &opts).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_millis(999)).await;
    client.ensure_fresh(&key, &fetch, &opts).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1, "fresh read must not fetch");

    tokio::time::advance(Duration::from_millis(2)).await;
    client.ensure_fresh(&key, &fetch, &opts).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2, "stale read must fetch");
}

#[tokio::test(start_paused = true)]
async fn test_refetch_bypasses_freshness() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = counting_fetch(calls.clone(), Duration::ZERO);
    let key = query_key!["categories"];
    let opts = QueryOptions::default();

    client.ensure_fresh(&key, &fetch, &opts).await.unwrap();
    let value = client.refetch(&key, &fetch, &opts).await.unwrap().unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(*value.downcast::<String>().unwrap(), "[\"categories\"]#1");
}

// == Garbage Collection ==

#[tokio::test(start_paused = true)]
async fn test_unobserved_entry_is_collected_after_gc_time() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = counting_fetch(calls.clone(), Duration::from_millis(1));
    let key = query_key!["products", "category", "shoes"];
    let opts = options(10, 500);

    let mut query: Query<String> = Query::observe(&client, Some(key.clone()), fetch.clone(), opts.clone());
    query.settled().await.unwrap();
    drop(query);

    tokio::time::sleep(Duration::from_millis(499)).await;
    assert!(client.snapshot(&key).is_some(), "entry kept until gc_time elapses");

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert!(client.snapshot(&key).is_none(), "entry evicted after gc_time");

    // A new read starts from a brand-new idle entry.
    let mut query: Query<String> = Query::observe(&client, Some(key), fetch, opts);
    assert!(query.result().is_loading);
    query.settled().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unmount_during_slow_fetch_still_collects() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = counting_fetch(calls.clone(), Duration::from_secs(2));
    let key = query_key!["product", "42"];

    let query: Query<String> = Query::observe(&client, Some(key.clone()), fetch, options(10, 500));
    drop(query);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(client.snapshot(&key).is_none(), "entry evicted once the fetch settled");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_mutation_during_fetch_reaches_mounted_query() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = counting_fetch(calls.clone(), Duration::from_millis(100));
    let key = query_key!["categories"];

    let mut query: Query<String> =
        Query::observe(&client, Some(key.clone()), fetch, QueryOptions::default());
    tokio::time::sleep(Duration::from_millis(10)).await;
    client.invalidate_matching(key.parts());

    tokio::time::sleep(Duration::from_secs(5)).await;
    let result = query.settled().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(result.data.as_deref().map(String::as_str), Some("[\"categories\"]#1"));
    assert!(!client.snapshot(&key).unwrap().invalidated);
}

#[tokio::test(start_paused = true)]
async fn test_clear_under_mounted_query_recreates_on_refetch() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = counting_fetch(calls.clone(), Duration::from_millis(5));
    let key = query_key!["products", "all"];

    let mut query: Query<String> =
        Query::observe(&client, Some(key.clone()), fetch, QueryOptions::default());
    query.settled().await.unwrap();

    assert_eq!(client.clear(), 1);
    let result = query.refetch().await.unwrap();
    assert_eq!(result.data.as_deref().map(String::as_str), Some("[\"products\",\"all\"]#1"));
    let observers = client.inspect(|store| store.get(&key).map(|e| e.subscriber_count()));
    assert_eq!(observers, Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_resubscribe_within_gc_time_keeps_entry() {
    let client = QueryClient::default();
    let fetch = counting_fetch(Arc::new(AtomicUsize::new(0)), Duration::ZERO);
    let key = query_key!["products", "all"];
    let opts = options(60_000, 500);

    let mut query: Query<String> = Query::observe(&client, Some(key.clone()), fetch.clone(), opts.clone());
    query.settled().await.unwrap();
    drop(query);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let again: Query<String> = Query::observe(&client, Some(key.clone()), fetch, opts);
    assert!(again.result().data.is_some(), "cached value served on remount");

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert!(client.snapshot(&key).is_some());
}

// == Errors ==

#[tokio::test(start_paused = true)]
async fn test_error_isolation_between_keys() {
    let client = QueryClient::default();
    let ok = counting_fetch(Arc::new(AtomicUsize::new(0)), Duration::ZERO);
    let failing = fetch_fn(|_| async { Err::<String, _>(QueryError::network("connection reset")) });
    let key_a = query_key!["product", "1"];
    let key_b = query_key!["product", "2"];

    let mut b: Query<String> = Query::observe(&client, Some(key_b.clone()), ok, QueryOptions::default());
    let before = b.settled().await.unwrap();

    let mut a: Query<String> = Query::observe(&client, Some(key_a), failing, QueryOptions::default());
    let a_result = a.settled().await.unwrap();
    assert!(a_result.is_error);

    let after = b.result();
    assert_eq!(after.status, QueryStatus::Success);
    assert!(!after.is_error);
    assert!(Arc::ptr_eq(before.data.as_ref().unwrap(), after.data.as_ref().unwrap()));
}

#[tokio::test(start_paused = true)]
async fn test_stale_while_error() {
    let client = QueryClient::default();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let fetch = fetch_fn(move |_| {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok("V".to_string())
            } else {
                Err(QueryError::http_status(500, "server error"))
            }
        }
    });
    let key = query_key!["products", "all"];

    let mut query: Query<String> = Query::observe(&client, Some(key), fetch, QueryOptions::default());
    let first = query.settled().await.unwrap();
    assert_eq!(first.data.as_deref().map(String::as_str), Some("V"));

    let after = query.refetch().await.unwrap();
    assert!(after.is_error);
    assert_eq!(after.status, QueryStatus::Error);
    assert_eq!(after.data.as_deref().map(String::as_str), Some("V"));
    assert!(matches!(after.error, Some(QueryError::Network { status: Some(500), .. })));
}

// == Scenarios ==

#[tokio::test(start_paused = true)]
async fn test_product_42_loads_after_ten_millis() {
    let client = QueryClient::default();
    let fetch = fetch_fn(|key: QueryKey| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(Product {
            id: key.parts()[1].to_string().trim_matches('"').to_string(),
            name: "Shoe".to_string(),
        })
    });

    let mut query: Query<Product> = Query::observe(
        &client,
        Some(query_key!["product", "42"]),
        fetch,
        QueryOptions::default(),
    );

    tokio::time::sleep(Duration::from_millis(9)).await;
    let loading = query.result();
    assert!(loading.is_loading);
    assert!(loading.data.is_none());

    let done = query.settled().await.unwrap();
    assert!(!done.is_loading);
    assert_eq!(
        done.data.as_deref(),
        Some(&Product {
            id: "42".to_string(),
            name: "Shoe".to_string()
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_disabled_until_id_is_defined() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = counting_fetch(calls.clone(), Duration::from_millis(10));

    let product_id: Option<&str> = None;
    let mut query: Query<String> = Query::observe(
        &client,
        product_id.map(|id| query_key!["product", id]),
        fetch.clone(),
        QueryOptions::default().enabled(product_id.is_some()),
    );
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(query.settled().await.unwrap().status, QueryStatus::Idle);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(client.is_empty());

    let product_id = Some("42");
    let query: Query<String> = Query::observe(
        &client,
        product_id.map(|id| query_key!["product", id]),
        fetch,
        QueryOptions::default().enabled(product_id.is_some()),
    );
    assert_eq!(query.result().status, QueryStatus::Fetching);
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_does_not_cancel_fetch() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = counting_fetch(calls.clone(), Duration::from_millis(20));
    let key = query_key!["products", "all"];

    let query: Query<String> = Query::observe(&client, Some(key.clone()), fetch.clone(), QueryOptions::default());
    drop(query);

    tokio::time::sleep(Duration::from_millis(30)).await;
    let state = client.snapshot(&key).unwrap();
    assert_eq!(state.status, QueryStatus::Success);

    // The completed fetch serves the next mount without a new call.
    let remount: Query<String> = Query::observe(&client, Some(key), fetch, QueryOptions::default());
    assert!(remount.result().data.is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

//! End-to-end scenarios through `QueryCache::intercept_traced`.

use std::sync::Arc;
use std::time::Duration;

use querykv_storage::{
    CacheConfig, CacheStage, Disposition, InMemoryKvStore, KvStore, Operation, QueryCache,
    QueryRequest, ReadPath,
};
use querykv_test_utils::{init_test_tracing, CountingExecutor, FaultyKvStore, MockQueryError};
use serde_json::json;

const EMPTY_ARGS_DIGEST: &str = "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a";

#[tokio::test(start_paused = true)]
async fn find_many_is_populated_then_served_from_cache() {
    init_test_tracing();
    let store = Arc::new(InMemoryKvStore::new());
    let cache = QueryCache::new(store.clone(), CacheConfig::default());
    let executor = CountingExecutor::returning(json!([{"id": 1}]));

    let first = cache
        .intercept_traced(QueryRequest::model("User", "findMany", json!({})), &executor)
        .await
        .unwrap();
    assert_eq!(first.disposition, Disposition::Read(ReadPath::MissPopulated));
    assert_eq!(first.value, json!([{"id": 1}]));

    let key = format!("PrismaKV_User.findMany.{EMPTY_ARGS_DIGEST}");
    assert_eq!(store.get(&key).await.unwrap(), Some(json!([{"id": 1}])));
    assert_eq!(store.ttl(&key).await, Some(Duration::from_secs(3600)));

    let second = cache
        .intercept_traced(QueryRequest::model("User", "findMany", json!({})), &executor)
        .await
        .unwrap();
    assert_eq!(second.disposition, Disposition::Read(ReadPath::Hit));
    assert_eq!(second.value, json!([{"id": 1}]));
    assert_eq!(executor.calls(), 1);

    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses), (1, 1));
}

#[tokio::test]
async fn update_flushes_user_namespace_and_executes_once() {
    init_test_tracing();
    let store = Arc::new(InMemoryKvStore::new());
    let cache = QueryCache::with_defaults(store.clone());
    let reads = CountingExecutor::returning(json!([]));

    for args in [json!({}), json!({"take": 5}), json!({"where": {"id": 1}})] {
        cache
            .intercept(QueryRequest::model("User", "findMany", args), &reads)
            .await
            .unwrap();
    }
    cache
        .intercept(QueryRequest::model("Post", "findFirst", json!({})), &reads)
        .await
        .unwrap();
    assert_eq!(store.len().await, 4);

    let update = CountingExecutor::returning(json!({"id": 1, "name": "renamed"}));
    let result = cache
        .intercept_traced(
            QueryRequest::model("User", "update", json!({"where": {"id": 1}})),
            &update,
        )
        .await
        .unwrap();

    assert_eq!(
        result.disposition,
        Disposition::Write {
            invalidated: Some(3)
        }
    );
    assert_eq!(result.value, json!({"id": 1, "name": "renamed"}));
    assert_eq!(update.calls(), 1);
    assert_eq!(update.seen_args(), vec![json!({"where": {"id": 1}})]);

    let post_key = cache.key_for(Some("Post"), &Operation::FindFirst, &json!({}));
    assert!(store.get(post_key.as_str()).await.unwrap().is_some());
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn disconnect_is_passthrough_with_no_store_calls() {
    let store = Arc::new(FaultyKvStore::new());
    let cache = QueryCache::with_defaults(store.clone());
    let executor = CountingExecutor::returning(json!(null));

    let result = cache
        .intercept_traced(QueryRequest::raw("disconnect", json!({})), &executor)
        .await
        .unwrap();

    assert_eq!(result.disposition, Disposition::Passthrough);
    assert_eq!(executor.calls(), 1);
    assert_eq!(store.calls().total(), 0);
}

#[tokio::test]
async fn read_survives_store_outage() {
    init_test_tracing();
    let store = Arc::new(FaultyKvStore::new());
    store.go_offline();
    let cache = QueryCache::with_defaults(store.clone());
    let executor = CountingExecutor::returning(json!([{"id": 9}]));

    for _ in 0..2 {
        let result = cache
            .intercept_traced(QueryRequest::model("User", "findUnique", json!({"where": {"id": 9}})), &executor)
            .await
            .expect("store outage must not fail the read");
        assert_eq!(result.value, json!([{"id": 9}]));
        assert_eq!(
            result.disposition,
            Disposition::Read(ReadPath::Bypassed {
                stage: CacheStage::Lookup
            })
        );
    }

    assert_eq!(executor.calls(), 2);
    assert_eq!(store.calls().sets, 0);
    assert_eq!(cache.stats().bypassed, 2);
}

#[tokio::test]
async fn failed_population_returns_result_without_reexecuting() {
    let store = Arc::new(FaultyKvStore::new());
    store.fail_set(true);
    let cache = QueryCache::with_defaults(store.clone());
    let executor = CountingExecutor::returning(json!({"count": 3}));

    let result = cache
        .intercept_traced(QueryRequest::model("User", "findFirst", json!({})), &executor)
        .await
        .unwrap();

    assert_eq!(
        result.disposition,
        Disposition::Read(ReadPath::Bypassed {
            stage: CacheStage::Populate
        })
    );
    assert_eq!(result.value, json!({"count": 3}));
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn write_proceeds_when_invalidation_fails() {
    init_test_tracing();
    let store = Arc::new(FaultyKvStore::new());
    let cache = QueryCache::with_defaults(store.clone());
    let reads = CountingExecutor::returning(json!([1]));
    cache
        .intercept(QueryRequest::model("User", "findMany", json!({})), &reads)
        .await
        .unwrap();

    store.fail_scan(true);
    let write = CountingExecutor::returning(json!({"count": 1}));
    let result = cache
        .intercept_traced(QueryRequest::model("User", "deleteMany", json!({})), &write)
        .await
        .unwrap();

    assert_eq!(result.disposition, Disposition::Write { invalidated: None });
    assert_eq!(result.value, json!({"count": 1}));
    assert_eq!(write.calls(), 1);
    assert_eq!(store.inner().len().await, 1, "stale entry is the accepted degraded mode");
    assert_eq!(cache.stats().invalidation_failures, 1);
}

#[tokio::test]
async fn write_proceeds_when_deletes_fail() {
    let store = Arc::new(FaultyKvStore::new());
    let cache = QueryCache::with_defaults(store.clone());
    let reads = CountingExecutor::returning(json!([1]));
    cache
        .intercept(QueryRequest::model("User", "findMany", json!({})), &reads)
        .await
        .unwrap();

    store.fail_delete(true);
    let write = CountingExecutor::returning(json!({"id": 2}));
    let result = cache
        .intercept_traced(QueryRequest::model("User", "create", json!({})), &write)
        .await
        .unwrap();

    assert_eq!(result.disposition, Disposition::Write { invalidated: None });
    assert_eq!(write.calls(), 1);
}

#[tokio::test]
async fn one_failed_delete_still_flushes_rest_of_namespace() {
    let store = Arc::new(FaultyKvStore::new());
    let cache = QueryCache::with_defaults(store.clone());
    let reads = CountingExecutor::returning(json!([]));
    for skip in 0..100 {
        cache
            .intercept(QueryRequest::model("User", "findMany", json!({ "skip": skip })), &reads)
            .await
            .unwrap();
    }

    store.fail_next_deletes(1);
    let update = CountingExecutor::returning(json!({"id": 1}));
    let result = cache
        .intercept_traced(QueryRequest::model("User", "update", json!({})), &update)
        .await
        .unwrap();

    assert_eq!(result.disposition, Disposition::Write { invalidated: None });
    assert_eq!(update.calls(), 1);
    assert_eq!(store.calls().deletes, 100);
    assert_eq!(store.inner().len().await, 1);
}

#[tokio::test]
async fn executor_errors_propagate_unchanged() {
    let store = Arc::new(InMemoryKvStore::new());
    let cache = QueryCache::with_defaults(store.clone());

    for operation in ["findMany", "update", "count"] {
        let executor = CountingExecutor::failing("connection to database lost");
        let err = cache
            .intercept(QueryRequest::model("User", operation, json!({})), &executor)
            .await
            .unwrap_err();
        assert_eq!(err, MockQueryError("connection to database lost".to_string()));
        assert_eq!(executor.calls(), 1, "{operation}");
    }

    assert!(store.is_empty().await, "failed reads must not be cached");
}

#[tokio::test]
async fn raw_query_and_raw_execute_share_no_model_namespace() {
    let store = Arc::new(InMemoryKvStore::new());
    let cache = QueryCache::with_defaults(store.clone());
    let raw = CountingExecutor::returning(json!([{"one": 1}]));

    cache
        .intercept(QueryRequest::raw("$queryRaw", json!(["SELECT 1"])), &raw)
        .await
        .unwrap();
    cache
        .intercept(QueryRequest::model("User", "findMany", json!({})), &raw)
        .await
        .unwrap();
    assert_eq!(store.len().await, 2);

    let exec = CountingExecutor::returning(json!(1));
    let result = cache
        .intercept_traced(QueryRequest::raw("$executeRaw", json!(["UPDATE t SET x = 1"])), &exec)
        .await
        .unwrap();

    assert_eq!(
        result.disposition,
        Disposition::Write {
            invalidated: Some(1)
        }
    );
    assert_eq!(store.len().await, 1, "named-model entries are untouched");
}

#[tokio::test(start_paused = true)]
async fn expired_entry_is_refetched() {
    let store = Arc::new(InMemoryKvStore::new());
    let cache = QueryCache::new(
        store.clone(),
        CacheConfig::new().with_ttl(Duration::from_secs(5)),
    );
    let executor = CountingExecutor::returning(json!([]));
    let request = || QueryRequest::model("User", "findMany", json!({}));

    cache.intercept(request(), &executor).await.unwrap();
    tokio::time::advance(Duration::from_secs(6)).await;

    let result = cache.intercept_traced(request(), &executor).await.unwrap();
    assert_eq!(result.disposition, Disposition::Read(ReadPath::MissPopulated));
    assert_eq!(executor.calls(), 2);
}

#[tokio::test]
async fn concurrent_reads_each_resolve() {
    let store = Arc::new(InMemoryKvStore::new());
    let cache = QueryCache::with_defaults(store);
    let executor = Arc::new(CountingExecutor::returning(json!([{"id": 1}])));

    let mut handles = Vec::new();
    for i in 0..8 {
        let cache = cache.clone();
        let executor = Arc::clone(&executor);
        handles.push(tokio::spawn(async move {
            cache
                .intercept(
                    QueryRequest::model("User", "findMany", json!({"skip": i % 2})),
                    &*executor,
                )
                .await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), json!([{"id": 1}]));
    }
    assert!(executor.calls() >= 2 && executor.calls() <= 8);
}

#[tokio::test]
async fn huge_ttl_read_degrades_instead_of_panicking() {
    let store = Arc::new(InMemoryKvStore::new());
    let config = CacheConfig::from_ttl_setting(Some("18446744073709551615")).unwrap();
    let cache = QueryCache::new(store.clone(), config);
    let executor = CountingExecutor::returning(json!([{"id": 1}]));

    let result = cache
        .intercept_traced(QueryRequest::model("User", "findMany", json!({})), &executor)
        .await
        .unwrap();

    assert_eq!(result.value, json!([{"id": 1}]));
    assert_eq!(
        result.disposition,
        Disposition::Read(ReadPath::Bypassed {
            stage: CacheStage::Populate
        })
    );
    assert_eq!(executor.calls(), 1);
    assert!(store.is_empty().await);
}

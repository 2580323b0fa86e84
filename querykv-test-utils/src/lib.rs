//! QueryKV Test Utilities
//!
//! Centralized test infrastructure for the QueryKV workspace:
//! - Counting / failing executors standing in for the data-access layer
//! - A fault-injecting store that counts every call it receives
//! - Proptest generators for argument payloads and operations
//! - Tracing setup for test output

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, Once};

use async_trait::async_trait;
use serde_json::Value;

// Re-export the types most tests need
pub use querykv_core::{
    CacheConfig, CacheKey, KeyDeriver, Operation, OperationKind, QueryRequest, StoreError,
    StoreResult,
};
pub use querykv_storage::{
    Disposition, InMemoryKvStore, KvStore, QueryCache, QueryExecutor, ReadPath, ScanPage,
};

/// Install a fmt subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// MOCK EXECUTORS
// ============================================================================

/// Error returned by [`CountingExecutor`] when configured to fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("query failed: {0}")]
pub struct MockQueryError(pub String);

/// Executor that counts calls, records their arguments and returns a
/// fixed response (or a fixed error).
#[derive(Debug)]
pub struct CountingExecutor {
    response: Result<Value, MockQueryError>,
    calls: AtomicUsize,
    seen_args: Mutex<Vec<Value>>,
}

impl CountingExecutor {
    pub fn returning(response: Value) -> Self {
        Self {
            response: Ok(response),
            calls: AtomicUsize::new(0),
            seen_args: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            response: Err(MockQueryError(message.into())),
            calls: AtomicUsize::new(0),
            seen_args: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Arguments of every call so far, in call order.
    pub fn seen_args(&self) -> Vec<Value> {
        self.seen_args
            .lock()
            .map(|args| args.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl QueryExecutor for CountingExecutor {
    type Error = MockQueryError;

    async fn execute(&self, args: Value) -> Result<Value, MockQueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen_args.lock() {
            seen.push(args);
        }
        self.response.clone()
    }
}

// ============================================================================
// FAULT-INJECTING STORE
// ============================================================================

/// Per-operation call counts observed by [`FaultyKvStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub gets: usize,
    pub sets: usize,
    pub deletes: usize,
    pub scans: usize,
}

impl StoreCalls {
    pub fn total(&self) -> usize {
        self.gets + self.sets + self.deletes + self.scans
    }
}

/// In-memory store whose individual operations can be switched to fail.
///
/// Every call is counted whether or not it fails.
#[derive(Debug, Default)]
pub struct FaultyKvStore {
    inner: InMemoryKvStore,
    fail_get: AtomicBool,
    fail_set: AtomicBool,
    fail_delete: AtomicBool,
    fail_scan: AtomicBool,
    delete_failures_left: AtomicUsize,
    gets: AtomicUsize,
    sets: AtomicUsize,
    deletes: AtomicUsize,
    scans: AtomicUsize,
}

impl FaultyKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    pub fn fail_set(&self, fail: bool) {
        self.fail_set.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    /// Fail only the next `count` deletes.
    pub fn fail_next_deletes(&self, count: usize) {
        self.delete_failures_left.store(count, Ordering::SeqCst);
    }

    pub fn fail_scan(&self, fail: bool) {
        self.fail_scan.store(fail, Ordering::SeqCst);
    }

    /// Make every operation fail, as if the store were unreachable.
    pub fn go_offline(&self) {
        self.fail_get(true);
        self.fail_set(true);
        self.fail_delete(true);
        self.fail_scan(true);
    }

    pub fn calls(&self) -> StoreCalls {
        StoreCalls {
            gets: self.gets.load(Ordering::SeqCst),
            sets: self.sets.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
            scans: self.scans.load(Ordering::SeqCst),
        }
    }

    /// The wrapped store, bypassing fault injection and counting.
    pub fn inner(&self) -> &InMemoryKvStore {
        &self.inner
    }

    fn check(flag: &AtomicBool, op: &str) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::unavailable(format!("injected {op} failure")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KvStore for FaultyKvStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_get, "get")?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &Value, expiry_seconds: u64) -> StoreResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_set, "set")?;
        self.inner.set(key, value, expiry_seconds).await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_delete, "delete")?;
        let one_shot = self
            .delete_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if one_shot.is_ok() {
            return Err(StoreError::unavailable("injected delete failure"));
        }
        self.inner.delete(key).await
    }

    async fn scan_page(
        &self,
        prefix: &str,
        after: Option<&str>,
        limit: usize,
    ) -> StoreResult<ScanPage> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_scan, "scan")?;
        self.inner.scan_page(prefix, after, limit).await
    }
}

// ============================================================================
// JSON HELPERS
// ============================================================================

/// Serialize `value` with every object's keys written in reverse order.
///
/// Parsing the output yields a payload equal to `value` whose textual key
/// order differs, for exercising key-order independence.
pub fn reversed_key_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| b.0.cmp(a.0));
            let fields: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), reversed_key_json(v)))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(reversed_key_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for payloads, models and operations.

    use super::*;
    use proptest::prelude::*;

    /// Generate a JSON scalar.
    pub fn arb_json_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 @._-]{0,12}".prop_map(Value::String),
        ]
    }

    /// Generate a nested argument payload (objects, arrays and scalars).
    pub fn arb_json_value() -> impl Strategy<Value = Value> {
        arb_json_leaf().prop_recursive(4, 64, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..5).prop_map(Value::Array),
                prop::collection::btree_map("[a-zA-Z_]{1,8}", inner, 0..5)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    /// Generate an ORM-style argument object (`where`, `select`, `take`, ...).
    pub fn arb_query_args() -> impl Strategy<Value = Value> {
        prop::collection::btree_map(
            prop_oneof![
                Just("where".to_string()),
                Just("select".to_string()),
                Just("include".to_string()),
                Just("orderBy".to_string()),
                Just("take".to_string()),
                Just("skip".to_string()),
            ],
            arb_json_value(),
            0..4,
        )
        .prop_map(|m| Value::Object(m.into_iter().collect()))
    }

    /// Generate a model name, or `None` for model-less operations.
    pub fn arb_model() -> impl Strategy<Value = Option<String>> {
        prop::option::of("[A-Z][a-zA-Z]{0,10}")
    }

    pub fn arb_read_operation() -> impl Strategy<Value = Operation> {
        prop_oneof![
            Just(Operation::FindFirst),
            Just(Operation::FindUnique),
            Just(Operation::FindMany),
            Just(Operation::QueryRaw),
        ]
    }

    pub fn arb_write_operation() -> impl Strategy<Value = Operation> {
        prop_oneof![
            Just(Operation::Create),
            Just(Operation::CreateMany),
            Just(Operation::Update),
            Just(Operation::UpdateMany),
            Just(Operation::Upsert),
            Just(Operation::Delete),
            Just(Operation::DeleteMany),
            Just(Operation::ExecuteRaw),
        ]
    }

    pub fn arb_passthrough_operation() -> impl Strategy<Value = Operation> {
        prop_oneof![
            Just(Operation::Count),
            Just(Operation::Aggregate),
            Just(Operation::GroupBy),
            Just(Operation::FindUniqueOrThrow),
            Just(Operation::QueryRawUnsafe),
            "[a-z]{3,10}".prop_map(|name| Operation::parse(&format!("x_{name}"))),
        ]
    }
}

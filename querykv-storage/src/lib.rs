//! QueryKV Storage - Store Adapters and the Query Cache
//!
//! Store adapters live in [`store`]; the interception layer that sits in
//! front of a data-access executor lives in [`cache`].

pub mod cache;
pub mod store;

pub use cache::{
    CacheMetrics, CacheRead, CacheStage, CacheStats, Disposition, FnExecutor, Intercepted,
    Invalidator, QueryCache, QueryExecutor, ReadPath, ReadThroughResolver,
};
pub use store::{keys_with_prefix, InMemoryKvStore, KvStore, LmdbKvStore, LmdbStoreError, ScanPage};

// Re-export core types so adapters and callers need a single import.
pub use querykv_core::{
    CacheConfig, CacheKey, KeyDeriver, Operation, OperationKind, QueryKvError, QueryKvResult,
    QueryRequest, StoreError, StoreResult,
};

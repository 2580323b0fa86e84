//! Read-through / write-invalidate query cache.
//!
//! # Design
//!
//! The cache never holds state in-process. Reads are keyed by
//! `(model, operation, canonical args)`; writes flush the whole namespace
//! of their model rather than trying to work out which reads they affect.
//! Expiry is left to the store.
//!
//! Cache-layer failures are recovered locally: a read that cannot use the
//! store runs the query directly, and a write whose invalidation fails
//! still runs. What a call did is observable through [`Disposition`] and
//! [`ReadPath`], so callers and tests need not infer it from timing.
//!
//! # Example
//!
//! ```ignore
//! let cache = QueryCache::new(store, CacheConfig::from_env());
//! let executor = FnExecutor::new(|args| async move { db.user_find_many(args).await });
//!
//! // First call executes and populates, second is served from the store.
//! cache.intercept(QueryRequest::model("User", "findMany", json!({})), &executor).await?;
//! cache.intercept(QueryRequest::model("User", "findMany", json!({})), &executor).await?;
//!
//! // Flushes every `PrismaKV_User.` key, then runs the update.
//! cache.intercept(QueryRequest::model("User", "update", args), &executor).await?;
//! ```

pub mod executor;
pub mod interceptor;
pub mod invalidation;
pub mod metrics;
pub mod read_through;

pub use executor::{FnExecutor, QueryExecutor};
pub use interceptor::{Disposition, Intercepted, QueryCache};
pub use invalidation::Invalidator;
pub use metrics::{CacheMetrics, CacheStats};
pub use read_through::{CacheRead, CacheStage, ReadPath, ReadThroughResolver};

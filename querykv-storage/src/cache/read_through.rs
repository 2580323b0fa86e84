//! Read-through resolution.
//!
//! A read looks up its derived key. A hit skips execution. A miss executes
//! the query once, stores the result with the configured expiry and
//! returns it. Any store failure degrades to direct execution; the caller
//! only ever sees the executor's own errors.

use std::sync::Arc;

use querykv_core::CacheKey;
use serde_json::Value;

use super::executor::QueryExecutor;
use super::metrics::CacheMetrics;
use crate::store::KvStore;

/// Which store call failed when a read bypassed the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheStage {
    /// The lookup failed; the query ran without consulting the cache.
    Lookup,
    /// The query ran on a miss but its result could not be stored.
    Populate,
}

/// How a read was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadPath {
    /// Served from the store without executing the query.
    Hit,
    /// Executed on a miss and stored for later reads.
    MissPopulated,
    /// Executed directly because the store failed at `stage`.
    Bypassed { stage: CacheStage },
}

/// Result of a read, carrying the path that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead<T> {
    value: T,
    path: ReadPath,
}

impl<T> CacheRead<T> {
    pub fn hit(value: T) -> Self {
        Self {
            value,
            path: ReadPath::Hit,
        }
    }

    pub fn populated(value: T) -> Self {
        Self {
            value,
            path: ReadPath::MissPopulated,
        }
    }

    pub fn bypassed(value: T, stage: CacheStage) -> Self {
        Self {
            value,
            path: ReadPath::Bypassed { stage },
        }
    }

    pub fn path(&self) -> ReadPath {
        self.path
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    pub fn into_parts(self) -> (T, ReadPath) {
        (self.value, self.path)
    }

    pub fn was_cache_hit(&self) -> bool {
        self.path == ReadPath::Hit
    }

    pub fn was_bypassed(&self) -> bool {
        matches!(self.path, ReadPath::Bypassed { .. })
    }
}

/// Serves reads from the store, falling back to the executor.
pub struct ReadThroughResolver<S: KvStore + ?Sized> {
    store: Arc<S>,
    expiry_seconds: u64,
    metrics: Arc<CacheMetrics>,
}

impl<S: KvStore + ?Sized> ReadThroughResolver<S> {
    pub fn new(store: Arc<S>, expiry_seconds: u64, metrics: Arc<CacheMetrics>) -> Self {
        Self {
            store,
            expiry_seconds,
            metrics,
        }
    }

    pub fn expiry_seconds(&self) -> u64 {
        self.expiry_seconds
    }

    /// Resolve one read.
    ///
    /// Performs at most one store read, one store write and one execution.
    /// The executor is never called twice, even when storing its result
    /// fails.
    pub async fn resolve<X>(
        &self,
        key: &CacheKey,
        executor: &X,
        args: Value,
    ) -> Result<CacheRead<Value>, X::Error>
    where
        X: QueryExecutor + ?Sized,
    {
        match self.store.get(key.as_str()).await {
            Ok(Some(cached)) => {
                self.metrics.record_hit();
                tracing::debug!(key = %key, "cache hit");
                return Ok(CacheRead::hit(cached));
            }
            Ok(None) => {}
            Err(e) => {
                self.metrics.record_bypass();
                tracing::warn!(
                    key = %key,
                    error = %e,
                    "Cache lookup failed, executing query directly"
                );
                let value = executor.execute(args).await?;
                return Ok(CacheRead::bypassed(value, CacheStage::Lookup));
            }
        }

        self.metrics.record_miss();
        tracing::debug!(key = %key, "cache miss");
        let value = executor.execute(args).await?;

        match self.store.set(key.as_str(), &value, self.expiry_seconds).await {
            Ok(()) => Ok(CacheRead::populated(value)),
            Err(e) => {
                self.metrics.record_bypass();
                tracing::warn!(
                    key = %key,
                    error = %e,
                    "Failed to store query result, returning it uncached"
                );
                Ok(CacheRead::bypassed(value, CacheStage::Populate))
            }
        }
    }
}

impl<S: KvStore + ?Sized> Clone for ReadThroughResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            expiry_seconds: self.expiry_seconds,
            metrics: Arc::clone(&self.metrics),
        }
    }
}

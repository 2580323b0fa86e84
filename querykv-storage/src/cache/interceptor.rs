//! The interception point.
//!
//! Every operation issued against the data-access layer passes through
//! [`QueryCache::intercept`], which classifies it and routes it:
//!
//! - reads go through the [`ReadThroughResolver`] under a derived key
//! - writes flush their model's namespace, then execute
//! - everything else executes directly
//!
//! Invalidation completes before a write starts. It is not rolled back if
//! the write then fails, so a failed write can still evict entries.

use std::sync::Arc;

use querykv_core::{
    CacheConfig, CacheKey, KeyDeriver, Operation, OperationKind, QueryKvResult, QueryRequest,
    StoreResult,
};
use serde_json::Value;

use super::executor::QueryExecutor;
use super::invalidation::Invalidator;
use super::metrics::{CacheMetrics, CacheStats};
use super::read_through::{ReadPath, ReadThroughResolver};
use crate::store::KvStore;

/// What the cache did for one intercepted operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A read, and how it was satisfied.
    Read(ReadPath),
    /// A write. `invalidated` is the number of keys flushed, or `None`
    /// when invalidation failed and the write ran anyway.
    Write { invalidated: Option<u64> },
    /// Executed with no cache interaction.
    Passthrough,
}

/// An operation result together with its [`Disposition`].
#[derive(Debug, Clone, PartialEq)]
pub struct Intercepted {
    pub value: Value,
    pub disposition: Disposition,
}

/// Read-through / write-invalidate cache in front of a query executor.
///
/// Holds no cached state of its own: everything lives in the store. Clones
/// share the store and counters.
///
/// # Example
///
/// ```ignore
/// let cache = QueryCache::new(Arc::new(InMemoryKvStore::new()), CacheConfig::from_env());
///
/// let users = cache
///     .intercept(QueryRequest::model("User", "findMany", json!({})), &executor)
///     .await?;
/// ```
pub struct QueryCache<S: KvStore + ?Sized> {
    store: Arc<S>,
    config: CacheConfig,
    deriver: KeyDeriver,
    resolver: ReadThroughResolver<S>,
    invalidator: Invalidator<S>,
    metrics: Arc<CacheMetrics>,
}

impl<S: KvStore + ?Sized> QueryCache<S> {
    /// Create a new query cache.
    pub fn new(store: Arc<S>, config: CacheConfig) -> Self {
        let metrics = Arc::new(CacheMetrics::new());
        let deriver = KeyDeriver::new(config.key_prefix.clone());
        let resolver = ReadThroughResolver::new(
            Arc::clone(&store),
            config.expiry_seconds(),
            Arc::clone(&metrics),
        );
        let invalidator = Invalidator::new(
            Arc::clone(&store),
            deriver.clone(),
            config.invalidation_concurrency,
            config.scan_page_size,
            Arc::clone(&metrics),
        );

        Self {
            store,
            config,
            deriver,
            resolver,
            invalidator,
            metrics,
        }
    }

    /// Create a query cache after validating `config`.
    pub fn try_new(store: Arc<S>, config: CacheConfig) -> QueryKvResult<Self> {
        config.validate()?;
        Ok(Self::new(store, config))
    }

    /// Create a query cache with default configuration.
    pub fn with_defaults(store: Arc<S>) -> Self {
        Self::new(store, CacheConfig::default())
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get a reference to the store.
    pub fn backend(&self) -> &S {
        &self.store
    }

    pub fn stats(&self) -> CacheStats {
        self.metrics.snapshot()
    }

    /// The key a read with these parameters is cached under.
    pub fn key_for(&self, model: Option<&str>, operation: &Operation, args: &Value) -> CacheKey {
        self.deriver.derive(model, operation, args)
    }

    /// Key prefix shared by every cached read of `model`.
    pub fn namespace(&self, model: Option<&str>) -> String {
        self.deriver.namespace(model)
    }

    /// Flush every cached read of `model`.
    pub async fn invalidate(&self, model: Option<&str>) -> StoreResult<u64> {
        self.invalidator.invalidate(model).await
    }

    /// Run one operation through the cache and return its result.
    ///
    /// Cache-layer failures never surface here. Errors returned are the
    /// executor's own, unchanged.
    pub async fn intercept<X>(&self, request: QueryRequest, executor: &X) -> Result<Value, X::Error>
    where
        X: QueryExecutor + ?Sized,
    {
        self.intercept_traced(request, executor)
            .await
            .map(|intercepted| intercepted.value)
    }

    /// Like [`QueryCache::intercept`], also reporting what the cache did.
    pub async fn intercept_traced<X>(
        &self,
        request: QueryRequest,
        executor: &X,
    ) -> Result<Intercepted, X::Error>
    where
        X: QueryExecutor + ?Sized,
    {
        let QueryRequest {
            model,
            operation,
            args,
        } = request;

        match operation.kind() {
            OperationKind::Write => {
                let invalidated = match self.invalidator.invalidate(model.as_deref()).await {
                    Ok(deleted) => Some(deleted),
                    Err(e) => {
                        tracing::warn!(
                            model = model.as_deref().unwrap_or_default(),
                            operation = %operation,
                            error = %e,
                            "Cache invalidation failed, executing write anyway"
                        );
                        None
                    }
                };

                let value = executor.execute(args).await?;
                Ok(Intercepted {
                    value,
                    disposition: Disposition::Write { invalidated },
                })
            }
            OperationKind::Read => {
                let key = self.deriver.derive(model.as_deref(), &operation, &args);
                let (value, path) = self
                    .resolver
                    .resolve(&key, executor, args)
                    .await?
                    .into_parts();
                Ok(Intercepted {
                    value,
                    disposition: Disposition::Read(path),
                })
            }
            OperationKind::Passthrough => {
                self.metrics.record_passthrough();
                let value = executor.execute(args).await?;
                Ok(Intercepted {
                    value,
                    disposition: Disposition::Passthrough,
                })
            }
        }
    }
}

impl<S: KvStore + ?Sized> Clone for QueryCache<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            deriver: self.deriver.clone(),
            resolver: self.resolver.clone(),
            invalidator: self.invalidator.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

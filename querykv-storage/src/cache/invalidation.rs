//! Namespace invalidation.
//!
//! A write flushes every cached read of its model. Keys are enumerated
//! first and deleted afterwards, so the scan never observes its own
//! deletions. Deletes run concurrently up to the configured limit.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt, TryStreamExt};
use querykv_core::{KeyDeriver, StoreError, StoreResult};

use super::metrics::CacheMetrics;
use crate::store::{keys_with_prefix, KvStore};

/// Deletes every cached entry of one model namespace.
pub struct Invalidator<S: KvStore + ?Sized> {
    store: Arc<S>,
    deriver: KeyDeriver,
    concurrency: usize,
    page_size: usize,
    metrics: Arc<CacheMetrics>,
}

impl<S: KvStore + ?Sized> Invalidator<S> {
    pub fn new(
        store: Arc<S>,
        deriver: KeyDeriver,
        concurrency: usize,
        page_size: usize,
        metrics: Arc<CacheMetrics>,
    ) -> Self {
        Self {
            store,
            deriver,
            concurrency: concurrency.max(1),
            page_size: page_size.max(1),
            metrics,
        }
    }

    /// Flush the namespace of `model` (or the no-model namespace).
    ///
    /// Returns the number of keys actually removed. Keys already gone by
    /// the time they are deleted are not an error. A failure to enumerate
    /// is returned at once. A failed delete does not stop the others; its
    /// error is returned after every key has been tried.
    pub async fn invalidate(&self, model: Option<&str>) -> StoreResult<u64> {
        let namespace = self.deriver.namespace(model);

        let result = self.flush(&namespace).await;
        match &result {
            Ok(deleted) => {
                self.metrics.record_invalidation(*deleted);
                tracing::debug!(namespace = %namespace, deleted, "cache namespace invalidated");
            }
            Err(_) => self.metrics.record_invalidation_failure(),
        }
        result
    }

    async fn flush(&self, namespace: &str) -> StoreResult<u64> {
        let keys: Vec<String> = keys_with_prefix(self.store.as_ref(), namespace, self.page_size)
            .try_collect()
            .await?;

        if keys.is_empty() {
            return Ok(0);
        }

        // Every delete is attempted even after one fails; the first error is
        // reported once the whole namespace has been tried.
        let store = &self.store;
        let (deleted, first_error) = stream::iter(keys)
            .map(|key| async move { store.delete(&key).await })
            .buffer_unordered(self.concurrency)
            .fold(
                (0u64, None::<StoreError>),
                |(deleted, first_error), outcome| async move {
                    match outcome {
                        Ok(removed) => (deleted + u64::from(removed), first_error),
                        Err(e) => (deleted, first_error.or(Some(e))),
                    }
                },
            )
            .await;

        match first_error {
            Some(e) => {
                tracing::debug!(namespace = %namespace, deleted, "partial namespace flush");
                Err(e)
            }
            None => Ok(deleted),
        }
    }
}

impl<S: KvStore + ?Sized> Clone for Invalidator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            deriver: self.deriver.clone(),
            concurrency: self.concurrency,
            page_size: self.page_size,
            metrics: Arc::clone(&self.metrics),
        }
    }
}

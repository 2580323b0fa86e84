//! Key-value store adapters.
//!
//! The cache only needs four capabilities from a store: point get, set with
//! expiry, idempotent delete, and paged enumeration of keys by prefix.
//! Eviction, replication and persistence are the store's business.

pub mod lmdb;
pub mod memory;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use querykv_core::{StoreError, StoreResult};
use serde_json::Value;
use std::sync::Arc;

pub use lmdb::{LmdbKvStore, LmdbStoreError};
pub use memory::InMemoryKvStore;

/// One page of a prefix scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Keys in this page, in store order.
    pub keys: Vec<String>,
    /// Resume point for the next page; `None` once the scan is exhausted.
    pub next_after: Option<String>,
}

impl ScanPage {
    /// Build a page from keys already filtered and ordered by the store.
    ///
    /// A full page carries its last key as the resume point. A short page
    /// ends the scan.
    pub fn from_keys(keys: Vec<String>, limit: usize) -> Self {
        let next_after = if keys.len() >= limit {
            keys.last().cloned()
        } else {
            None
        };
        Self { keys, next_after }
    }
}

/// Capability interface over an external key-value store.
///
/// Implementations must be safe to share across concurrent operations.
/// `get` must distinguish an absent key from a stored falsy value such as
/// `[]` or `null`.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Look up a live (unexpired) entry.
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Store `value` under `key`, expiring after `expiry_seconds`.
    async fn set(&self, key: &str, value: &Value, expiry_seconds: u64) -> StoreResult<()>;

    /// Delete `key`. Returns whether an entry was removed; deleting a
    /// missing key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Return up to `limit` live keys starting with `prefix` and ordered
    /// strictly after `after`.
    async fn scan_page(
        &self,
        prefix: &str,
        after: Option<&str>,
        limit: usize,
    ) -> StoreResult<ScanPage>;
}

#[async_trait]
impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &Value, expiry_seconds: u64) -> StoreResult<()> {
        (**self).set(key, value, expiry_seconds).await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        (**self).delete(key).await
    }

    async fn scan_page(
        &self,
        prefix: &str,
        after: Option<&str>,
        limit: usize,
    ) -> StoreResult<ScanPage> {
        (**self).scan_page(prefix, after, limit).await
    }
}

enum ScanState {
    Start,
    After(String),
    Done,
}

/// Lazily enumerate every key starting with `prefix`, one page at a time.
///
/// The stream is finite and not restartable. A failing page ends the
/// stream with that error.
pub fn keys_with_prefix<'a, S>(
    store: &'a S,
    prefix: &'a str,
    page_size: usize,
) -> BoxStream<'a, StoreResult<String>>
where
    S: KvStore + ?Sized,
{
    let page_size = page_size.max(1);
    stream::try_unfold(ScanState::Start, move |state| async move {
        let after = match state {
            ScanState::Done => return Ok(None),
            ScanState::Start => None,
            ScanState::After(key) => Some(key),
        };

        let page = store.scan_page(prefix, after.as_deref(), page_size).await?;
        let next = match page.next_after {
            Some(key) => ScanState::After(key),
            None => ScanState::Done,
        };
        let keys = stream::iter(page.keys.into_iter().map(Ok::<String, StoreError>));
        Ok::<_, StoreError>(Some((keys, next)))
    })
    .try_flatten()
    .boxed()
}

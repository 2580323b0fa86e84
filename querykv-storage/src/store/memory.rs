//! In-process key-value store with per-entry expiry.
//!
//! Useful for tests and single-process deployments. Expired entries are
//! invisible to every operation and are purged lazily.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::time::Duration;

use async_trait::async_trait;
use querykv_core::{StoreError, StoreResult};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{KvStore, ScanPage};

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory store backed by an ordered map.
///
/// Expiry uses the tokio clock, so tests can drive it with a paused
/// runtime and `tokio::time::advance`.
#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remaining time to live for `key`, if it is live.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.expires_at - now)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: remove it unless a concurrent set already replaced it.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &Value, expiry_seconds: u64) -> StoreResult<()> {
        if expiry_seconds == 0 {
            return Err(StoreError::backend(format!(
                "invalid expire time for key {key}: 0"
            )));
        }

        let expires_at = Instant::now()
            .checked_add(Duration::from_secs(expiry_seconds))
            .ok_or_else(|| {
                StoreError::backend(format!(
                    "expire time out of range for key {key}: {expiry_seconds}"
                ))
            })?;

        let entry = Entry {
            value: value.clone(),
            expires_at,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .write()
            .await
            .remove(key)
            .is_some_and(|entry| entry.is_live(now)))
    }

    async fn scan_page(
        &self,
        prefix: &str,
        after: Option<&str>,
        limit: usize,
    ) -> StoreResult<ScanPage> {
        let now = Instant::now();
        let start = match after {
            Some(after) if after >= prefix => Bound::Excluded(after),
            _ => Bound::Included(prefix),
        };

        let entries = self.entries.read().await;
        let keys: Vec<String> = entries
            .range::<str, _>((start, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(_, entry)| entry.is_live(now))
            .take(limit)
            .map(|(key, _)| key.clone())
            .collect();

        Ok(ScanPage::from_keys(keys, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = InMemoryKvStore::new();
        store
            .set("k", &json!([{"id": 1}]), 60)
            .await
            .expect("set should succeed");

        let value = store.get("k").await.expect("get should succeed");
        assert_eq!(value, Some(json!([{"id": 1}])));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let store = InMemoryKvStore::new();
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_falsy_values_are_present() {
        let store = InMemoryKvStore::new();
        for (key, value) in [
            ("empty_array", json!([])),
            ("null", json!(null)),
            ("zero", json!(0)),
            ("false", json!(false)),
            ("empty_string", json!("")),
        ] {
            store.set(key, &value, 60).await.unwrap();
            assert_eq!(store.get(key).await.unwrap(), Some(value), "{key}");
        }
    }

    #[tokio::test]
    async fn test_zero_expiry_rejected() {
        let store = InMemoryKvStore::new();
        let err = store.set("k", &json!(1), 0).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend { .. }));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_unrepresentable_expiry_rejected() {
        let store = InMemoryKvStore::new();
        let err = store.set("k", &json!(1), u64::MAX).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend { .. }));
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = InMemoryKvStore::new();
        store.set("k", &json!("v"), 10).await.unwrap();
        assert_eq!(store.ttl("k").await, Some(Duration::from_secs(10)));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(store.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.get("k").await.unwrap().is_none());
        assert_eq!(store.ttl("k").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = InMemoryKvStore::new();
        store.set("short", &json!(1), 1).await.unwrap();
        store.set("long", &json!(2), 100).await.unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = InMemoryKvStore::new();
        store.set("k", &json!(1), 60).await.unwrap();

        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite() {
        let store = InMemoryKvStore::new();
        store.set("k", &json!("old"), 60).await.unwrap();
        store.set("k", &json!("new"), 60).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!("new")));
    }

    #[tokio::test]
    async fn test_scan_page_respects_prefix_and_cursor() {
        let store = InMemoryKvStore::new();
        for key in ["a.1", "a.2", "a.3", "ab.1", "b.1"] {
            store.set(key, &json!(key), 60).await.unwrap();
        }

        let page = store.scan_page("a.", None, 2).await.unwrap();
        assert_eq!(page.keys, vec!["a.1", "a.2"]);
        assert_eq!(page.next_after.as_deref(), Some("a.2"));

        let page = store.scan_page("a.", Some("a.2"), 2).await.unwrap();
        assert_eq!(page.keys, vec!["a.3"]);
        assert!(page.next_after.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_skips_expired() {
        let store = InMemoryKvStore::new();
        store.set("n.short", &json!(1), 1).await.unwrap();
        store.set("n.long", &json!(2), 100).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        let page = store.scan_page("n.", None, 10).await.unwrap();
        assert_eq!(page.keys, vec!["n.long"]);
    }
}

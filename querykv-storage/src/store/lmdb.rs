//! LMDB-backed store adapter.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a persistent,
//! memory-mapped key-value store that survives process restarts.
//!
//! # Value Format
//!
//! Each value is stored as `[expires_at_ms: 8 bytes LE][json]`. LMDB has no
//! native expiry, so expired rows are filtered on read and removed the
//! next time they are looked up.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The adapter uses:
//! - Read transactions for `get` and `scan_page`
//! - Write transactions for `set`, `delete` and expired-row cleanup

use std::ops::Bound;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use querykv_core::{StoreError, StoreResult};
use serde_json::Value;

use super::{KvStore, ScanPage};

const EXPIRY_HEADER_LEN: usize = 8;

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for StoreError {
    fn from(e: LmdbStoreError) -> Self {
        match e {
            LmdbStoreError::Transaction(reason) => StoreError::Backend { reason },
            other => StoreError::Unavailable {
                reason: other.to_string(),
            },
        }
    }
}

fn txn_error(e: heed::Error) -> LmdbStoreError {
    LmdbStoreError::Transaction(e.to_string())
}

/// Split a stored row into its expiry and JSON body.
fn split_row(bytes: &[u8]) -> Option<(i64, &[u8])> {
    if bytes.len() < EXPIRY_HEADER_LEN {
        return None;
    }
    let header: [u8; EXPIRY_HEADER_LEN] = bytes[..EXPIRY_HEADER_LEN].try_into().ok()?;
    Some((i64::from_le_bytes(header), &bytes[EXPIRY_HEADER_LEN..]))
}

fn is_live(expires_at_ms: i64, now_ms: i64) -> bool {
    now_ms < expires_at_ms
}

/// LMDB-backed key-value store with per-entry expiry.
///
/// # Example
///
/// ```ignore
/// use querykv_storage::store::{KvStore, LmdbKvStore};
///
/// let store = LmdbKvStore::new("/tmp/querykv", 100)?;
/// store.set("PrismaKV_User.findMany.abc", &json!([]), 3600).await?;
/// ```
pub struct LmdbKvStore {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
}

impl LmdbKvStore {
    /// Create a new LMDB store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per path by this process and
        // the mapped file is never truncated while open.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;

        wtxn.commit().map_err(txn_error)?;

        Ok(Self { env, db })
    }

    /// Write a row with an absolute expiry timestamp.
    fn put_row(&self, key: &str, body: &[u8], expires_at_ms: i64) -> Result<(), LmdbStoreError> {
        let mut row = Vec::with_capacity(EXPIRY_HEADER_LEN + body.len());
        row.extend_from_slice(&expires_at_ms.to_le_bytes());
        row.extend_from_slice(body);

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db
            .put(&mut wtxn, key.as_bytes(), &row)
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(())
    }

    /// Remove `key` only if it is still expired as of `now_ms`.
    fn remove_if_expired(&self, key: &str, now_ms: i64) -> Result<(), LmdbStoreError> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let expired = match self.db.get(&wtxn, key.as_bytes()).map_err(txn_error)? {
            Some(bytes) => split_row(bytes).map_or(true, |(exp, _)| !is_live(exp, now_ms)),
            None => false,
        };
        if expired {
            self.db
                .delete(&mut wtxn, key.as_bytes())
                .map_err(txn_error)?;
        }
        wtxn.commit().map_err(txn_error)?;
        Ok(())
    }

    /// Delete every expired row. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<u64, LmdbStoreError> {
        let now_ms = Utc::now().timestamp_millis();
        let expired_keys = {
            let rtxn = self.env.read_txn().map_err(txn_error)?;
            let mut keys = Vec::new();
            for result in self.db.iter(&rtxn).map_err(txn_error)? {
                let (key, bytes) = result.map_err(txn_error)?;
                if split_row(bytes).map_or(true, |(exp, _)| !is_live(exp, now_ms)) {
                    keys.push(key.to_vec());
                }
            }
            keys
        };

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let mut removed = 0u64;
        for key in &expired_keys {
            if self.db.delete(&mut wtxn, key).map_err(txn_error)? {
                removed += 1;
            }
        }
        wtxn.commit().map_err(txn_error)?;
        Ok(removed)
    }
}

#[async_trait]
impl KvStore for LmdbKvStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let now_ms = Utc::now().timestamp_millis();

        let decoded = {
            let rtxn = self.env.read_txn().map_err(txn_error)?;
            match self.db.get(&rtxn, key.as_bytes()).map_err(txn_error)? {
                None => return Ok(None),
                Some(bytes) => match split_row(bytes) {
                    Some((expires_at_ms, body)) if is_live(expires_at_ms, now_ms) => {
                        Some(serde_json::from_slice::<Value>(body).map_err(|e| {
                            StoreError::serialization(key, e.to_string())
                        })?)
                    }
                    _ => None,
                },
            }
        };

        if decoded.is_none() {
            // Expired or truncated row.
            self.remove_if_expired(key, now_ms)?;
        }
        Ok(decoded)
    }

    async fn set(&self, key: &str, value: &Value, expiry_seconds: u64) -> StoreResult<()> {
        if expiry_seconds == 0 {
            return Err(StoreError::backend(format!(
                "invalid expire time for key {key}: 0"
            )));
        }

        let body =
            serde_json::to_vec(value).map_err(|e| StoreError::serialization(key, e.to_string()))?;
        let ttl_ms = i64::try_from(expiry_seconds)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        let expires_at_ms = Utc::now().timestamp_millis().saturating_add(ttl_ms);

        self.put_row(key, &body, expires_at_ms)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let deleted = self
            .db
            .delete(&mut wtxn, key.as_bytes())
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(deleted)
    }

    async fn scan_page(
        &self,
        prefix: &str,
        after: Option<&str>,
        limit: usize,
    ) -> StoreResult<ScanPage> {
        let now_ms = Utc::now().timestamp_millis();
        let rtxn = self.env.read_txn().map_err(txn_error)?;

        // Seek straight to the cursor (or the prefix) and stop at the first
        // key past the prefix; LMDB orders keys bytewise.
        let lower = match after {
            Some(after) if after.as_bytes() >= prefix.as_bytes() => {
                Bound::Excluded(after.as_bytes())
            }
            _ => Bound::Included(prefix.as_bytes()),
        };
        let range: (Bound<&[u8]>, Bound<&[u8]>) = (lower, Bound::Unbounded);

        let mut keys = Vec::new();
        for result in self.db.range(&rtxn, &range).map_err(txn_error)? {
            let (raw_key, bytes) = result.map_err(txn_error)?;
            if !raw_key.starts_with(prefix.as_bytes()) {
                break;
            }
            if !split_row(bytes).is_some_and(|(exp, _)| is_live(exp, now_ms)) {
                continue;
            }
            // Keys are only ever written from &str.
            let Ok(key) = std::str::from_utf8(raw_key) else {
                continue;
            };
            keys.push(key.to_string());
            if keys.len() == limit {
                break;
            }
        }

        Ok(ScanPage::from_keys(keys, limit))
    }
}

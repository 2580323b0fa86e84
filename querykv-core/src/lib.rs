//! QueryKV Core - Operation Policy Types
//!
//! Shared by every other crate: operation classification, cache key
//! derivation, configuration and the error taxonomy. No I/O happens here.

pub mod config;
pub mod error;
pub mod key;
pub mod operation;

pub use config::{
    CacheConfig, DEFAULT_INVALIDATION_CONCURRENCY, DEFAULT_KEY_PREFIX, DEFAULT_SCAN_PAGE_SIZE,
    DEFAULT_TTL_SECS, LEGACY_TTL_ENV_VAR, TTL_ENV_VAR,
};
pub use error::{ConfigError, QueryKvError, QueryKvResult, StoreError, StoreResult};
pub use key::{args_digest, canonical_json, CacheKey, KeyDeriver, DIGEST_HEX_LEN, NO_MODEL_NAMESPACE};
pub use operation::{Operation, OperationKind, QueryRequest};

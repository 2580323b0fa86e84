//! Cache configuration.
//!
//! The configuration is built once at process start and handed to the
//! interception layer by value. Nothing here is read lazily or mutated
//! afterwards.

use std::time::Duration;

use crate::error::{ConfigError, QueryKvResult};

/// Environment variable overriding the cache entry TTL, in whole seconds.
pub const TTL_ENV_VAR: &str = "QUERYKV_TTL_SECS";

/// Older name for [`TTL_ENV_VAR`], still honoured when the new one is unset.
pub const LEGACY_TTL_ENV_VAR: &str = "PRISMA_VERCEL_KV_TTL";

/// Default TTL for cached entries (1 hour).
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Default namespace prefix for every key written by the cache.
pub const DEFAULT_KEY_PREFIX: &str = "PrismaKV";

/// Default number of concurrent deletes issued during invalidation.
pub const DEFAULT_INVALIDATION_CONCURRENCY: usize = 32;

/// Default number of keys requested per store scan page.
pub const DEFAULT_SCAN_PAGE_SIZE: usize = 500;

/// Configuration for the query cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL for cached entries. Expiry is enforced by the store.
    pub entry_ttl: Duration,
    /// Namespace prefix for keys, joined to the model with `_`.
    pub key_prefix: String,
    /// Maximum number of deletes in flight while flushing a namespace.
    pub invalidation_concurrency: usize,
    /// Keys requested per page when enumerating a namespace.
    pub scan_page_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            entry_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            invalidation_concurrency: DEFAULT_INVALIDATION_CONCURRENCY,
            scan_page_size: DEFAULT_SCAN_PAGE_SIZE,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a CacheConfig from the environment.
    ///
    /// # Environment Variables
    /// - `QUERYKV_TTL_SECS`: TTL of cached entries in seconds (default: 3600)
    /// - `PRISMA_VERCEL_KV_TTL`: same meaning, read only when
    ///   `QUERYKV_TTL_SECS` is unset
    ///
    /// A missing variable yields the default. A value that is not a positive
    /// integer is logged and ignored.
    pub fn from_env() -> Self {
        let (variable, raw) = Self::ttl_env_setting();
        match Self::from_ttl_setting(raw.as_deref()) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    variable,
                    error = %e,
                    default_secs = DEFAULT_TTL_SECS,
                    "Ignoring invalid cache TTL override"
                );
                Self::default()
            }
        }
    }

    /// Strict variant of [`CacheConfig::from_env`]: an invalid override is an error.
    pub fn try_from_env() -> QueryKvResult<Self> {
        let (_, raw) = Self::ttl_env_setting();
        Self::from_ttl_setting(raw.as_deref())
    }

    fn ttl_env_setting() -> (&'static str, Option<String>) {
        select_ttl_setting(
            std::env::var(TTL_ENV_VAR).ok(),
            std::env::var(LEGACY_TTL_ENV_VAR).ok(),
        )
    }

    /// Build a config from the raw TTL setting, if one was supplied.
    pub fn from_ttl_setting(raw: Option<&str>) -> QueryKvResult<Self> {
        let Some(raw) = raw else {
            return Ok(Self::default());
        };

        let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field: TTL_ENV_VAR.to_string(),
            value: raw.to_string(),
            reason: "must be a positive integer number of seconds".to_string(),
        })?;

        let config = Self::default().with_ttl(Duration::from_secs(secs));
        config.validate()?;
        Ok(config)
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }

    /// Set the key namespace prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the number of concurrent deletes during invalidation.
    pub fn with_invalidation_concurrency(mut self, concurrency: usize) -> Self {
        self.invalidation_concurrency = concurrency;
        self
    }

    /// Set the scan page size.
    pub fn with_scan_page_size(mut self, page_size: usize) -> Self {
        self.scan_page_size = page_size;
        self
    }

    /// Entry TTL in whole seconds, as passed to the store.
    ///
    /// Sub-second TTLs round up so an entry is never written without expiry.
    pub fn expiry_seconds(&self) -> u64 {
        let secs = self.entry_ttl.as_secs();
        if self.entry_ttl.subsec_nanos() > 0 {
            secs.saturating_add(1)
        } else {
            secs
        }
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - entry_ttl is positive
    /// - key_prefix is non-empty and contains no `.`
    /// - invalidation_concurrency and scan_page_size are positive
    pub fn validate(&self) -> QueryKvResult<()> {
        if self.entry_ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "entry_ttl".to_string(),
                value: format!("{:?}", self.entry_ttl),
                reason: "entry_ttl must be positive".to_string(),
            }
            .into());
        }

        if self.key_prefix.is_empty() || self.key_prefix.contains('.') {
            return Err(ConfigError::InvalidValue {
                field: "key_prefix".to_string(),
                value: self.key_prefix.clone(),
                reason: "key_prefix must be non-empty and must not contain '.'".to_string(),
            }
            .into());
        }

        if self.invalidation_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "invalidation_concurrency".to_string(),
                value: "0".to_string(),
                reason: "invalidation_concurrency must be positive".to_string(),
            }
            .into());
        }

        if self.scan_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scan_page_size".to_string(),
                value: "0".to_string(),
                reason: "scan_page_size must be positive".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Pick the TTL setting and the variable it came from. The current name
/// wins over the legacy one.
fn select_ttl_setting(
    current: Option<String>,
    legacy: Option<String>,
) -> (&'static str, Option<String>) {
    match (current, legacy) {
        (Some(raw), _) => (TTL_ENV_VAR, Some(raw)),
        (None, Some(raw)) => (LEGACY_TTL_ENV_VAR, Some(raw)),
        (None, None) => (TTL_ENV_VAR, None),
    }
}

//! Cache key derivation.
//!
//! Key format: `<prefix>_<model>.<operation>.<sha256 hex of canonical args>`.
//! Operations without a model use the [`NO_MODEL_NAMESPACE`] sentinel so
//! their entries stay groupable and never collide with a real model name.
//!
//! Arguments are serialized canonically: object keys are sorted at every
//! depth before hashing, so two payloads that differ only in key insertion
//! order share a key. This holds even when serde_json's `preserve_order`
//! feature is switched on elsewhere in the dependency graph.

use std::fmt;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::config::DEFAULT_KEY_PREFIX;
use crate::operation::Operation;

/// Namespace used when an operation has no model.
pub const NO_MODEL_NAMESPACE: &str = "$$NO_MODEL$$";

/// Length of the hex-encoded argument digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// A derived cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// The trailing argument digest.
    pub fn digest(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or_default()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives cache keys and namespace prefixes under one key prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDeriver {
    prefix: String,
}

impl Default for KeyDeriver {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

impl KeyDeriver {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Derive the key for one read operation.
    ///
    /// Deterministic across calls and processes. Any difference in model,
    /// operation or arguments yields a different key, up to SHA-256
    /// collisions.
    pub fn derive(&self, model: Option<&str>, operation: &Operation, args: &Value) -> CacheKey {
        let digest = args_digest(args);
        CacheKey(format!(
            "{}{}.{}",
            self.namespace(model),
            operation.as_str(),
            digest
        ))
    }

    /// The prefix shared by every key of one model: `<prefix>_<model>.`.
    ///
    /// The trailing `.` keeps `User` from matching `UserProfile`.
    pub fn namespace(&self, model: Option<&str>) -> String {
        format!(
            "{}_{}.",
            self.prefix,
            model.unwrap_or(NO_MODEL_NAMESPACE)
        )
    }
}

/// Serialize a payload with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    canonicalize(value).to_string()
}

/// Hex-encoded SHA-256 of the canonical serialization of `args`.
pub fn args_digest(args: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(args).as_bytes());
    hex::encode(hasher.finalize())
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let sorted: Map<String, Value> = entries
                .into_iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

//! Token Cache Backends
//!
//! The gate talks to its cache through [`CacheBackend`] only. Two backends
//! ship with the crate: [`MemoryCache`] for a single process and
//! [`FileCache`] for tokens shared across CLI invocations.

pub mod file;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::common::AppResult;

pub use file::FileCache;
pub use memory::MemoryCache;

/// Default token lifetime in seconds
pub const DEFAULT_CACHE_LIFETIME: u64 = 1500;

/// Key-value store with per-entry expiry.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch a live value. Expired or missing entries read as `None`.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Store `value` under `key` for `lifetime`.
    async fn set(&self, key: &str, value: &str, lifetime: Duration) -> AppResult<()>;

    async fn delete(&self, key: &str) -> AppResult<bool>;

    async fn clear(&self) -> AppResult<()>;
}

/// Cache settings for a gate.
///
/// Missing fields in a deserialized config fall back to the defaults, so
/// `{"prefix": "svc::"}` still gets the 1500 second lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Token lifetime in seconds
    pub lifetime: u64,
    /// Prepended to every key to keep clear of other cache users
    pub prefix: String,
    /// Keys longer than this are replaced by a truncated SHA-256 hex digest
    pub max_key_length: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            lifetime: DEFAULT_CACHE_LIFETIME,
            prefix: String::new(),
            max_key_length: None,
        }
    }
}

impl CacheConfig {
    pub fn with_lifetime(mut self, seconds: u64) -> Self {
        self.lifetime = seconds;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_max_key_length(mut self, max: usize) -> Self {
        self.max_key_length = Some(max);
        self
    }

    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime)
    }

    /// Backend key for a scope cache key: `prefix + key`, hashed if too long.
    /// A `max_key_length` of zero means no limit.
    pub fn full_key(&self, key: &str) -> String {
        let full = format!("{}{}", self.prefix, key);
        match self.max_key_length {
            Some(max) if max > 0 && full.len() > max => {
                let digest = hex::encode(Sha256::digest(full.as_bytes()));
                digest[..max.min(digest.len())].to_string()
            }
            _ => full,
        }
    }
}

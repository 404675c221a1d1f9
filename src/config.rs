//! Per-store cache configuration

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::CacheError;

/// Predicate deciding whether a freshly computed value should be written
/// back to the store. Evaluated against the canonical JSON form.
pub type CacheablePredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Configuration applied per store instance.
#[derive(Clone, Default)]
pub struct CacheConfig {
    /// Default TTL in seconds for entries without a per-call override.
    /// Zero means entries never expire.
    pub ttl: f64,
    /// Optional gate for writing computed values back after a `wrap` miss.
    /// Never consulted for reads or explicit `set` calls.
    pub is_cacheable_value: Option<CacheablePredicate>,
    /// Optional prefix concatenated in front of every key sent to a remote
    /// backend. Purely a storage-layer namespacing detail; statistics and
    /// request coalescing always see the unprefixed key.
    pub prefix: Option<String>,
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("ttl", &self.ttl)
            .field(
                "is_cacheable_value",
                &self.is_cacheable_value.as_ref().map(|_| "<predicate>"),
            )
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default TTL in seconds.
    pub fn with_ttl(mut self, secs: f64) -> Self {
        self.ttl = secs;
        self
    }

    /// Sets the key prefix. The prefix is used verbatim; include a separator
    /// such as `"myapp:"` if one is wanted.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Sets the cacheable-value predicate.
    pub fn with_is_cacheable_value<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.is_cacheable_value = Some(Arc::new(predicate));
        self
    }

    pub(crate) fn validate(&self) -> Result<(), CacheError> {
        if !self.ttl.is_finite() || self.ttl < 0.0 {
            return Err(CacheError::configuration(format!(
                "default TTL must be a finite number of seconds >= 0, got {}",
                self.ttl
            )));
        }
        Ok(())
    }

    /// Whether a computed value (in serialized form) should be written back.
    pub(crate) fn need_cache(&self, raw: &str) -> bool {
        match &self.is_cacheable_value {
            Some(predicate) => match serde_json::from_str::<Value>(raw) {
                Ok(value) => predicate(&value),
                Err(_) => true,
            },
            None => true,
        }
    }
}

//! Store abstraction shared by the memory and Redis backends

mod memory;
mod redis;

pub use memory::{MemoryOptions, MemoryStore};
pub use redis::{RedisConnection, RedisOptions, RedisStore};

use std::fmt::Debug;
use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::CacheError;
use crate::stats::StatsSnapshot;
use crate::ttl::Ttl;

/// Boxed computation producing the serialized value for a cache miss.
pub type RawCompute = Box<dyn FnOnce() -> BoxFuture<'static, Result<String, CacheError>> + Send>;

/// Contract both cache backends satisfy.
///
/// Values cross this boundary as canonical JSON strings so the trait stays
/// dyn-compatible; [`StoreExt`] layers typed operations on top.
#[async_trait]
pub trait Store: Send + Sync + Debug {
    /// Gets a raw JSON value. Absent and expired entries both read as `None`.
    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores a raw JSON value, always overwriting. The TTL override is
    /// resolved against the store default before the write.
    async fn set_raw(&self, key: &str, value: &str, ttl: Option<&Ttl>) -> Result<(), CacheError>;

    /// Removes a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Compute-if-absent: returns the cached value when present, otherwise
    /// runs `compute` and writes the result back (subject to the configured
    /// cacheable-value predicate). Compute failures propagate and cache
    /// nothing.
    async fn wrap_raw(
        &self,
        key: &str,
        compute: RawCompute,
        ttl: Option<&Ttl>,
    ) -> Result<String, CacheError>;

    /// Releases backend resources. Idempotent.
    async fn close(&self) -> Result<(), CacheError>;

    /// Current hit/miss counters for `wrap` calls.
    fn stats(&self) -> StatsSnapshot;
}

pub(crate) fn encode<V: Serialize>(value: &V) -> Result<String, CacheError> {
    serde_json::to_string(value)
        .map_err(|e| CacheError::serialization(format!("Failed to serialize cache value: {}", e)))
}

pub(crate) fn decode<V: DeserializeOwned>(raw: &str) -> Result<V, CacheError> {
    serde_json::from_str(raw)
        .map_err(|e| CacheError::serialization(format!("Failed to deserialize cache value: {}", e)))
}

/// Extension trait providing typed get/set/wrap over the raw JSON contract.
pub trait StoreExt: Store {
    /// Gets a typed value.
    fn get<'a, V>(
        &'a self,
        key: &'a str,
    ) -> impl Future<Output = Result<Option<V>, CacheError>> + Send + 'a
    where
        V: DeserializeOwned + Send,
    {
        async move {
            match self.get_raw(key).await? {
                Some(raw) => Ok(Some(decode(&raw)?)),
                None => Ok(None),
            }
        }
    }

    /// Sets a typed value with an optional TTL override.
    fn set<'a, V>(
        &'a self,
        key: &'a str,
        value: &'a V,
        ttl: Option<Ttl>,
    ) -> impl Future<Output = Result<(), CacheError>> + Send + 'a
    where
        V: Serialize + Send + Sync,
    {
        async move {
            let raw = encode(value)?;
            self.set_raw(key, &raw, ttl.as_ref()).await
        }
    }

    /// Typed compute-if-absent. The computed value makes one round trip
    /// through its canonical JSON form, so all callers observe the same
    /// representation whether they hit or miss.
    fn wrap<'a, T, F, Fut>(
        &'a self,
        key: &'a str,
        compute: F,
        ttl: Option<Ttl>,
    ) -> impl Future<Output = Result<T, CacheError>> + Send + 'a
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CacheError>> + Send + 'static,
    {
        async move {
            let raw_compute: RawCompute = Box::new(move || {
                async move {
                    let value = compute().await?;
                    encode(&value)
                }
                .boxed()
            });
            let raw = self.wrap_raw(key, raw_compute, ttl.as_ref()).await?;
            decode(&raw)
        }
    }
}

impl<T: Store + ?Sized> StoreExt for T {}

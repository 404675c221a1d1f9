//! In-process store backed by a bounded moka cache
//!
//! Expiry is tracked per entry and enforced lazily: an expired entry is only
//! removed when it is next read. Capacity-based eviction belongs to moka.

use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use tracing::debug;

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::stats::{StatsRegistry, StatsSnapshot, ALL_GROUP};
use crate::ttl::{self, Ttl};

use super::{RawCompute, Store};

/// Sizing options for the in-memory backend.
#[derive(Debug, Clone)]
pub struct MemoryOptions {
    /// Maximum number of entries before eviction kicks in. Required; must be
    /// greater than zero.
    pub max_entries: u64,
}

impl MemoryOptions {
    pub fn new(max_entries: u64) -> Self {
        Self { max_entries }
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    /// Absolute expiry in millis since epoch; 0 means the entry never expires.
    expire_at_ms: u64,
    /// Serialized JSON value.
    data: String,
}

/// In-memory cache store.
#[derive(Debug)]
pub struct MemoryStore {
    entries: MokaCache<String, MemoryEntry>,
    config: CacheConfig,
    stats: StatsRegistry,
}

impl MemoryStore {
    pub fn new(options: MemoryOptions, config: CacheConfig) -> Result<Self, CacheError> {
        if options.max_entries == 0 {
            return Err(CacheError::configuration(
                "memory store requires max_entries greater than zero",
            ));
        }
        config.validate()?;

        Ok(Self {
            entries: MokaCache::builder()
                .max_capacity(options.max_entries)
                .build(),
            config,
            stats: StatsRegistry::new(),
        })
    }

    fn now_ms() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    fn is_expired(entry: &MemoryEntry) -> bool {
        entry.expire_at_ms != 0 && Self::now_ms() >= entry.expire_at_ms
    }

    /// Reads an entry, removing it lazily when past its deadline. Presence
    /// is explicit, so stored zeroes, empty strings and nulls are hits.
    async fn lookup(&self, key: &str) -> Option<String> {
        match self.entries.get(key).await {
            Some(entry) if !Self::is_expired(&entry) => Some(entry.data),
            Some(_) => {
                debug!(key = %key, "removing expired entry");
                self.entries.remove(key).await;
                None
            }
            None => None,
        }
    }

    async fn insert(&self, key: &str, value: &str, secs: f64) {
        let expire_at_ms = if secs > 0.0 {
            Self::now_ms() + (secs * 1000.0).round() as u64
        } else {
            0
        };
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                expire_at_ms,
                data: value.to_string(),
            },
        )
        .await;
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.lookup(key).await)
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Option<&Ttl>) -> Result<(), CacheError> {
        let secs = ttl::resolve(self.config.ttl, ttl)?;
        self.insert(key, value, secs).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key).await;
        Ok(())
    }

    async fn wrap_raw(
        &self,
        key: &str,
        compute: RawCompute,
        ttl: Option<&Ttl>,
    ) -> Result<String, CacheError> {
        self.stats.record_call(ALL_GROUP);
        // Resolve up front so an invalid override fails before the compute
        // runs and before anything is written.
        let secs = ttl::resolve(self.config.ttl, ttl)?;

        if let Some(raw) = self.lookup(key).await {
            self.stats.record_hit(ALL_GROUP);
            debug!(key = %key, "memory cache hit");
            return Ok(raw);
        }

        let raw = compute().await?;
        if self.config.need_cache(&raw) {
            self.insert(key, &raw, secs).await;
        }
        Ok(raw)
    }

    async fn close(&self) -> Result<(), CacheError> {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
        Ok(())
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::store::StoreExt;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct TestValue {
        name: String,
        values: Vec<i32>,
    }

    fn test_value() -> TestValue {
        TestValue {
            name: "test".to_string(),
            values: vec![1, 2, 3],
        }
    }

    fn new_store() -> MemoryStore {
        MemoryStore::new(MemoryOptions::new(1000), CacheConfig::new()).unwrap()
    }

    #[tokio::test]
    async fn test_get_nothing() {
        let store = new_store();
        let result: Option<TestValue> = store.get("nothing").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = new_store();
        store.set("test-key", &test_value(), None).await.unwrap();

        let result: Option<TestValue> = store.get("test-key").await.unwrap();
        assert_eq!(result, Some(test_value()));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = new_store();
        store.set("test-key", &test_value(), None).await.unwrap();
        store.delete("test-key").await.unwrap();

        let result: Option<TestValue> = store.get("test-key").await.unwrap();
        assert!(result.is_none());

        // Deleting an absent key is fine
        store.delete("test-key").await.unwrap();
    }

    #[tokio::test]
    async fn test_wrap_records_stats() {
        let store = new_store();

        let result: TestValue = store
            .wrap("test-wrap", || async { Ok(test_value()) }, Some(0.0.into()))
            .await
            .unwrap();
        assert_eq!(result, test_value());

        let snapshot = store.stats();
        assert_eq!(snapshot[ALL_GROUP].call, 1);
        assert_eq!(snapshot[ALL_GROUP].hit, 0);
        assert_eq!(snapshot[ALL_GROUP].percent, 0.0);
    }

    #[tokio::test]
    async fn test_wrap_hits_cache() {
        let store = new_store();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            let result: TestValue = store
                .wrap(
                    "test-wrap",
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(test_value())
                    },
                    Some(0.0.into()),
                )
                .await
                .unwrap();
            assert_eq!(result, test_value());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let snapshot = store.stats();
        assert_eq!(snapshot[ALL_GROUP].call, 2);
        assert_eq!(snapshot[ALL_GROUP].hit, 1);
        assert_eq!(snapshot[ALL_GROUP].percent, 0.5);
    }

    #[tokio::test]
    async fn test_cacheable_value_predicate_skips_write_back() {
        let store = MemoryStore::new(
            MemoryOptions::new(1000),
            CacheConfig::new().with_is_cacheable_value(|_| false),
        )
        .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        for expected in 1..=2 {
            let counter = Arc::clone(&calls);
            let result: TestValue = store
                .wrap(
                    "test-wrap-ttl",
                    move || async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(test_value())
                    },
                    Some(0.0.into()),
                )
                .await
                .unwrap();
            assert_eq!(result, test_value());
            assert_eq!(calls.load(Ordering::SeqCst), expected);
        }

        // Compute ran every time, so no hits were recorded
        let snapshot = store.stats();
        assert_eq!(snapshot[ALL_GROUP].call, 2);
        assert_eq!(snapshot[ALL_GROUP].hit, 0);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let store = new_store();

        let result: TestValue = store
            .wrap(
                "test-wrap-ttl",
                || async { Ok(test_value()) },
                Some(0.1.into()),
            )
            .await
            .unwrap();
        assert_eq!(result, test_value());

        tokio::time::sleep(Duration::from_millis(200)).await;

        let result: Option<TestValue> = store.get("test-wrap-ttl").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_never_expires() {
        let store = MemoryStore::new(
            MemoryOptions::new(1000),
            CacheConfig::new().with_ttl(0.05),
        )
        .unwrap();

        // Per-call 0 overrides the short store default
        store
            .set("durable", &test_value(), Some(0.0.into()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let result: Option<TestValue> = store.get("durable").await.unwrap();
        assert_eq!(result, Some(test_value()));
    }

    #[tokio::test]
    async fn test_invalid_ttl_leaves_key_untouched() {
        let store = new_store();

        let result = store.set("test-key", &test_value(), Some((-1.0).into())).await;
        assert!(matches!(result, Err(CacheError::Validation { .. })));

        let stored: Option<TestValue> = store.get("test-key").await.unwrap();
        assert!(stored.is_none());

        let result: Result<TestValue, _> = store
            .wrap(
                "test-key",
                || async { Ok(test_value()) },
                Some(f64::NAN.into()),
            )
            .await;
        assert!(matches!(result, Err(CacheError::Validation { .. })));
        let stored: Option<TestValue> = store.get("test-key").await.unwrap();
        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn test_compute_failure_not_cached() {
        let store = new_store();

        let result: Result<TestValue, _> = store
            .wrap(
                "failing",
                || async { Err(CacheError::compute("For test")) },
                Some(0.0.into()),
            )
            .await;
        assert!(matches!(result, Err(CacheError::Compute { .. })));

        let stored: Option<TestValue> = store.get("failing").await.unwrap();
        assert!(stored.is_none());

        // A later wrap with a succeeding compute works normally
        let result: TestValue = store
            .wrap("failing", || async { Ok(test_value()) }, Some(0.0.into()))
            .await
            .unwrap();
        assert_eq!(result, test_value());
    }

    #[tokio::test]
    async fn test_falsy_values_are_hits() {
        let store = new_store();

        store.set("zero", &0, None).await.unwrap();
        store.set("empty", &"", None).await.unwrap();

        let zero: Option<i64> = store.get("zero").await.unwrap();
        assert_eq!(zero, Some(0));
        let empty: Option<String> = store.get("empty").await.unwrap();
        assert_eq!(empty, Some(String::new()));
    }

    #[tokio::test]
    async fn test_close_clears_entries() {
        let store = new_store();
        store.set("test-key", &test_value(), None).await.unwrap();

        store.close().await.unwrap();
        let result: Option<TestValue> = store.get("test-key").await.unwrap();
        assert!(result.is_none());

        // Idempotent
        store.close().await.unwrap();
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = MemoryStore::new(MemoryOptions::new(0), CacheConfig::new());
        assert!(matches!(result, Err(CacheError::Configuration { .. })));
    }
}

//! Outward-facing cache facade and backend selection

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::memo::{MemoConfig, MemoKey, MemoWithCacheConfig, Memoized};
use crate::stats::StatsSnapshot;
use crate::store::{MemoryOptions, MemoryStore, RedisConnection, RedisStore, Store, StoreExt};
use crate::ttl::Ttl;

/// Supported backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Redis,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Memory => write!(f, "memory"),
            StoreKind::Redis => write!(f, "redis"),
        }
    }
}

impl FromStr for StoreKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "redis" => Ok(StoreKind::Redis),
            _ => Err(CacheError::configuration(format!(
                "Unknown store kind: {}. Valid kinds: memory, redis",
                s
            ))),
        }
    }
}

/// Backend selection with its backend-specific construction options.
#[derive(Debug)]
pub enum StoreConfig {
    Memory(MemoryOptions),
    Redis(RedisConnection),
}

impl StoreConfig {
    pub fn kind(&self) -> StoreKind {
        match self {
            StoreConfig::Memory(_) => StoreKind::Memory,
            StoreConfig::Redis(_) => StoreKind::Redis,
        }
    }
}

/// Cache facade owning exactly one store, selected at construction.
///
/// All operations forward verbatim to the store; the compute-if-absent
/// semantics, TTL resolution and statistics live in the store layer.
#[derive(Debug, Clone)]
pub struct Cache {
    store: Arc<dyn Store>,
}

impl Cache {
    /// Builds the store selected by `store_config` and wraps it.
    pub async fn new(store_config: StoreConfig, config: CacheConfig) -> Result<Self, CacheError> {
        let store: Arc<dyn Store> = match store_config {
            StoreConfig::Memory(options) => Arc::new(MemoryStore::new(options, config)?),
            StoreConfig::Redis(connection) => {
                Arc::new(RedisStore::connect(connection, config).await?)
            }
        };
        Ok(Self { store })
    }

    /// Wraps an already-built store.
    pub fn from_store(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub async fn get<V>(&self, key: &str) -> Result<Option<V>, CacheError>
    where
        V: DeserializeOwned + Send,
    {
        self.store.get(key).await
    }

    pub async fn set<V>(&self, key: &str, value: &V, ttl: Option<Ttl>) -> Result<(), CacheError>
    where
        V: Serialize + Send + Sync,
    {
        self.store.set(key, value, ttl).await
    }

    pub async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.store.delete(key).await
    }

    /// Compute-if-absent through the selected store.
    pub async fn wrap<T, F, Fut>(
        &self,
        key: &str,
        compute: F,
        ttl: Option<Ttl>,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CacheError>> + Send + 'static,
    {
        self.store.wrap(key, compute, ttl).await
    }

    pub async fn close(&self) -> Result<(), CacheError> {
        self.store.close().await
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.store.stats()
    }

    /// Memoizes an async function with its own independent cache.
    pub fn memo<A, T, F, Fut>(f: F, config: MemoConfig) -> Memoized<A, T>
    where
        A: Clone + Hash + Eq + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, CacheError>> + Send + 'static,
    {
        Memoized::new(f, config)
    }

    /// Memoizes an async function and additionally persists its results
    /// through this cache's `wrap`: the memo layer absorbs hot repeats while
    /// the store keeps the value across memo expiry (and across processes
    /// for the Redis backend).
    pub fn memo_with_cache<A, T, F, Fut>(
        f: F,
        key: MemoKey<A>,
        cache: &Cache,
        options: MemoWithCacheConfig,
    ) -> Memoized<A, T>
    where
        A: Clone + Hash + Eq + Send + Sync + 'static,
        T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, CacheError>> + Send + 'static,
    {
        let store = Arc::clone(&cache.store);
        let f = Arc::new(f);
        let wrap_ttl = options.wrap_ttl;

        let through_store = move |arg: A| {
            let store = Arc::clone(&store);
            let f = Arc::clone(&f);
            let cache_key = key.derive(&arg);
            let ttl = wrap_ttl.clone();
            async move { store.wrap(&cache_key, move || f(arg), ttl).await }
        };

        Memoized::new(through_store, options.memo)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio_test::assert_ok;

    use super::*;

    async fn memory_cache() -> Cache {
        Cache::new(
            StoreConfig::Memory(MemoryOptions::new(1000)),
            CacheConfig::new(),
        )
        .await
        .unwrap()
    }

    #[test]
    fn test_store_kind_from_str() {
        assert_eq!("memory".parse::<StoreKind>().unwrap(), StoreKind::Memory);
        assert_eq!("redis".parse::<StoreKind>().unwrap(), StoreKind::Redis);
        assert_eq!("REDIS".parse::<StoreKind>().unwrap(), StoreKind::Redis);
    }

    #[test]
    fn test_store_kind_from_str_invalid() {
        let result = "invalid".parse::<StoreKind>();
        assert!(matches!(result, Err(CacheError::Configuration { .. })));
    }

    #[test]
    fn test_store_kind_display() {
        assert_eq!(StoreKind::Memory.to_string(), "memory");
        assert_eq!(StoreKind::Redis.to_string(), "redis");
    }

    #[test]
    fn test_store_config_kind() {
        let config = StoreConfig::Memory(MemoryOptions::new(10));
        assert_eq!(config.kind(), StoreKind::Memory);
        let config = StoreConfig::Redis("redis://localhost".into());
        assert_eq!(config.kind(), StoreKind::Redis);
    }

    #[tokio::test]
    async fn test_wrap_end_to_end() {
        let cache = memory_cache().await;

        let result: i32 = cache
            .wrap("a", || async { Ok(4) }, Some(0.0.into()))
            .await
            .unwrap();
        assert_eq!(result, 4);

        let stats = cache.stats();
        assert_eq!(stats["all"].call, 1);
        assert_eq!(stats["all"].hit, 0);
        assert_eq!(stats["all"].percent, 0.0);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let result: i32 = cache
            .wrap(
                "a",
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(4)
                },
                Some(0.0.into()),
            )
            .await
            .unwrap();
        assert_eq!(result, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let stats = cache.stats();
        assert_eq!(stats["all"].call, 2);
        assert_eq!(stats["all"].hit, 1);
        assert_eq!(stats["all"].percent, 0.5);
    }

    #[tokio::test]
    async fn test_facade_forwards_operations() {
        let cache = memory_cache().await;

        assert_ok!(cache.set("test-key", &vec![1, 2, 3], None).await);
        let result: Option<Vec<i32>> = cache.get("test-key").await.unwrap();
        assert_eq!(result, Some(vec![1, 2, 3]));

        cache.del("test-key").await.unwrap();
        let result: Option<Vec<i32>> = cache.get("test-key").await.unwrap();
        assert!(result.is_none());

        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_memo() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let memo = Cache::memo(
            move |n: i64| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(n * n) }
            },
            MemoConfig::new(),
        );

        assert_eq!(memo.call(1).await.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(memo.call(1).await.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(memo.call(2).await.unwrap(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_memo_with_cache_persists_through_store() {
        let cache = memory_cache().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let memo = Cache::memo_with_cache(
            move |n: i64| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(n * n) }
            },
            MemoKey::derived(|n: &i64| format!("test-memo:{}", n)),
            &cache,
            MemoWithCacheConfig::new().with_wrap_ttl(Ttl::seconds(10.0)),
        );

        assert_eq!(memo.call(2).await.unwrap(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The value went through the store under the derived key
        let stored: Option<i64> = cache.get("test-memo:2").await.unwrap();
        assert_eq!(stored, Some(4));

        // Memo layer hit; neither the function nor the store runs again
        assert_eq!(memo.call(2).await.unwrap(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_memo_with_cache_fixed_key() {
        let cache = memory_cache().await;

        let memo = Cache::memo_with_cache(
            |n: i64| async move { Ok(n + 1) },
            "fixed-key".into(),
            &cache,
            MemoWithCacheConfig::new(),
        );

        assert_eq!(memo.call(1).await.unwrap(), 2);
        let stored: Option<i64> = cache.get("fixed-key").await.unwrap();
        assert_eq!(stored, Some(2));
    }

    #[tokio::test]
    async fn test_memo_with_cache_reads_store_after_memo_expiry() {
        let cache = memory_cache().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let memo = Cache::memo_with_cache(
            move |n: i64| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(n * 10) }
            },
            MemoKey::derived(|n: &i64| format!("tens:{}", n)),
            &cache,
            MemoWithCacheConfig::new()
                .with_memo(MemoConfig::new().with_ttl(std::time::Duration::from_millis(50))),
        );

        assert_eq!(memo.call(3).await.unwrap(), 30);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        // Memo expired, but the store still holds the value
        assert_eq!(memo.call(3).await.unwrap(), 30);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats["all"].call, 2);
        assert_eq!(stats["all"].hit, 1);
    }
}

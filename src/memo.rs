//! Async function memoization
//!
//! [`Memoized`] wraps an async function with an independent moka cache keyed
//! by the call argument. Concurrent calls for the same argument share one
//! invocation. The memo cache is unrelated to the store layer; the two are
//! composed by [`Cache::memo_with_cache`](crate::Cache::memo_with_cache).

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use moka::future::Cache as MokaCache;

use crate::error::CacheError;
use crate::ttl::Ttl;

/// Options for a memoized function.
#[derive(Debug, Clone)]
pub struct MemoConfig {
    /// How long a memoized result stays valid. `None` keeps results until
    /// they are evicted by capacity.
    pub ttl: Option<Duration>,
    /// Maximum number of memoized arguments.
    pub max_capacity: u64,
}

impl Default for MemoConfig {
    fn default() -> Self {
        Self {
            ttl: None,
            max_capacity: 10_000,
        }
    }
}

impl MemoConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = capacity;
        self
    }
}

/// Cache key for the store layer underneath a memoized function: either one
/// fixed key, or a key derived from the call argument.
pub enum MemoKey<A> {
    Fixed(String),
    Derived(Arc<dyn Fn(&A) -> String + Send + Sync>),
}

impl<A> MemoKey<A> {
    pub fn fixed(key: impl Into<String>) -> Self {
        Self::Fixed(key.into())
    }

    pub fn derived<F>(f: F) -> Self
    where
        F: Fn(&A) -> String + Send + Sync + 'static,
    {
        Self::Derived(Arc::new(f))
    }

    pub(crate) fn derive(&self, arg: &A) -> String {
        match self {
            MemoKey::Fixed(key) => key.clone(),
            MemoKey::Derived(f) => f(arg),
        }
    }
}

impl<A> fmt::Debug for MemoKey<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoKey::Fixed(key) => f.debug_tuple("Fixed").field(key).finish(),
            MemoKey::Derived(_) => f.debug_tuple("Derived").field(&"<closure>").finish(),
        }
    }
}

impl<A> From<&str> for MemoKey<A> {
    fn from(key: &str) -> Self {
        Self::Fixed(key.to_string())
    }
}

impl<A> From<String> for MemoKey<A> {
    fn from(key: String) -> Self {
        Self::Fixed(key)
    }
}

/// Options for [`Cache::memo_with_cache`](crate::Cache::memo_with_cache).
#[derive(Debug, Default)]
pub struct MemoWithCacheConfig {
    /// Options for the memoized front layer.
    pub memo: MemoConfig,
    /// TTL override for the store-level `wrap` behind it.
    pub wrap_ttl: Option<Ttl>,
}

impl MemoWithCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memo(mut self, memo: MemoConfig) -> Self {
        self.memo = memo;
        self
    }

    pub fn with_wrap_ttl(mut self, ttl: Ttl) -> Self {
        self.wrap_ttl = Some(ttl);
        self
    }
}

/// A memoized async function.
pub struct Memoized<A, T> {
    cache: MokaCache<A, T>,
    func: Arc<dyn Fn(A) -> BoxFuture<'static, Result<T, CacheError>> + Send + Sync>,
}

impl<A, T> fmt::Debug for Memoized<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl<A, T> Memoized<A, T>
where
    A: Clone + Hash + Eq + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new<F, Fut>(f: F, config: MemoConfig) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, CacheError>> + Send + 'static,
    {
        let mut builder = MokaCache::builder().max_capacity(config.max_capacity);
        if let Some(ttl) = config.ttl {
            builder = builder.time_to_live(ttl);
        }
        Self {
            cache: builder.build(),
            func: Arc::new(move |arg| f(arg).boxed()),
        }
    }

    /// Invokes the function, returning a memoized result when one exists.
    /// Failures are not memoized; concurrent calls for the same argument
    /// share one invocation and its outcome.
    pub async fn call(&self, arg: A) -> Result<T, CacheError> {
        let func = Arc::clone(&self.func);
        let input = arg.clone();
        self.cache
            .try_get_with(arg, async move { func(input).await })
            .await
            .map_err(|e: Arc<CacheError>| (*e).clone())
    }

    /// Drops the memoized result for one argument.
    pub async fn forget(&self, arg: &A) {
        self.cache.invalidate(arg).await;
    }
}

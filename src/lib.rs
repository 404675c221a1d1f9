//! wrapcache
//!
//! A uniform caching layer over two interchangeable backends: a bounded
//! in-process store (moka) and Redis. Callers code against one [`Cache`]
//! facade (or the [`Store`] trait directly), so the backend is a
//! configuration decision, not a code-path decision.
//!
//! The centerpiece is [`Cache::wrap`], compute-if-absent with per-call TTL
//! overrides and hit/miss statistics. On the Redis backend, concurrent
//! `wrap` calls for the same key are coalesced onto a single in-flight
//! computation, so a cache-miss stampede costs one computation and one
//! write.
//!
//! ```no_run
//! use wrapcache::{Cache, CacheConfig, MemoryOptions, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), wrapcache::CacheError> {
//!     let cache = Cache::new(
//!         StoreConfig::Memory(MemoryOptions::new(1000)),
//!         CacheConfig::new().with_ttl(60.0),
//!     )
//!     .await?;
//!
//!     let user: String = cache
//!         .wrap("user:42", || async { Ok("alice".to_string()) }, None)
//!         .await?;
//!     assert_eq!(user, "alice");
//!
//!     println!("{:?}", cache.stats());
//!     cache.close().await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod memo;
pub mod stats;
pub mod store;
pub mod ttl;

pub use cache::{Cache, StoreConfig, StoreKind};
pub use config::{CacheConfig, CacheablePredicate};
pub use error::CacheError;
pub use memo::{MemoConfig, MemoKey, MemoWithCacheConfig, Memoized};
pub use stats::{GroupStats, StatsSnapshot, ALL_GROUP};
pub use store::{
    MemoryOptions, MemoryStore, RedisConnection, RedisOptions, RedisStore, Store, StoreExt,
};
pub use ttl::Ttl;

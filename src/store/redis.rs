//! Redis-backed store with per-key request coalescing
//!
//! Unlike the memory store, the gap between "check cache" and "populate
//! cache" spans a network round trip here, so concurrent `wrap` calls for
//! the same key are collapsed onto one shared in-flight computation.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use tracing::debug;

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::stats::{StatsRegistry, StatsSnapshot, ALL_GROUP};
use crate::ttl::{self, Ttl};

use super::{RawCompute, Store};

/// Structured connection options for the Redis backend.
#[derive(Debug, Clone)]
pub struct RedisOptions {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for RedisOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 0,
            username: None,
            password: None,
        }
    }
}

/// Connection specification for [`RedisStore`].
///
/// A pre-built handle is borrowed: the store never disconnects it, and its
/// lifecycle belongs to whoever constructed it. URL and options variants
/// produce a connection the store owns and drops on `close`.
pub enum RedisConnection {
    /// Existing connection handle, shared with the caller.
    Handle(ConnectionManager),
    /// Connection URL, e.g. `redis://127.0.0.1:6379/0`.
    Url(String),
    /// Structured host/port options.
    Options(RedisOptions),
}

impl fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedisConnection::Handle(_) => f.debug_tuple("Handle").field(&"<ConnectionManager>").finish(),
            RedisConnection::Url(url) => f.debug_tuple("Url").field(url).finish(),
            RedisConnection::Options(opts) => f.debug_tuple("Options").field(opts).finish(),
        }
    }
}

impl From<&str> for RedisConnection {
    fn from(url: &str) -> Self {
        Self::Url(url.to_string())
    }
}

impl From<String> for RedisConnection {
    fn from(url: String) -> Self {
        Self::Url(url)
    }
}

impl From<RedisOptions> for RedisConnection {
    fn from(options: RedisOptions) -> Self {
        Self::Options(options)
    }
}

impl From<ConnectionManager> for RedisConnection {
    fn from(manager: ConnectionManager) -> Self {
        Self::Handle(manager)
    }
}

/// Capability the store needs from the remote key-value service. Kept as a
/// seam so tests can substitute an in-process fake for the real connection.
#[async_trait]
trait RemoteClient: Send + Sync + fmt::Debug {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
    async fn set_with_expiry(&self, key: &str, value: &str, ttl_ms: u64)
        -> Result<(), CacheError>;
    async fn del(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Clone)]
struct RedisClientHandle {
    connection: ConnectionManager,
}

impl fmt::Debug for RedisClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisClientHandle")
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

#[async_trait]
impl RemoteClient for RedisClientHandle {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection.clone();
        let result: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| CacheError::backend(format!("Failed to get key '{}': {}", key, e)))?;
        Ok(result)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .set(key, value)
            .await
            .map_err(|e| CacheError::backend(format!("Failed to set key '{}': {}", key, e)))?;
        Ok(())
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl_ms: u64,
    ) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .pset_ex(key, value, ttl_ms)
            .await
            .map_err(|e| CacheError::backend(format!("Failed to set key '{}': {}", key, e)))?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .del(key)
            .await
            .map_err(|e| CacheError::backend(format!("Failed to delete key '{}': {}", key, e)))?;
        Ok(())
    }
}

/// A pending computation shared by every caller that arrived during the same
/// miss window. Settled results clone out to each waiter.
type Flight = Shared<BoxFuture<'static, Result<String, CacheError>>>;

/// Redis cache store.
pub struct RedisStore {
    client: Mutex<Option<Arc<dyn RemoteClient>>>,
    owns_client: bool,
    config: CacheConfig,
    prefix: String,
    stats: Arc<StatsRegistry>,
    in_flight: Arc<Mutex<HashMap<String, Flight>>>,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("config", &self.config)
            .field("owns_client", &self.owns_client)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl RedisStore {
    /// Creates a store from a connection specification.
    pub async fn connect(
        connection: RedisConnection,
        config: CacheConfig,
    ) -> Result<Self, CacheError> {
        config.validate()?;

        let (manager, owns_client) = match connection {
            RedisConnection::Handle(manager) => (manager, false),
            RedisConnection::Url(url) => {
                let client = Client::open(url.as_str()).map_err(|e| {
                    CacheError::configuration(format!("Invalid Redis URL '{}': {}", url, e))
                })?;
                let manager = ConnectionManager::new(client).await.map_err(|e| {
                    CacheError::backend(format!("Failed to connect to Redis: {}", e))
                })?;
                (manager, true)
            }
            RedisConnection::Options(options) => {
                let info = ConnectionInfo {
                    addr: ConnectionAddr::Tcp(options.host.clone(), options.port),
                    redis: RedisConnectionInfo {
                        db: options.db,
                        username: options.username.clone(),
                        password: options.password.clone(),
                        ..Default::default()
                    },
                };
                let client = Client::open(info).map_err(|e| {
                    CacheError::configuration(format!("Invalid Redis options: {}", e))
                })?;
                let manager = ConnectionManager::new(client).await.map_err(|e| {
                    CacheError::backend(format!("Failed to connect to Redis: {}", e))
                })?;
                (manager, true)
            }
        };

        Ok(Self::with_client(
            Arc::new(RedisClientHandle { connection: manager }),
            owns_client,
            config,
        ))
    }

    fn with_client(client: Arc<dyn RemoteClient>, owns_client: bool, config: CacheConfig) -> Self {
        let prefix = config.prefix.clone().unwrap_or_default();
        Self {
            client: Mutex::new(Some(client)),
            owns_client,
            config,
            prefix,
            stats: Arc::new(StatsRegistry::new()),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn client(&self) -> Result<Arc<dyn RemoteClient>, CacheError> {
        self.client
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| CacheError::backend("store is closed"))
    }

    /// The prefix is a storage-layer detail only: it is applied right before
    /// each remote call and never reaches stats or the in-flight table.
    fn prefixed(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }

    async fn write(
        client: &Arc<dyn RemoteClient>,
        prefixed_key: &str,
        value: &str,
        secs: f64,
    ) -> Result<(), CacheError> {
        if secs > 0.0 {
            let ttl_ms = (secs * 1000.0).round() as u64;
            client.set_with_expiry(prefixed_key, value, ttl_ms).await
        } else {
            client.set(prefixed_key, value).await
        }
    }

    /// Builds the shared computation for a cache miss. The returned flight
    /// removes its own in-flight entry as its final step, on success and on
    /// failure alike, so the key is always eligible for a fresh attempt once
    /// the result has settled.
    fn launch(
        client: Arc<dyn RemoteClient>,
        stats: Arc<StatsRegistry>,
        in_flight: Arc<Mutex<HashMap<String, Flight>>>,
        key: String,
        prefixed_key: String,
        config: CacheConfig,
        secs: f64,
        compute: RawCompute,
    ) -> Flight {
        let fut = async move {
            let result: Result<String, CacheError> = async {
                if let Some(raw) = client.get(&prefixed_key).await? {
                    stats.record_hit(ALL_GROUP);
                    debug!(key = %key, "redis cache hit");
                    return Ok(raw);
                }

                let raw = compute().await?;
                if config.need_cache(&raw) {
                    Self::write(&client, &prefixed_key, &raw, secs).await?;
                }
                Ok(raw)
            }
            .await;

            in_flight.lock().unwrap().remove(&key);
            result
        };
        fut.boxed().shared()
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        let client = self.client()?;
        client.get(&self.prefixed(key)).await
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Option<&Ttl>) -> Result<(), CacheError> {
        let secs = ttl::resolve(self.config.ttl, ttl)?;
        let client = self.client()?;
        Self::write(&client, &self.prefixed(key), value, secs).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let client = self.client()?;
        client.del(&self.prefixed(key)).await
    }

    async fn wrap_raw(
        &self,
        key: &str,
        compute: RawCompute,
        ttl: Option<&Ttl>,
    ) -> Result<String, CacheError> {
        self.stats.record_call(ALL_GROUP);
        let secs = ttl::resolve(self.config.ttl, ttl)?;
        let client = self.client()?;

        let flight = {
            // Check-then-publish must be atomic: no await happens while the
            // lock is held, so two callers can never both miss the table and
            // launch independent computations for the same key.
            let mut in_flight = self.in_flight.lock().unwrap();
            match in_flight.get(key) {
                Some(existing) => {
                    self.stats.record_hit(ALL_GROUP);
                    debug!(key = %key, "joining in-flight computation");
                    existing.clone()
                }
                None => {
                    let flight = Self::launch(
                        client,
                        Arc::clone(&self.stats),
                        Arc::clone(&self.in_flight),
                        key.to_string(),
                        self.prefixed(key),
                        self.config.clone(),
                        secs,
                        compute,
                    );
                    in_flight.insert(key.to_string(), flight.clone());
                    flight
                }
            }
        };

        flight.await
    }

    async fn close(&self) -> Result<(), CacheError> {
        if self.owns_client {
            // Dropping the last handle disconnects; a borrowed connection is
            // left to its owner.
            self.client.lock().unwrap().take();
        }
        Ok(())
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

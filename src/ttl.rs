//! Time-to-live resolution
//!
//! A per-call TTL is either a fixed number of seconds or a zero-argument
//! closure evaluated when the operation begins, before any compute or I/O.
//! `None` falls back to the store default;
//! an explicit `Ttl::Seconds(0.0)` disables expiry even when the store
//! default is non-zero.

use std::fmt;
use std::sync::Arc;

use crate::error::CacheError;

/// Per-call TTL override, in seconds. Zero means "never expires".
#[derive(Clone)]
pub enum Ttl {
    /// Fixed number of seconds.
    Seconds(f64),
    /// Computed when the operation begins.
    Dynamic(Arc<dyn Fn() -> f64 + Send + Sync>),
}

impl Ttl {
    /// Fixed TTL in seconds.
    pub fn seconds(secs: f64) -> Self {
        Self::Seconds(secs)
    }

    /// TTL produced by a closure evaluated when the operation begins.
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(f))
    }
}

impl fmt::Debug for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ttl::Seconds(secs) => f.debug_tuple("Seconds").field(secs).finish(),
            Ttl::Dynamic(_) => f.debug_tuple("Dynamic").field(&"<closure>").finish(),
        }
    }
}

impl From<f64> for Ttl {
    fn from(secs: f64) -> Self {
        Self::Seconds(secs)
    }
}

impl From<u64> for Ttl {
    fn from(secs: u64) -> Self {
        Self::Seconds(secs as f64)
    }
}

impl From<u32> for Ttl {
    fn from(secs: u32) -> Self {
        Self::Seconds(f64::from(secs))
    }
}

/// Resolves the effective TTL in seconds from the store default and an
/// optional per-call override.
pub(crate) fn resolve(default_secs: f64, override_ttl: Option<&Ttl>) -> Result<f64, CacheError> {
    let secs = match override_ttl {
        None => default_secs,
        Some(Ttl::Seconds(secs)) => *secs,
        Some(Ttl::Dynamic(f)) => f(),
    };

    if !secs.is_finite() || secs < 0.0 {
        return Err(CacheError::validation(format!(
            "TTL must be a finite number of seconds >= 0, got {}",
            secs
        )));
    }

    Ok(secs)
}

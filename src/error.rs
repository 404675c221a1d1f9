use thiserror::Error;

/// Errors surfaced by the caching layer.
///
/// Variants carry owned messages so a settled result can be cloned to every
/// caller coalesced onto the same in-flight computation.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Backend error: {message}")]
    Backend { message: String },

    #[error("Compute failed: {message}")]
    Compute { message: String },
}

impl CacheError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn compute(message: impl Into<String>) -> Self {
        Self::Compute {
            message: message.into(),
        }
    }

    /// True for errors raised by a caller-supplied compute function.
    pub fn is_compute(&self) -> bool {
        matches!(self, Self::Compute { .. })
    }
}

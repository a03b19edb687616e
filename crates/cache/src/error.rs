//! Error types for the texture cache crate.

use tracing::warn;

/// Errors raised while the cache releases values it owned.
///
/// A failing `dispose()` never leaves the cache in an inconsistent state: the
/// entry is already gone from both the key map and the recency list before
/// its value is released. The enclosing operation always runs to completion
/// and reports the failure afterwards.
#[derive(Debug, thiserror::Error)]
pub enum CacheError<E>
where
    E: std::error::Error + 'static,
{
    /// Releasing a single value failed.
    #[error("failed to dispose cached value for key `{key}`")]
    Dispose {
        key: String,
        #[source]
        source: E,
    },

    /// Several values failed to release during one operation.
    ///
    /// Only the first failure is kept; the others were logged.
    #[error("failed to dispose {failed} cached values (first failure: `{first_key}`)")]
    DisposeMany {
        first_key: String,
        failed: usize,
        #[source]
        source: E,
    },
}

impl<E> CacheError<E>
where
    E: std::error::Error + 'static,
{
    /// Key of the (first) entry whose value failed to release.
    pub fn key(&self) -> &str {
        match self {
            CacheError::Dispose { key, .. } => key,
            CacheError::DisposeMany { first_key, .. } => first_key,
        }
    }

    /// Number of values that failed to release.
    pub fn failed(&self) -> usize {
        match self {
            CacheError::Dispose { .. } => 1,
            CacheError::DisposeMany { failed, .. } => *failed,
        }
    }
}

/// Errors that can occur while building or loading a [`CacheConfig`](crate::CacheConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration value could not be parsed
    #[error("invalid value `{value}` for configuration key {key}")]
    InvalidValue { key: String, value: String },

    /// The configuration parsed but describes an unusable cache
    #[error("invalid cache configuration: {0}")]
    Invalid(String),

    /// I/O error reading or writing a configuration file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration file
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors produced by [`GpuTexture`](crate::GpuTexture).
#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error("texture has zero extent ({width}x{height})")]
    ZeroSized { width: u32, height: u32 },

    /// The backend reported a failure while releasing the GPU resource
    #[error("failed to release texture: {0}")]
    Release(String),
}

/// Collects dispose failures while an operation finishes its bookkeeping.
pub(crate) struct DisposeFailures<E> {
    first: Option<(String, E)>,
    failed: usize,
}

impl<E> DisposeFailures<E>
where
    E: std::error::Error + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            first: None,
            failed: 0,
        }
    }

    pub(crate) fn record(&mut self, key: String, source: E) {
        warn!(key = %key, error = %source, "Failed to dispose cached texture");
        self.failed += 1;
        if self.first.is_none() {
            self.first = Some((key, source));
        }
    }

    pub(crate) fn into_result(self) -> Result<(), CacheError<E>> {
        match self.first {
            None => Ok(()),
            Some((key, source)) if self.failed == 1 => Err(CacheError::Dispose { key, source }),
            Some((first_key, source)) => Err(CacheError::DisposeMany {
                first_key,
                failed: self.failed,
                source,
            }),
        }
    }
}

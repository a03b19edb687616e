//! The release contract every cached value satisfies.

use std::convert::Infallible;

/// A resource that must be explicitly released, such as a GPU texture.
///
/// `dispose` consumes the value, so a value can be released at most once.
/// The cache takes ownership on insertion and calls `dispose` exactly once
/// when the value is evicted, replaced, deleted, cleared, or when the cache
/// itself is dropped.
pub trait Disposable {
    /// Error reported by a failed release.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Release the underlying resource.
    fn dispose(self) -> Result<(), Self::Error>;
}

/// Plain CPU-side pixel buffers need no explicit release.
impl Disposable for Vec<u8> {
    type Error = Infallible;

    fn dispose(self) -> Result<(), Infallible> {
        Ok(())
    }
}

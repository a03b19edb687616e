//! GPU texture resources stored in the cache.
//!
//! A [`GpuTexture`] wraps a platform-specific texture handle (WebGL, wgpu,
//! Metal, ...) together with the metadata needed to estimate its VRAM
//! footprint. The backend supplies a release hook that frees the GPU-side
//! resource when the cache disposes the texture.

use std::any::Any;
use std::fmt;

use crate::dispose::Disposable;
use crate::error::{CacheError, TextureError};
use crate::lru::LruTextureCache;

/// Pixel format of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    R8,
    Rg8,
    Rgba8,
    Rgba16F,
    Rgba32F,
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            TextureFormat::R8 => 1,
            TextureFormat::Rg8 => 2,
            TextureFormat::Rgba8 => 4,
            TextureFormat::Rgba16F => 8,
            TextureFormat::Rgba32F => 16,
        }
    }
}

/// Texture dimensions and format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureMetadata {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    pub format: TextureFormat,
    /// Whether a full mip chain is allocated
    pub mipmapped: bool,
}

impl TextureMetadata {
    pub fn new(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            format,
            mipmapped: false,
        }
    }

    pub fn with_mipmaps(mut self) -> Self {
        self.mipmapped = true;
        self
    }

    /// Estimated VRAM usage in bytes.
    ///
    /// A full mip chain adds roughly one third on top of the base level.
    pub fn estimated_memory(&self) -> usize {
        let base = self.width as usize * self.height as usize * self.format.bytes_per_pixel();
        if self.mipmapped {
            base + base / 3
        } else {
            base
        }
    }
}

type ReleaseHook =
    Box<dyn FnOnce(TextureMetadata, Box<dyn Any + Send>) -> Result<(), TextureError> + Send>;

/// GPU texture handle
///
/// Owns an opaque backend handle. Disposing the texture hands the handle to
/// the release hook, if one was installed; otherwise the handle is dropped.
pub struct GpuTexture {
    metadata: TextureMetadata,
    handle: Box<dyn Any + Send>,
    release: Option<ReleaseHook>,
}

impl GpuTexture {
    /// Wrap a backend texture handle.
    ///
    /// # Errors
    ///
    /// Returns [`TextureError::ZeroSized`] if either dimension is zero.
    pub fn new<H: Any + Send>(handle: H, metadata: TextureMetadata) -> Result<Self, TextureError> {
        if metadata.width == 0 || metadata.height == 0 {
            return Err(TextureError::ZeroSized {
                width: metadata.width,
                height: metadata.height,
            });
        }

        Ok(Self {
            metadata,
            handle: Box::new(handle),
            release: None,
        })
    }

    /// Install the hook that frees the GPU-side resource.
    ///
    /// The hook receives the texture metadata and the boxed backend handle.
    pub fn with_release<F>(mut self, release: F) -> Self
    where
        F: FnOnce(TextureMetadata, Box<dyn Any + Send>) -> Result<(), TextureError> + Send + 'static,
    {
        self.release = Some(Box::new(release));
        self
    }

    pub fn metadata(&self) -> TextureMetadata {
        self.metadata
    }

    pub fn width(&self) -> u32 {
        self.metadata.width
    }

    pub fn height(&self) -> u32 {
        self.metadata.height
    }

    /// Estimated VRAM usage in bytes
    pub fn estimated_memory(&self) -> usize {
        self.metadata.estimated_memory()
    }

    /// Get a reference to the underlying texture handle
    ///
    /// Returns `None` if the type doesn't match.
    pub fn handle<H: 'static>(&self) -> Option<&H> {
        self.handle.downcast_ref::<H>()
    }
}

impl Disposable for GpuTexture {
    type Error = TextureError;

    fn dispose(self) -> Result<(), TextureError> {
        match self.release {
            Some(release) => release(self.metadata, self.handle),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuTexture")
            .field("metadata", &self.metadata)
            .field("has_release_hook", &self.release.is_some())
            .finish()
    }
}

impl LruTextureCache<GpuTexture> {
    /// Store a texture, charging its estimated VRAM usage.
    pub fn set_texture(
        &mut self,
        key: impl Into<String>,
        texture: GpuTexture,
    ) -> Result<(), CacheError<TextureError>> {
        let memory_size = texture.estimated_memory();
        self.set(key, texture, Some(memory_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, PartialEq)]
    struct MockHandle {
        id: u32,
    }

    fn counting_texture(id: u32, size: u32, released: &Arc<AtomicU32>) -> GpuTexture {
        let released = Arc::clone(released);
        GpuTexture::new(MockHandle { id }, TextureMetadata::new(size, size, TextureFormat::Rgba8))
            .unwrap()
            .with_release(move |_, handle| {
                assert!(handle.downcast_ref::<MockHandle>().is_some());
                released.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
    }

    #[test]
    fn test_bytes_per_pixel() {
        assert_eq!(TextureFormat::R8.bytes_per_pixel(), 1);
        assert_eq!(TextureFormat::Rg8.bytes_per_pixel(), 2);
        assert_eq!(TextureFormat::Rgba8.bytes_per_pixel(), 4);
        assert_eq!(TextureFormat::Rgba16F.bytes_per_pixel(), 8);
        assert_eq!(TextureFormat::Rgba32F.bytes_per_pixel(), 16);
    }

    #[test]
    fn test_estimated_memory() {
        let metadata = TextureMetadata::new(256, 256, TextureFormat::Rgba8);
        assert_eq!(metadata.estimated_memory(), 256 * 256 * 4);

        let mipmapped = metadata.with_mipmaps();
        assert_eq!(mipmapped.estimated_memory(), 256 * 256 * 4 + 256 * 256 * 4 / 3);
    }

    #[test]
    fn test_zero_sized_texture_rejected() {
        let result = GpuTexture::new((), TextureMetadata::new(0, 64, TextureFormat::R8));
        assert!(matches!(
            result,
            Err(TextureError::ZeroSized { width: 0, height: 64 })
        ));
    }

    #[test]
    fn test_handle_downcast() {
        let texture = GpuTexture::new(
            MockHandle { id: 42 },
            TextureMetadata::new(16, 8, TextureFormat::Rg8),
        )
        .unwrap();

        assert_eq!(texture.handle::<MockHandle>(), Some(&MockHandle { id: 42 }));
        assert!(texture.handle::<String>().is_none());
        assert_eq!(texture.width(), 16);
        assert_eq!(texture.height(), 8);
    }

    #[test]
    fn test_dispose_without_hook() {
        let texture =
            GpuTexture::new(7u64, TextureMetadata::new(4, 4, TextureFormat::R8)).unwrap();
        assert!(texture.dispose().is_ok());
    }

    #[test]
    fn test_release_hook_error() {
        let texture = GpuTexture::new((), TextureMetadata::new(4, 4, TextureFormat::R8))
            .unwrap()
            .with_release(|_, _| Err(TextureError::Release("context lost".to_string())));

        let err = texture.dispose().unwrap_err();
        assert_eq!(err.to_string(), "failed to release texture: context lost");
    }

    #[test]
    fn test_set_texture_charges_estimated_memory() {
        let released = Arc::new(AtomicU32::new(0));
        // Room for two 256x256 RGBA textures
        let mut cache = LruTextureCache::with_limits(100, 512 * 1024);

        cache.set_texture("1", counting_texture(1, 256, &released)).unwrap();
        assert_eq!(cache.memory_usage(), 256 * 256 * 4);

        cache.set_texture("2", counting_texture(2, 256, &released)).unwrap();
        cache.set_texture("3", counting_texture(3, 256, &released)).unwrap();

        assert!(!cache.has("1"));
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(cache.memory_usage(), 2 * 256 * 256 * 4);

        let texture = cache.get("3").unwrap();
        assert_eq!(texture.handle::<MockHandle>().map(|h| h.id), Some(3));

        drop(cache);
        assert_eq!(released.load(Ordering::SeqCst), 3);
    }
}

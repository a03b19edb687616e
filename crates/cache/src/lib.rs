//! CAD Viewer Cache Library
//!
//! Texture cache for the 3D viewer: a count- and memory-bounded LRU cache
//! that releases every GPU resource it owns exactly once.

pub mod config;
pub mod dispose;
pub mod error;
pub mod lru;
pub mod shared;
pub mod texture;

pub use config::CacheConfig;
pub use dispose::Disposable;
pub use error::{CacheError, ConfigError, TextureError};
pub use lru::{CacheStats, Keys, LruTextureCache};
pub use shared::SharedTextureCache;
pub use texture::{GpuTexture, TextureFormat, TextureMetadata};

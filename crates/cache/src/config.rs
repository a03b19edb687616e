//! Texture cache configuration.
//!
//! A configuration can be created programmatically, loaded from environment
//! variables, or loaded from a JSON file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default maximum number of cached textures.
pub const DEFAULT_MAX_SIZE: usize = 100;

/// Default aggregate memory limit (50 MB).
pub const DEFAULT_MAX_MEMORY: usize = 50 * 1024 * 1024;

/// Memory charged to an entry inserted without an explicit size (64 KB).
pub const DEFAULT_TEXTURE_MEMORY: usize = 64 * 1024;

const ENV_MAX_SIZE: &str = "CAD_VIEWER_TEXTURE_CACHE_MAX_SIZE";
const ENV_MAX_MEMORY_MB: &str = "CAD_VIEWER_TEXTURE_CACHE_MAX_MEMORY_MB";
const ENV_DEFAULT_TEXTURE_KB: &str = "CAD_VIEWER_TEXTURE_CACHE_DEFAULT_TEXTURE_KB";

/// Limits for an [`LruTextureCache`](crate::LruTextureCache).
///
/// Missing fields in a configuration file take their default values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries
    pub max_size: usize,
    /// Maximum aggregate memory in bytes; 0 means unlimited
    pub max_memory: usize,
    /// Bytes charged to an entry when the caller gives no size
    pub default_texture_memory: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            max_memory: DEFAULT_MAX_MEMORY,
            default_texture_memory: DEFAULT_TEXTURE_MEMORY,
        }
    }
}

impl CacheConfig {
    /// Creates a configuration with explicit entry and byte limits.
    pub fn new(max_size: usize, max_memory: usize) -> Self {
        Self {
            max_size,
            max_memory,
            ..Default::default()
        }
    }

    /// Sets the maximum number of entries.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Sets the memory limit in bytes (0 = unlimited).
    pub fn with_max_memory(mut self, bytes: usize) -> Self {
        self.max_memory = bytes;
        self
    }

    /// Sets the memory limit in megabytes (0 = unlimited).
    pub fn with_max_memory_mb(mut self, mb: usize) -> Self {
        self.max_memory = mb * 1024 * 1024;
        self
    }

    /// Sets the memory charged to entries inserted without a size.
    pub fn with_default_texture_memory(mut self, bytes: usize) -> Self {
        self.default_texture_memory = bytes;
        self
    }

    /// Returns true when no memory limit is enforced.
    pub fn is_memory_unlimited(&self) -> bool {
        self.max_memory == 0
    }

    /// Checks that the configuration describes a usable cache.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] when `max_size` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::Invalid("max_size must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CAD_VIEWER_TEXTURE_CACHE_MAX_SIZE`: entry limit (default: 100)
    /// - `CAD_VIEWER_TEXTURE_CACHE_MAX_MEMORY_MB`: memory limit in MB, 0 for unlimited (default: 50)
    /// - `CAD_VIEWER_TEXTURE_CACHE_DEFAULT_TEXTURE_KB`: default entry charge in KB (default: 64)
    ///
    /// # Errors
    /// Returns an error if any variable holds an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(max_size) = env_usize(ENV_MAX_SIZE)? {
            config.max_size = max_size;
        }
        if let Some(mb) = env_usize(ENV_MAX_MEMORY_MB)? {
            config.max_memory = mb * 1024 * 1024;
        }
        if let Some(kb) = env_usize(ENV_DEFAULT_TEXTURE_KB)? {
            config.default_texture_memory = kb * 1024;
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    ///
    /// ```json
    /// { "max_size": 200, "max_memory": 104857600, "default_texture_memory": 65536 }
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a JSON file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }
}

fn env_usize(name: &str) -> Result<Option<usize>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: name.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const ALL_VARS: [&str; 3] = [ENV_MAX_SIZE, ENV_MAX_MEMORY_MB, ENV_DEFAULT_TEXTURE_KB];

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.max_size, 100);
        assert_eq!(config.max_memory, 52_428_800);
        assert_eq!(config.default_texture_memory, 65_536);
        assert!(!config.is_memory_unlimited());
    }

    #[test]
    fn test_builder_methods() {
        let config = CacheConfig::default()
            .with_max_size(8)
            .with_max_memory_mb(4)
            .with_default_texture_memory(1024);

        assert_eq!(config.max_size, 8);
        assert_eq!(config.max_memory, 4 * 1024 * 1024);
        assert_eq!(config.default_texture_memory, 1024);

        let unlimited = CacheConfig::new(3, 0);
        assert!(unlimited.is_memory_unlimited());
        assert_eq!(unlimited.default_texture_memory, DEFAULT_TEXTURE_MEMORY);
    }

    #[test]
    fn test_validate_rejects_zero_size() {
        let config = CacheConfig::default().with_max_size(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert!(CacheConfig::default().validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        let _guard = EnvGuard::new(&ALL_VARS);

        env::set_var(ENV_MAX_SIZE, "25");
        env::set_var(ENV_MAX_MEMORY_MB, "0");
        env::set_var(ENV_DEFAULT_TEXTURE_KB, "16");

        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.max_size, 25);
        assert_eq!(config.max_memory, 0);
        assert_eq!(config.default_texture_memory, 16 * 1024);
    }

    #[test]
    #[serial]
    fn test_from_env_partial() {
        let _guard = EnvGuard::new(&ALL_VARS);

        env::remove_var(ENV_MAX_MEMORY_MB);
        env::remove_var(ENV_DEFAULT_TEXTURE_KB);
        env::set_var(ENV_MAX_SIZE, "12");

        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.max_size, 12);
        assert_eq!(config.max_memory, DEFAULT_MAX_MEMORY);
        assert_eq!(config.default_texture_memory, DEFAULT_TEXTURE_MEMORY);
    }

    #[test]
    #[serial]
    fn test_from_env_invalid() {
        let _guard = EnvGuard::new(&ALL_VARS);

        env::set_var(ENV_MAX_MEMORY_MB, "lots");
        match CacheConfig::from_env() {
            Err(ConfigError::InvalidValue { key, value }) => {
                assert_eq!(key, ENV_MAX_MEMORY_MB);
                assert_eq!(value, "lots");
            }
            other => panic!("expected InvalidValue, got {:?}", other),
        }

        env::remove_var(ENV_MAX_MEMORY_MB);
        env::set_var(ENV_MAX_SIZE, "0");
        assert!(matches!(
            CacheConfig::from_env(),
            Err(ConfigError::Invalid(_))
        ));
    }

    // Saves and restores environment variables around a test
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(var_names: &[&str]) -> Self {
            let vars = var_names
                .iter()
                .map(|name| (name.to_string(), env::var(name).ok()))
                .collect();
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn test_file_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("texture_cache.json");

        let config = CacheConfig::new(42, 8 * 1024 * 1024).with_default_texture_memory(4096);
        config.save_to_file(&path).unwrap();

        let loaded = CacheConfig::from_file(&path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_file_partial_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        fs::write(&path, r#"{ "max_size": 7 }"#).unwrap();

        let loaded = CacheConfig::from_file(&path).unwrap();
        assert_eq!(loaded.max_size, 7);
        assert_eq!(loaded.max_memory, DEFAULT_MAX_MEMORY);
    }

    #[test]
    fn test_file_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = CacheConfig::from_file(dir.path().join("missing.json"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));

        let garbage = dir.path().join("garbage.json");
        fs::write(&garbage, "max_size = 3").unwrap();
        assert!(matches!(
            CacheConfig::from_file(&garbage),
            Err(ConfigError::Serde(_))
        ));
    }
}

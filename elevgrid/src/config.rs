//! Store configuration.

use std::path::{Path, PathBuf};

use crate::error::{CoverageError, Result};

/// Where the GeoPackage lives and how much to keep open and cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    gpkg_path: PathBuf,
    pool_size: u32,
    cache_size: u64,
}

impl StoreConfig {
    /// Pooled connections for file databases.
    pub const DEFAULT_POOL_SIZE: u32 = 4;
    /// Decoded tiles kept per sampler.
    pub const DEFAULT_CACHE_SIZE: u64 = 64;

    pub fn new<P: AsRef<Path>>(gpkg_path: P) -> Self {
        StoreConfigBuilder::new(gpkg_path).build()
    }

    pub fn builder<P: AsRef<Path>>(gpkg_path: P) -> StoreConfigBuilder {
        StoreConfigBuilder::new(gpkg_path)
    }

    pub fn gpkg_path(&self) -> &Path {
        &self.gpkg_path
    }

    pub fn pool_size(&self) -> u32 {
        self.pool_size
    }

    pub fn cache_size(&self) -> u64 {
        self.cache_size
    }
}

/// Builder for [`StoreConfig`].
///
/// # Example
///
/// ```
/// use elevgrid::StoreConfig;
///
/// let config = StoreConfig::builder("/data/terrain.gpkg")
///     .pool_size(8)
///     .cache_size(256)
///     .build();
/// assert_eq!(config.pool_size(), 8);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfigBuilder {
    gpkg_path: PathBuf,
    pool_size: u32,
    cache_size: u64,
}

impl StoreConfigBuilder {
    pub fn new<P: AsRef<Path>>(gpkg_path: P) -> Self {
        Self {
            gpkg_path: gpkg_path.as_ref().to_path_buf(),
            pool_size: StoreConfig::DEFAULT_POOL_SIZE,
            cache_size: StoreConfig::DEFAULT_CACHE_SIZE,
        }
    }

    /// Create a builder configured from environment variables.
    ///
    /// # Environment Variables
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `ELEVGRID_GPKG` | Path of the GeoPackage | Required |
    /// | `ELEVGRID_POOL_SIZE` | Pooled SQLite connections | 4 |
    /// | `ELEVGRID_CACHE_SIZE` | Decoded tiles kept per sampler | 64 |
    ///
    /// Unparseable numbers fall back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `ELEVGRID_GPKG` is not set.
    pub fn from_env() -> Result<Self> {
        let gpkg_path = std::env::var("ELEVGRID_GPKG").map_err(|_| {
            CoverageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "ELEVGRID_GPKG environment variable not set",
            ))
        })?;

        let pool_size = std::env::var("ELEVGRID_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(StoreConfig::DEFAULT_POOL_SIZE);
        let cache_size = std::env::var("ELEVGRID_CACHE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(StoreConfig::DEFAULT_CACHE_SIZE);

        Ok(Self {
            gpkg_path: PathBuf::from(gpkg_path),
            pool_size,
            cache_size,
        })
    }

    pub fn gpkg_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.gpkg_path = path.as_ref().to_path_buf();
        self
    }

    /// Connections in the pool; at least one is always opened.
    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size.max(1);
        self
    }

    pub fn cache_size(mut self, size: u64) -> Self {
        self.cache_size = size;
        self
    }

    pub fn build(self) -> StoreConfig {
        StoreConfig {
            gpkg_path: self.gpkg_path,
            pool_size: self.pool_size,
            cache_size: self.cache_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::new("terrain.gpkg");
        assert_eq!(config.gpkg_path(), Path::new("terrain.gpkg"));
        assert_eq!(config.pool_size(), 4);
        assert_eq!(config.cache_size(), 64);
    }

    #[test]
    fn test_builder_overrides() {
        let config = StoreConfig::builder("a.gpkg")
            .gpkg_path("b.gpkg")
            .pool_size(0)
            .cache_size(10)
            .build();
        assert_eq!(config.gpkg_path(), Path::new("b.gpkg"));
        assert_eq!(config.pool_size(), 1);
        assert_eq!(config.cache_size(), 10);
    }

    // one test touches the environment so parallel tests cannot race on it
    #[test]
    fn test_from_env() {
        std::env::remove_var("ELEVGRID_GPKG");
        assert!(matches!(
            StoreConfigBuilder::from_env(),
            Err(CoverageError::Io(_))
        ));

        std::env::set_var("ELEVGRID_GPKG", "/tmp/env.gpkg");
        std::env::set_var("ELEVGRID_POOL_SIZE", "2");
        std::env::set_var("ELEVGRID_CACHE_SIZE", "not a number");
        let config = StoreConfigBuilder::from_env().unwrap().build();
        assert_eq!(config.gpkg_path(), Path::new("/tmp/env.gpkg"));
        assert_eq!(config.pool_size(), 2);
        assert_eq!(config.cache_size(), 64);

        std::env::remove_var("ELEVGRID_GPKG");
        std::env::remove_var("ELEVGRID_POOL_SIZE");
        std::env::remove_var("ELEVGRID_CACHE_SIZE");
    }
}

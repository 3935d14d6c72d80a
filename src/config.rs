//! Configuration for layered-vfs.
//!
//! This module provides the settings resolvers are built from: cache
//! capacities and whether the built-in helpers are registered.
//! Use [`ConfigBuilder`] at application startup to configure the global
//! resolver, or pass a built [`Config`] to [`Resolver::with_config`].
//!
//! [`Resolver::with_config`]: crate::resolver::Resolver::with_config

use std::sync::OnceLock;

/// Global configuration, initialized via [`ConfigBuilder::init`].
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Default number of idle file objects kept in the cache.
pub const DEFAULT_MAX_FILE_OBJECTS: usize = 128;

/// Default number of idle file systems kept in the cache.
pub const DEFAULT_MAX_FILE_SYSTEMS: usize = 16;

/// Default cap on the decompressed size of one compressed stream (1 GiB).
pub const DEFAULT_MAX_DECOMPRESSED_SIZE: u64 = 1 << 30;

/// Runtime configuration for resolvers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Idle file objects kept before the least recently used is evicted.
    pub max_file_objects: usize,
    /// Idle file systems kept before the least recently used is evicted.
    pub max_file_systems: usize,
    /// Register the `OS`, `DATA_RANGE` and `GZIP` helpers on new resolvers.
    pub builtin_helpers: bool,
    /// Largest stream the built-in `GZIP` helper decompresses into memory.
    pub max_decompressed_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_file_objects: DEFAULT_MAX_FILE_OBJECTS,
            max_file_systems: DEFAULT_MAX_FILE_SYSTEMS,
            builtin_helpers: true,
            max_decompressed_size: DEFAULT_MAX_DECOMPRESSED_SIZE,
        }
    }
}

/// Configuration builder for fluent API.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    max_file_objects: Option<usize>,
    max_file_systems: Option<usize>,
    builtin_helpers: Option<bool>,
    max_decompressed_size: Option<u64>,
}

impl ConfigBuilder {
    /// Create a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how many idle file objects the cache keeps.
    ///
    /// Default: 128. Referenced entries are never evicted, so the cache can
    /// temporarily hold more.
    ///
    /// # Example
    ///
    /// ```
    /// use layered_vfs::config::ConfigBuilder;
    ///
    /// let config = ConfigBuilder::new().max_file_objects(512).build();
    /// assert_eq!(config.max_file_objects, 512);
    /// ```
    pub fn max_file_objects(mut self, capacity: usize) -> Self {
        self.max_file_objects = Some(capacity);
        self
    }

    /// Set how many idle file systems the cache keeps.
    ///
    /// Default: 16
    pub fn max_file_systems(mut self, capacity: usize) -> Self {
        self.max_file_systems = Some(capacity);
        self
    }

    /// Enable or disable the built-in helpers.
    ///
    /// Default: enabled
    pub fn builtin_helpers(mut self, enabled: bool) -> Self {
        self.builtin_helpers = Some(enabled);
        self
    }

    /// Cap the decompressed size of a `GZIP` layer.
    ///
    /// Default: 1 GiB. Larger streams fail to open with a format error.
    pub fn max_decompressed_size(mut self, bytes: u64) -> Self {
        self.max_decompressed_size = Some(bytes);
        self
    }

    /// Build the configuration without installing it globally.
    pub fn build(self) -> Config {
        let defaults = Config::default();
        Config {
            max_file_objects: self.max_file_objects.unwrap_or(defaults.max_file_objects),
            max_file_systems: self.max_file_systems.unwrap_or(defaults.max_file_systems),
            builtin_helpers: self.builtin_helpers.unwrap_or(defaults.builtin_helpers),
            max_decompressed_size: self
                .max_decompressed_size
                .unwrap_or(defaults.max_decompressed_size),
        }
    }

    /// Build and initialize the global configuration.
    ///
    /// This can only be called once, and must run before the global
    /// resolver is first used. Subsequent calls are ignored.
    /// Returns `true` if configuration was set, `false` if already initialized.
    pub fn init(self) -> bool {
        CONFIG.set(self.build()).is_ok()
    }
}

/// Initialize layered-vfs with default configuration.
///
/// This is equivalent to `ConfigBuilder::new().init()`.
pub fn init_default() -> bool {
    ConfigBuilder::new().init()
}

/// Get the current configuration, or default if not initialized.
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_file_objects, 128);
        assert_eq!(config.max_file_systems, 16);
        assert!(config.builtin_helpers);
        assert_eq!(config.max_decompressed_size, 1 << 30);
    }

    #[test]
    fn test_builder() {
        let builder = ConfigBuilder::new().max_file_systems(4);
        assert_eq!(builder.max_file_systems, Some(4));

        let config = builder.builtin_helpers(false).build();
        assert_eq!(config.max_file_systems, 4);
        assert_eq!(config.max_file_objects, DEFAULT_MAX_FILE_OBJECTS);
        assert!(!config.builtin_helpers);
        assert_eq!(config.max_decompressed_size, DEFAULT_MAX_DECOMPRESSED_SIZE);
    }
}

//! Configuration for opening a Coral instance.
//!
//! Built with `typed-builder`, the same way every option has a default and only
//! the interesting ones need naming.

use std::path::PathBuf;
use typed_builder::TypedBuilder;

/// Configuration for a Coral instance and its Sled backend.
///
/// # Examples
///
/// ```
/// use coral::config::CoralConfig;
///
/// // Temporary database, removed when the instance is dropped
/// let config = CoralConfig::temp();
/// assert!(config.path.is_none());
///
/// // Customize options
/// let config = CoralConfig::builder()
///     .path("/data/coral")
///     .max_idle_sessions(2)
///     .root_subject("admin")
///     .build();
/// assert_eq!(config.root_subject, "admin");
/// ```
#[derive(Debug, Clone, TypedBuilder)]
#[builder(doc)]
pub struct CoralConfig {
    /// Directory of the Sled database. `None` opens a temporary database.
    #[builder(default, setter(strip_option, into))]
    pub path: Option<PathBuf>,

    /// Sled page cache size in bytes
    #[builder(default = 64 * 1024 * 1024)]
    pub cache_capacity_bytes: u64,

    /// Background flush interval. `None` leaves flushing to explicit calls.
    #[builder(default = Some(500))]
    pub flush_every_ms: Option<u64>,

    /// Idle sessions kept in the pool for each principal
    #[builder(default = 8)]
    pub max_idle_sessions: usize,

    /// Name of the built-in superuser subject
    #[builder(default = String::from("root"), setter(into))]
    pub root_subject: String,

    /// Name of the built-in unauthenticated subject
    #[builder(default = String::from("anonymous"), setter(into))]
    pub anonymous_subject: String,

    /// Name of the built-in administrative role held by the root subject
    #[builder(default = String::from("root"), setter(into))]
    pub root_role: String,
}

impl CoralConfig {
    /// Create a configuration persisting under `path`
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self::builder().path(path).build()
    }

    /// Create a configuration for a temporary database
    pub fn temp() -> Self {
        Self::builder().build()
    }

    pub(crate) fn sled_config(&self) -> sled::Config {
        let config = sled::Config::new()
            .cache_capacity(self.cache_capacity_bytes)
            .flush_every_ms(self.flush_every_ms);
        match &self.path {
            Some(path) => config.path(path),
            None => config.temporary(true),
        }
    }
}

impl Default for CoralConfig {
    fn default() -> Self {
        Self::temp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = CoralConfig::builder()
            .path(PathBuf::from("/tmp/coral"))
            .max_idle_sessions(3)
            .anonymous_subject("guest")
            .build();

        assert_eq!(config.path, Some(PathBuf::from("/tmp/coral")));
        assert_eq!(config.max_idle_sessions, 3);
        assert_eq!(config.anonymous_subject, "guest");
        assert_eq!(config.root_subject, "root");
    }

    #[test]
    fn test_config_defaults() {
        let config = CoralConfig::new("/tmp/default");
        assert_eq!(config.max_idle_sessions, 8);
        assert_eq!(config.flush_every_ms, Some(500));
        assert_eq!(config.root_role, "root");
    }

    #[test]
    fn test_temp_has_no_path() {
        assert!(CoralConfig::temp().path.is_none());
        assert!(CoralConfig::default().path.is_none());
    }
}

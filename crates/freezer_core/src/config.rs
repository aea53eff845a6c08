//! Store configuration.

use std::time::Duration;

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the backing file if it doesn't exist.
    pub create_if_missing: bool,

    /// How long a connection waits for the exclusive write lock before
    /// surfacing a busy error.
    pub busy_timeout: Duration,

    /// Capacity of the per-connection prepared statement cache.
    pub statement_cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            busy_timeout: Duration::from_secs(5),
            statement_cache_capacity: 32,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the backing file if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the write lock acquisition timeout.
    #[must_use]
    pub const fn busy_timeout(mut self, value: Duration) -> Self {
        self.busy_timeout = value;
        self
    }

    /// Sets the prepared statement cache capacity.
    #[must_use]
    pub const fn statement_cache_capacity(mut self, value: usize) -> Self {
        self.statement_cache_capacity = value;
        self
    }
}

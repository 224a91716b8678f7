//! Registry configuration

use std::time::Duration;

use super::ring::DEFAULT_RING_CAPACITY;

/// Configuration for the client registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Frames kept per client
    pub ring_capacity: usize,

    /// Evict clients whose last frame is older than this (None = never evict)
    pub client_ttl: Option<Duration>,

    /// How often the cleanup task runs when eviction is enabled
    pub cleanup_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ring_capacity: DEFAULT_RING_CAPACITY,
            client_ttl: None,
            cleanup_interval: Duration::from_secs(5),
        }
    }
}

impl RegistryConfig {
    /// Set the per-client ring capacity
    pub fn ring_capacity(mut self, capacity: usize) -> Self {
        self.ring_capacity = capacity.max(1);
        self
    }

    /// Enable eviction of clients idle for longer than `ttl`
    pub fn client_ttl(mut self, ttl: Duration) -> Self {
        self.client_ttl = Some(ttl);
        self
    }

    /// Set the cleanup interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}

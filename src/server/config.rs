//! Server configuration

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::compositor::{
    Compositor, DEFAULT_CELL_HEIGHT, DEFAULT_CELL_WIDTH, DEFAULT_JPEG_QUALITY, MAX_CELL_DIMENSION,
};
use crate::control::ControlPolicy;
use crate::publisher::{interval_for_rate, WorkerPool, DEFAULT_PUBLISH_RATE};
use crate::registry::{RegistryConfig, DEFAULT_RING_CAPACITY};

/// Default listen port
pub const DEFAULT_PORT: u16 = 8080;

/// Default number of sources the worker pool is sized for
pub const DEFAULT_EXPECTED_CLIENTS: usize = 8;

/// Invalid configuration value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid value {value:?} for {key}: {reason}")]
pub struct ConfigError {
    /// Setting name (environment variable)
    pub key: String,
    /// Offending value
    pub value: String,
    /// What was wrong with it
    pub reason: String,
}

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent ingest connections (0 = unlimited)
    pub max_connections: usize,

    /// Target composite rate for viewers, frames per second
    pub publish_rate: f64,

    /// Frames kept per source
    pub ring_capacity: usize,

    /// Concurrent compositor jobs
    pub worker_threads: usize,

    /// Width of one grid cell in pixels
    pub cell_width: u32,

    /// Height of one grid cell in pixels
    pub cell_height: u32,

    /// JPEG quality of the composite
    pub jpeg_quality: u8,

    /// How long shutdown waits for in-flight compositor jobs
    pub shutdown_grace: Duration,

    /// Evict sources idle for longer than this (None = never)
    pub client_ttl: Option<Duration>,

    /// What happens to a control command once forwarded
    pub control_policy: ControlPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            publish_rate: DEFAULT_PUBLISH_RATE,
            ring_capacity: DEFAULT_RING_CAPACITY,
            worker_threads: WorkerPool::default_size(DEFAULT_EXPECTED_CLIENTS),
            cell_width: DEFAULT_CELL_WIDTH,
            cell_height: DEFAULT_CELL_HEIGHT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            shutdown_grace: Duration::from_secs(2),
            client_ttl: None,
            control_policy: ControlPolicy::Persist,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Load configuration from `CAMGRID_*` environment variables
    ///
    /// Unset variables keep their defaults; set but unparsable ones are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let host: IpAddr = parse_var(&lookup, "CAMGRID_HOST")?.unwrap_or(config.bind_addr.ip());
        let port: u16 = parse_var(&lookup, "CAMGRID_PORT")?.unwrap_or(config.bind_addr.port());
        config.bind_addr = SocketAddr::new(host, port);

        if let Some(max) = parse_var(&lookup, "CAMGRID_MAX_CONNECTIONS")? {
            config.max_connections = max;
        }

        if let Some(rate) = parse_var::<f64, _>(&lookup, "CAMGRID_FRAME_RATE")? {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(invalid("CAMGRID_FRAME_RATE", &rate.to_string(), "must be positive"));
            }
            config.publish_rate = rate;
        }

        if let Some(capacity) = parse_var::<usize, _>(&lookup, "CAMGRID_RING_CAPACITY")? {
            if capacity == 0 {
                return Err(invalid("CAMGRID_RING_CAPACITY", "0", "must be at least 1"));
            }
            config.ring_capacity = capacity;
        }

        if let Some(expected) = parse_var(&lookup, "CAMGRID_MAX_EXPECTED_CLIENTS")? {
            config.worker_threads = WorkerPool::default_size(expected);
        }
        if let Some(threads) = parse_var::<usize, _>(&lookup, "CAMGRID_WORKER_THREADS")? {
            config.worker_threads = threads.max(1);
        }

        config.cell_width = parse_cell_dimension(&lookup, "CAMGRID_CELL_WIDTH")?
            .unwrap_or(config.cell_width);
        config.cell_height = parse_cell_dimension(&lookup, "CAMGRID_CELL_HEIGHT")?
            .unwrap_or(config.cell_height);

        if let Some(quality) = parse_var::<u8, _>(&lookup, "CAMGRID_JPEG_QUALITY")? {
            config.jpeg_quality = quality.clamp(1, 100);
        }

        if let Some(ms) = parse_var(&lookup, "CAMGRID_SHUTDOWN_GRACE_MS")? {
            config.shutdown_grace = Duration::from_millis(ms);
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "CAMGRID_CLIENT_TTL_SECS")? {
            config.client_ttl = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(policy) = parse_var(&lookup, "CAMGRID_CONTROL_POLICY")? {
            config.control_policy = policy;
        }

        Ok(config)
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum ingest connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the publish rate (frames per second)
    pub fn publish_rate(mut self, fps: f64) -> Self {
        self.publish_rate = fps;
        self
    }

    /// Set the per-source ring capacity
    pub fn ring_capacity(mut self, capacity: usize) -> Self {
        self.ring_capacity = capacity.max(1);
        self
    }

    /// Set the worker pool size
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.max(1);
        self
    }

    /// Set the grid cell size (each side clamped to `1..=MAX_CELL_DIMENSION`)
    pub fn cell_size(mut self, width: u32, height: u32) -> Self {
        self.cell_width = width.clamp(1, MAX_CELL_DIMENSION);
        self.cell_height = height.clamp(1, MAX_CELL_DIMENSION);
        self
    }

    /// Set the JPEG quality
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Set the shutdown grace period
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Enable eviction of idle sources
    pub fn client_ttl(mut self, ttl: Duration) -> Self {
        self.client_ttl = Some(ttl);
        self
    }

    /// Set the control command policy
    pub fn control_policy(mut self, policy: ControlPolicy) -> Self {
        self.control_policy = policy;
        self
    }

    /// Pacing interval derived from the publish rate
    pub fn publish_interval(&self) -> Duration {
        interval_for_rate(self.publish_rate)
    }

    /// Registry settings derived from this config
    pub fn registry_config(&self) -> RegistryConfig {
        let config = RegistryConfig::default().ring_capacity(self.ring_capacity);
        match self.client_ttl {
            Some(ttl) => config
                .client_ttl(ttl)
                .cleanup_interval((ttl / 2).max(Duration::from_millis(100))),
            None => config,
        }
    }

    /// Compositor built from this config
    pub fn compositor(&self) -> Compositor {
        Compositor::new(self.cell_width, self.cell_height).jpeg_quality(self.jpeg_quality)
    }
}

fn invalid(key: &str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_cell_dimension<F>(lookup: &F, key: &str) -> Result<Option<u32>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_var::<u32, _>(lookup, key)? {
        Some(px) if px == 0 || px > MAX_CELL_DIMENSION => Err(invalid(
            key,
            &px.to_string(),
            format!("must be between 1 and {MAX_CELL_DIMENSION}"),
        )),
        other => Ok(other),
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| invalid(key, &raw, e.to_string())),
        _ => Ok(None),
    }
}

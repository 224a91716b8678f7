//! Client registry implementation
//!
//! The central map from source identity to that source's recent frames.
//! Ingest tasks write into it; stream publishers take snapshots of it.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use indexmap::IndexMap;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::config::RegistryConfig;
use crate::control::ControlRelay;
use super::entry::{ClientEntry, ClientStats};
use super::frame::{ClientFrame, ClientId};

type EntryHandle = Arc<RwLock<ClientEntry>>;

/// Registry of all frame sources
///
/// The key set sits behind one `RwLock`; each entry has its own lock so an
/// ingest task appending to its buffer never blocks other clients. Keys are
/// kept in insertion order, which fixes every client's grid cell for as long
/// as it stays registered.
pub struct ClientRegistry {
    /// Map of client id to client entry
    clients: RwLock<IndexMap<ClientId, EntryHandle>>,

    /// Configuration
    config: RegistryConfig,
}

impl ClientRegistry {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            clients: RwLock::new(IndexMap::new()),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Get the entry for a client, creating it if needed
    ///
    /// Idempotent: concurrent callers for the same id receive the same entry.
    pub async fn get_or_create(&self, id: &ClientId) -> EntryHandle {
        if let Some(entry) = self.clients.read().await.get(id) {
            return Arc::clone(entry);
        }

        let mut clients = self.clients.write().await;
        let entry = clients.entry(id.clone()).or_insert_with(|| {
            tracing::info!(client = %id, "Client registered");
            Arc::new(RwLock::new(ClientEntry::new(&self.config)))
        });
        Arc::clone(entry)
    }

    /// Append a frame to a client's buffer
    ///
    /// Creates the client on first contact. Returns the client's refreshed stats.
    pub async fn append(&self, id: &ClientId, data: Bytes, received_at: Instant) -> ClientStats {
        let entry = self.get_or_create(id).await;
        let mut entry = entry.write().await;
        entry.push(data, received_at);

        tracing::trace!(
            client = %id,
            fps = entry.fps,
            frame_count = entry.frame_count,
            "Frame appended"
        );

        entry.stats()
    }

    /// Take a point-in-time view of every client's latest frame
    ///
    /// The key set is read atomically; each client's latest frame is read
    /// afterwards and may be one frame stale relative to a concurrent append.
    pub async fn snapshot(&self) -> Vec<ClientFrame> {
        let entries: Vec<(ClientId, EntryHandle)> = {
            let clients = self.clients.read().await;
            clients
                .iter()
                .map(|(id, entry)| (id.clone(), Arc::clone(entry)))
                .collect()
        };

        let mut snapshot = Vec::with_capacity(entries.len());
        for (id, entry) in entries {
            let latest = entry.read().await.latest();
            snapshot.push(ClientFrame::new(id, latest));
        }
        snapshot
    }

    /// Get stats for one client
    pub async fn client_stats(&self, id: &ClientId) -> Option<ClientStats> {
        let entry = {
            let clients = self.clients.read().await;
            Arc::clone(clients.get(id)?)
        };
        let stats = entry.read().await.stats();
        Some(stats)
    }

    /// Get stats for every client, in grid order
    pub async fn all_stats(&self) -> Vec<(ClientId, ClientStats)> {
        let entries: Vec<(ClientId, EntryHandle)> = {
            let clients = self.clients.read().await;
            clients
                .iter()
                .map(|(id, entry)| (id.clone(), Arc::clone(entry)))
                .collect()
        };

        let mut stats = Vec::with_capacity(entries.len());
        for (id, entry) in entries {
            stats.push((id, entry.read().await.stats()));
        }
        stats
    }

    /// Check whether a client is registered
    pub async fn contains(&self, id: &ClientId) -> bool {
        self.clients.read().await.contains_key(id)
    }

    /// Get total number of clients
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Remove a client, keeping the remaining clients in order
    pub async fn remove(&self, id: &ClientId) -> bool {
        let removed = self.clients.write().await.shift_remove(id).is_some();
        if removed {
            tracing::info!(client = %id, "Client removed");
        }
        removed
    }

    /// Run cleanup once
    ///
    /// Removes clients whose last frame is older than `client_ttl`. Does
    /// nothing when no TTL is configured. Returns the ids removed.
    pub async fn cleanup(&self) -> Vec<ClientId> {
        let Some(ttl) = self.config.client_ttl else {
            return Vec::new();
        };

        let mut clients = self.clients.write().await;
        let now = Instant::now();
        let mut evicted = Vec::new();

        clients.retain(|id, entry_arc| {
            // Entries being written right now are active by definition
            let Ok(entry) = entry_arc.try_read() else {
                return true;
            };
            let keep = now.saturating_duration_since(entry.last_seen()) <= ttl;
            if !keep {
                tracing::info!(client = %id, "Client evicted after idle timeout");
                evicted.push(id.clone());
            }
            keep
        });

        evicted
    }

    /// Spawn the background cleanup task
    ///
    /// Evicted clients also lose any control command stored in `relay`.
    /// Returns `None` when eviction is disabled. The task stops when `cancel`
    /// fires.
    pub fn spawn_cleanup_task(
        self: &Arc<Self>,
        relay: Arc<ControlRelay>,
        cancel: CancellationToken,
    ) -> Option<tokio::task::JoinHandle<()>> {
        self.config.client_ttl?;

        let registry = Arc::clone(self);
        let interval = registry.config.cleanup_interval;

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        for id in registry.cleanup().await {
                            relay.clear(&id).await;
                        }
                    }
                }
            }
        }))
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! Control relay
//!
//! Holds the latest control command per source. Viewers write into it; the
//! source's ingest task reads from it after each frame and forwards the
//! command over its own connection.

use std::collections::HashMap;
use std::str::FromStr;

use tokio::sync::RwLock;

use super::command::ControlCommand;
use crate::registry::ClientId;

/// What happens to a stored command once it has been forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlPolicy {
    /// Keep forwarding the command after every frame until overwritten
    #[default]
    Persist,
    /// Forward the command once, then clear it
    ConsumeOnce,
}

impl FromStr for ControlPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "persist" => Ok(ControlPolicy::Persist),
            "consume" | "consume-once" | "consume_once" => Ok(ControlPolicy::ConsumeOnce),
            other => Err(format!("unknown control policy: {other}")),
        }
    }
}

/// Latest control command per client, last write wins
#[derive(Debug, Default)]
pub struct ControlRelay {
    commands: RwLock<HashMap<ClientId, ControlCommand>>,
    policy: ControlPolicy,
}

impl ControlRelay {
    /// Create a relay with the default (persist) policy
    pub fn new() -> Self {
        Self::with_policy(ControlPolicy::default())
    }

    /// Create a relay with the given policy
    pub fn with_policy(policy: ControlPolicy) -> Self {
        Self {
            commands: RwLock::new(HashMap::new()),
            policy,
        }
    }

    /// Configured policy
    pub fn policy(&self) -> ControlPolicy {
        self.policy
    }

    /// Store a command, replacing any previous one for this client
    pub async fn set(&self, id: ClientId, command: ControlCommand) {
        tracing::debug!(client = %id, x = command.x, y = command.y, "Control command stored");
        self.commands.write().await.insert(id, command);
    }

    /// Store a batch of commands under a single lock acquisition
    pub async fn merge<I>(&self, update: I) -> usize
    where
        I: IntoIterator<Item = (ClientId, ControlCommand)>,
    {
        let mut commands = self.commands.write().await;
        let mut count = 0;
        for (id, command) in update {
            commands.insert(id, command);
            count += 1;
        }
        count
    }

    /// Read the stored command without consuming it
    pub async fn get(&self, id: &ClientId) -> Option<ControlCommand> {
        self.commands.read().await.get(id).copied()
    }

    /// Fetch the command to forward to a client, applying the policy
    ///
    /// Under `Persist` this is a plain read; under `ConsumeOnce` the command
    /// is removed.
    pub async fn take_if_present(&self, id: &ClientId) -> Option<ControlCommand> {
        match self.policy {
            ControlPolicy::Persist => self.get(id).await,
            ControlPolicy::ConsumeOnce => self.commands.write().await.remove(id),
        }
    }

    /// Drop the stored command for a client
    pub async fn clear(&self, id: &ClientId) -> Option<ControlCommand> {
        self.commands.write().await.remove(id)
    }

    /// Number of clients with a stored command
    pub async fn len(&self) -> usize {
        self.commands.read().await.len()
    }

    /// Whether no commands are stored
    pub async fn is_empty(&self) -> bool {
        self.commands.read().await.is_empty()
    }
}

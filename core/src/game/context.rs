//! Game-world boundary
//!
//! The orchestration core talks to the world exclusively through
//! [`GameContext`]: a snapshot feed plus opaque named actions. Protocol
//! decoding, pathfinding and physics live behind an implementation of this
//! trait, never in the core.

use serde_json::Value;

use super::snapshot::GameSnapshot;

/// Result of one dispatched game action
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl ActionOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Boundary to the running game world
#[async_trait::async_trait]
pub trait GameContext: Send + Sync {
    /// Current view of the world; transport failures surface as errors
    async fn snapshot(&self) -> anyhow::Result<GameSnapshot>;

    /// Dispatch a named action with JSON parameters
    async fn execute(&self, action: &str, params: Value) -> anyhow::Result<ActionOutcome>;

    /// Container modes pause the background world scan for their duration
    async fn pause_world_scan(&self) {}

    /// Counterpart of [`GameContext::pause_world_scan`]
    async fn resume_world_scan(&self) {}
}

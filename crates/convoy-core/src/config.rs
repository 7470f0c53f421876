//! Agent configuration boundary.
//!
//! Settings and credential persistence live outside this core; they are
//! consulted exactly once per conversation, at creation time, through the
//! [`AgentConfigProvider`] trait.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Opaque agent configuration handed to a runner at creation time.
///
/// The core never interprets these fields; they travel through to the
/// agent backend unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model identifier for the agent runtime.
    pub model: String,
    /// Root directory the agent operates in, if constrained.
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
    /// Free-form backend-specific settings.
    #[serde(default)]
    pub extra: serde_json::Value,
}

/// External collaborator that produces the agent configuration for a new
/// conversation.
#[async_trait]
pub trait AgentConfigProvider: Send + Sync {
    async fn load(&self) -> Result<AgentConfig>;
}

/// Provider that always returns the same configuration.
///
/// Useful for composition roots without a settings store, and for tests.
pub struct StaticConfigProvider {
    config: AgentConfig,
}

impl StaticConfigProvider {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AgentConfigProvider for StaticConfigProvider {
    async fn load(&self) -> Result<AgentConfig> {
        Ok(self.config.clone())
    }
}

//! The agent backend seam.
//!
//! Everything about the agent's reasoning, tool selection, and transport
//! to the model provider is an external collaborator behind this trait.
//! The runner hands each queued input to the backend as one "turn" and
//! gives it a [`TurnHandle`] for progress, accounting, and action
//! proposals.

use async_trait::async_trait;
use convoy_core::{ConversationMetrics, Result};

use crate::runner::TurnHandle;

/// Result of one completed agent turn.
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    /// Usage not already reported through `TurnHandle::record_metrics`.
    pub metrics: ConversationMetrics,
}

/// Executes one agent turn for one user input.
///
/// Implementations may block on model output or tool execution for
/// arbitrary duration; every `TurnHandle` call is a safe suspension point
/// where a cooperative pause signal is honored.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    async fn run_turn(&self, input: &str, turn: &mut TurnHandle) -> Result<TurnOutcome>;
}

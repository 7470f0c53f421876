//! Pending-action types for the confirmation flow.

use serde::{Deserialize, Serialize};

/// Operator-facing risk classification of an agent-proposed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// One agent-proposed action awaiting a confirm/reject decision.
///
/// Pending actions are resolved in FIFO order relative to the conversation
/// that produced them; the agent cannot safely proceed past an unresolved
/// action. Resolution is idempotent: a second decision on an already
/// resolved action is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    /// Unique action identifier.
    pub id: String,
    /// Human-readable description of what the agent wants to do.
    pub description: String,
    pub risk: RiskLevel,
    /// The conversation that surfaced this action.
    pub conversation_id: String,
}

impl PendingAction {
    /// Creates a pending action with a freshly generated identifier.
    pub fn new(
        conversation_id: impl Into<String>,
        description: impl Into<String>,
        risk: RiskLevel,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            description: description.into(),
            risk,
            conversation_id: conversation_id.into(),
        }
    }
}

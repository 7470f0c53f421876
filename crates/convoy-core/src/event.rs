//! Typed events that cross execution contexts.
//!
//! The UI surface and the background runners never touch shared state
//! directly; everything funnels through these tagged unions into the
//! router's single event channel. Dispatch is an exhaustive `match`, so a
//! new event kind cannot be silently unhandled.

use serde::{Deserialize, Serialize};

use crate::conversation::{ConversationMetrics, PendingAction, RunStatus};
use crate::policy::ConfirmationPolicy;

/// High-level events consumed by the conversation router.
///
/// Operator-originated variants are posted by the manager's public API;
/// `Runner` wraps everything a background runner emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    /// Operator submitted input for the active conversation.
    UserInputSubmitted { text: String },
    /// Request to create and foreground a fresh conversation.
    CreateConversation,
    /// Request to foreground a different conversation.
    SwitchConversation { target_id: String },
    /// Request to remove a conversation from the registry.
    RemoveConversation { conversation_id: String },
    /// Operator decision for a pending action on the active conversation.
    ConfirmationDecision { action_id: String, approve: bool },
    /// Request to change the session-wide confirmation policy.
    SetConfirmationPolicy { policy: ConfirmationPolicy },
    /// Request to pause the active conversation's runner.
    PauseConversation,
    /// Event emitted asynchronously by a conversation runner.
    Runner(RunnerEvent),
}

/// Events a `ConversationRunner` emits from its background context.
///
/// Delivery is FIFO per runner; no ordering holds between runners. After a
/// runner acknowledges a pause with `Paused`, it emits nothing further
/// until it is resumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunnerEvent {
    /// Incremental output or accounting update from an in-flight turn.
    Progress {
        conversation_id: String,
        delta: ProgressDelta,
    },
    /// The agent proposed an action that may need operator confirmation.
    PendingAction {
        conversation_id: String,
        action: PendingAction,
    },
    /// A turn finished, with its terminal status.
    Completed {
        conversation_id: String,
        status: RunStatus,
    },
    /// Acknowledgment of a cooperative pause signal.
    Paused { conversation_id: String },
}

impl RunnerEvent {
    /// The conversation this event belongs to.
    pub fn conversation_id(&self) -> &str {
        match self {
            Self::Progress {
                conversation_id, ..
            }
            | Self::PendingAction {
                conversation_id, ..
            }
            | Self::Completed {
                conversation_id, ..
            }
            | Self::Paused { conversation_id } => conversation_id,
        }
    }
}

/// Incremental update carried by a `Progress` event.
///
/// All fields are optional; a delta only describes what changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressDelta {
    /// Display text produced by the agent (rendering is the UI's concern).
    #[serde(default)]
    pub text: Option<String>,
    /// Accumulated usage metrics as of this event.
    #[serde(default)]
    pub metrics: Option<ConversationMetrics>,
    /// Accumulated run time in seconds as of this event.
    #[serde(default)]
    pub elapsed_seconds: Option<f64>,
}

impl ProgressDelta {
    /// A delta carrying only display text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// A delta carrying only updated metrics.
    pub fn metrics(metrics: ConversationMetrics) -> Self {
        Self {
            metrics: Some(metrics),
            ..Self::default()
        }
    }
}

/// Callback surface a runner uses to re-enter the router asynchronously.
///
/// Implementations must be non-blocking; a runner may emit from a context
/// that is never allowed to stall.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: RunnerEvent);
}

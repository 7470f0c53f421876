//! Conversation domain module.
//!
//! Contains the conversation identity model, usage metrics, and the
//! pending-action types used by the confirmation flow.

mod model;
mod pending;

pub use model::{Conversation, ConversationMetrics, RunStatus};
pub use pending::{PendingAction, RiskLevel};

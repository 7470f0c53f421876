//! Error types for the Convoy workspace.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for the conversation core.
///
/// Every failure the router can observe is represented here; nothing is
/// allowed to unwind past the router boundary. Variants map to how the
/// failure is handled: validation errors are logged and dropped, registry
/// misses become non-fatal notices, runner failures become a terminal
/// status on the conversation state, and confirmation conflicts are
/// rejected without any state change.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ConvoyError {
    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound { entity_type: String, id: String },

    /// Malformed or unroutable event, rejected at the router
    #[error("Validation error: {0}")]
    Validation(String),

    /// Agent or tool execution error surfaced by a runner
    #[error("Runner failure in conversation '{conversation_id}': {message}")]
    RunnerFailure {
        conversation_id: String,
        message: String,
    },

    /// Decision received for an already-resolved, out-of-order, or unknown
    /// pending action
    #[error("Confirmation conflict for action '{action_id}': {reason}")]
    ConfirmationConflict { action_id: String, reason: String },

    /// Configuration error (agent config could not be obtained)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvoyError {
    /// Creates a NotFound error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Creates a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a RunnerFailure error
    pub fn runner_failure(
        conversation_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::RunnerFailure {
            conversation_id: conversation_id.into(),
            message: message.into(),
        }
    }

    /// Creates a ConfirmationConflict error
    pub fn confirmation_conflict(
        action_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ConfirmationConflict {
            action_id: action_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a Validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a ConfirmationConflict error
    pub fn is_confirmation_conflict(&self) -> bool {
        matches!(self, Self::ConfirmationConflict { .. })
    }

    /// Check if this is a RunnerFailure error
    pub fn is_runner_failure(&self) -> bool {
        matches!(self, Self::RunnerFailure { .. })
    }
}

impl From<serde_json::Error> for ConvoyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON serialization error: {}", err))
    }
}

/// A type alias for `Result<T, ConvoyError>`.
pub type Result<T> = std::result::Result<T, ConvoyError>;

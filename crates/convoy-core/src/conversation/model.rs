//! Core conversation domain model.

use serde::{Deserialize, Serialize};

/// One logical dialogue between the operator and the agent.
///
/// A conversation is created by the CRUD controller and destroyed only by
/// explicit removal from the runner registry, never implicitly. Exactly one
/// conversation is foregrounded at a time in a UI session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Stable identifier, generated on creation.
    pub id: String,
    /// Mutable display name, shown in the history panel.
    pub title: String,
    /// Creation timestamp (ISO 8601 format).
    pub created_at: String,
}

impl Conversation {
    /// Creates a new conversation with a default title.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: "New conversation".to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Usage metrics accumulated over a conversation's agent turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationMetrics {
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Context window of the most recent request, in tokens.
    pub context_window: u64,
    pub accumulated_cost: f64,
}

impl ConversationMetrics {
    /// Folds another metrics delta into this one.
    ///
    /// Token counts and cost add up; the context window is a capacity, so
    /// the most recent non-zero value wins.
    pub fn accumulate(&mut self, delta: &ConversationMetrics) {
        self.input_tokens += delta.input_tokens;
        self.output_tokens += delta.output_tokens;
        self.accumulated_cost += delta.accumulated_cost;
        if delta.context_window > 0 {
            self.context_window = delta.context_window;
        }
    }
}

/// Terminal status of one runner turn.
///
/// A cooperative pause is not terminal: the suspended turn resumes where
/// it parked and still ends in one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// The turn finished normally.
    Ok,
    /// The turn failed; the conversation stays selectable but cannot
    /// re-enter a running state until the operator starts a new turn.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_accumulate_adds_counters_and_keeps_latest_window() {
        let mut metrics = ConversationMetrics {
            input_tokens: 100,
            output_tokens: 50,
            context_window: 8192,
            accumulated_cost: 0.01,
        };

        metrics.accumulate(&ConversationMetrics {
            input_tokens: 20,
            output_tokens: 5,
            context_window: 0,
            accumulated_cost: 0.002,
        });

        assert_eq!(metrics.input_tokens, 120);
        assert_eq!(metrics.output_tokens, 55);
        assert_eq!(metrics.context_window, 8192);
        assert!((metrics.accumulated_cost - 0.012).abs() < 1e-9);
    }

    #[test]
    fn conversation_gets_default_title() {
        let conversation = Conversation::new("conv-1");
        assert_eq!(conversation.id, "conv-1");
        assert_eq!(conversation.title, "New conversation");
    }
}

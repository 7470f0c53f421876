//! Operator input and turn-progress handling.

use convoy_core::{ConversationState, ConvoyError, ProgressDelta, Result, RunStatus};
use convoy_runtime::RunnerRegistry;

const DEFAULT_TITLE: &str = "New conversation";
const TITLE_MAX_CHARS: usize = 48;

/// Routes operator input into the active runner and applies the
/// resulting progress and completion events to the state.
pub struct UserMessageController;

impl UserMessageController {
    /// Queues operator input on the active conversation's runner.
    ///
    /// The first input of a conversation also becomes its title.
    ///
    /// # Errors
    ///
    /// Returns a validation error for empty input or when no
    /// conversation is foregrounded.
    pub async fn handle_input(
        &self,
        state: &mut ConversationState,
        registry: &RunnerRegistry,
        text: String,
    ) -> Result<()> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ConvoyError::validation("input is empty"));
        }
        let Some(conversation_id) = state.conversation_id().map(str::to_string) else {
            return Err(ConvoyError::validation("no active conversation"));
        };
        let Some(runner) = registry.get(&conversation_id).await else {
            return Err(ConvoyError::not_found("conversation", &conversation_id));
        };

        // A fresh operator turn lifts an explicit pause; otherwise the
        // worker would stay parked and never pick up the input.
        if runner.is_paused() {
            runner.resume().await;
        }

        if state.title() == DEFAULT_TITLE {
            let title = derive_title(trimmed);
            registry.set_title(&conversation_id, title.clone()).await;
            state.set_conversation_title(title);
        }

        state.set_last_error(None);
        runner.queue_input(trimmed)?;
        state.set_running(true);
        tracing::debug!(conversation_id = %conversation_id, "input queued");
        Ok(())
    }

    /// Applies a progress delta from the active conversation; progress
    /// from background conversations is dropped.
    pub fn handle_progress(
        &self,
        state: &mut ConversationState,
        conversation_id: &str,
        delta: ProgressDelta,
    ) -> Result<()> {
        if state.conversation_id() != Some(conversation_id) {
            tracing::debug!(
                conversation_id = %conversation_id,
                "progress from background conversation dropped"
            );
            return Ok(());
        }
        if let Some(metrics) = delta.metrics {
            state.set_metrics(metrics);
        }
        if let Some(elapsed_seconds) = delta.elapsed_seconds {
            state.set_elapsed_seconds(elapsed_seconds);
        }
        Ok(())
    }

    /// Applies a turn completion from the active conversation.
    pub fn handle_completed(
        &self,
        state: &mut ConversationState,
        conversation_id: &str,
        status: RunStatus,
    ) -> Result<()> {
        if state.conversation_id() != Some(conversation_id) {
            tracing::debug!(
                conversation_id = %conversation_id,
                "completion from background conversation dropped"
            );
            return Ok(());
        }
        state.set_running(false);
        match status {
            RunStatus::Ok => state.set_last_error(None),
            RunStatus::Error { message } => {
                state.set_last_error(Some(message));
            }
        }
        Ok(())
    }
}

/// First line of the input, truncated on a char boundary.
fn derive_title(input: &str) -> String {
    let first_line = input.lines().next().unwrap_or(input);
    match first_line.char_indices().nth(TITLE_MAX_CHARS) {
        Some((idx, _)) => format!("{}…", &first_line[..idx]),
        None => first_line.to_string(),
    }
}

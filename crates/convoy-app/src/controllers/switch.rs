//! Foreground switching and cooperative pause.

use convoy_core::{
    ConfirmationPolicyService, ConversationState, ConvoyError, Result, StateSnapshot,
};
use convoy_runtime::RunnerRegistry;

/// Moves the foreground between conversations.
///
/// A switch pauses the outgoing runner, swaps the whole state snapshot
/// in one transition, then resumes the incoming runner. Observers never
/// see the new conversation id paired with the old conversation's data.
pub struct ConversationSwitchController;

impl ConversationSwitchController {
    /// Foregrounds `target_id`.
    ///
    /// Switching to the already-active conversation is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id; the current selection and
    /// state are unchanged.
    pub async fn switch_to(
        &self,
        state: &mut ConversationState,
        registry: &RunnerRegistry,
        policy: &ConfirmationPolicyService,
        target_id: &str,
    ) -> Result<()> {
        if state.conversation_id() == Some(target_id) {
            return Ok(());
        }
        let Some(target) = registry.get(target_id).await else {
            return Err(ConvoyError::not_found("conversation", target_id));
        };

        if let Some(outgoing) = registry.current().await {
            outgoing.pause().await;
        }
        registry.set_current(target_id).await?;

        let runner = target.snapshot().await;
        let title = registry
            .title(target_id)
            .await
            .unwrap_or_else(|| "New conversation".to_string());
        state.replace(StateSnapshot {
            running: runner.running,
            conversation_id: Some(target_id.to_string()),
            title,
            confirmation_policy: policy.policy(),
            pending_action_count: runner.pending_actions.len(),
            pending_actions: runner.pending_actions,
            elapsed_seconds: runner.elapsed_seconds,
            metrics: runner.metrics,
            last_error: runner.last_error,
        });

        target.resume().await;
        tracing::info!(conversation_id = %target_id, "conversation foregrounded");
        Ok(())
    }

    /// Signals a cooperative pause to the active conversation's runner.
    ///
    /// # Errors
    ///
    /// Returns a validation error when no conversation is foregrounded.
    pub async fn pause_current(&self, registry: &RunnerRegistry) -> Result<()> {
        let Some(runner) = registry.current().await else {
            return Err(ConvoyError::validation("no active conversation"));
        };
        runner.pause().await;
        Ok(())
    }

    /// Marks the active conversation as no longer running once its
    /// runner acknowledges a pause. Acknowledgments from background
    /// conversations are dropped.
    pub fn handle_runner_paused(
        &self,
        state: &mut ConversationState,
        conversation_id: &str,
    ) -> Result<()> {
        if state.conversation_id() != Some(conversation_id) {
            tracing::debug!(
                conversation_id = %conversation_id,
                "pause acknowledgment from background conversation dropped"
            );
            return Ok(());
        }
        state.set_running(false);
        Ok(())
    }
}

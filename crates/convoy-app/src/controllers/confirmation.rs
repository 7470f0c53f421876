//! Confirmation flow: surfacing proposed actions and resolving decisions.

use convoy_core::{
    ConfirmationPolicy, ConfirmationPolicyService, ConversationState, ConvoyError, PendingAction,
    Result,
};
use convoy_runtime::{ConversationRunner, RunnerRegistry};

/// Applies the confirmation policy to proposed actions and forwards
/// operator decisions to the owning runner.
pub struct ConfirmationFlowController;

impl ConfirmationFlowController {
    /// Handles a newly proposed action from the active conversation.
    ///
    /// The policy is consulted first and only then mirrored into the
    /// state, so an `ApproveOnceThenAuto` flip is observed in order.
    /// Auto-approval respects FIFO: an action behind an unresolved
    /// earlier action stays surfaced until that decision lands.
    pub async fn handle_pending_action(
        &self,
        state: &mut ConversationState,
        registry: &RunnerRegistry,
        policy: &mut ConfirmationPolicyService,
        action: PendingAction,
    ) -> Result<()> {
        if state.conversation_id() != Some(action.conversation_id.as_str()) {
            tracing::warn!(
                conversation_id = %action.conversation_id,
                action_id = %action.id,
                "pending action from background conversation dropped"
            );
            return Ok(());
        }
        let Some(runner) = registry.get(&action.conversation_id).await else {
            tracing::warn!(
                conversation_id = %action.conversation_id,
                "pending action for unregistered conversation dropped"
            );
            return Ok(());
        };

        let needs_confirmation = policy.should_confirm(&action);
        state.set_confirmation_policy(policy.policy());

        if !needs_confirmation {
            match runner.resolve(&action.id, true).await {
                Ok(resolved) => {
                    tracing::info!(action_id = %resolved.id, "action auto-approved");
                    self.sync_pending(state, &runner).await;
                    return Ok(());
                }
                Err(err) if err.is_confirmation_conflict() => {
                    tracing::debug!(
                        action_id = %action.id,
                        "auto-approval deferred behind an unresolved earlier action"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        self.sync_pending(state, &runner).await;
        Ok(())
    }

    /// Resolves an operator decision on the active conversation.
    ///
    /// # Errors
    ///
    /// Returns a validation error when no conversation is foregrounded,
    /// and propagates `ConfirmationConflict` for duplicate, out-of-order,
    /// or unknown action ids; the surfaced prompt is unchanged in those
    /// cases.
    pub async fn handle_decision(
        &self,
        state: &mut ConversationState,
        registry: &RunnerRegistry,
        action_id: &str,
        approve: bool,
    ) -> Result<()> {
        let Some(runner) = registry.current().await else {
            return Err(ConvoyError::validation("no active conversation"));
        };
        let action = runner.resolve(action_id, approve).await?;
        tracing::info!(action_id = %action.id, approve, "confirmation resolved");
        self.sync_pending(state, &runner).await;
        Ok(())
    }

    /// Changes the session-wide policy, effective from the next
    /// proposed action. Actions already surfaced still need decisions.
    pub fn set_policy(
        &self,
        state: &mut ConversationState,
        policy_service: &mut ConfirmationPolicyService,
        policy: ConfirmationPolicy,
    ) -> Result<()> {
        policy_service.set_policy(policy);
        state.set_confirmation_policy(policy);
        Ok(())
    }

    async fn sync_pending(&self, state: &mut ConversationState, runner: &ConversationRunner) {
        let pending = runner.pending_actions().await;
        state.set_pending_action_count(pending.len());
        state.set_pending_actions(pending);
    }
}

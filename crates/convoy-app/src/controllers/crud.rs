//! Conversation creation and removal.

use convoy_core::{AgentConfigProvider, ConversationState, Result};
use convoy_runtime::RunnerRegistry;

/// Creates and removes conversations.
///
/// Creation is the only place agent configuration is loaded; the
/// resulting config is bound to the runner for the conversation's whole
/// lifetime.
pub struct ConversationCrudController;

impl ConversationCrudController {
    /// Creates a fresh conversation, pauses the outgoing one, and
    /// foregrounds the new one.
    ///
    /// # Errors
    ///
    /// Returns the configuration provider's error if loading fails; no
    /// conversation is created in that case.
    pub async fn create(
        &self,
        state: &mut ConversationState,
        registry: &RunnerRegistry,
        provider: &dyn AgentConfigProvider,
    ) -> Result<()> {
        let config = provider.load().await?;
        let conversation_id = uuid::Uuid::new_v4().to_string();

        if let Some(outgoing) = registry.current().await {
            outgoing.pause().await;
        }
        registry.get_or_create(&conversation_id, config).await;
        registry.set_current(&conversation_id).await?;
        state.reset_for(conversation_id);
        Ok(())
    }

    /// Removes a conversation and stops its runner.
    ///
    /// Unknown ids are ignored. Removing the foregrounded conversation
    /// leaves the session idle.
    pub async fn remove(
        &self,
        state: &mut ConversationState,
        registry: &RunnerRegistry,
        conversation_id: &str,
    ) -> Result<()> {
        registry.remove(conversation_id).await;
        if state.conversation_id() == Some(conversation_id) {
            state.reset_idle();
        }
        Ok(())
    }
}

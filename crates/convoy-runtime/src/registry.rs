//! Runner registry: the single owner of every live conversation runner.

use std::collections::HashMap;
use std::sync::Arc;

use convoy_core::{AgentConfig, Conversation, ConvoyError, EventSink, Result};
use tokio::sync::Mutex;

use crate::factory::RunnerFactory;
use crate::runner::ConversationRunner;

struct RegistryEntry {
    conversation: Conversation,
    runner: Arc<ConversationRunner>,
}

#[derive(Default)]
struct RegistryInner {
    entries: HashMap<String, RegistryEntry>,
    current: Option<String>,
}

/// Maps conversation ids to their runners and tracks the foregrounded one.
///
/// All mutation happens under one lock, so get-or-create is atomic:
/// concurrent lookups of the same id observe the same runner instance.
/// Removal is the only way a runner leaves the registry.
pub struct RunnerRegistry {
    factory: RunnerFactory,
    sink: Arc<dyn EventSink>,
    inner: Mutex<RegistryInner>,
}

impl RunnerRegistry {
    pub fn new(factory: RunnerFactory, sink: Arc<dyn EventSink>) -> Self {
        Self {
            factory,
            sink,
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Returns the runner for `conversation_id`, creating it (and its
    /// conversation record) on first use.
    pub async fn get_or_create(
        &self,
        conversation_id: &str,
        config: AgentConfig,
    ) -> Arc<ConversationRunner> {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.entries.get(conversation_id) {
            return entry.runner.clone();
        }
        let runner = Arc::new(self.factory.create(
            conversation_id,
            config,
            self.sink.clone(),
        ));
        inner.entries.insert(
            conversation_id.to_string(),
            RegistryEntry {
                conversation: Conversation::new(conversation_id),
                runner: runner.clone(),
            },
        );
        tracing::info!(conversation_id = %conversation_id, "conversation registered");
        runner
    }

    pub async fn get(&self, conversation_id: &str) -> Option<Arc<ConversationRunner>> {
        self.inner
            .lock()
            .await
            .entries
            .get(conversation_id)
            .map(|entry| entry.runner.clone())
    }

    /// Foregrounds `conversation_id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no conversation with this id is registered;
    /// the previous selection stays in effect.
    pub async fn set_current(&self, conversation_id: &str) -> Result<Arc<ConversationRunner>> {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.entries.get(conversation_id) else {
            return Err(ConvoyError::not_found("conversation", conversation_id));
        };
        let runner = entry.runner.clone();
        inner.current = Some(conversation_id.to_string());
        Ok(runner)
    }

    /// The foregrounded runner, if any conversation is selected.
    pub async fn current(&self) -> Option<Arc<ConversationRunner>> {
        let inner = self.inner.lock().await;
        let id = inner.current.as_ref()?;
        inner.entries.get(id).map(|entry| entry.runner.clone())
    }

    pub async fn current_id(&self) -> Option<String> {
        self.inner.lock().await.current.clone()
    }

    /// Removes a conversation and stops its runner.
    ///
    /// Removing an unknown id is a no-op; removing the foregrounded
    /// conversation clears the selection.
    pub async fn remove(&self, conversation_id: &str) {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.entries.remove(conversation_id) else {
            tracing::debug!(conversation_id = %conversation_id, "remove of unknown conversation ignored");
            return;
        };
        entry.runner.stop();
        if inner.current.as_deref() == Some(conversation_id) {
            inner.current = None;
        }
        tracing::info!(conversation_id = %conversation_id, "conversation removed");
    }

    pub async fn set_title(&self, conversation_id: &str, title: impl Into<String>) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.entries.get_mut(conversation_id) {
            entry.conversation.title = title.into();
        }
    }

    pub async fn title(&self, conversation_id: &str) -> Option<String> {
        self.inner
            .lock()
            .await
            .entries
            .get(conversation_id)
            .map(|entry| entry.conversation.title.clone())
    }

    pub async fn conversation(&self, conversation_id: &str) -> Option<Conversation> {
        self.inner
            .lock()
            .await
            .entries
            .get(conversation_id)
            .map(|entry| entry.conversation.clone())
    }

    /// All registered conversations, newest first.
    pub async fn conversations(&self) -> Vec<Conversation> {
        let inner = self.inner.lock().await;
        let mut all: Vec<Conversation> = inner
            .entries
            .values()
            .map(|entry| entry.conversation.clone())
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ChannelSink, ScriptedBackend};

    fn registry() -> RunnerRegistry {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let (sink, _events) = ChannelSink::new();
        RunnerRegistry::new(RunnerFactory::new(backend), sink)
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let registry = registry();

        let first = registry.get_or_create("conv-1", AgentConfig::default()).await;
        let second = registry.get_or_create("conv-1", AgentConfig::default()).await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn set_current_rejects_unknown_conversation() {
        let registry = registry();
        registry.get_or_create("conv-1", AgentConfig::default()).await;
        registry.set_current("conv-1").await.unwrap();

        let err = registry.set_current("missing").await.unwrap_err();
        assert!(err.is_not_found());
        // The previous selection is untouched.
        assert_eq!(registry.current_id().await.as_deref(), Some("conv-1"));
    }

    #[tokio::test]
    async fn remove_clears_current_selection() {
        let registry = registry();
        registry.get_or_create("conv-1", AgentConfig::default()).await;
        registry.set_current("conv-1").await.unwrap();

        registry.remove("conv-1").await;

        assert!(registry.current().await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn remove_of_unknown_id_is_a_no_op() {
        let registry = registry();
        registry.get_or_create("conv-1", AgentConfig::default()).await;

        registry.remove("missing").await;

        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn title_updates_are_visible() {
        let registry = registry();
        registry.get_or_create("conv-1", AgentConfig::default()).await;

        assert_eq!(
            registry.title("conv-1").await.as_deref(),
            Some("New conversation")
        );
        registry.set_title("conv-1", "Fix the build").await;
        assert_eq!(
            registry.title("conv-1").await.as_deref(),
            Some("Fix the build")
        );
    }
}

//! Runner construction.

use std::sync::Arc;

use convoy_core::{AgentConfig, EventSink};

use crate::backend::AgentBackend;
use crate::runner::ConversationRunner;

/// Builds runners wired to one agent backend.
///
/// The factory is the single place a backend is bound to the runner
/// layer; the registry calls it whenever a conversation needs a fresh
/// pipeline.
pub struct RunnerFactory {
    backend: Arc<dyn AgentBackend>,
}

impl RunnerFactory {
    pub fn new(backend: Arc<dyn AgentBackend>) -> Self {
        Self { backend }
    }

    /// Spawns a runner for `conversation_id` with its own worker task.
    pub fn create(
        &self,
        conversation_id: impl Into<String>,
        config: AgentConfig,
        sink: Arc<dyn EventSink>,
    ) -> ConversationRunner {
        let conversation_id = conversation_id.into();
        tracing::debug!(conversation_id = %conversation_id, "creating runner");
        ConversationRunner::spawn(conversation_id, config, self.backend.clone(), sink)
    }
}

//! The conversation manager and its router task.
//!
//! The router task is the owning context: it alone holds the mutable
//! [`ConversationState`], the runner registry, and the policy service.
//! Everything else, operator-facing API calls and runner callbacks alike,
//! is marshaled onto it as a typed event through one unbounded channel
//! and applied strictly in arrival order.

use std::sync::Arc;

use convoy_core::{
    AgentConfigProvider, ConfirmationPolicy, ConversationEvent, ConversationState, ConvoyError,
    EventSink, Result, RunnerEvent, StateChange, StateSnapshot,
};
use convoy_runtime::{AgentBackend, RunnerFactory, RunnerRegistry};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::controllers::{
    ConfirmationFlowController, ConversationCrudController, ConversationSwitchController,
    UserMessageController,
};

/// One queued unit of router work.
///
/// Operator-originated events carry a reply channel so validation and
/// conflict errors surface to the caller; runner callbacks are
/// fire-and-forget.
struct Envelope {
    event: ConversationEvent,
    reply: Option<oneshot::Sender<Result<()>>>,
}

/// Sink handed to every runner: re-enters the router channel without
/// blocking.
struct RouterSink {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl EventSink for RouterSink {
    fn emit(&self, event: RunnerEvent) {
        // A closed channel means the router shut down; the runner's
        // events have nowhere to go and that is fine.
        let _ = self.tx.send(Envelope {
            event: ConversationEvent::Runner(event),
            reply: None,
        });
    }
}

/// Handle to a running conversation router.
///
/// Cloning is cheap; every clone posts to the same router task and
/// observes the same state.
#[derive(Clone)]
pub struct ConversationManager {
    tx: mpsc::UnboundedSender<Envelope>,
    snapshots: watch::Receiver<StateSnapshot>,
    changes: broadcast::Sender<StateChange>,
}

impl ConversationManager {
    /// Spawns the router task and returns its handle.
    ///
    /// `backend` executes agent turns, `config_provider` is consulted
    /// once per conversation at creation time, and `policy` seeds the
    /// session-wide confirmation policy.
    pub fn spawn(
        backend: Arc<dyn AgentBackend>,
        config_provider: Arc<dyn AgentConfigProvider>,
        policy: ConfirmationPolicy,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(RouterSink { tx: tx.clone() });

        let state = ConversationState::new(policy);
        let snapshots = state.watch();
        let changes = state.change_sender();

        let router = Router {
            state,
            registry: RunnerRegistry::new(RunnerFactory::new(backend), sink),
            config_provider,
            policy: convoy_core::ConfirmationPolicyService::new(policy),
            messages: UserMessageController,
            crud: ConversationCrudController,
            switcher: ConversationSwitchController,
            confirmations: ConfirmationFlowController,
        };
        tokio::spawn(router.run(rx));

        Self {
            tx,
            snapshots,
            changes,
        }
    }

    // ---- Operator-facing API ----

    /// Creates a fresh conversation and foregrounds it.
    pub async fn create_conversation(&self) -> Result<()> {
        self.request(ConversationEvent::CreateConversation).await
    }

    /// Submits operator input to the active conversation.
    ///
    /// # Errors
    ///
    /// Returns a validation error for empty input or when no conversation
    /// is foregrounded.
    pub async fn send_message(&self, text: impl Into<String>) -> Result<()> {
        self.request(ConversationEvent::UserInputSubmitted { text: text.into() })
            .await
    }

    /// Foregrounds `target_id`, pausing the outgoing conversation.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id; the current selection is
    /// unchanged.
    pub async fn switch_to(&self, target_id: impl Into<String>) -> Result<()> {
        self.request(ConversationEvent::SwitchConversation {
            target_id: target_id.into(),
        })
        .await
    }

    /// Resolves a pending action on the active conversation.
    ///
    /// # Errors
    ///
    /// Returns `ConfirmationConflict` for duplicate, out-of-order, or
    /// unknown action ids.
    pub async fn answer_confirmation(
        &self,
        action_id: impl Into<String>,
        approve: bool,
    ) -> Result<()> {
        self.request(ConversationEvent::ConfirmationDecision {
            action_id: action_id.into(),
            approve,
        })
        .await
    }

    /// Changes the session-wide confirmation policy, effective from the
    /// next proposed action.
    pub async fn set_confirmation_policy(&self, policy: ConfirmationPolicy) -> Result<()> {
        self.request(ConversationEvent::SetConfirmationPolicy { policy })
            .await
    }

    /// Signals a cooperative pause to the active conversation's runner.
    pub async fn pause_current(&self) -> Result<()> {
        self.request(ConversationEvent::PauseConversation).await
    }

    /// Removes a conversation and stops its runner. Unknown ids are
    /// ignored.
    pub async fn remove_conversation(&self, conversation_id: impl Into<String>) -> Result<()> {
        self.request(ConversationEvent::RemoveConversation {
            conversation_id: conversation_id.into(),
        })
        .await
    }

    // ---- Observation ----

    /// The latest state snapshot.
    pub fn current_state(&self) -> StateSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A `watch` handle over state snapshots. Intermediate snapshots may
    /// be coalesced; the handle always holds the latest.
    pub fn watch_state(&self) -> watch::Receiver<StateSnapshot> {
        self.snapshots.clone()
    }

    /// Per-change notifications, uncoalesced and in application order.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    async fn request(&self, event: ConversationEvent) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                event,
                reply: Some(reply_tx),
            })
            .map_err(|_| ConvoyError::internal("conversation router stopped"))?;
        reply_rx
            .await
            .map_err(|_| ConvoyError::internal("conversation router dropped the request"))?
    }
}

/// The router: exclusive owner of conversation state, registry, and
/// policy. Lives on its own task and processes one envelope at a time.
struct Router {
    state: ConversationState,
    registry: RunnerRegistry,
    config_provider: Arc<dyn AgentConfigProvider>,
    policy: convoy_core::ConfirmationPolicyService,
    messages: UserMessageController,
    crud: ConversationCrudController,
    switcher: ConversationSwitchController,
    confirmations: ConfirmationFlowController,
}

impl Router {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Envelope>) {
        while let Some(envelope) = rx.recv().await {
            let result = self.dispatch(envelope.event).await;
            if let Err(err) = &result {
                tracing::warn!(error = %err, "event rejected");
            }
            if let Some(reply) = envelope.reply {
                // Caller may have given up waiting; nothing to do.
                let _ = reply.send(result);
            }
        }
        tracing::debug!("router channel closed; shutting down");
    }

    /// Exhaustive dispatch: adding an event variant breaks compilation
    /// here until it is routed to a controller.
    async fn dispatch(&mut self, event: ConversationEvent) -> Result<()> {
        match event {
            ConversationEvent::UserInputSubmitted { text } => {
                self.messages
                    .handle_input(&mut self.state, &self.registry, text)
                    .await
            }
            ConversationEvent::CreateConversation => {
                self.crud
                    .create(
                        &mut self.state,
                        &self.registry,
                        self.config_provider.as_ref(),
                    )
                    .await
            }
            ConversationEvent::SwitchConversation { target_id } => {
                self.switcher
                    .switch_to(&mut self.state, &self.registry, &self.policy, &target_id)
                    .await
            }
            ConversationEvent::RemoveConversation { conversation_id } => {
                self.crud
                    .remove(&mut self.state, &self.registry, &conversation_id)
                    .await
            }
            ConversationEvent::ConfirmationDecision { action_id, approve } => {
                self.confirmations
                    .handle_decision(&mut self.state, &self.registry, &action_id, approve)
                    .await
            }
            ConversationEvent::SetConfirmationPolicy { policy } => {
                self.confirmations
                    .set_policy(&mut self.state, &mut self.policy, policy)
            }
            ConversationEvent::PauseConversation => {
                self.switcher.pause_current(&self.registry).await
            }
            ConversationEvent::Runner(runner_event) => self.dispatch_runner(runner_event).await,
        }
    }

    async fn dispatch_runner(&mut self, event: RunnerEvent) -> Result<()> {
        match event {
            RunnerEvent::Progress {
                conversation_id,
                delta,
            } => self
                .messages
                .handle_progress(&mut self.state, &conversation_id, delta),
            RunnerEvent::PendingAction { action, .. } => {
                self.confirmations
                    .handle_pending_action(&mut self.state, &self.registry, &mut self.policy, action)
                    .await
            }
            RunnerEvent::Completed {
                conversation_id,
                status,
            } => self
                .messages
                .handle_completed(&mut self.state, &conversation_id, status),
            RunnerEvent::Paused { conversation_id } => self
                .switcher
                .handle_runner_paused(&mut self.state, &conversation_id),
        }
    }
}

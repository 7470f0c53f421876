//! Reactive conversation state.
//!
//! `ConversationState` is the single source of truth for "what is the
//! current conversation doing right now". It is owned exclusively by the
//! router task (the owning context); runner contexts never write to it
//! directly — their writes arrive as events on the router channel and are
//! applied here one event at a time, so no two mutations ever interleave.
//!
//! Reads are safe from anywhere: every mutation republishes an immutable
//! [`StateSnapshot`] on a `watch` channel, and per-change notifications go
//! out on a `broadcast` channel so displays can react to individual fields
//! without polling.

use tokio::sync::{broadcast, watch};

use crate::conversation::{ConversationMetrics, PendingAction};
use crate::policy::ConfirmationPolicy;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Immutable snapshot of the foregrounded conversation's state.
///
/// At any instant a snapshot reflects exactly one conversation id — the
/// one currently foregrounded — never a merge of two conversations.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    /// Whether the conversation is currently running/processing.
    pub running: bool,
    /// Id of the foregrounded conversation, `None` while idle.
    pub conversation_id: Option<String>,
    /// Display title of the foregrounded conversation.
    pub title: String,
    /// Session-wide confirmation policy.
    pub confirmation_policy: ConfirmationPolicy,
    /// Number of actions awaiting operator confirmation.
    pub pending_action_count: usize,
    /// The surfaced decision prompt: actions awaiting confirmation, FIFO.
    pub pending_actions: Vec<PendingAction>,
    /// Accumulated run time in seconds.
    pub elapsed_seconds: f64,
    /// Usage metrics of the foregrounded conversation.
    pub metrics: ConversationMetrics,
    /// Terminal failure descriptor of the last turn, if it failed.
    pub last_error: Option<String>,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            running: false,
            conversation_id: None,
            title: String::new(),
            confirmation_policy: ConfirmationPolicy::default(),
            pending_action_count: 0,
            pending_actions: Vec::new(),
            elapsed_seconds: 0.0,
            metrics: ConversationMetrics::default(),
            last_error: None,
        }
    }
}

/// Notification emitted once per distinct state change, in the order the
/// changes were applied.
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    Running(bool),
    ConversationId(Option<String>),
    Title(String),
    ConfirmationPolicy(ConfirmationPolicy),
    PendingActionCount(usize),
    PendingActions(Vec<PendingAction>),
    ElapsedSeconds(f64),
    Metrics(ConversationMetrics),
    LastError(Option<String>),
    /// The whole state was swapped atomically (conversation switch or
    /// reset). Observed as a single transition; no partial application.
    Replaced(StateSnapshot),
}

/// The single reactive state holder.
///
/// Mutations go through the closed setter set below, never ad-hoc field
/// writes. Each setter skips no-op writes, applies the change, then
/// notifies synchronously, so observers see every distinct value exactly
/// once and never a torn intermediate.
pub struct ConversationState {
    current: StateSnapshot,
    snapshot_tx: watch::Sender<StateSnapshot>,
    changes_tx: broadcast::Sender<StateChange>,
}

impl ConversationState {
    /// Creates the state holder with idle defaults and the given
    /// session-wide confirmation policy.
    pub fn new(policy: ConfirmationPolicy) -> Self {
        let current = StateSnapshot {
            confirmation_policy: policy,
            ..StateSnapshot::default()
        };
        let (snapshot_tx, _) = watch::channel(current.clone());
        let (changes_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            current,
            snapshot_tx,
            changes_tx,
        }
    }

    // ---- Reads ----

    /// Clones the current snapshot.
    pub fn snapshot(&self) -> StateSnapshot {
        self.current.clone()
    }

    pub fn is_running(&self) -> bool {
        self.current.running
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.current.conversation_id.as_deref()
    }

    pub fn title(&self) -> &str {
        &self.current.title
    }

    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        self.current.confirmation_policy
    }

    pub fn pending_action_count(&self) -> usize {
        self.current.pending_action_count
    }

    pub fn pending_actions(&self) -> &[PendingAction] {
        &self.current.pending_actions
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.current.elapsed_seconds
    }

    pub fn metrics(&self) -> &ConversationMetrics {
        &self.current.metrics
    }

    pub fn last_error(&self) -> Option<&str> {
        self.current.last_error.as_deref()
    }

    // ---- Subscriptions ----

    /// A `watch` handle that always holds the latest snapshot. Safe to
    /// read from any task; intermediate snapshots may be coalesced.
    pub fn watch(&self) -> watch::Receiver<StateSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// The change broadcaster. Subscribing to it yields every distinct
    /// change, uncoalesced and in application order.
    pub fn change_sender(&self) -> broadcast::Sender<StateChange> {
        self.changes_tx.clone()
    }

    /// Subscribes to per-field change notifications.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<StateChange> {
        self.changes_tx.subscribe()
    }

    // ---- Mutators ----

    pub fn set_running(&mut self, running: bool) {
        if self.current.running == running {
            return;
        }
        self.current.running = running;
        self.publish(StateChange::Running(running));
    }

    pub fn set_conversation_id(&mut self, conversation_id: Option<String>) {
        if self.current.conversation_id == conversation_id {
            return;
        }
        self.current.conversation_id = conversation_id.clone();
        self.publish(StateChange::ConversationId(conversation_id));
    }

    pub fn set_conversation_title(&mut self, title: impl Into<String>) {
        let title = title.into();
        if self.current.title == title {
            return;
        }
        self.current.title = title.clone();
        self.publish(StateChange::Title(title));
    }

    pub fn set_confirmation_policy(&mut self, policy: ConfirmationPolicy) {
        if self.current.confirmation_policy == policy {
            return;
        }
        self.current.confirmation_policy = policy;
        self.publish(StateChange::ConfirmationPolicy(policy));
    }

    pub fn set_pending_action_count(&mut self, count: usize) {
        if self.current.pending_action_count == count {
            return;
        }
        self.current.pending_action_count = count;
        self.publish(StateChange::PendingActionCount(count));
    }

    pub fn set_pending_actions(&mut self, actions: Vec<PendingAction>) {
        if self.current.pending_actions == actions {
            return;
        }
        self.current.pending_actions = actions.clone();
        self.publish(StateChange::PendingActions(actions));
    }

    pub fn set_elapsed_seconds(&mut self, elapsed_seconds: f64) {
        if self.current.elapsed_seconds == elapsed_seconds {
            return;
        }
        self.current.elapsed_seconds = elapsed_seconds;
        self.publish(StateChange::ElapsedSeconds(elapsed_seconds));
    }

    pub fn set_metrics(&mut self, metrics: ConversationMetrics) {
        if self.current.metrics == metrics {
            return;
        }
        self.current.metrics = metrics.clone();
        self.publish(StateChange::Metrics(metrics));
    }

    pub fn set_last_error(&mut self, last_error: Option<String>) {
        if self.current.last_error == last_error {
            return;
        }
        self.current.last_error = last_error.clone();
        self.publish(StateChange::LastError(last_error));
    }

    /// Replaces every field atomically with the given snapshot.
    ///
    /// Used for conversation switches: display logic must observe the swap
    /// as a single transition, never a new id with stale metrics.
    pub fn replace(&mut self, snapshot: StateSnapshot) {
        if self.current == snapshot {
            return;
        }
        self.current = snapshot.clone();
        self.publish(StateChange::Replaced(snapshot));
    }

    /// Resets to a fresh conversation's values, preserving the
    /// session-wide confirmation policy.
    pub fn reset_for(&mut self, conversation_id: impl Into<String>) {
        let conversation_id = conversation_id.into();
        self.replace(StateSnapshot {
            conversation_id: Some(conversation_id),
            title: "New conversation".to_string(),
            confirmation_policy: self.current.confirmation_policy,
            ..StateSnapshot::default()
        });
    }

    /// Resets to idle defaults (no conversation foregrounded), preserving
    /// the session-wide confirmation policy.
    pub fn reset_idle(&mut self) {
        self.replace(StateSnapshot {
            confirmation_policy: self.current.confirmation_policy,
            ..StateSnapshot::default()
        });
    }

    fn publish(&mut self, change: StateChange) {
        // Snapshot first, so a change subscriber that reads the watch
        // handle sees values at least as new as the notification.
        self.snapshot_tx.send_replace(self.current.clone());
        // No subscribers is fine; displays are optional collaborators.
        let _ = self.changes_tx.send(change);
    }
}

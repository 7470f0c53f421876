//! Conversation runner: one background execution pipeline per conversation.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use convoy_core::{
    AgentConfig, ConversationMetrics, ConvoyError, EventSink, PendingAction, ProgressDelta,
    Result, RiskLevel, RunStatus, RunnerEvent,
};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::backend::AgentBackend;

/// Point-in-time view of a runner, used for the atomic state swap on a
/// conversation switch.
#[derive(Debug, Clone)]
pub struct RunnerSnapshot {
    pub conversation_id: String,
    pub running: bool,
    pub pending_actions: Vec<PendingAction>,
    pub elapsed_seconds: f64,
    pub metrics: ConversationMetrics,
    pub last_error: Option<String>,
}

/// An action awaiting a decision, paired with the channel that unblocks
/// the proposing turn.
struct PendingEntry {
    action: PendingAction,
    decision: oneshot::Sender<bool>,
}

/// Bookkeeping shared between the runner handle and its worker task.
///
/// The ledger mutex is held only for short, non-awaiting sections; a turn
/// never awaits a decision while holding it.
struct RunnerLedger {
    running: bool,
    pause_acked: bool,
    pending: VecDeque<PendingEntry>,
    resolved: HashSet<String>,
    elapsed: Duration,
    metrics: ConversationMetrics,
    last_error: Option<String>,
}

impl Default for RunnerLedger {
    fn default() -> Self {
        Self {
            running: false,
            pause_acked: false,
            pending: VecDeque::new(),
            resolved: HashSet::new(),
            elapsed: Duration::ZERO,
            metrics: ConversationMetrics::default(),
            last_error: None,
        }
    }
}

struct RunnerShared {
    conversation_id: String,
    sink: Arc<dyn EventSink>,
    pause_tx: watch::Sender<bool>,
    ledger: Mutex<RunnerLedger>,
}

impl RunnerShared {
    /// Safe suspension point: if a pause has been signalled, acknowledge
    /// it once with a `Paused` event and park until resumed. No event is
    /// emitted between the acknowledgment and the resume.
    async fn checkpoint(&self) {
        let mut pause_rx = self.pause_tx.subscribe();
        if !*pause_rx.borrow_and_update() {
            return;
        }
        {
            let mut ledger = self.ledger.lock().await;
            if !ledger.pause_acked {
                ledger.pause_acked = true;
                tracing::debug!(
                    conversation_id = %self.conversation_id,
                    "pause observed at suspension point"
                );
                self.sink.emit(RunnerEvent::Paused {
                    conversation_id: self.conversation_id.clone(),
                });
            }
        }
        // The sender lives on self, so this cannot fail while we run.
        let _ = pause_rx.wait_for(|paused| !*paused).await;
    }
}

/// Handle a backend uses during one turn to report progress, account
/// usage, and propose actions that may need operator confirmation.
///
/// Every method is a safe suspension point for the cooperative pause
/// signal.
pub struct TurnHandle {
    shared: Arc<RunnerShared>,
    started: Instant,
}

impl TurnHandle {
    pub fn conversation_id(&self) -> &str {
        &self.shared.conversation_id
    }

    /// Emits incremental display output.
    pub async fn progress(&self, text: impl Into<String>) {
        self.shared.checkpoint().await;
        let elapsed_seconds = {
            let ledger = self.shared.ledger.lock().await;
            (ledger.elapsed + self.started.elapsed()).as_secs_f64()
        };
        self.shared.sink.emit(RunnerEvent::Progress {
            conversation_id: self.shared.conversation_id.clone(),
            delta: ProgressDelta {
                text: Some(text.into()),
                metrics: None,
                elapsed_seconds: Some(elapsed_seconds),
            },
        });
    }

    /// Folds a usage delta into the conversation totals and reports the
    /// new totals.
    pub async fn record_metrics(&self, delta: ConversationMetrics) {
        self.shared.checkpoint().await;
        let totals = {
            let mut ledger = self.shared.ledger.lock().await;
            ledger.metrics.accumulate(&delta);
            ledger.metrics.clone()
        };
        self.shared.sink.emit(RunnerEvent::Progress {
            conversation_id: self.shared.conversation_id.clone(),
            delta: ProgressDelta::metrics(totals),
        });
    }

    /// Proposes a single action and awaits the operator decision.
    pub async fn propose(
        &mut self,
        description: impl Into<String>,
        risk: RiskLevel,
    ) -> Result<bool> {
        let approvals = self.propose_many(vec![(description.into(), risk)]).await?;
        Ok(approvals.into_iter().next().unwrap_or(false))
    }

    /// Proposes a batch of actions, then awaits their decisions in FIFO
    /// order. Unresolved proposals survive a pause; re-activating the
    /// conversation later resumes at the same awaiting-confirmation state.
    pub async fn propose_many(
        &mut self,
        actions: Vec<(String, RiskLevel)>,
    ) -> Result<Vec<bool>> {
        self.shared.checkpoint().await;
        let mut receivers = Vec::with_capacity(actions.len());
        for (description, risk) in actions {
            let action =
                PendingAction::new(self.shared.conversation_id.clone(), description, risk);
            let (decision_tx, decision_rx) = oneshot::channel();
            {
                let mut ledger = self.shared.ledger.lock().await;
                ledger.pending.push_back(PendingEntry {
                    action: action.clone(),
                    decision: decision_tx,
                });
            }
            tracing::debug!(
                conversation_id = %self.shared.conversation_id,
                action_id = %action.id,
                risk = ?action.risk,
                "action proposed"
            );
            self.shared.sink.emit(RunnerEvent::PendingAction {
                conversation_id: self.shared.conversation_id.clone(),
                action,
            });
            receivers.push(decision_rx);
        }

        let mut approvals = Vec::with_capacity(receivers.len());
        for decision_rx in receivers {
            let approved = decision_rx
                .await
                .map_err(|_| ConvoyError::internal("decision channel dropped"))?;
            approvals.push(approved);
        }
        self.shared.checkpoint().await;
        Ok(approvals)
    }
}

/// The execution pipeline bound to one conversation.
///
/// Owned exclusively by the registry; controllers borrow a reference by
/// id and never store it long-term. The worker task blocks on external
/// I/O freely — the owning context only ever talks to it through the
/// input queue, the pause flag, and decision resolution.
pub struct ConversationRunner {
    conversation_id: String,
    config: AgentConfig,
    inputs: mpsc::UnboundedSender<String>,
    shared: Arc<RunnerShared>,
    worker: JoinHandle<()>,
}

impl ConversationRunner {
    pub(crate) fn spawn(
        conversation_id: String,
        config: AgentConfig,
        backend: Arc<dyn AgentBackend>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let (pause_tx, _) = watch::channel(false);
        let shared = Arc::new(RunnerShared {
            conversation_id: conversation_id.clone(),
            sink,
            pause_tx,
            ledger: Mutex::new(RunnerLedger::default()),
        });
        let worker = tokio::spawn(run_worker(shared.clone(), backend, inputs_rx));
        Self {
            conversation_id,
            config,
            inputs: inputs_tx,
            shared,
            worker,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Enqueues operator input for the worker. Never blocks; the running
    /// turn picks it up when ready.
    pub fn queue_input(&self, text: impl Into<String>) -> Result<()> {
        self.inputs
            .send(text.into())
            .map_err(|_| ConvoyError::internal("runner input queue is closed"))
    }

    /// Resolves the operator decision for `action_id`.
    ///
    /// Decisions must arrive in FIFO order and exactly once per action;
    /// anything else is a `ConfirmationConflict` and leaves the queue
    /// untouched.
    pub async fn resolve(&self, action_id: &str, approve: bool) -> Result<PendingAction> {
        let mut ledger = self.shared.ledger.lock().await;

        if ledger.resolved.contains(action_id) {
            return Err(ConvoyError::confirmation_conflict(
                action_id,
                "action already resolved",
            ));
        }
        match ledger.pending.front() {
            Some(front) if front.action.id == action_id => {}
            Some(_) => {
                let reason = if ledger.pending.iter().any(|e| e.action.id == action_id) {
                    "decisions must be resolved in the order actions were proposed"
                } else {
                    "unknown action"
                };
                return Err(ConvoyError::confirmation_conflict(action_id, reason));
            }
            None => {
                return Err(ConvoyError::confirmation_conflict(
                    action_id,
                    "no actions awaiting confirmation",
                ));
            }
        }

        let Some(entry) = ledger.pending.pop_front() else {
            return Err(ConvoyError::internal("pending queue emptied concurrently"));
        };
        ledger.resolved.insert(entry.action.id.clone());
        if entry.decision.send(approve).is_err() {
            tracing::warn!(
                conversation_id = %self.conversation_id,
                action_id = %entry.action.id,
                "turn is no longer waiting for this decision"
            );
        }
        Ok(entry.action)
    }

    /// Signals a cooperative pause. The worker stops emitting at its next
    /// safe suspension point and acknowledges with a `Paused` event; an
    /// idle worker acknowledges immediately.
    pub async fn pause(&self) {
        self.shared.pause_tx.send_replace(true);
        let mut ledger = self.shared.ledger.lock().await;
        if !ledger.running && !ledger.pause_acked {
            ledger.pause_acked = true;
            self.shared.sink.emit(RunnerEvent::Paused {
                conversation_id: self.conversation_id.clone(),
            });
        }
    }

    /// Clears the pause signal; the worker resumes where it parked.
    pub async fn resume(&self) {
        self.shared.pause_tx.send_replace(false);
        self.shared.ledger.lock().await.pause_acked = false;
    }

    pub fn is_paused(&self) -> bool {
        *self.shared.pause_tx.borrow()
    }

    pub async fn is_running(&self) -> bool {
        self.shared.ledger.lock().await.running
    }

    pub async fn pending_count(&self) -> usize {
        self.shared.ledger.lock().await.pending.len()
    }

    /// Unresolved actions in proposal order.
    pub async fn pending_actions(&self) -> Vec<PendingAction> {
        self.shared
            .ledger
            .lock()
            .await
            .pending
            .iter()
            .map(|entry| entry.action.clone())
            .collect()
    }

    pub async fn snapshot(&self) -> RunnerSnapshot {
        let ledger = self.shared.ledger.lock().await;
        RunnerSnapshot {
            conversation_id: self.conversation_id.clone(),
            running: ledger.running,
            pending_actions: ledger.pending.iter().map(|e| e.action.clone()).collect(),
            elapsed_seconds: ledger.elapsed.as_secs_f64(),
            metrics: ledger.metrics.clone(),
            last_error: ledger.last_error.clone(),
        }
    }

    /// Stops the worker task. Called on registry eviction.
    pub fn stop(&self) {
        self.worker.abort();
    }
}

impl Drop for ConversationRunner {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

impl std::fmt::Debug for ConversationRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationRunner")
            .field("conversation_id", &self.conversation_id)
            .field("paused", &self.is_paused())
            .finish_non_exhaustive()
    }
}

async fn run_worker(
    shared: Arc<RunnerShared>,
    backend: Arc<dyn AgentBackend>,
    mut inputs: mpsc::UnboundedReceiver<String>,
) {
    while let Some(input) = inputs.recv().await {
        // Safe suspension point: honor a pause before starting the turn.
        shared.checkpoint().await;

        {
            let mut ledger = shared.ledger.lock().await;
            ledger.running = true;
        }

        let started = Instant::now();
        let mut turn = TurnHandle {
            shared: shared.clone(),
            started,
        };
        let result = backend.run_turn(&input, &mut turn).await;

        let status = {
            let mut ledger = shared.ledger.lock().await;
            ledger.running = false;
            ledger.elapsed += started.elapsed();
            match result {
                Ok(outcome) => {
                    ledger.metrics.accumulate(&outcome.metrics);
                    ledger.last_error = None;
                    RunStatus::Ok
                }
                Err(err) => {
                    let message = err.to_string();
                    ledger.last_error = Some(message.clone());
                    RunStatus::Error { message }
                }
            }
        };
        if let RunStatus::Error { message } = &status {
            tracing::warn!(
                conversation_id = %shared.conversation_id,
                error = %message,
                "turn failed"
            );
        }

        // A pause that landed mid-turn suppresses the completion event
        // until the conversation is re-activated.
        shared.checkpoint().await;
        shared.sink.emit(RunnerEvent::Completed {
            conversation_id: shared.conversation_id.clone(),
            status,
        });
    }
    tracing::debug!(
        conversation_id = %shared.conversation_id,
        "input queue closed; worker stopped"
    );
}

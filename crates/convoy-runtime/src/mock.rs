//! Test doubles for the backend and sink seams.
//!
//! These live in the library (not behind `cfg(test)`) so integration
//! tests and downstream composition roots can script conversations
//! without a real agent.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use convoy_core::{ConversationMetrics, ConvoyError, EventSink, Result, RiskLevel, RunnerEvent};
use tokio::sync::{Mutex, mpsc};

use crate::backend::{AgentBackend, TurnOutcome};
use crate::runner::TurnHandle;

/// One scripted step of an agent turn.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Emit incremental display output.
    Progress(String),
    /// Report a usage delta.
    Metrics(ConversationMetrics),
    /// Propose one action and await its decision.
    Propose { description: String, risk: RiskLevel },
    /// Propose several actions at once, then await their decisions in
    /// proposal order.
    ProposeBatch(Vec<(String, RiskLevel)>),
    /// Fail the turn with this message.
    Fail(String),
}

/// Backend that replays a fixed script, one step list per turn.
///
/// Turns beyond the script echo the input back as progress. Decisions
/// received for proposed actions are recorded for inspection.
pub struct ScriptedBackend {
    turns: Mutex<VecDeque<Vec<ScriptStep>>>,
    approvals: Mutex<Vec<bool>>,
}

impl ScriptedBackend {
    pub fn new(turns: Vec<Vec<ScriptStep>>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            approvals: Mutex::new(Vec::new()),
        }
    }

    /// Decisions observed so far, in the order they resolved.
    pub async fn approvals(&self) -> Vec<bool> {
        self.approvals.lock().await.clone()
    }
}

#[async_trait]
impl AgentBackend for ScriptedBackend {
    async fn run_turn(&self, input: &str, turn: &mut TurnHandle) -> Result<TurnOutcome> {
        let steps = self.turns.lock().await.pop_front();
        let Some(steps) = steps else {
            turn.progress(format!("echo: {input}")).await;
            return Ok(TurnOutcome::default());
        };

        for step in steps {
            match step {
                ScriptStep::Progress(text) => turn.progress(text).await,
                ScriptStep::Metrics(delta) => turn.record_metrics(delta).await,
                ScriptStep::Propose { description, risk } => {
                    let approved = turn.propose(description, risk).await?;
                    self.approvals.lock().await.push(approved);
                }
                ScriptStep::ProposeBatch(actions) => {
                    let approved = turn.propose_many(actions).await?;
                    self.approvals.lock().await.extend(approved);
                }
                ScriptStep::Fail(message) => {
                    return Err(ConvoyError::runner_failure(turn.conversation_id(), message));
                }
            }
        }
        Ok(TurnOutcome::default())
    }
}

/// Sink that forwards runner events into an unbounded channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<RunnerEvent>,
}

impl ChannelSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RunnerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: RunnerEvent) {
        // Dropped receiver means the observer went away; nothing to do.
        let _ = self.tx.send(event);
    }
}

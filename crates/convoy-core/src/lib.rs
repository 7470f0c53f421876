//! Core domain layer for Convoy.
//!
//! This crate holds everything the conversation router and the runner
//! workers agree on: the conversation domain models, the typed event
//! unions that cross execution contexts, the reactive state holder, the
//! confirmation policy, and the shared error type.
//!
//! # Module Structure
//!
//! - `conversation`: Domain models (`Conversation`, `PendingAction`, metrics)
//! - `event`: Typed events and the `EventSink` boundary trait
//! - `state`: Reactive `ConversationState` with change notification
//! - `policy`: Confirmation policy and its evaluation service
//! - `config`: Agent configuration boundary (`AgentConfig`, provider trait)
//! - `error`: Shared `ConvoyError` type

pub mod config;
pub mod conversation;
pub mod error;
pub mod event;
pub mod policy;
pub mod state;

pub use config::{AgentConfig, AgentConfigProvider, StaticConfigProvider};
pub use conversation::{Conversation, ConversationMetrics, PendingAction, RiskLevel, RunStatus};
pub use error::{ConvoyError, Result};
pub use event::{ConversationEvent, EventSink, ProgressDelta, RunnerEvent};
pub use policy::{ConfirmationPolicy, ConfirmationPolicyService};
pub use state::{ConversationState, StateChange, StateSnapshot};

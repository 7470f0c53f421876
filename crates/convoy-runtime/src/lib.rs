//! Runner layer for Convoy.
//!
//! One [`ConversationRunner`] drives one conversation's agent turns on a
//! background task; the [`RunnerRegistry`] owns every runner and tracks
//! which one is foregrounded. The agent's own reasoning lives behind the
//! [`AgentBackend`] seam — this crate only manages execution: input
//! queueing, cooperative pause, FIFO confirmation resolution, and event
//! emission back into the router.

pub mod backend;
pub mod factory;
pub mod mock;
pub mod registry;
pub mod runner;

pub use backend::{AgentBackend, TurnOutcome};
pub use factory::RunnerFactory;
pub use registry::RunnerRegistry;
pub use runner::{ConversationRunner, RunnerSnapshot, TurnHandle};

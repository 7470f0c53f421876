//! Application layer for Convoy.
//!
//! [`ConversationManager`] is the composition root and the only entry
//! point UI surfaces talk to. It spawns the router task that owns the
//! reactive conversation state, routes typed events to single-purpose
//! controllers, and exposes cheap clonable handles for posting events
//! and observing state.

pub mod controllers;
pub mod logging;
pub mod manager;

pub use manager::ConversationManager;

//! Single-purpose controllers invoked by the router.
//!
//! Controllers are stateless; everything they touch (state, registry,
//! policy) is owned by the router and passed in per call, so all
//! mutation stays serialized on the router task.

pub mod confirmation;
pub mod crud;
pub mod switch;
pub mod user_message;

pub use confirmation::ConfirmationFlowController;
pub use crud::ConversationCrudController;
pub use switch::ConversationSwitchController;
pub use user_message::UserMessageController;

//! Confirmation policy and its evaluation service.

use serde::{Deserialize, Serialize};

use crate::conversation::PendingAction;

/// Session-level rule governing whether pending actions require
/// interactive approval.
///
/// The policy is global to the UI session and applied per action at
/// decision time, not baked into a runner at creation time, so the
/// operator can change it mid-run and have it apply to the next action.
/// It is deliberately not reset when conversations are switched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationPolicy {
    /// Every pending action needs an interactive decision.
    #[default]
    AlwaysConfirm,
    /// Pending actions are approved without asking.
    AutoApprove,
    /// The next pending action needs a decision; after that the policy
    /// flips to `AutoApprove` for the remainder of the session.
    ApproveOnceThenAuto,
}

impl std::fmt::Display for ConfirmationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::AlwaysConfirm => "always-confirm",
            Self::AutoApprove => "auto-approve",
            Self::ApproveOnceThenAuto => "approve-once-then-auto",
        };
        write!(f, "{}", label)
    }
}

/// Holds the operator's current risk-approval policy and evaluates whether
/// a pending action needs interactive confirmation.
pub struct ConfirmationPolicyService {
    policy: ConfirmationPolicy,
}

impl ConfirmationPolicyService {
    pub fn new(policy: ConfirmationPolicy) -> Self {
        Self { policy }
    }

    /// The currently effective policy.
    pub fn policy(&self) -> ConfirmationPolicy {
        self.policy
    }

    /// Replaces the policy, effective from the next consultation.
    pub fn set_policy(&mut self, policy: ConfirmationPolicy) {
        if self.policy != policy {
            tracing::info!(%policy, "confirmation policy changed");
            self.policy = policy;
        }
    }

    /// Decides whether `action` needs interactive confirmation.
    ///
    /// For `ApproveOnceThenAuto` this returns `true` exactly once and flips
    /// the service to `AutoApprove` for all subsequent calls. Callers must
    /// mirror the policy into the conversation state after this call, never
    /// before, so the flip is observed in order.
    pub fn should_confirm(&mut self, action: &PendingAction) -> bool {
        match self.policy {
            ConfirmationPolicy::AlwaysConfirm => true,
            ConfirmationPolicy::AutoApprove => false,
            ConfirmationPolicy::ApproveOnceThenAuto => {
                self.policy = ConfirmationPolicy::AutoApprove;
                tracing::info!(
                    action_id = %action.id,
                    "approve-once consumed; switching to auto-approve"
                );
                true
            }
        }
    }
}

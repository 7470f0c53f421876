//! End-to-end flows through the conversation manager.

use std::sync::Arc;
use std::time::Duration;

use convoy_app::ConversationManager;
use convoy_core::{
    AgentConfig, ConfirmationPolicy, ConversationMetrics, RiskLevel, StateChange, StateSnapshot,
    StaticConfigProvider,
};
use convoy_runtime::mock::{ScriptStep, ScriptedBackend};
use tokio::sync::{broadcast, watch};
use tokio::time::timeout;

fn manager_with_script(
    script: Vec<Vec<ScriptStep>>,
    policy: ConfirmationPolicy,
) -> (ConversationManager, Arc<ScriptedBackend>) {
    let backend = Arc::new(ScriptedBackend::new(script));
    let provider = Arc::new(StaticConfigProvider::new(AgentConfig::default()));
    let manager = ConversationManager::spawn(backend.clone(), provider, policy);
    (manager, backend)
}

async fn wait_for_state<F>(
    rx: &mut watch::Receiver<StateSnapshot>,
    mut predicate: F,
) -> StateSnapshot
where
    F: FnMut(&StateSnapshot) -> bool,
{
    timeout(Duration::from_secs(5), async {
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if predicate(&snapshot) {
                    return snapshot.clone();
                }
            }
            rx.changed().await.expect("state channel closed");
        }
    })
    .await
    .expect("timed out waiting for state")
}

/// Waits for an uncoalesced `Running(value)` change notification; the
/// `watch` channel may skip over transient values, the broadcast never
/// does.
async fn wait_for_running(rx: &mut broadcast::Receiver<StateChange>, value: bool) {
    timeout(Duration::from_secs(5), async {
        loop {
            if let StateChange::Running(v) = rx.recv().await.expect("change channel closed") {
                if v == value {
                    return;
                }
            }
        }
    })
    .await
    .expect("timed out waiting for running change")
}

#[tokio::test]
async fn message_runs_a_turn_and_completes() {
    let (manager, _backend) = manager_with_script(
        vec![vec![ScriptStep::Progress("thinking".to_string())]],
        ConfirmationPolicy::AlwaysConfirm,
    );
    let mut states = manager.watch_state();

    manager.create_conversation().await.unwrap();
    let created = wait_for_state(&mut states, |s| s.conversation_id.is_some()).await;
    assert_eq!(created.title, "New conversation");

    let mut changes = manager.subscribe_changes();
    manager.send_message("fix the flaky test").await.unwrap();
    wait_for_running(&mut changes, true).await;
    wait_for_running(&mut changes, false).await;

    let done = manager.current_state();
    assert!(done.last_error.is_none());
    assert_eq!(done.title, "fix the flaky test");
}

#[tokio::test]
async fn empty_or_unaddressed_input_is_rejected() {
    let (manager, _backend) =
        manager_with_script(vec![], ConfirmationPolicy::AlwaysConfirm);

    // No conversation foregrounded yet.
    let err = manager.send_message("hello").await.unwrap_err();
    assert!(err.is_validation());

    manager.create_conversation().await.unwrap();
    let err = manager.send_message("   ").await.unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn pending_action_surfaces_and_resolves() {
    let (manager, backend) = manager_with_script(
        vec![vec![ScriptStep::Propose {
            description: "delete scratch dir".to_string(),
            risk: RiskLevel::High,
        }]],
        ConfirmationPolicy::AlwaysConfirm,
    );
    let mut states = manager.watch_state();

    manager.create_conversation().await.unwrap();
    manager.send_message("clean up").await.unwrap();

    let surfaced = wait_for_state(&mut states, |s| s.pending_action_count == 1).await;
    let action = surfaced.pending_actions[0].clone();
    assert_eq!(action.description, "delete scratch dir");
    assert_eq!(action.risk, RiskLevel::High);

    manager.answer_confirmation(&action.id, true).await.unwrap();
    wait_for_state(&mut states, |s| s.pending_action_count == 0).await;
    wait_for_state(&mut states, |s| !s.running).await;

    assert_eq!(backend.approvals().await, vec![true]);
}

#[tokio::test]
async fn decisions_must_follow_proposal_order() {
    let (manager, backend) = manager_with_script(
        vec![vec![ScriptStep::ProposeBatch(vec![
            ("write config".to_string(), RiskLevel::Medium),
            ("restart service".to_string(), RiskLevel::High),
        ])]],
        ConfirmationPolicy::AlwaysConfirm,
    );
    let mut states = manager.watch_state();

    manager.create_conversation().await.unwrap();
    manager.send_message("apply changes").await.unwrap();

    let surfaced = wait_for_state(&mut states, |s| s.pending_action_count == 2).await;
    let first = surfaced.pending_actions[0].clone();
    let second = surfaced.pending_actions[1].clone();

    // Out of order: rejected, prompt unchanged.
    let err = manager.answer_confirmation(&second.id, true).await.unwrap_err();
    assert!(err.is_confirmation_conflict());
    assert_eq!(manager.current_state().pending_action_count, 2);

    manager.answer_confirmation(&first.id, true).await.unwrap();
    manager.answer_confirmation(&second.id, false).await.unwrap();

    // Duplicate decision on an already resolved action.
    let err = manager.answer_confirmation(&first.id, false).await.unwrap_err();
    assert!(err.is_confirmation_conflict());

    wait_for_state(&mut states, |s| !s.running && s.pending_action_count == 0).await;
    assert_eq!(backend.approvals().await, vec![true, false]);
}

#[tokio::test]
async fn approve_once_asks_once_then_auto_approves() {
    let (manager, backend) = manager_with_script(
        vec![
            vec![ScriptStep::Propose {
                description: "first action".to_string(),
                risk: RiskLevel::Medium,
            }],
            vec![ScriptStep::Propose {
                description: "second action".to_string(),
                risk: RiskLevel::Medium,
            }],
        ],
        ConfirmationPolicy::ApproveOnceThenAuto,
    );
    let mut states = manager.watch_state();

    manager.create_conversation().await.unwrap();
    manager.send_message("turn one").await.unwrap();

    let surfaced = wait_for_state(&mut states, |s| s.pending_action_count == 1).await;
    // The policy flipped the moment the first action was consulted.
    assert_eq!(surfaced.confirmation_policy, ConfirmationPolicy::AutoApprove);

    let action = surfaced.pending_actions[0].clone();
    manager.answer_confirmation(&action.id, true).await.unwrap();
    wait_for_state(&mut states, |s| !s.running).await;

    // The second turn's action never needs a decision.
    let mut changes = manager.subscribe_changes();
    manager.send_message("turn two").await.unwrap();
    wait_for_running(&mut changes, true).await;
    wait_for_running(&mut changes, false).await;
    assert_eq!(manager.current_state().pending_action_count, 0);

    assert_eq!(backend.approvals().await, vec![true, true]);
}

#[tokio::test]
async fn auto_approve_policy_skips_prompts() {
    let (manager, backend) = manager_with_script(
        vec![vec![ScriptStep::Propose {
            description: "routine write".to_string(),
            risk: RiskLevel::Low,
        }]],
        ConfirmationPolicy::AlwaysConfirm,
    );
    let mut states = manager.watch_state();

    manager
        .set_confirmation_policy(ConfirmationPolicy::AutoApprove)
        .await
        .unwrap();
    assert_eq!(
        manager.current_state().confirmation_policy,
        ConfirmationPolicy::AutoApprove
    );

    manager.create_conversation().await.unwrap();
    wait_for_state(&mut states, |s| s.conversation_id.is_some()).await;

    let mut changes = manager.subscribe_changes();
    manager.send_message("go").await.unwrap();
    wait_for_running(&mut changes, true).await;
    wait_for_running(&mut changes, false).await;

    assert_eq!(manager.current_state().pending_action_count, 0);
    assert_eq!(backend.approvals().await, vec![true]);
}

#[tokio::test]
async fn switching_back_restores_an_awaiting_confirmation() {
    let (manager, _backend) = manager_with_script(
        vec![vec![ScriptStep::Propose {
            description: "risky step".to_string(),
            risk: RiskLevel::High,
        }]],
        ConfirmationPolicy::AlwaysConfirm,
    );
    let mut states = manager.watch_state();

    manager.create_conversation().await.unwrap();
    let first = wait_for_state(&mut states, |s| s.conversation_id.is_some()).await;
    let first_id = first.conversation_id.clone().unwrap();

    manager.send_message("do the risky step").await.unwrap();
    let surfaced = wait_for_state(&mut states, |s| s.pending_action_count == 1).await;
    let action = surfaced.pending_actions[0].clone();

    // Foreground a fresh conversation; the prompt belongs to the first.
    manager.create_conversation().await.unwrap();
    let second = wait_for_state(&mut states, |s| {
        s.conversation_id.as_deref() != Some(first_id.as_str())
    })
    .await;
    assert_eq!(second.pending_action_count, 0);
    assert!(!second.running);

    // The first conversation's action cannot be resolved from here.
    let err = manager.answer_confirmation(&action.id, true).await.unwrap_err();
    assert!(err.is_confirmation_conflict());

    manager.switch_to(&first_id).await.unwrap();
    let restored = wait_for_state(&mut states, |s| {
        s.conversation_id.as_deref() == Some(first_id.as_str())
    })
    .await;
    assert_eq!(restored.pending_action_count, 1);
    assert_eq!(restored.pending_actions[0].id, action.id);
    assert!(restored.running);

    manager.answer_confirmation(&action.id, true).await.unwrap();
    wait_for_state(&mut states, |s| !s.running && s.pending_action_count == 0).await;
}

#[tokio::test]
async fn switch_to_unknown_conversation_is_not_found() {
    let (manager, _backend) =
        manager_with_script(vec![], ConfirmationPolicy::AlwaysConfirm);
    let mut states = manager.watch_state();

    manager.create_conversation().await.unwrap();
    let created = wait_for_state(&mut states, |s| s.conversation_id.is_some()).await;

    let err = manager.switch_to("no-such-id").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(
        manager.current_state().conversation_id,
        created.conversation_id
    );
}

#[tokio::test]
async fn removing_the_active_conversation_goes_idle() {
    let (manager, _backend) =
        manager_with_script(vec![], ConfirmationPolicy::AlwaysConfirm);
    let mut states = manager.watch_state();

    manager.create_conversation().await.unwrap();
    let created = wait_for_state(&mut states, |s| s.conversation_id.is_some()).await;
    let id = created.conversation_id.unwrap();

    manager.remove_conversation(&id).await.unwrap();
    wait_for_state(&mut states, |s| s.conversation_id.is_none()).await;

    // The removed conversation cannot be foregrounded again.
    let err = manager.switch_to(&id).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn removing_a_background_conversation_leaves_state_alone() {
    let (manager, _backend) =
        manager_with_script(vec![], ConfirmationPolicy::AlwaysConfirm);
    let mut states = manager.watch_state();

    manager.create_conversation().await.unwrap();
    let first = wait_for_state(&mut states, |s| s.conversation_id.is_some()).await;
    let first_id = first.conversation_id.unwrap();

    manager.create_conversation().await.unwrap();
    let second = wait_for_state(&mut states, |s| {
        s.conversation_id.as_deref() != Some(first_id.as_str())
    })
    .await;

    manager.remove_conversation(&first_id).await.unwrap();
    // Unknown ids are ignored too.
    manager.remove_conversation("no-such-id").await.unwrap();

    assert_eq!(
        manager.current_state().conversation_id,
        second.conversation_id
    );
}

#[tokio::test]
async fn failed_turn_surfaces_the_error() {
    let (manager, _backend) = manager_with_script(
        vec![vec![ScriptStep::Fail("tool exploded".to_string())]],
        ConfirmationPolicy::AlwaysConfirm,
    );
    let mut states = manager.watch_state();

    manager.create_conversation().await.unwrap();
    manager.send_message("try it").await.unwrap();

    let failed = wait_for_state(&mut states, |s| s.last_error.is_some()).await;
    assert!(!failed.running);
    assert!(failed.last_error.unwrap().contains("tool exploded"));

    // A new turn clears the error.
    let mut changes = manager.subscribe_changes();
    manager.send_message("try again").await.unwrap();
    wait_for_running(&mut changes, true).await;
    wait_for_running(&mut changes, false).await;
    assert!(manager.current_state().last_error.is_none());
}

#[tokio::test]
async fn progress_updates_metrics_and_elapsed() {
    let delta = ConversationMetrics {
        input_tokens: 120,
        output_tokens: 40,
        context_window: 8192,
        accumulated_cost: 0.01,
    };
    let (manager, _backend) = manager_with_script(
        vec![vec![
            ScriptStep::Metrics(delta),
            ScriptStep::Progress("done".to_string()),
        ]],
        ConfirmationPolicy::AlwaysConfirm,
    );
    let mut states = manager.watch_state();

    manager.create_conversation().await.unwrap();
    manager.send_message("measure").await.unwrap();

    let measured = wait_for_state(&mut states, |s| s.metrics.input_tokens == 120).await;
    assert_eq!(measured.metrics.output_tokens, 40);
    assert_eq!(measured.metrics.context_window, 8192);

    wait_for_state(&mut states, |s| !s.running).await;
}

#[tokio::test]
async fn new_message_lifts_an_explicit_pause() {
    let (manager, _backend) = manager_with_script(
        vec![vec![ScriptStep::Progress("back to work".to_string())]],
        ConfirmationPolicy::AlwaysConfirm,
    );
    let mut states = manager.watch_state();

    manager.create_conversation().await.unwrap();
    wait_for_state(&mut states, |s| s.conversation_id.is_some()).await;

    manager.pause_current().await.unwrap();

    // The paused worker must wake up and run the new turn to completion.
    let mut changes = manager.subscribe_changes();
    manager.send_message("keep going").await.unwrap();
    wait_for_running(&mut changes, true).await;
    wait_for_running(&mut changes, false).await;

    let done = manager.current_state();
    assert!(done.last_error.is_none());
    assert_eq!(done.title, "keep going");
}

#[tokio::test]
async fn messages_do_not_leak_into_other_conversations() {
    let delta = ConversationMetrics {
        input_tokens: 7,
        output_tokens: 3,
        context_window: 2048,
        accumulated_cost: 0.001,
    };
    let (manager, _backend) = manager_with_script(
        vec![vec![
            ScriptStep::Metrics(delta),
            ScriptStep::Progress("first conversation work".to_string()),
        ]],
        ConfirmationPolicy::AlwaysConfirm,
    );
    let mut states = manager.watch_state();

    manager.create_conversation().await.unwrap();
    let first = wait_for_state(&mut states, |s| s.conversation_id.is_some()).await;
    let first_id = first.conversation_id.unwrap();

    manager.create_conversation().await.unwrap();
    let second = wait_for_state(&mut states, |s| {
        s.conversation_id.as_deref() != Some(first_id.as_str())
    })
    .await;
    let second_id = second.conversation_id.unwrap();

    manager.switch_to(&first_id).await.unwrap();
    wait_for_state(&mut states, |s| {
        s.conversation_id.as_deref() == Some(first_id.as_str())
    })
    .await;

    let mut changes = manager.subscribe_changes();
    manager.send_message("only for the first").await.unwrap();
    wait_for_running(&mut changes, true).await;
    wait_for_running(&mut changes, false).await;

    let done = manager.current_state();
    assert_eq!(done.metrics.input_tokens, 7);
    assert_eq!(done.title, "only for the first");

    // The other conversation's runner never saw any of it.
    manager.switch_to(&second_id).await.unwrap();
    let other = wait_for_state(&mut states, |s| {
        s.conversation_id.as_deref() == Some(second_id.as_str())
    })
    .await;
    assert!(!other.running);
    assert_eq!(other.pending_action_count, 0);
    assert_eq!(other.metrics, ConversationMetrics::default());
    assert_eq!(other.elapsed_seconds, 0.0);
    assert_eq!(other.title, "New conversation");
    assert!(other.last_error.is_none());
}

#[tokio::test]
async fn decisions_and_pauses_need_a_conversation() {
    let (manager, _backend) =
        manager_with_script(vec![], ConfirmationPolicy::AlwaysConfirm);

    let err = manager.answer_confirmation("any", true).await.unwrap_err();
    assert!(err.is_validation());

    let err = manager.pause_current().await.unwrap_err();
    assert!(err.is_validation());
}

//! Session actor behavior against an in-memory agent service
//!
//! Time is paused, so polling and watchdog ceilings elapse instantly.

mod common;

use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use common::{MockAgentService, Reply, answer, init_logging, prompt, question, registry, wait_for};
use kodegen_opencode_daemon::{
    CommandRequest, DaemonError, ModelRef, SessionCommand, SessionId, SessionState,
};

fn ses() -> SessionId {
    SessionId::new("ses_1")
}

#[tokio::test(start_paused = true)]
async fn test_prompt_runs_to_idle() {
    init_logging();
    let service = MockAgentService::new();
    let registry = registry(&service);
    let (handle, created) = registry.ensure(&ses(), None).unwrap();
    assert!(created);

    service.push_reply(Reply::Ok(json!({"parts": [{"type": "text", "text": "4"}]})));
    handle.submit(SessionCommand::Prompt(prompt("2 + 2?"))).unwrap();

    let snapshot = wait_for(&handle, |s| s.latest_response.is_some() && s.queued == 0).await;
    assert_eq!(snapshot.state, SessionState::Idle);
    let latest = snapshot.latest_response.unwrap();
    assert!(latest.error.is_none());
    assert_eq!(latest.result["parts"][0]["text"], "4");

    assert_eq!(service.prompt_texts(), vec!["2 + 2?"]);
    assert_eq!(service.directories(), vec![PathBuf::from("/work/project")]);
}

#[tokio::test(start_paused = true)]
async fn test_remote_failure_is_recorded_not_raised() {
    init_logging();
    let service = MockAgentService::new();
    let registry = registry(&service);
    let (handle, _) = registry.ensure(&ses(), None).unwrap();

    service.push_reply(Reply::Fail("API error 500".to_string()));
    handle.submit(SessionCommand::Prompt(prompt("hi"))).unwrap();

    let snapshot = wait_for(&handle, |s| s.latest_response.is_some()).await;
    assert_eq!(snapshot.state, SessionState::Idle);
    let error = snapshot.latest_response.unwrap().error.unwrap();
    assert!(error.contains("API error 500"), "{error}");
}

#[tokio::test(start_paused = true)]
async fn test_command_runs_worker() {
    init_logging();
    let service = MockAgentService::new();
    let registry = registry(&service);
    let (handle, _) = registry.ensure(&ses(), None).unwrap();

    let command = CommandRequest {
        agent: "build".to_string(),
        model: ModelRef::new("zai", "glm-5"),
        command: "review".to_string(),
        arguments: "src/".to_string(),
        parts: Vec::new(),
    };
    handle.submit(SessionCommand::Command(command)).unwrap();

    wait_for(&handle, |s| s.latest_response.is_some()).await;
    let commands = service.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].1.command, "review");
    assert!(service.prompts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_at_most_one_worker_per_session() {
    init_logging();
    let service = MockAgentService::new();
    let registry = registry(&service);
    let (handle, _) = registry.ensure(&ses(), None).unwrap();

    let gate = Arc::new(Notify::new());
    service.push_reply(Reply::Gated(Arc::clone(&gate), Ok(json!("first"))));
    handle.submit(SessionCommand::Prompt(prompt("first"))).unwrap();
    wait_for(&handle, |s| s.state == SessionState::Busy).await;

    // Bypasses the daemon's busy check; the actor itself must drop these.
    handle.submit(SessionCommand::Prompt(prompt("second"))).unwrap();
    handle.submit(SessionCommand::Prompt(prompt("continue"))).unwrap();
    wait_for(&handle, |s| s.queued == 0).await;

    gate.notify_one();
    let snapshot = wait_for(&handle, |s| s.state == SessionState::Idle).await;
    assert_eq!(snapshot.latest_response.unwrap().result, json!("first"));
    assert_eq!(service.prompt_texts(), vec!["first"]);
    assert_eq!(service.max_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_questions_drive_waiting_state() {
    init_logging();
    let service = MockAgentService::new();
    let registry = registry(&service);
    let (handle, _) = registry.ensure(&ses(), None).unwrap();

    let gate = Arc::new(Notify::new());
    service.push_reply(Reply::Gated(Arc::clone(&gate), Ok(json!(null))));
    handle.submit(SessionCommand::Prompt(prompt("work"))).unwrap();
    wait_for(&handle, |s| s.state == SessionState::Busy).await;

    service.set_questions(vec![question("q1", "ses_1"), question("q9", "ses_other")]);
    let snapshot = wait_for(&handle, |s| s.state == SessionState::WaitingForInput).await;
    assert_eq!(snapshot.questions.len(), 1);
    assert_eq!(snapshot.questions[0].id.as_str(), "q1");

    // Worker still alive: back to BUSY once the question disappears.
    service.set_questions(Vec::new());
    let snapshot = wait_for(&handle, |s| s.state != SessionState::WaitingForInput).await;
    assert_eq!(snapshot.state, SessionState::Busy);
    assert!(snapshot.questions.is_empty());

    gate.notify_one();
    wait_for(&handle, |s| s.state == SessionState::Idle).await;
}

#[tokio::test(start_paused = true)]
async fn test_question_outlives_worker() {
    init_logging();
    let service = MockAgentService::new();
    let registry = registry(&service);
    let (handle, _) = registry.ensure(&ses(), None).unwrap();

    let gate = Arc::new(Notify::new());
    service.push_reply(Reply::Gated(Arc::clone(&gate), Ok(json!("partial"))));
    handle.submit(SessionCommand::Prompt(prompt("work"))).unwrap();
    service.set_questions(vec![question("q1", "ses_1")]);
    wait_for(&handle, |s| s.state == SessionState::WaitingForInput).await;

    // Completion while a question is open keeps WAITING_FOR_INPUT.
    gate.notify_one();
    let snapshot = wait_for(&handle, |s| s.latest_response.is_some()).await;
    assert_eq!(snapshot.state, SessionState::WaitingForInput);

    service.set_questions(Vec::new());
    wait_for(&handle, |s| s.state == SessionState::Idle).await;
}

#[tokio::test(start_paused = true)]
async fn test_answer_removes_only_answered_question() {
    init_logging();
    let service = MockAgentService::new();
    let registry = registry(&service);
    let (handle, _) = registry.ensure(&ses(), None).unwrap();

    let gate = Arc::new(Notify::new());
    service.push_reply(Reply::Gated(Arc::clone(&gate), Ok(json!(null))));
    handle.submit(SessionCommand::Prompt(prompt("work"))).unwrap();
    service.set_questions(vec![question("q1", "ses_1"), question("q2", "ses_1")]);
    wait_for(&handle, |s| s.questions.len() == 2).await;

    handle.submit(SessionCommand::Answer(answer("q1"))).unwrap();
    let snapshot = wait_for(&handle, |s| s.queued == 0 && s.questions.len() == 1).await;
    assert_eq!(snapshot.state, SessionState::WaitingForInput);
    assert_eq!(snapshot.questions[0].id.as_str(), "q2");
    assert_eq!(service.answers()[0].request_id.as_str(), "q1");

    handle.submit(SessionCommand::Answer(answer("q2"))).unwrap();
    let snapshot = wait_for(&handle, |s| s.queued == 0 && s.questions.is_empty()).await;
    assert_eq!(snapshot.state, SessionState::Busy);

    gate.notify_one();
    wait_for(&handle, |s| s.state == SessionState::Idle).await;
}

#[tokio::test(start_paused = true)]
async fn test_answer_with_no_worker_goes_idle() {
    init_logging();
    let service = MockAgentService::new();
    let registry = registry(&service);
    let (handle, _) = registry.ensure(&ses(), None).unwrap();

    service.set_questions(vec![question("q1", "ses_1")]);
    wait_for(&handle, |s| s.state == SessionState::WaitingForInput).await;

    handle.submit(SessionCommand::Answer(answer("q1"))).unwrap();
    wait_for(&handle, |s| s.queued == 0 && s.state == SessionState::Idle).await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_answer_leaves_state_unchanged() {
    init_logging();
    let service = MockAgentService::new();
    let registry = registry(&service);
    let (handle, _) = registry.ensure(&ses(), None).unwrap();

    service.set_questions(vec![question("q1", "ses_1")]);
    wait_for(&handle, |s| s.state == SessionState::WaitingForInput).await;

    service.set_answer_fails(true);
    handle.submit(SessionCommand::Answer(answer("q1"))).unwrap();
    let snapshot = wait_for(&handle, |s| s.queued == 0).await;
    assert_eq!(snapshot.state, SessionState::WaitingForInput);
    assert_eq!(snapshot.questions.len(), 1);

    // A retry goes through once the service accepts it.
    service.set_answer_fails(false);
    handle.submit(SessionCommand::Answer(answer("q1"))).unwrap();
    wait_for(&handle, |s| s.state == SessionState::Idle).await;
}

#[tokio::test(start_paused = true)]
async fn test_optimistic_removal_heals_on_next_poll() {
    init_logging();
    let service = MockAgentService::new();
    let registry = registry(&service);
    let (handle, _) = registry.ensure(&ses(), None).unwrap();

    service.set_questions(vec![question("q1", "ses_1")]);
    wait_for(&handle, |s| s.state == SessionState::WaitingForInput).await;

    handle.submit(SessionCommand::Answer(answer("q1"))).unwrap();
    wait_for(&handle, |s| s.questions.is_empty()).await;

    // The remote still reports the question after all.
    service.set_questions(vec![question("q1", "ses_1")]);
    tokio::time::sleep(Duration::from_millis(3_100)).await;
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, SessionState::WaitingForInput);
    assert_eq!(snapshot.questions[0].id.as_str(), "q1");
}

#[tokio::test(start_paused = true)]
async fn test_poll_failure_is_a_noop() {
    init_logging();
    let service = MockAgentService::new();
    let registry = registry(&service);
    let (handle, _) = registry.ensure(&ses(), None).unwrap();

    service.set_questions(vec![question("q1", "ses_1")]);
    wait_for(&handle, |s| s.state == SessionState::WaitingForInput).await;

    service.set_poll_fails(true);
    service.set_questions(Vec::new());
    let polls = service.polls();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(service.polls() > polls);
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, SessionState::WaitingForInput);
    assert_eq!(snapshot.questions.len(), 1);
    assert!(!handle.is_stopped());
}

#[tokio::test(start_paused = true)]
async fn test_polling_is_throttled() {
    init_logging();
    let service = MockAgentService::new();
    let registry = registry(&service);
    let (handle, _) = registry.ensure(&ses(), None).unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let start = service.polls();
    for _ in 0..20 {
        handle.submit(SessionCommand::SetWorkingDir(PathBuf::from("/work/project"))).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    // 1s of steady command traffic fits in a single 2s poll window.
    assert!(service.polls() - start <= 1, "polled {} times", service.polls() - start);
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_recovers_hung_task() {
    init_logging();
    let service = MockAgentService::new();
    let registry = registry(&service);
    let (handle, _) = registry.ensure(&ses(), None).unwrap();

    service.push_reply(Reply::Hang);
    service.push_reply(Reply::Hang);
    handle.submit(SessionCommand::Prompt(prompt("long task"))).unwrap();
    wait_for(&handle, |s| s.state == SessionState::Busy).await;

    tokio::time::sleep(Duration::from_secs(590)).await;
    assert!(service.aborts().is_empty());

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(service.aborts(), vec![ses()]);
    // The hung call was released by the abort; its error must not surface.
    assert!(handle.snapshot().latest_response.is_none());
    assert_eq!(handle.state(), SessionState::Busy);

    tokio::time::sleep(Duration::from_secs(4)).await;
    let prompts = service.prompts();
    assert_eq!(prompts.len(), 2);
    assert_eq!(prompts[1].1.first_text(), Some("continue"));
    assert_eq!(prompts[1].1.agent, "build");
    assert_eq!(prompts[1].1.model, ModelRef::new("zai", "glm-5"));

    // The clock restarted with the replacement worker.
    tokio::time::sleep(Duration::from_secs(500)).await;
    assert_eq!(service.aborts().len(), 1);
    assert!(handle.snapshot().latest_response.is_none());

    tokio::time::sleep(Duration::from_secs(110)).await;
    assert_eq!(service.aborts().len(), 2);

    let snapshot = wait_for(&handle, |s| s.latest_response.is_some()).await;
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(snapshot.latest_response.unwrap().error.is_none());
    assert_eq!(service.prompts().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_ignores_waiting_sessions() {
    init_logging();
    let service = MockAgentService::new();
    let registry = registry(&service);
    let (handle, _) = registry.ensure(&ses(), None).unwrap();

    service.push_reply(Reply::Hang);
    handle.submit(SessionCommand::Prompt(prompt("ask me"))).unwrap();
    service.set_questions(vec![question("q1", "ses_1")]);
    wait_for(&handle, |s| s.state == SessionState::WaitingForInput).await;

    tokio::time::sleep(Duration::from_secs(900)).await;
    assert!(service.aborts().is_empty());

    // Answering restarts the clock rather than tripping it immediately.
    handle.submit(SessionCommand::Answer(answer("q1"))).unwrap();
    wait_for(&handle, |s| s.state == SessionState::Busy).await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(service.aborts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_fix_discards_late_result_of_old_worker() {
    init_logging();
    let service = MockAgentService::new();
    let registry = registry(&service);
    let (handle, _) = registry.ensure(&ses(), None).unwrap();

    let old_gate = Arc::new(Notify::new());
    let new_gate = Arc::new(Notify::new());
    service.push_reply(Reply::Gated(Arc::clone(&old_gate), Err("stalled run failed".to_string())));
    service.push_reply(Reply::Gated(Arc::clone(&new_gate), Ok(json!({"fresh": true}))));

    handle.submit(SessionCommand::Prompt(prompt("work"))).unwrap();
    wait_for(&handle, |s| s.state == SessionState::Busy).await;

    handle.submit(SessionCommand::Fix).unwrap();
    wait_for(&handle, |s| s.queued == 0).await;
    assert_eq!(service.aborts(), vec![ses()]);

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(service.prompt_texts(), vec!["work", "continue"]);

    old_gate.notify_one();
    tokio::time::sleep(Duration::from_secs(3)).await;
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, SessionState::Busy);
    assert!(snapshot.latest_response.is_none());

    new_gate.notify_one();
    let snapshot = wait_for(&handle, |s| s.state == SessionState::Idle).await;
    let latest = snapshot.latest_response.unwrap();
    assert!(latest.error.is_none());
    assert_eq!(latest.result, json!({"fresh": true}));
}

#[tokio::test(start_paused = true)]
async fn test_fix_without_history_uses_fallback_agent() {
    init_logging();
    let service = MockAgentService::new();
    let registry = registry(&service);
    let (handle, _) = registry.ensure(&ses(), None).unwrap();

    handle.submit(SessionCommand::Fix).unwrap();
    let snapshot = wait_for(&handle, |s| s.queued == 0).await;
    assert_eq!(snapshot.state, SessionState::Busy);

    wait_for(&handle, |s| s.state == SessionState::Idle).await;
    let prompts = service.prompts();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].1.agent, "fallback-agent");
    assert_eq!(prompts[0].1.first_text(), Some("continue"));
}

#[tokio::test(start_paused = true)]
async fn test_fix_clears_pending_questions() {
    init_logging();
    let service = MockAgentService::new();
    let registry = registry(&service);
    let (handle, _) = registry.ensure(&ses(), None).unwrap();

    let gate = Arc::new(Notify::new());
    service.push_reply(Reply::Hang);
    service.push_reply(Reply::Gated(Arc::clone(&gate), Ok(json!(null))));
    handle.submit(SessionCommand::Prompt(prompt("work"))).unwrap();
    service.set_questions(vec![question("q1", "ses_1")]);
    wait_for(&handle, |s| s.state == SessionState::WaitingForInput).await;

    service.set_questions(Vec::new());
    handle.submit(SessionCommand::Fix).unwrap();
    let snapshot = wait_for(&handle, |s| s.queued == 0).await;
    assert_eq!(snapshot.state, SessionState::Busy);
    assert!(snapshot.questions.is_empty());
    gate.notify_one();
}

#[tokio::test(start_paused = true)]
async fn test_abort_goes_idle_and_ignores_released_call() {
    init_logging();
    let service = MockAgentService::new();
    let registry = registry(&service);
    let (handle, _) = registry.ensure(&ses(), None).unwrap();

    service.push_reply(Reply::Hang);
    handle.submit(SessionCommand::Prompt(prompt("work"))).unwrap();
    wait_for(&handle, |s| s.state == SessionState::Busy).await;

    handle.submit(SessionCommand::Abort).unwrap();
    let snapshot = wait_for(&handle, |s| s.queued == 0 && s.state == SessionState::Idle).await;
    assert_eq!(
        snapshot.latest_response.unwrap().error.as_deref(),
        Some("Task aborted by user")
    );

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(
        handle.snapshot().latest_response.unwrap().error.as_deref(),
        Some("Task aborted by user")
    );
    assert_eq!(service.prompts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_working_dir_update_scopes_later_calls() {
    init_logging();
    let service = MockAgentService::new();
    let registry = registry(&service);
    registry.ensure(&ses(), None).unwrap();

    let (handle, created) = registry
        .ensure(&ses(), Some(PathBuf::from("/work/other")))
        .unwrap();
    assert!(!created);

    handle.submit(SessionCommand::Prompt(prompt("hi"))).unwrap();
    wait_for(&handle, |s| s.latest_response.is_some()).await;
    assert_eq!(service.directories(), vec![PathBuf::from("/work/other")]);
}

#[tokio::test(start_paused = true)]
async fn test_sessions_are_independent() {
    init_logging();
    let service = MockAgentService::new();
    let registry = registry(&service);
    let (a, _) = registry.ensure(&SessionId::new("ses_a"), None).unwrap();
    let (b, _) = registry.ensure(&SessionId::new("ses_b"), None).unwrap();
    assert_eq!(registry.len(), 2);

    service.push_reply(Reply::Hang);
    a.submit(SessionCommand::Prompt(prompt("slow"))).unwrap();
    wait_for(&a, |s| s.state == SessionState::Busy).await;

    b.submit(SessionCommand::Prompt(prompt("fast"))).unwrap();
    wait_for(&b, |s| s.latest_response.is_some()).await;
    assert_eq!(a.state(), SessionState::Busy);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_every_actor() {
    init_logging();
    let service = MockAgentService::new();
    let registry = registry(&service);
    let (handle, _) = registry.ensure(&ses(), None).unwrap();

    registry.shutdown().await;
    assert!(registry.is_empty());
    assert!(handle.is_stopped());

    let err = handle.submit(SessionCommand::Fix).unwrap_err();
    assert!(matches!(err, DaemonError::SessionNotFound(_)));
    assert_eq!(handle.snapshot().queued, 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_is_not_held_by_stalled_abort() {
    init_logging();
    let service = MockAgentService::new();
    let registry = registry(&service);
    let (handle, _) = registry.ensure(&ses(), None).unwrap();

    service.set_abort_stalls(true);
    handle.submit(SessionCommand::Fix).unwrap();
    while service.aborts().is_empty() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    tokio::time::timeout(Duration::from_secs(5), registry.shutdown())
        .await
        .expect("shutdown waited on the stalled abort");
    assert!(handle.is_stopped());
    assert_eq!(handle.snapshot().queued, 0);

    // The stopped actor never sent the replacement "continue".
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(service.prompts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_is_not_held_by_stalled_answer() {
    init_logging();
    let service = MockAgentService::new();
    let registry = registry(&service);
    let (handle, _) = registry.ensure(&ses(), None).unwrap();

    service.set_questions(vec![question("q1", "ses_1")]);
    wait_for(&handle, |s| s.state == SessionState::WaitingForInput).await;

    service.set_answer_stalls(true);
    handle.submit(SessionCommand::Answer(answer("q1"))).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    tokio::time::timeout(Duration::from_secs(5), registry.shutdown())
        .await
        .expect("shutdown waited on the stalled answer");
    assert!(handle.is_stopped());
    assert_eq!(handle.snapshot().state, SessionState::WaitingForInput);
}

#[tokio::test(start_paused = true)]
async fn test_stopped_handle_is_replaced_on_next_start() {
    init_logging();
    let service = MockAgentService::new();
    let registry = registry(&service);
    let (handle, started) = registry.ensure(&ses(), None).unwrap();
    assert!(started);

    handle.stop();
    assert!(handle.is_stopped());
    tokio::time::sleep(Duration::from_secs(1)).await;
    let err = handle.submit(SessionCommand::Fix).unwrap_err();
    assert!(matches!(err, DaemonError::SessionNotFound(_)));

    let (fresh, started) = registry.ensure(&ses(), None).unwrap();
    assert!(started);
    assert!(!fresh.is_stopped());
    fresh.submit(SessionCommand::Prompt(prompt("again"))).unwrap();
    wait_for(&fresh, |s| s.latest_response.is_some()).await;
    assert_eq!(service.prompt_texts(), vec!["again"]);
}

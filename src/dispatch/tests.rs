// SPDX-FileCopyrightText: 2026 Coderelay contributors
// SPDX-License-Identifier: MIT

use std::sync::Arc;
use std::time::Duration;

use super::*;

fn core() -> Arc<DispatchCore> {
    Arc::new(DispatchCore::new(Arc::new(ChangeHistory::new())))
}

fn agent(value: &str) -> AgentId {
    AgentId::new(value).expect("agent id")
}

fn spec(kind: &str, priority: Priority, task_type: Option<&str>) -> CommandSpec {
    CommandSpec {
        kind: kind.to_owned(),
        payload: serde_json::json!({}),
        priority,
        source: "test".to_owned(),
        target_component_ids: Vec::new(),
        task_type: task_type.map(str::to_owned),
    }
}

fn ci_filter() -> CommandFilter {
    CommandFilter { task_types: Some(vec!["ci".to_owned()]), ..Default::default() }
}

/// Spins until the registry holds `n` waits. Only usable on a current-thread
/// test runtime where yielding lets spawned waiters run to registration.
async fn wait_for_registrations(core: &DispatchCore, n: usize) {
    while core.list_waiting().await.len() < n {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn pending_command_resolves_wait_immediately() {
    let core = core();
    let submitted = core.submit(spec("BUILD", Priority::High, Some("ci"))).await;
    assert_eq!(submitted.status, CommandStatus::Pending);

    let delivered = core
        .wait_for_command(agent("agentA"), ci_filter(), Duration::from_secs(5))
        .await
        .expect("delivery");
    assert_eq!(delivered.id, submitted.id);
    assert_eq!(delivered.status, CommandStatus::Delivered);
    assert_eq!(delivered.delivered_to, Some(agent("agentA")));
    assert!(delivered.delivered_at.is_some());

    assert!(core.list_pending().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn second_wait_for_same_command_times_out() {
    let core = core();
    core.submit(spec("BUILD", Priority::High, Some("ci"))).await;
    core.wait_for_command(agent("agentA"), ci_filter(), Duration::from_secs(5))
        .await
        .expect("delivery");

    let err = core
        .wait_for_command(agent("agentB"), ci_filter(), Duration::from_millis(5000))
        .await
        .unwrap_err();
    assert_eq!(err, WaitError::Timeout);
    assert!(core.list_waiting().await.is_empty());
}

#[tokio::test]
async fn submit_delivers_to_first_registered_waiter() {
    let core = core();

    let first = {
        let core = core.clone();
        tokio::spawn(async move {
            core.wait_for_command(agent("w1"), ci_filter(), Duration::from_secs(30)).await
        })
    };
    wait_for_registrations(&core, 1).await;

    let second = {
        let core = core.clone();
        tokio::spawn(async move {
            core.wait_for_command(agent("w2"), ci_filter(), Duration::from_secs(30)).await
        })
    };
    wait_for_registrations(&core, 2).await;

    let submitted = core.submit(spec("BUILD", Priority::Medium, Some("ci"))).await;
    assert_eq!(submitted.status, CommandStatus::Delivered);
    assert_eq!(submitted.delivered_to, Some(agent("w1")));

    let received = first.await.expect("join").expect("delivery");
    assert_eq!(received.id, submitted.id);

    // w2 keeps waiting; release it.
    assert_eq!(core.list_waiting().await.len(), 1);
    assert!(core.cancel_wait(&agent("w2")).await);
    assert_eq!(second.await.expect("join").unwrap_err(), WaitError::Cancelled);
}

#[tokio::test]
async fn each_command_is_delivered_at_most_once() {
    let core = core();

    let mut waits = Vec::new();
    for name in ["w1", "w2", "w3"] {
        let task_core = core.clone();
        let agent_id = agent(name);
        waits.push(tokio::spawn(async move {
            task_core
                .wait_for_command(agent_id, CommandFilter::default(), Duration::from_secs(30))
                .await
        }));
        wait_for_registrations(&core, waits.len()).await;
    }

    core.submit(spec("DEPLOY", Priority::High, None)).await;

    // exactly one waiter resolves; the others stay registered
    wait_for_registrations(&core, 2).await;
    assert_eq!(core.list_waiting().await.len(), 2);

    for agent_id in ["w2", "w3"] {
        core.cancel_wait(&agent(agent_id)).await;
    }
    let mut delivered = 0;
    for wait in waits {
        if wait.await.expect("join").is_ok() {
            delivered += 1;
        }
    }
    assert_eq!(delivered, 1);
}

#[tokio::test]
async fn pending_commands_match_in_insertion_order() {
    let core = core();
    let first = core.submit(spec("BUILD", Priority::Low, Some("ci"))).await;
    let second = core.submit(spec("BUILD", Priority::Low, Some("ci"))).await;

    let delivered = core
        .wait_for_command(agent("a"), ci_filter(), Duration::from_secs(5))
        .await
        .expect("delivery");
    assert_eq!(delivered.id, first.id);

    let remaining = core.list_pending().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, second.id);
}

#[tokio::test(start_paused = true)]
async fn non_matching_command_stays_pending() {
    let core = core();
    core.submit(spec("BUILD", Priority::Low, Some("deploy"))).await;

    let err = core
        .wait_for_command(agent("a"), ci_filter(), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert_eq!(err, WaitError::Timeout);
    assert_eq!(core.list_pending().await.len(), 1);
}

#[tokio::test]
async fn cancel_is_lenient_and_idempotent() {
    let core = core();
    let pending = core.submit(spec("BUILD", Priority::Low, None)).await;

    assert_eq!(core.cancel(&pending.id).await, Some(CommandStatus::Cancelled));
    assert_eq!(core.cancel(&pending.id).await, Some(CommandStatus::Cancelled));

    // delivered commands keep their terminal status
    let delivered = core.submit(spec("BUILD", Priority::High, Some("ci"))).await;
    core.wait_for_command(agent("a"), ci_filter(), Duration::from_secs(5))
        .await
        .expect("delivery");
    assert_eq!(core.cancel(&delivered.id).await, Some(CommandStatus::Delivered));

    assert_eq!(core.cancel(&CommandId::random()).await, None);
}

#[tokio::test(start_paused = true)]
async fn cancelled_command_is_never_delivered() {
    let core = core();
    let submitted = core.submit(spec("BUILD", Priority::High, Some("ci"))).await;
    core.cancel(&submitted.id).await;

    let err = core
        .wait_for_command(agent("a"), ci_filter(), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert_eq!(err, WaitError::Timeout);
}

#[tokio::test]
async fn reregistering_rejects_the_prior_wait_as_superseded() {
    let core = core();

    let first = {
        let core = core.clone();
        tokio::spawn(async move {
            core.wait_for_command(agent("a"), ci_filter(), Duration::from_secs(30)).await
        })
    };
    wait_for_registrations(&core, 1).await;

    let second = {
        let core = core.clone();
        tokio::spawn(async move {
            core.wait_for_command(agent("a"), ci_filter(), Duration::from_secs(30)).await
        })
    };
    assert_eq!(first.await.expect("join").unwrap_err(), WaitError::Superseded);

    // the registry still holds exactly one wait for the agent, and it is live
    assert_eq!(core.list_waiting().await.len(), 1);
    let submitted = core.submit(spec("BUILD", Priority::Low, Some("ci"))).await;
    let received = second.await.expect("join").expect("delivery");
    assert_eq!(received.id, submitted.id);
}

#[tokio::test]
async fn cancel_wait_fails_the_wait_and_reports_unknown_agents() {
    let core = core();
    assert!(!core.cancel_wait(&agent("ghost")).await);

    let wait = {
        let core = core.clone();
        tokio::spawn(async move {
            core.wait_for_command(agent("a"), CommandFilter::default(), Duration::from_secs(30))
                .await
        })
    };
    wait_for_registrations(&core, 1).await;

    assert!(core.cancel_wait(&agent("a")).await);
    assert_eq!(wait.await.expect("join").unwrap_err(), WaitError::Cancelled);
    assert!(core.list_waiting().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn list_waiting_reports_filters_until_timeout() {
    let core = core();
    let wait = {
        let core = core.clone();
        tokio::spawn(async move {
            core.wait_for_command(agent("a"), ci_filter(), Duration::from_secs(2)).await
        })
    };
    wait_for_registrations(&core, 1).await;

    let waiting = core.list_waiting().await;
    assert_eq!(waiting[0].agent_id, agent("a"));
    assert_eq!(waiting[0].filter, ci_filter());

    assert_eq!(wait.await.expect("join").unwrap_err(), WaitError::Timeout);
    assert!(core.list_waiting().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn delivery_at_the_deadline_beats_the_timeout() {
    let core = core();
    let wait = {
        let core = core.clone();
        tokio::spawn(async move {
            core.wait_for_command(agent("a"), CommandFilter::default(), Duration::from_millis(100))
                .await
        })
    };
    wait_for_registrations(&core, 1).await;

    // Queue a submitter, then expire the deadline. When time advances both
    // tasks are runnable; the submitter was queued first, so its claim takes
    // the lock before the waiter's timeout arm and removes the registration.
    // Lock order decides: the wait resolves with the command, not Timeout.
    let submit = {
        let core = core.clone();
        tokio::spawn(async move { core.submit(spec("BUILD", Priority::Low, None)).await })
    };
    tokio::time::advance(Duration::from_millis(100)).await;

    let submitted = submit.await.expect("join");
    assert_eq!(submitted.status, CommandStatus::Delivered);
    assert_eq!(submitted.delivered_to, Some(agent("a")));

    let received = wait.await.expect("join").expect("delivery");
    assert_eq!(received.id, submitted.id);
}

#[tokio::test(start_paused = true)]
async fn stale_deadline_never_tears_down_a_superseding_wait() {
    let core = core();
    let first = {
        let core = core.clone();
        tokio::spawn(async move {
            core.wait_for_command(agent("a"), ci_filter(), Duration::from_millis(100)).await
        })
    };
    wait_for_registrations(&core, 1).await;

    let second = {
        let core = core.clone();
        tokio::spawn(async move {
            core.wait_for_command(agent("a"), ci_filter(), Duration::from_secs(60)).await
        })
    };
    assert_eq!(first.await.expect("join").unwrap_err(), WaitError::Superseded);

    // Run past the first wait's deadline: the replacement registration has a
    // newer sequence number, so nothing removes it.
    tokio::time::advance(Duration::from_millis(200)).await;
    tokio::task::yield_now().await;
    assert_eq!(core.list_waiting().await.len(), 1);

    let submitted = core.submit(spec("BUILD", Priority::High, Some("ci"))).await;
    assert_eq!(submitted.delivered_to, Some(agent("a")));
    let received = second.await.expect("join").expect("delivery");
    assert_eq!(received.id, submitted.id);
}

#[tokio::test]
async fn command_history_is_newest_first_and_truncated() {
    let core = core();
    let first = core.submit(spec("ONE", Priority::Low, None)).await;
    let second = core.submit(spec("TWO", Priority::Low, None)).await;
    let third = core.submit(spec("THREE", Priority::Low, None)).await;
    core.cancel(&first.id).await;

    let all = core.command_history(100).await;
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].id, third.id);
    assert_eq!(all[2].id, first.id);
    assert_eq!(all[2].status, CommandStatus::Cancelled);

    let limited = core.command_history(2).await;
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].id, third.id);
    assert_eq!(limited[1].id, second.id);
}

#[tokio::test]
async fn submit_and_cancel_each_record_one_history_entry() {
    let history = Arc::new(ChangeHistory::new());
    let core = DispatchCore::new(history.clone());

    let submitted = core.submit(spec("BUILD", Priority::High, None)).await;
    core.cancel(&submitted.id).await;
    // unknown ids record nothing
    core.cancel(&CommandId::random()).await;

    let stats = history.stats().await;
    assert_eq!(stats.total_operations, 2);
    assert_eq!(stats.operation_counts["SEND_COMMAND"], 1);
    assert_eq!(stats.operation_counts["CANCEL_COMMAND"], 1);

    let entries = history.query(Some(submitted.id.as_str()), None, 10).await;
    assert_eq!(entries.len(), 2);
}

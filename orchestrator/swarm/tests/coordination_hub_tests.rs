// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! End-to-end coordination through the hub: locks, deadlock detection,
//! messaging, conflicts, snapshots and a full dry-run project.

use genesis_core::domain::agent::AgentId;
use genesis_core::domain::config::{CoordinationConfig, SnapshotConfig};
use genesis_core::domain::project::{ProjectArchetype, ProjectSpec};
use genesis_core::domain::task::TaskStatus;
use genesis_swarm::application::hub::CoordinationHub;
use genesis_swarm::domain::conflict::{FileVersion, ResolutionStrategy};
use genesis_swarm::domain::health::AgentHealth;
use genesis_swarm::domain::lock::{LockError, LockMode};
use genesis_swarm::domain::message::{MessagePayload, MessagePriority, MessageTarget};
use genesis_swarm::infrastructure::DryRunExecutor;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn agent(id: &str) -> AgentId {
    AgentId::new(id)
}

#[tokio::test]
async fn test_single_writer_many_readers() {
    let hub = CoordinationHub::new(CoordinationConfig::default());
    let locks = hub.locks().clone();

    for reader in ["gfa-1", "gfa-2", "gta-1"] {
        locks
            .request_lock("package.json", LockMode::Read, &agent(reader), Duration::from_millis(50), 1)
            .await
            .unwrap();
    }
    assert_eq!(locks.grants_for("package.json").len(), 3);

    let err = locks
        .request_lock("package.json", LockMode::Write, &agent("gsa-1"), Duration::from_millis(150), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, LockError::Timeout { .. }));

    for reader in ["gfa-1", "gfa-2", "gta-1"] {
        locks.release_lock("package.json", &agent(reader)).unwrap();
    }
    let grant = locks
        .request_lock("package.json", LockMode::Write, &agent("gsa-1"), Duration::from_millis(50), 1)
        .await
        .unwrap();
    assert_eq!(grant.owner, agent("gsa-1"));
    assert_eq!(locks.grants_for("package.json").len(), 1);
}

#[tokio::test]
async fn test_deadlock_between_two_agents_is_reported() {
    let hub = CoordinationHub::new(CoordinationConfig::default());
    let locks = hub.locks().clone();
    let (a, b) = (agent("agent-a"), agent("agent-b"));

    locks.request_lock("X", LockMode::Write, &a, Duration::from_millis(10), 1).await.unwrap();
    locks.request_lock("Y", LockMode::Write, &b, Duration::from_millis(10), 1).await.unwrap();

    let waiter_a = {
        let (locks, a) = (locks.clone(), a.clone());
        tokio::spawn(async move { locks.request_lock("Y", LockMode::Write, &a, Duration::from_millis(400), 1).await })
    };
    let waiter_b = {
        let (locks, b) = (locks.clone(), b.clone());
        tokio::spawn(async move { locks.request_lock("X", LockMode::Write, &b, Duration::from_millis(400), 1).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(locks.detect_deadlocks(), vec![vec![a.clone(), b.clone()]]);

    // Breaking the cycle lets one waiter through
    locks.release_all_for_agent(&a);
    assert!(waiter_b.await.unwrap().is_ok());
    assert!(matches!(waiter_a.await.unwrap(), Err(LockError::Timeout { .. })));
    assert!(locks.detect_deadlocks().is_empty());
}

#[tokio::test]
async fn test_broadcast_and_priority_delivery() {
    let hub = CoordinationHub::new(CoordinationConfig::default());
    let bus = hub.messages().clone();
    for id in ["ca-main", "gfa-1", "gta-1"] {
        bus.register_mailbox(&agent(id));
    }

    bus.send(&agent("gta-1"), &agent("gfa-1"), MessagePayload::Heartbeat, MessagePriority::Low, None)
        .unwrap();
    bus.send(
        &agent("ca-main"),
        MessageTarget::Broadcast,
        MessagePayload::StatusUpdate {
            status: "halt".to_string(),
            progress: None,
        },
        MessagePriority::Critical,
        None,
    )
    .unwrap();

    let inbox = bus.receive(&agent("gfa-1"), None).unwrap();
    assert_eq!(inbox.len(), 2);
    assert_eq!(inbox[0].priority, MessagePriority::Critical);
    assert_eq!(bus.queue_len(&agent("gta-1")), 1);
    assert_eq!(bus.queue_len(&agent("ca-main")), 0);
}

#[tokio::test]
async fn test_conflict_resolution_and_snapshot_rollback() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = CoordinationConfig::default();
    config.snapshots = SnapshotConfig {
        directory: Some(dir.path().to_path_buf()),
        ..SnapshotConfig::default()
    };

    let hub = CoordinationHub::new(config.clone());
    hub.initialize().unwrap();

    let base = FileVersion::new("export const routes = [];\n", agent("gsa-1"));
    hub.conflicts().record_base("src/routes.ts", base.clone());
    let before = hub.capture_snapshot(
        "before features",
        &HashMap::from([("src/routes.ts".to_string(), base)]),
        vec![],
    );

    let conflict = hub
        .conflicts()
        .detect_conflict(
            "src/routes.ts",
            vec![
                FileVersion::new("export const routes = ['auth'];\n", agent("gfa-1")),
                FileVersion::new("export const routes = ['billing'];\n", agent("gfa-2")),
            ],
        )
        .unwrap();
    assert_eq!(conflict.agents.len(), 2);

    let resolution = hub
        .conflicts()
        .resolve("src/routes.ts", ResolutionStrategy::Reject, hub.id())
        .unwrap();
    assert_eq!(resolution.content, "export const routes = [];\n");

    let after = hub.capture_snapshot(
        "after features",
        &HashMap::from([
            ("src/routes.ts".to_string(), FileVersion::new(resolution.content.clone(), agent("ca-main"))),
            ("src/auth.ts".to_string(), FileVersion::new("export {};\n", agent("gfa-1"))),
        ]),
        vec![],
    );
    let diff = hub.snapshots().compare_snapshots(&before.id, &after.id).unwrap();
    assert_eq!(diff.added, vec!["src/auth.ts".to_string()]);
    assert!(diff.modified.is_empty());

    hub.shutdown().await;

    // A fresh hub over the same directory restores both snapshots
    let restarted = CoordinationHub::new(config);
    restarted.initialize().unwrap();
    assert_eq!(restarted.snapshots().list().len(), 2);
    let files = restarted.snapshots().restore_files(&before.id).unwrap();
    assert_eq!(files["src/routes.ts"].content, "export const routes = [];\n");
    restarted.shutdown().await;
}

#[tokio::test]
async fn test_dry_run_project_through_hub() {
    let hub = CoordinationHub::new(CoordinationConfig::default());
    hub.initialize().unwrap();

    let coordinator = hub.coordination_agent(Arc::new(DryRunExecutor::new()));
    let spec = ProjectSpec::new("launchpad", ProjectArchetype::LandingPage);
    let outcome = coordinator.coordinate_autonomous_project(&spec).await.unwrap();

    assert!(outcome.success, "failed tasks: {:?}", outcome.validation.failed_tasks);
    assert!(outcome.validation.project_created);
    assert_eq!(outcome.validation.features_total, 4);
    assert!(outcome.results.iter().all(|r| r.status == TaskStatus::Completed));

    let view = hub.health_snapshot();
    assert!(view.initialized);
    assert!(view.health.agents >= 3);
    assert_eq!(view.health.total_tasks_failed, 0);
    assert_eq!(
        hub.health().get_status(&agent("gfa-1")).unwrap().health,
        AgentHealth::Healthy
    );
    assert!(view.messages.sent_total > 0);

    hub.shutdown().await;
}

#[tokio::test]
async fn test_failed_worker_is_recovered() {
    let mut config = CoordinationConfig::default();
    config.health.error_threshold = 1;
    config.coordination.halt_on_failure = false;
    let hub = CoordinationHub::new(config);

    let executor = DryRunExecutor::new().failing(["setup"]);
    let coordinator = hub.coordination_agent(Arc::new(executor));
    let outcome = coordinator
        .coordinate_autonomous_project(&ProjectSpec::new("acme", ProjectArchetype::SaasApp))
        .await
        .unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.validation.failed_tasks, vec!["setup".to_string()]);

    let setup_worker = agent("gsa-1");
    assert_eq!(
        hub.health().get_status(&setup_worker).unwrap().health,
        AgentHealth::Unhealthy
    );
    let (_, actions) = hub.health().run_cycle();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].agent_id, setup_worker);
}

#[tokio::test]
async fn test_emergency_stop_through_hub_shutdown() {
    let hub = Arc::new(CoordinationHub::new(CoordinationConfig::default()));
    hub.initialize().unwrap();

    let executor = DryRunExecutor::new().with_time_per_minute(Duration::from_millis(20));
    let coordinator = Arc::new(hub.coordination_agent(Arc::new(executor)));
    let runner = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            coordinator
                .coordinate_autonomous_project(&ProjectSpec::new("acme", ProjectArchetype::SaasApp))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    hub.shutdown().await;

    let outcome = runner.await.unwrap().unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.stopped.as_deref(), Some("shutdown"));
    assert!(!outcome.validation.blocked_tasks.is_empty());
}

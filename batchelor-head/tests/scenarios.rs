//! End-to-end scenario tests against an in-memory SQLite pool, covering the
//! numbered scenarios in spec.md §8.

use std::sync::Arc;
use std::time::Duration;

use batchelor_head::dispatch::observer::TracingObserver;
use batchelor_head::dispatch::DispatchService;
use batchelor_head::store::event_types::EventTypeStore;
use batchelor_head::store::tasks::TaskStore;
use batchelor_head::store::schema;
use batchelor_shared::auth::Role;
use batchelor_shared::model::{EventTypeAvailable, FetchRequest, RunRequest, Setting, TaskState};
use sqlx::SqlitePool;

async fn dispatch_service() -> DispatchService {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    schema::migrate(&pool).await.unwrap();
    DispatchService::new(
        TaskStore::new(pool.clone()),
        EventTypeStore::new(pool),
        Arc::new(TracingObserver),
        Duration::from_secs(300),
    )
}

async fn advertise(svc: &DispatchService, event_type: &str) {
    svc.fetch_task(
        Role::Worker,
        FetchRequest {
            tasks: vec![],
            metrics: vec![],
            event_types: vec![EventTypeAvailable {
                event_type: event_type.to_string(),
                available: true,
            }],
        },
    )
    .await
    .unwrap();
}

fn run_request(event_type: &str) -> RunRequest {
    RunRequest {
        event_type: event_type.to_string(),
        settings: vec![Setting::new("k", "v")],
        metrics: vec![],
        condition: String::new(),
        priority: 0,
    }
}

/// S1 — resubmitting an identical request against a still-queued task
/// dedups onto it and refreshes its priority/condition in place.
#[tokio::test]
async fn s1_dedup_of_a_queued_task_refreshes_priority_and_condition() {
    let svc = dispatch_service().await;
    advertise(&svc, "e").await;

    let first = svc.run_task(Role::Execute, run_request("e")).await.unwrap();
    assert!(!first.task_id.is_empty());

    let mut resubmit = run_request("e");
    resubmit.priority = 7;
    resubmit.condition = "${X} == \"1\"".to_string();
    let second = svc.run_task(Role::Execute, resubmit).await.unwrap();

    assert_eq!(first.task_id, second.task_id);
    let task = svc.get_task(Role::ReadOnly, &first.task_id).await.unwrap();
    assert_eq!(task.condition, "${X} == \"1\"");
    assert_eq!(task.priority, 7);
}

/// S2 — a condition referencing a variable that's only present in the
/// fetching worker's own metrics only admits once the right worker asks.
#[tokio::test]
async fn s2_condition_admits_only_the_matching_worker() {
    let svc = dispatch_service().await;
    advertise(&svc, "e").await;

    let mut request = run_request("e");
    request.condition = "${CLOUD} == \"GCP\"".to_string();
    svc.run_task(Role::Execute, request).await.unwrap();

    let fetch = |cloud: &str| FetchRequest {
        tasks: vec![],
        metrics: vec![Setting::new("CLOUD", cloud)],
        event_types: vec![EventTypeAvailable {
            event_type: "e".to_string(),
            available: true,
        }],
    };

    let from_aws = svc.fetch_task(Role::Worker, fetch("AWS")).await.unwrap();
    assert!(from_aws.run_configurations.is_empty());

    let from_gcp = svc.fetch_task(Role::Worker, fetch("GCP")).await.unwrap();
    assert_eq!(from_gcp.run_configurations.len(), 1);
}

/// S3 — an older, lower-priority task can overtake a fresher, higher
/// priority one once its aging bonus outweighs the gap.
#[tokio::test]
async fn s3_priority_aging_lets_an_older_task_win() {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    schema::migrate(&pool).await.unwrap();
    let tasks = TaskStore::new(pool.clone());
    let event_types = EventTypeStore::new(pool);
    let svc = DispatchService::new(tasks.clone(), event_types, Arc::new(TracingObserver), Duration::from_secs(300));

    let now = batchelor_shared::time::now_millis();

    let fresh = batchelor_shared::model::Task {
        task_id: "fresh".to_string(),
        crc32: 1,
        priority: 10,
        priority_ts: now,
        event_type: "e".to_string(),
        settings: Default::default(),
        metrics: Default::default(),
        signals: Vec::new(),
        condition: String::new(),
        created_ts: now,
        begin_ts: None,
        end_ts: None,
        last_heartbeat_ts: now,
        state: TaskState::Queued,
        return_code: None,
        message: None,
    };
    let mut old = fresh.clone();
    old.task_id = "old".to_string();
    old.crc32 = 2;
    old.priority = 0;
    old.priority_ts = now - 30 * 60_000;
    old.created_ts = now - 30 * 60_000;

    tasks.insert(&fresh).await.unwrap();
    tasks.insert(&old).await.unwrap();

    advertise(&svc, "e").await;
    let response = svc
        .fetch_task(
            Role::Worker,
            FetchRequest {
                tasks: vec![],
                metrics: vec![],
                event_types: vec![EventTypeAvailable {
                    event_type: "e".to_string(),
                    available: true,
                }],
            },
        )
        .await
        .unwrap();

    assert_eq!(response.run_configurations.len(), 1);
    assert_eq!(response.run_configurations[0].task_id, "old");
}

/// S6 — canceling a task that hasn't been picked up by a worker yet
/// transitions it straight to `signaled`, with no worker round-trip.
#[tokio::test]
async fn s6_cancel_a_queued_task_signals_immediately() {
    let svc = dispatch_service().await;
    advertise(&svc, "e").await;

    let resp = svc.run_task(Role::Execute, run_request("e")).await.unwrap();
    svc.send_signal(Role::Execute, &resp.task_id, "CANCEL").await.unwrap();

    let task = svc.get_task(Role::ReadOnly, &resp.task_id).await.unwrap();
    assert_eq!(task.state, TaskState::Signaled);
}

/// Zombie promotion: a queued task whose heartbeat goes stale is promoted
/// to `zombie` by the sweeper, not left queued forever.
#[tokio::test]
async fn zombie_sweep_promotes_stale_queued_and_running_tasks() {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    schema::migrate(&pool).await.unwrap();
    let tasks = TaskStore::new(pool.clone());
    let event_types = EventTypeStore::new(pool);

    let svc = DispatchService::new(tasks.clone(), event_types, Arc::new(TracingObserver), Duration::from_secs(0));

    let resp = svc.run_task(Role::Execute, run_request("e")).await;
    // Event type was never advertised, so admission is rejected; insert a
    // queued task directly to exercise the sweeper regardless.
    assert!(resp.unwrap().task_id.is_empty());

    let task = batchelor_shared::model::Task {
        task_id: "stale-1".to_string(),
        crc32: 0,
        priority: 0,
        priority_ts: 0,
        event_type: "e".to_string(),
        settings: Default::default(),
        metrics: Default::default(),
        signals: Vec::new(),
        condition: String::new(),
        created_ts: 0,
        begin_ts: None,
        end_ts: None,
        last_heartbeat_ts: 0,
        state: TaskState::Queued,
        return_code: None,
        message: None,
    };
    tasks.insert(&task).await.unwrap();

    let (promoted, _deleted) = tasks.sweep(1_000, i64::MAX).await.unwrap();
    assert_eq!(promoted, 1);

    let reloaded = tasks.load_by_id("stale-1").await.unwrap().unwrap();
    assert_eq!(reloaded.state, TaskState::Zombie);
}

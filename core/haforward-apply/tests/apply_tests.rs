mod common;

use common::{FakeHost, fast_config, hosts};
use haforward_apply::{
    ApplyError, ChangeIndexHandler, ChangeStateReader, CommandDispatcher, EntityIndexHandler,
    HostError, HostResult,
};
use haforward_transport::{FailsafePolicy, WorkerPool, context};
use haforward_types::{
    AccountId, ChangeId, Command, CommandPayload, EntityKind, GroupUuid, IndexEvent,
    IndexOperation, ProjectName,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

fn dispatcher(host: &Arc<FakeHost>) -> CommandDispatcher {
    CommandDispatcher::new(hosts(host), &fast_config(3))
}

// ── Dedup ────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_apply_for_same_id_is_rejected() {
    let host = FakeHost::new();
    let dispatcher = Arc::new(dispatcher(&host));
    let (mut entered, release) = host.hold_next_index();

    let first = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            dispatcher
                .apply(&Command::index_account(AccountId::new(7), None))
                .await
        })
    };
    entered.recv().await.unwrap();

    let second = dispatcher
        .apply(&Command::index_account(AccountId::new(7), None))
        .await;
    assert!(matches!(second, Err(ApplyError::AlreadyInFlight(id)) if id == "7"));

    release.send(()).unwrap();
    first.await.unwrap().unwrap();
    assert_eq!(host.mutations(), 1);
    assert!(
        dispatcher
            .entities(EntityKind::Account)
            .unwrap()
            .in_flight()
            .is_empty()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn different_ids_apply_concurrently() {
    let host = FakeHost::new();
    let dispatcher = Arc::new(dispatcher(&host));
    let (mut entered, release) = host.hold_next_index();

    let first = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            dispatcher
                .apply(&Command::index_account(AccountId::new(1), None))
                .await
        })
    };
    entered.recv().await.unwrap();

    dispatcher
        .apply(&Command::index_account(AccountId::new(2), None))
        .await
        .unwrap();

    release.send(()).unwrap();
    first.await.unwrap().unwrap();
    assert_eq!(host.mutations(), 2);
}

#[tokio::test]
async fn id_is_released_after_host_panic() {
    let host = FakeHost::new();
    let dispatcher = dispatcher(&host);
    host.panic_on_index.store(true, Ordering::SeqCst);

    let command = Command::index_group(&GroupUuid::new("g1"), None);
    assert!(matches!(
        dispatcher.apply(&command).await,
        Err(ApplyError::Task(_))
    ));

    host.panic_on_index.store(false, Ordering::SeqCst);
    dispatcher.apply(&command).await.unwrap();
    assert!(host.is_indexed(EntityKind::Group, "g1"));
}

// ── Loop prevention ──────────────────────────────────────────────

#[tokio::test]
async fn host_sees_forwarded_flag_during_apply() {
    let host = FakeHost::new();
    let dispatcher = dispatcher(&host);

    let commands = [
        Command::index_account(AccountId::new(1), None),
        Command::index_project("foo", None),
        Command::delete_project("foo"),
        Command::evict_cache("accounts", "1"),
        Command::post_event(serde_json::json!({"type": "ref-updated"})),
        Command::add_to_project_list("foo"),
        Command::delete_all_for_project("foo"),
    ];
    for command in &commands {
        dispatcher.apply(command).await.unwrap();
        assert!(!context::is_forwarded());
    }

    assert_eq!(host.mutations(), commands.len());
    assert!(host.all_mutations_forwarded());
}

#[tokio::test]
async fn flag_is_cleared_after_failure() {
    let host = FakeHost::new();
    host.fail_index_of("foo");
    let dispatcher = dispatcher(&host);

    let result = dispatcher.apply(&Command::index_project("foo", None)).await;

    assert!(matches!(result, Err(ApplyError::Host(HostError::Io(_)))));
    assert!(!context::is_forwarded());
    assert!(
        dispatcher
            .entities(EntityKind::Project)
            .unwrap()
            .in_flight()
            .is_empty()
    );
}

// ── Idempotence ──────────────────────────────────────────────────

#[tokio::test]
async fn applying_twice_leaves_the_same_state() {
    let host = FakeHost::new();
    let dispatcher = dispatcher(&host);
    let change = ChangeId::new("foo", 100);
    host.set_change(&change, 10, "X");

    let commands = [
        Command::index_change(&change, Some(IndexEvent::at(10).with_target("X"))),
        Command::index_account(AccountId::new(3), None),
        Command::add_to_project_list("bar"),
    ];
    for command in &commands {
        dispatcher.apply(command).await.unwrap();
    }
    let once = (host.indexed(), host.projects.lock().unwrap().clone());

    for command in &commands {
        dispatcher.apply(command).await.unwrap();
    }
    let twice = (host.indexed(), host.projects.lock().unwrap().clone());

    assert_eq!(once, twice);
}

// ── Unsupported delete ───────────────────────────────────────────

#[tokio::test]
async fn account_and_group_delete_are_unsupported() {
    let host = FakeHost::new();
    for kind in [EntityKind::Account, EntityKind::Group] {
        let handler = EntityIndexHandler::new(kind, host.clone(), WorkerPool::new("test", 1));
        let result = handler.apply("1", IndexOperation::Delete).await;
        assert!(matches!(
            result,
            Err(ApplyError::UnsupportedOperation { kind: k, operation: IndexOperation::Delete }) if k == kind
        ));
    }
    assert_eq!(host.mutations(), 0);
}

#[tokio::test]
async fn project_delete_is_applied() {
    let host = FakeHost::new();
    let dispatcher = dispatcher(&host);

    dispatcher.apply(&Command::index_project("foo", None)).await.unwrap();
    dispatcher.apply(&Command::delete_project("foo")).await.unwrap();

    assert!(!host.is_indexed(EntityKind::Project, "foo"));
}

#[tokio::test]
async fn account_delete_command_is_unsupported() {
    let host = FakeHost::new();
    let dispatcher = dispatcher(&host);
    let mut command = Command::index_account(AccountId::new(5), None);
    if let CommandPayload::IndexEntity(entity) = &mut command.payload {
        entity.operation = IndexOperation::Delete;
    }

    assert!(matches!(
        dispatcher.apply(&command).await,
        Err(ApplyError::UnsupportedOperation { .. })
    ));
    assert_eq!(host.mutations(), 0);
}

// ── Change index ─────────────────────────────────────────────────

#[tokio::test]
async fn current_change_is_indexed() {
    let host = FakeHost::new();
    let dispatcher = dispatcher(&host);
    let change = ChangeId::new("foo", 1);
    host.set_change(&change, 20, "X");

    dispatcher
        .apply(&Command::index_change(&change, Some(IndexEvent::at(10).with_target("Y"))))
        .await
        .unwrap();

    assert!(host.is_indexed(EntityKind::Change, "foo~1"));
}

#[tokio::test]
async fn stale_change_exhausts_retries_without_indexing() {
    let host = FakeHost::new();
    let dispatcher = dispatcher(&host);
    let change = ChangeId::new("foo", 1);
    host.set_change(&change, 10, "X");

    let result = dispatcher
        .apply(&Command::index_change(&change, Some(IndexEvent::at(10).with_target("Y"))))
        .await;

    assert!(matches!(result, Err(ApplyError::Exhausted { attempts: 3, .. })));
    assert_eq!(host.mutations(), 0);
    assert!(dispatcher.changes().in_flight().is_empty());
}

#[tokio::test]
async fn missing_change_is_removed_from_index() {
    let host = FakeHost::new();
    let dispatcher = dispatcher(&host);
    host.index
        .lock()
        .unwrap()
        .insert((EntityKind::Change, "foo~9".to_string()));

    dispatcher
        .apply(&Command::index_change(
            &ChangeId::new("foo", 9),
            Some(IndexEvent::at(10)),
        ))
        .await
        .unwrap();

    assert!(!host.is_indexed(EntityKind::Change, "foo~9"));
}

#[tokio::test]
async fn delete_all_for_project_only_touches_that_project() {
    let host = FakeHost::new();
    let dispatcher = dispatcher(&host);
    for (project, n) in [("foo", 1), ("foo", 2), ("bar", 1)] {
        let change = ChangeId::new(project, n);
        host.set_change(&change, 1, "X");
        dispatcher
            .apply(&Command::index_change(&change, None))
            .await
            .unwrap();
    }

    dispatcher
        .changes()
        .delete_all_for_project(&ProjectName::new("foo"))
        .await
        .unwrap();

    assert!(!host.is_indexed(EntityKind::Change, "foo~1"));
    assert!(!host.is_indexed(EntityKind::Change, "foo~2"));
    assert!(host.is_indexed(EntityKind::Change, "bar~1"));
}

/// A change whose local timestamp moves forward on every read.
struct CatchingUp {
    ts: AtomicI64,
    reads: AtomicUsize,
}

impl ChangeStateReader for CatchingUp {
    fn current_timestamp(&self, _change: &ChangeId) -> HostResult<i64> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.ts.fetch_add(1, Ordering::SeqCst))
    }

    fn meta_fingerprint(&self, _change: &ChangeId) -> HostResult<Option<String>> {
        Ok(Some("meta".into()))
    }

    fn target_fingerprint(&self, _change: &ChangeId) -> HostResult<Option<String>> {
        Ok(Some("X".into()))
    }
}

#[tokio::test]
async fn change_is_indexed_once_local_state_catches_up() {
    let host = FakeHost::new();
    let reader = Arc::new(CatchingUp {
        ts: AtomicI64::new(8),
        reads: AtomicUsize::new(0),
    });
    let handler = ChangeIndexHandler::new(
        host.clone(),
        reader.clone(),
        FailsafePolicy::new(5, Duration::from_millis(5)),
        WorkerPool::new("test", 1),
        WorkerPool::new("test-batch", 1),
    );

    handler
        .index(
            &ChangeId::new("foo", 1),
            Some(IndexEvent::at(10).with_target("X")),
            false,
        )
        .await
        .unwrap();

    assert_eq!(reader.reads.load(Ordering::SeqCst), 3);
    assert!(host.is_indexed(EntityKind::Change, "foo~1"));
}

#[tokio::test]
async fn dropped_caller_does_not_cancel_the_reindex() {
    let host = FakeHost::new();
    let reader = Arc::new(CatchingUp {
        ts: AtomicI64::new(8),
        reads: AtomicUsize::new(0),
    });
    let handler = ChangeIndexHandler::new(
        host.clone(),
        reader.clone(),
        FailsafePolicy::new(5, Duration::from_millis(20)),
        WorkerPool::new("test", 1),
        WorkerPool::new("test-batch", 1),
    );
    let change = ChangeId::new("foo", 1);

    // The caller gives up while the first retry is still waiting.
    let detached = tokio::time::timeout(
        Duration::from_millis(5),
        handler.index(&change, Some(IndexEvent::at(10).with_target("X")), false),
    )
    .await;
    assert!(detached.is_err());
    assert!(handler.in_flight().contains("foo~1"));

    for _ in 0..100 {
        if host.is_indexed(EntityKind::Change, "foo~1") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(host.is_indexed(EntityKind::Change, "foo~1"));
    assert_eq!(reader.reads.load(Ordering::SeqCst), 3);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(handler.in_flight().is_empty());
}

#[tokio::test]
async fn local_io_failure_stops_index_retries() {
    let host = FakeHost::new();
    let dispatcher = dispatcher(&host);
    let change = ChangeId::new("foo", 4);
    host.set_change(&change, 10, "X");
    host.fail_index_of("foo~4");

    let result = dispatcher
        .apply(&Command::index_change(&change, None))
        .await;

    assert!(matches!(result, Err(ApplyError::Host(HostError::Io(_)))));
}

#[tokio::test]
async fn malformed_change_id_is_invalid() {
    let host = FakeHost::new();
    let dispatcher = dispatcher(&host);
    let mut command = Command::index_change(&ChangeId::new("foo", 1), None);
    if let CommandPayload::IndexEntity(entity) = &mut command.payload {
        entity.entity_id = "no-number".into();
    }

    assert!(matches!(
        dispatcher.apply(&command).await,
        Err(ApplyError::InvalidId { kind: EntityKind::Change, .. })
    ));
}

// ── Caches, events, project list ─────────────────────────────────

#[tokio::test]
async fn eviction_key_is_decoded_for_its_cache() {
    let host = FakeHost::new();
    let dispatcher = dispatcher(&host);

    dispatcher
        .apply(&Command::evict_cache("changes", "\"foo~3\""))
        .await
        .unwrap();
    dispatcher
        .apply(&Command::evict_cache("owners.cache", "{\"a\":1}"))
        .await
        .unwrap();

    let evicted = host.evicted.lock().unwrap().clone();
    assert_eq!(
        evicted[0].key,
        haforward_types::CacheKey::Change(ChangeId::new("foo", 3))
    );
    assert_eq!(evicted[1].plugin_namespace, "owners");
    assert_eq!(evicted[1].cache_name, "cache");
}

#[tokio::test]
async fn malformed_eviction_key_is_rejected() {
    let host = FakeHost::new();
    let dispatcher = dispatcher(&host);

    let result = dispatcher
        .apply(&Command::evict_cache("accounts", "\"not-a-number\""))
        .await;

    assert!(matches!(result, Err(ApplyError::Codec(_))));
    assert_eq!(host.mutations(), 0);
}

#[tokio::test]
async fn project_list_follows_add_and_remove() {
    let host = FakeHost::new();
    let dispatcher = dispatcher(&host);

    dispatcher.apply(&Command::add_to_project_list("a")).await.unwrap();
    dispatcher.apply(&Command::add_to_project_list("b")).await.unwrap();
    dispatcher
        .apply(&Command::remove_from_project_list("a"))
        .await
        .unwrap();

    let projects: Vec<_> = host.projects.lock().unwrap().iter().cloned().collect();
    assert_eq!(projects, vec!["b".to_string()]);
}

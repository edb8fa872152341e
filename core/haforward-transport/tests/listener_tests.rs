use async_trait::async_trait;
use haforward_transport::{CacheForwardingConfig, Forwarder, ForwardingListener, context};
use haforward_types::{
    AccountId, CacheKey, ChangeId, Command, CommandPayload, GroupUuid, InstanceId, ProjectName,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

/// Records every command instead of sending it.
#[derive(Default)]
struct RecordingForwarder {
    commands: Mutex<Vec<Command>>,
}

impl RecordingForwarder {
    fn payloads(&self) -> Vec<CommandPayload> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.payload.clone())
            .collect()
    }
}

#[async_trait]
impl Forwarder for RecordingForwarder {
    async fn forward(&self, command: Command) -> bool {
        self.commands.lock().unwrap().push(command);
        true
    }
}

fn listener() -> (Arc<RecordingForwarder>, ForwardingListener, InstanceId) {
    let recorder = Arc::new(RecordingForwarder::default());
    let instance_id = InstanceId::new();
    let listener = ForwardingListener::new(
        recorder.clone(),
        &CacheForwardingConfig::default(),
        instance_id,
    )
    .unwrap();
    (recorder, listener, instance_id)
}

// ── Forwarding ───────────────────────────────────────────────────

#[tokio::test]
async fn local_mutations_are_forwarded() {
    let (recorder, listener, _) = listener();

    let handles = [
        listener.on_change_indexed(&ChangeId::new("foo", 1), None),
        listener.on_change_deleted(&ChangeId::new("foo", 2)),
        listener.on_account_indexed(AccountId::new(3), None),
        listener.on_group_indexed(&GroupUuid::new("abc"), None),
        listener.on_project_indexed(&ProjectName::new("foo"), None),
        listener.on_project_created(&ProjectName::new("bar")),
    ];
    for handle in handles {
        assert!(handle.unwrap().await.unwrap());
    }

    assert_eq!(recorder.payloads().len(), 6);
}

#[tokio::test]
async fn project_list_hooks_carry_the_direction() {
    let (recorder, listener, _) = listener();

    listener
        .on_project_created(&ProjectName::new("new"))
        .unwrap()
        .await
        .unwrap();
    listener
        .on_project_removed(&ProjectName::new("old"))
        .unwrap()
        .await
        .unwrap();

    assert_eq!(
        recorder.payloads(),
        vec![
            CommandPayload::ProjectListChange {
                project: "new".into(),
                added: true
            },
            CommandPayload::ProjectListChange {
                project: "old".into(),
                added: false
            },
        ]
    );
}

// ── Loop prevention ──────────────────────────────────────────────

#[tokio::test]
async fn replayed_mutations_are_not_forwarded() {
    let (recorder, listener, _) = listener();

    let suppressed = context::forwarded(async {
        [
            listener.on_change_indexed(&ChangeId::new("foo", 1), None),
            listener.on_all_changes_deleted(&ProjectName::new("foo")),
            listener.on_cache_evicted("accounts", &CacheKey::Account(AccountId::new(1))),
            listener.on_project_removed(&ProjectName::new("foo")),
        ]
    })
    .await;

    assert!(suppressed.iter().all(Option::is_none));
    assert!(recorder.payloads().is_empty());
}

#[tokio::test]
async fn replay_on_blocking_thread_is_not_forwarded() {
    let (recorder, listener, _) = listener();
    let listener = Arc::new(listener);
    let runtime = tokio::runtime::Handle::current();

    let l = Arc::clone(&listener);
    let suppressed = tokio::task::spawn_blocking(move || {
        let _enter = runtime.enter();
        context::run_forwarded(|| l.on_account_indexed(AccountId::new(9), None).is_none())
    })
    .await
    .unwrap();

    assert!(suppressed);
    assert!(recorder.payloads().is_empty());
}

#[tokio::test]
async fn flag_ends_with_the_replay() {
    let (recorder, listener, _) = listener();

    context::forwarded(async {}).await;
    let handle = listener.on_account_indexed(AccountId::new(1), None);

    assert!(handle.unwrap().await.unwrap());
    assert_eq!(recorder.payloads().len(), 1);
}

// ── Cache filter ─────────────────────────────────────────────────

#[tokio::test]
async fn only_configured_caches_are_forwarded() {
    let (recorder, listener, _) = listener();

    let forwarded = listener
        .on_cache_evicted("groups_byuuid", &CacheKey::Group(GroupUuid::new("g")))
        .unwrap();
    assert!(listener
        .on_cache_evicted("web_sessions", &CacheKey::Raw(json!("x")))
        .is_none());
    // anchored: a prefix match is not enough
    assert!(listener
        .on_cache_evicted("accounts_byname", &CacheKey::Raw(json!("x")))
        .is_none());

    assert!(forwarded.await.unwrap());
    assert_eq!(recorder.payloads().len(), 1);
}

#[test]
fn invalid_cache_pattern_is_rejected() {
    let config = CacheForwardingConfig {
        patterns: vec!["(".to_string()],
    };
    assert!(config.compile().is_err());
}

// ── Stream events ────────────────────────────────────────────────

#[tokio::test]
async fn own_events_are_forwarded() {
    let (recorder, listener, instance_id) = listener();

    let event = json!({"type": "ref-updated", "instanceId": instance_id.to_string()});
    assert!(listener.on_event(event.clone()).unwrap().await.unwrap());

    assert_eq!(recorder.payloads(), vec![CommandPayload::PostEvent { event }]);
}

#[tokio::test]
async fn foreign_events_stay_local() {
    let (recorder, listener, _) = listener();

    let event = json!({"type": "ref-updated", "instanceId": InstanceId::new().to_string()});
    assert!(listener.on_event(event).is_none());
    assert!(recorder.payloads().is_empty());
}

use haforward_transport::context;

// ── Task scope ───────────────────────────────────────────────────

#[tokio::test]
async fn flag_is_set_only_inside_the_scope() {
    assert!(!context::is_forwarded());
    let inside = context::forwarded(async { context::is_forwarded() }).await;
    assert!(inside);
    assert!(!context::is_forwarded());
}

#[tokio::test]
async fn flag_survives_await_points() {
    let seen = context::forwarded(async {
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        context::is_forwarded()
    })
    .await;
    assert!(seen);
}

#[tokio::test]
async fn spawned_task_does_not_inherit_the_flag() {
    let child = context::forwarded(async { tokio::spawn(async { context::is_forwarded() }) })
        .await
        .await
        .unwrap();
    assert!(!child);
}

#[tokio::test]
async fn concurrent_tasks_are_isolated() {
    let replay = tokio::spawn(context::forwarded(async {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        context::is_forwarded()
    }));
    let local = tokio::spawn(async {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        context::is_forwarded()
    });

    assert!(replay.await.unwrap());
    assert!(!local.await.unwrap());
}

// ── Thread scope ─────────────────────────────────────────────────

#[tokio::test]
async fn blocking_continuation_sets_its_own_flag() {
    let (inside, after) = tokio::task::spawn_blocking(|| {
        let inside = context::run_forwarded(context::is_forwarded);
        (inside, context::is_forwarded())
    })
    .await
    .unwrap();
    assert!(inside);
    assert!(!after);
}

#[tokio::test]
async fn task_flag_does_not_reach_blocking_threads() {
    let on_thread = context::forwarded(async {
        tokio::task::spawn_blocking(context::is_forwarded).await.unwrap()
    })
    .await;
    assert!(!on_thread);
}

#[test]
fn unset_clears_a_leaked_flag() {
    let guard = context::set_forwarded();
    std::mem::forget(guard);
    assert!(context::is_forwarded());
    context::unset_forwarded();
    assert!(!context::is_forwarded());
}

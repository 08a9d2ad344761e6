use devrig_core::{
    context::TestContext,
    dispatch::{DispatchError, Dispatcher, RemoteError},
    ids::PackageName,
};
use devrig_testkit::{Fake, FakeApk, FakeCompanion, FakeShell, fast_config};
use serde_json::json;
use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

fn dispatcher(companion: &Arc<FakeCompanion>) -> Dispatcher {
    Dispatcher::new(companion.clone(), &fast_config()).unwrap()
}

fn queries() -> PackageName {
    PackageName::new("com.android.cts.appenumeration.queries.nothing").unwrap()
}

#[test]
fn await_returns_the_exact_payload() {
    let payload = json!({ "installed": ["com.android.cts.appenumeration.noapi"], "count": 1 });
    let companion = Arc::new(FakeCompanion::new().on("GET_INSTALLED_PACKAGES", Ok(payload.clone())));

    let answer = dispatcher(&companion)
        .send_command(&queries(), None, None, "GET_INSTALLED_PACKAGES", true)
        .unwrap()
        .await_result()
        .unwrap();

    assert_eq!(answer, payload);
}

#[test]
fn target_and_payload_reach_the_companion() {
    let companion = Arc::new(FakeCompanion::new().on("QUERY_PACKAGE", Ok(json!(true))));
    let target = Fake::package(1);

    dispatcher(&companion)
        .send_command_blocking(&queries(), Some(&target), Some(Fake::payload(1)), "QUERY_PACKAGE")
        .unwrap();

    let received = companion.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].target.as_ref(), Some(&target));
    assert_eq!(received[0].payload["seed"], 1);
}

#[test]
fn unanswered_command_times_out_within_the_budget() {
    let companion = Arc::new(FakeCompanion::new().on_ready_only("AWAIT_BROADCAST"));
    let cfg = fast_config();
    let start = Instant::now();

    let err = dispatcher(&companion)
        .send_command(&queries(), None, None, "AWAIT_BROADCAST", true)
        .unwrap()
        .await_result()
        .unwrap_err();

    assert!(matches!(err, DispatchError::Timeout { .. }));
    assert!(start.elapsed() >= cfg.timeouts.result());
    assert!(start.elapsed() < cfg.timeouts.result() + Duration::from_secs(2));
}

#[test]
fn silent_companion_fails_the_readiness_wait() {
    let companion = Arc::new(FakeCompanion::new().on_silent("START_ACTIVITY"));

    let err = dispatcher(&companion)
        .send_command(&queries(), None, None, "START_ACTIVITY", true)
        .err()
        .unwrap();

    assert!(matches!(err, DispatchError::ReadinessTimeout { .. }));
}

#[test]
fn deferred_answer_arrives_from_another_thread() {
    let companion = Arc::new(FakeCompanion::new().on_deferred("AWAIT_PACKAGE_ADDED"));

    let pending = dispatcher(&companion)
        .send_command(&queries(), None, None, "AWAIT_PACKAGE_ADDED", true)
        .unwrap();
    assert!(!pending.is_resolved());

    let remote = companion.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        remote.complete_next(Ok(json!({ "package": "com.example.added" })))
    });

    assert_eq!(
        pending.await_result().unwrap(),
        json!({ "package": "com.example.added" })
    );
    assert!(handle.join().unwrap());
    assert!(!companion.complete_next(Ok(json!(null))));
}

#[test]
fn remote_missing_broadcast_is_recognised() {
    let companion = Arc::new(FakeCompanion::new().on(
        "AWAIT_PACKAGE_REMOVED",
        Err(RemoteError::new(
            "android.app.cts.MissingBroadcastException",
            "timed out",
        )),
    ));

    let err = dispatcher(&companion)
        .send_command_blocking(&queries(), None, None, "AWAIT_PACKAGE_REMOVED")
        .unwrap_err();

    assert!(err.is_missing_broadcast());
    assert_eq!(err.remote().map(|r| r.message.as_str()), Some("timed out"));
}

#[test]
fn transport_failure_resolves_the_result() {
    let companion = Arc::new(FakeCompanion::new().on_refused("SEND", "adb went away"));
    let start = Instant::now();

    let err = dispatcher(&companion)
        .send_command(&queries(), None, None, "SEND", true)
        .unwrap()
        .await_result()
        .unwrap_err();

    assert_eq!(err, DispatchError::Transport("adb went away".to_string()));
    assert!(start.elapsed() < fast_config().timeouts.result());
}

#[test]
fn commands_are_delivered_in_order() {
    let companion = Arc::new(
        FakeCompanion::new()
            .on("FIRST", Ok(json!(1)))
            .on("SECOND", Ok(json!(2))),
    );
    let dispatcher = dispatcher(&companion);

    let first = dispatcher
        .send_command(&queries(), None, None, "FIRST", false)
        .unwrap();
    let second = dispatcher
        .send_command(&queries(), None, None, "SECOND", false)
        .unwrap();

    assert_eq!(second.await_result().unwrap(), json!(2));
    assert_eq!(first.await_result().unwrap(), json!(1));

    let actions: Vec<_> = companion.received().into_iter().map(|c| c.action).collect();
    assert_eq!(actions, vec!["FIRST", "SECOND"]);
}

const NOAPI: &str = "com.android.cts.appenumeration.noapi";

#[test]
fn broadcast_receiver_acknowledges_then_sees_the_install() {
    let dir = tempfile::tempdir().unwrap();
    let apk = FakeApk::base(NOAPI).write(dir.path(), "CtsNoApi.apk").unwrap();
    let shell = Arc::new(
        FakeShell::booted().await_package_added("AWAIT_PACKAGE_ADDED", Duration::from_secs(5)),
    );
    let ctx = TestContext::with_broadcast(shell, Arc::new(fast_config())).unwrap();
    let target = PackageName::new(NOAPI).unwrap();

    let pending = ctx
        .send_command(&queries(), Some(&target), None, "AWAIT_PACKAGE_ADDED", true)
        .unwrap();
    assert!(!pending.is_resolved());

    ctx.install().add_file(&apk).run().unwrap();

    assert_eq!(pending.await_result().unwrap(), json!({ "package": NOAPI }));
}

#[test]
fn broadcast_receiver_reports_a_missing_install() {
    let shell = Arc::new(
        FakeShell::booted().await_package_added("AWAIT_PACKAGE_ADDED", Duration::from_millis(20)),
    );
    let ctx = TestContext::with_broadcast(shell, Arc::new(fast_config())).unwrap();
    let target = PackageName::new(NOAPI).unwrap();

    let err = ctx
        .send_command(&queries(), Some(&target), None, "AWAIT_PACKAGE_ADDED", true)
        .unwrap()
        .await_result()
        .unwrap_err();

    assert!(err.is_missing_broadcast());
}

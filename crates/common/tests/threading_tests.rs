use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, bounded};
use deskwatch_common::threading::{ThreadRegistry, ThreadSnapshot, ThreadStatus};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn status_of(registry: &ThreadRegistry, name: &str) -> Option<ThreadStatus> {
    registry
        .snapshot()
        .into_iter()
        .find(|s| s.name == name)
        .map(|s| s.status)
}

#[test]
fn loops_are_listed_before_they_start() {
    let registry = ThreadRegistry::with_slots(["persistence-worker", "keep-awake", "keep-awake"]);

    assert_eq!(
        registry.snapshot(),
        vec![
            ThreadSnapshot {
                name: "persistence-worker".into(),
                status: ThreadStatus::Reserved,
            },
            ThreadSnapshot {
                name: "keep-awake".into(),
                status: ThreadStatus::Reserved,
            },
        ]
    );
}

#[test]
fn worker_takes_its_reserved_slot_and_is_joined() -> TestResult {
    let registry = ThreadRegistry::with_slots(["persistence-worker", "keep-awake"]);
    let (started_tx, started_rx) = bounded(1);
    let (stop_tx, stop_rx) = bounded::<()>(1);

    let handle = registry.spawn("persistence-worker", move || {
        started_tx.send(()).ok();
        let _ = stop_rx.recv();
    })?;
    started_rx.recv_timeout(Duration::from_secs(1))?;

    assert_eq!(status_of(&registry, "persistence-worker"), Some(ThreadStatus::Running));
    assert_eq!(status_of(&registry, "keep-awake"), Some(ThreadStatus::Reserved));

    stop_tx.send(())?;
    handle.join().expect("worker panicked");

    assert_eq!(status_of(&registry, "persistence-worker"), Some(ThreadStatus::Joined));
    assert_eq!(registry.snapshot().len(), 2);
    Ok(())
}

#[test]
fn worker_abandoned_after_grace_stays_detached() -> TestResult {
    let registry = ThreadRegistry::with_slots(["persistence-worker"]);
    let (done_tx, done_rx) = bounded::<()>(1);
    let (release_tx, release_rx) = bounded::<()>(1);

    // Stands in for a write that outlives the shutdown grace period.
    let handle = registry.spawn("persistence-worker", move || {
        let _ = release_rx.recv();
        let _ = done_tx.send(());
    })?;

    assert_eq!(
        done_rx.recv_timeout(Duration::from_millis(50)),
        Err(RecvTimeoutError::Timeout)
    );
    drop(handle);
    assert_eq!(status_of(&registry, "persistence-worker"), Some(ThreadStatus::Detached));

    // Finishing later does not rewrite history.
    release_tx.send(())?;
    done_rx.recv_timeout(Duration::from_secs(1))?;
    assert_eq!(status_of(&registry, "persistence-worker"), Some(ThreadStatus::Detached));
    Ok(())
}

#[test]
fn panicking_loop_is_reported_on_join() -> TestResult {
    let registry = ThreadRegistry::with_slots(["keep-awake"]);
    let handle = registry.spawn("keep-awake", || panic!("inhibitor exploded"))?;

    assert!(handle.join().is_err());
    assert_eq!(status_of(&registry, "keep-awake"), Some(ThreadStatus::Panicked));
    Ok(())
}

#[test]
fn unreserved_name_gets_a_fresh_slot() -> TestResult {
    let registry = ThreadRegistry::with_slots(["persistence-worker"]);
    let handle = registry.spawn("adhoc", || {})?;
    handle.join().expect("adhoc panicked");

    let names: Vec<_> = registry.snapshot().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["persistence-worker", "adhoc"]);
    assert_eq!(status_of(&registry, "persistence-worker"), Some(ThreadStatus::Reserved));
    Ok(())
}

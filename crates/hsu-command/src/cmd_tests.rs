//! Unit tests for the coordinator protocol.

use crate::cmd::Cmd;
use crate::hook::Hook;
use crate::options::Options;
use hsu_common::ProcessError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn streaming() -> Options {
    Options {
        buffered: false,
        streaming: true,
    }
}

async fn drain(mut hook: Hook) {
    while hook.next_line().await.is_some() {}
}

#[tokio::test]
async fn test_add_hook_after_start_is_refused() {
    let mut cmd = Cmd::new(Options::default(), "true", Vec::<String>::new());
    cmd.add_hook(drain).unwrap();
    cmd.start().unwrap();

    let err = cmd.add_hook(drain).unwrap_err();
    assert!(matches!(err, ProcessError::OperationNotAllowed { .. }));

    let code = tokio::time::timeout(TEST_TIMEOUT, cmd.wait())
        .await
        .expect("wait should finish")
        .unwrap();
    assert_eq!(code, 0);
}

#[tokio::test]
async fn test_replaced_hook_never_runs() {
    let first_ran = Arc::new(AtomicBool::new(false));
    let second_ran = Arc::new(AtomicBool::new(false));

    let mut cmd = Cmd::new(streaming(), "true", Vec::<String>::new());
    {
        let first_ran = Arc::clone(&first_ran);
        cmd.add_hook(move |hook| async move {
            first_ran.store(true, Ordering::SeqCst);
            drain(hook).await;
        })
        .unwrap();
    }
    {
        let second_ran = Arc::clone(&second_ran);
        cmd.add_hook(move |hook| async move {
            second_ran.store(true, Ordering::SeqCst);
            drain(hook).await;
        })
        .unwrap();
    }

    cmd.start().unwrap();
    tokio::time::timeout(TEST_TIMEOUT, cmd.wait())
        .await
        .unwrap()
        .unwrap();

    assert!(!first_ran.load(Ordering::SeqCst));
    assert!(second_ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_start_twice_is_refused() {
    let mut cmd = Cmd::new(Options::default(), "true", Vec::<String>::new());
    cmd.start().unwrap();
    assert!(matches!(
        cmd.start(),
        Err(ProcessError::OperationNotAllowed { .. })
    ));
    tokio::time::timeout(TEST_TIMEOUT, cmd.wait())
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_launch_error_from_start_and_wait() {
    let mut cmd = Cmd::new(streaming(), "/definitely/not/a/real/binary", ["x"]);
    cmd.add_hook(drain).unwrap();

    let err = cmd.start().unwrap_err();
    assert!(matches!(err, ProcessError::SpawnFailed { .. }));

    // The start timestamp is set on launch failure, so this does not spin.
    let started = tokio::time::timeout(TEST_TIMEOUT, cmd.wait_started())
        .await
        .expect("wait_started must not spin on launch failure");
    assert_eq!(started.unwrap_err(), err);

    let waited = tokio::time::timeout(TEST_TIMEOUT, cmd.wait())
        .await
        .expect("hook sees closed channels and finishes");
    assert_eq!(waited.unwrap_err(), err);
    assert_eq!(cmd.status().exit, hsu_process::EXIT_UNKNOWN);
}

#[tokio::test]
async fn test_wait_before_start_times_out() {
    let cmd = Cmd::new(Options::default(), "true", Vec::<String>::new());

    let err = cmd.wait_timeout(Duration::from_millis(50)).await.unwrap_err();
    assert!(matches!(err, ProcessError::Timeout { .. }));
    assert!(!cmd.is_started());
}

#[tokio::test]
async fn test_wait_with_cancel() {
    let cmd = Cmd::new(Options::default(), "true", Vec::<String>::new());
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = tokio::time::timeout(TEST_TIMEOUT, cmd.wait_with_cancel(&token))
        .await
        .expect("cancellation should end the wait")
        .unwrap_err();
    assert!(matches!(err, ProcessError::Cancelled { .. }));
}

#[tokio::test]
async fn test_panicking_hook_is_reported() {
    let mut cmd = Cmd::new(streaming(), "true", Vec::<String>::new());
    cmd.add_hook(|hook| async move {
        let _hook = hook;
        panic!("hook exploded");
    })
    .unwrap();

    cmd.start().unwrap();
    let err = tokio::time::timeout(TEST_TIMEOUT, cmd.wait())
        .await
        .expect("a panicking hook still closes its signal")
        .unwrap_err();

    match err {
        ProcessError::TaskPanic { message, .. } => assert_eq!(message, "hook exploded"),
        other => panic!("unexpected error: {other:?}"),
    }

    // Later waiters see the same outcome.
    let again = tokio::time::timeout(TEST_TIMEOUT, cmd.wait()).await.unwrap();
    assert!(matches!(again, Err(ProcessError::TaskPanic { .. })));
}

#[tokio::test]
async fn test_panic_after_close_is_not_reported() {
    let mut cmd = Cmd::new(streaming(), "true", Vec::<String>::new());
    cmd.add_hook(|mut hook| async move {
        while hook.next_line().await.is_some() {}
        hook.close();
        tokio::time::sleep(Duration::from_millis(300)).await;
        panic!("too late");
    })
    .unwrap();

    cmd.start().unwrap();
    let first = tokio::time::timeout(TEST_TIMEOUT, cmd.wait()).await.unwrap();
    assert_eq!(first, Ok(0));

    // The hook task has panicked by now; the answer does not change.
    tokio::time::sleep(Duration::from_millis(600)).await;
    let second = tokio::time::timeout(TEST_TIMEOUT, cmd.wait()).await.unwrap();
    assert_eq!(second, Ok(0));
}

#[tokio::test]
async fn test_wait_blocks_until_hook_closes() {
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let mut cmd = Cmd::new(streaming(), "true", Vec::<String>::new());
    cmd.add_hook(move |mut hook| async move {
        while hook.next_line().await.is_some() {}
        // Hold the completion signal open until the test releases it.
        let _ = release_rx.await;
        hook.close();
    })
    .unwrap();
    cmd.start().unwrap();

    // Process exits quickly, but the hook is still open.
    tokio::time::timeout(TEST_TIMEOUT, cmd.runner().done().unwrap().wait())
        .await
        .unwrap();
    let early = tokio::time::timeout(Duration::from_millis(100), cmd.wait()).await;
    assert!(early.is_err(), "wait returned before the hook closed");

    release_tx.send(()).unwrap();
    let code = tokio::time::timeout(TEST_TIMEOUT, cmd.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(code, 0);
}

#[tokio::test]
async fn test_stop_reports_signal() {
    let mut cmd = Cmd::new(Options::default(), "sleep", ["30"]);
    cmd.start().unwrap();
    cmd.wait_started().await.unwrap();

    cmd.stop().unwrap();
    let err = tokio::time::timeout(TEST_TIMEOUT, cmd.wait())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, ProcessError::Signaled { .. }));
    assert!(!cmd.status().complete);
}

#[test]
fn test_has_hook() {
    let mut cmd = Cmd::new(Options::default(), "true", Vec::<String>::new());
    assert!(!cmd.has_hook());
    cmd.add_hook(drain).unwrap();
    assert!(cmd.has_hook());
    assert_eq!(cmd.name(), "true");
    assert!(cmd.args().is_empty());
}

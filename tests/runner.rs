//! End-to-end runs through the real tokio spawner.
//!
//! `env` stands in for bwrap: with an empty profile the invocation becomes
//! `env <command...>`, which runs the command without isolation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use bwrapper::sandbox::{BindSpec, CommandRequest, SandboxProfile, SandboxRunner};
use bwrapper::BwrapperError;

fn passthrough_runner() -> SandboxRunner {
    SandboxRunner::new(SandboxProfile::new("env", vec![], vec![], vec![]))
}

#[tokio::test]
async fn test_run_echo() {
    let result = passthrough_runner()
        .run(&CommandRequest::new(["echo", "hello"]))
        .await
        .unwrap();

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout.trim(), "hello");
    assert!(result.stderr.is_empty());
}

#[tokio::test]
async fn test_run_failure_carries_output() {
    let request = CommandRequest::new(["sh", "-c", "echo before; echo oops >&2; exit 7"]);
    let err = passthrough_runner().run(&request).await.unwrap_err();

    match err {
        BwrapperError::ExecutionFailure {
            exit_code,
            stdout,
            stderr,
        } => {
            assert_eq!(exit_code, Some(7));
            assert_eq!(stdout.trim(), "before");
            assert_eq!(stderr.trim(), "oops");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_run_timeout_does_not_hang() {
    let request = CommandRequest::new(["sleep", "10"]).with_timeout(Duration::from_millis(300));

    let started = Instant::now();
    let err = passthrough_runner().run(&request).await.unwrap_err();

    assert!(matches!(err, BwrapperError::Timeout { .. }));
    assert!(!err.is_pre_spawn());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_background_child_holding_pipes_respects_timeout() {
    let request = CommandRequest::new(["sh", "-c", "sleep 4 & echo hi"])
        .with_timeout(Duration::from_millis(500));

    let started = Instant::now();
    let result = passthrough_runner().run(&request).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(result.stdout, "hi\n");
}

#[tokio::test]
async fn test_run_cancel() {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let request = CommandRequest::new(["sleep", "10"]).without_timeout();
    let err = passthrough_runner()
        .run_with_cancel(&request, token)
        .await
        .unwrap_err();
    assert!(matches!(err, BwrapperError::Cancelled));
}

#[tokio::test]
async fn test_environment_overlay() {
    let request = CommandRequest::new(["sh", "-c", "printf '%s' \"$BWRAPPER_TEST_VALUE\""])
        .with_env("BWRAPPER_TEST_VALUE", "overlay");

    let result = passthrough_runner().run(&request).await.unwrap();
    assert_eq!(result.stdout, "overlay");
}

#[tokio::test]
async fn test_concurrent_runs_are_independent() {
    let runner = passthrough_runner();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let runner = runner.clone();
            tokio::spawn(async move {
                let request = CommandRequest::new(vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    "sleep 0.1; echo \"$0\"".to_string(),
                    format!("run-{}", i),
                ]);
                (i, runner.run(&request).await)
            })
        })
        .collect();

    for handle in handles {
        let (i, result) = handle.await.unwrap();
        assert_eq!(result.unwrap().stdout.trim(), format!("run-{}", i));
    }
}

#[tokio::test]
async fn test_missing_isolator_fails_before_spawn() {
    let runner = SandboxRunner::new(SandboxProfile::new(
        "non-existent-bwrap-binary",
        vec![],
        vec![],
        vec![],
    ));

    let err = runner
        .run(&CommandRequest::new(["echo", "test"]))
        .await
        .unwrap_err();
    assert!(matches!(err, BwrapperError::ToolUnavailable { .. }));
    assert!(err.is_pre_spawn());
}

#[tokio::test]
async fn test_empty_command_fails_before_spawn() {
    let err = passthrough_runner()
        .run(&CommandRequest::new(Vec::<String>::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, BwrapperError::InvalidCommand));
}

#[test]
fn test_prepare_does_not_start_anything() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");

    let request = CommandRequest::new([
        "touch".to_string(),
        marker.display().to_string(),
    ])
    .with_timeout(Duration::from_secs(10));
    let process = passthrough_runner().prepare(&request).unwrap();

    assert_eq!(process.program(), "env");
    assert_eq!(process.timeout, Some(Duration::from_secs(10)));
    assert!(!marker.exists());
}

#[test]
fn test_default_profile_command_layout() {
    let runner = SandboxRunner::new(Arc::new(SandboxProfile::default()))
        .with_resolver(Arc::new(AlwaysAvailable));

    let invocation = runner
        .build_command(
            &["echo".to_string(), "hello".to_string()],
            &[BindSpec::mount("/tmp/out", "/tmp/out", false)],
        )
        .unwrap();
    let parts = invocation.as_slice();

    assert_eq!(parts[0], "bwrap");
    assert_eq!(parts[1], "--unshare-all");
    assert_eq!(parts[parts.len() - 2..], ["echo", "hello"]);

    let last_ro_default = parts
        .windows(3)
        .rposition(|w| w[0] == "--ro-bind" && w[1] == w[2] && w[1] != "/tmp/out")
        .unwrap();
    let tmp_write = parts
        .windows(3)
        .position(|w| w == ["--bind", "/tmp", "/tmp"])
        .unwrap();
    let extra = parts
        .windows(3)
        .position(|w| w == ["--bind", "/tmp/out", "/tmp/out"])
        .unwrap();
    assert!(last_ro_default < tmp_write);
    assert!(tmp_write < extra);
}

struct AlwaysAvailable;

impl bwrapper::sandbox::ExecutableResolver for AlwaysAvailable {
    fn is_available(&self, _binary: &str) -> bool {
        true
    }
}

/// Exercises the real isolator when it is installed and usable on this host.
#[tokio::test]
async fn test_real_bwrap_when_available() {
    let runner = SandboxRunner::new(SandboxProfile::default());
    if !runner.is_available() {
        return;
    }

    match runner.run(&CommandRequest::new(["echo", "sandboxed"])).await {
        Ok(result) => assert_eq!(result.stdout.trim(), "sandboxed"),
        // bwrap exists but user namespaces may be disabled (e.g. in containers)
        Err(BwrapperError::ExecutionFailure { .. }) => {}
        Err(other) => panic!("unexpected error: {other}"),
    }
}

//! Supervision window against real OS processes

#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::sys::signal::kill;
use nix::unistd::Pid;
use pixagent_core::application::{ProcessSupervisor, SupervisionOutcome, SupervisionPolicy, WaitMode};
use pixagent_core::domain::LaunchSpec;
use pixagent_infra_system::SubprocessLauncher;

fn supervisor(window: Duration, wait_mode: WaitMode) -> ProcessSupervisor {
    ProcessSupervisor::new(
        Arc::new(SubprocessLauncher::new()),
        SupervisionPolicy {
            window,
            wait_mode,
            grace: Duration::from_millis(500),
            escalate: true,
        },
    )
}

/// Run `script` under sh, recording the shell's pid in `pid_file` first
fn sh_with_pid(pid_file: &Path, script: &str) -> LaunchSpec {
    LaunchSpec::new(
        "sh",
        vec![
            "-c".to_string(),
            format!("echo $$ > {}; {}", pid_file.display(), script),
        ],
    )
}

fn read_pid(pid_file: &Path) -> Pid {
    let raw = std::fs::read_to_string(pid_file).unwrap();
    Pid::from_raw(raw.trim().parse().unwrap())
}

fn is_running(pid: Pid) -> bool {
    kill(pid, None).is_ok()
}

#[tokio::test]
async fn test_worker_exiting_early_is_not_signalled() {
    let outcome = supervisor(Duration::from_millis(500), WaitMode::FullWindow)
        .supervise(&LaunchSpec::new("sh", vec!["-c".into(), "sleep 0.1".into()]))
        .await;

    match outcome {
        SupervisionOutcome::ExitedWithinWindow(exit) => assert!(exit.success),
        other => panic!("expected ExitedWithinWindow, got {:?}", other),
    }
}

#[tokio::test]
async fn test_never_exiting_worker_is_gone_after_window() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("worker.pid");
    let start = Instant::now();

    let outcome = supervisor(Duration::from_millis(300), WaitMode::FullWindow)
        .supervise(&sh_with_pid(&pid_file, "exec sleep 30"))
        .await;

    assert!(matches!(outcome, SupervisionOutcome::Terminated(_)));
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(!is_running(read_pid(&pid_file)));
}

#[tokio::test]
async fn test_sigterm_ignoring_worker_is_killed() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("worker.pid");

    let outcome = supervisor(Duration::from_millis(300), WaitMode::ReturnOnExit)
        .supervise(&sh_with_pid(&pid_file, "trap '' TERM; exec sleep 30"))
        .await;

    assert!(matches!(outcome, SupervisionOutcome::Killed));
    assert!(!is_running(read_pid(&pid_file)));
}

#[tokio::test]
async fn test_missing_binary_does_not_wait_for_window() {
    let start = Instant::now();

    let outcome = supervisor(Duration::from_secs(30), WaitMode::FullWindow)
        .supervise(&LaunchSpec::new("/nonexistent/pixelpwnr", Vec::new()))
        .await;

    assert!(matches!(outcome, SupervisionOutcome::LaunchFailed(_)));
    assert!(start.elapsed() < Duration::from_secs(5));
}

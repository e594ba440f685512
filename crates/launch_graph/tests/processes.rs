//! Supervision of real `/bin/sh` children

#![cfg(unix)]

mod common;

use common::{fast_config, prepare, wait_for_state};
use launch_graph::config::PackageIndex;
use launch_graph::runtime::{ActionOutcome, ProcessState, Supervisor, TokioLauncher};
use std::sync::Arc;
use std::time::Duration;

async fn run_to_end(yaml: &str) -> launch_graph::RunReport {
    let prepared = prepare(yaml, &[], PackageIndex::new()).unwrap();
    let supervisor = Supervisor::new(prepared, Arc::new(TokioLauncher), fast_config());
    tokio::time::timeout(Duration::from_secs(10), supervisor.run())
        .await
        .expect("supervisor did not finish")
}

#[tokio::test]
async fn test_exit_codes_are_collected() {
    let report = run_to_end(
        r#"
nodes:
  ok:
    executable: /bin/sh
    arguments: ["-c", "exit 0"]
  broken:
    executable: /bin/sh
    arguments: ["-c", "echo failing >&2; exit 4"]
"#,
    )
    .await;

    assert_eq!(report.outcome("ok"), Some(&ActionOutcome::Exited(Some(0))));
    assert_eq!(report.outcome("broken"), Some(&ActionOutcome::Exited(Some(4))));
    assert_eq!(report.exit_code(), 1);
    assert!(report.first_failure.unwrap().contains("broken"));
}

#[tokio::test]
async fn test_missing_executable_fails_action() {
    let report = run_to_end(
        r#"
nodes:
  ghost:
    executable: /definitely/not/installed
    respawn: true
"#,
    )
    .await;

    assert!(matches!(
        report.outcome("ghost"),
        Some(ActionOutcome::Failed(_))
    ));
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn test_working_dir_and_env() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = format!(
        r#"
env:
  MARKER: launched
nodes:
  writer:
    executable: /bin/sh
    arguments: ["-c", "echo $MARKER > marker.txt"]
    working_dir: "{}"
"#,
        dir.path().display()
    );
    let report = run_to_end(&yaml).await;
    assert_eq!(report.exit_code(), 0);

    let marker = std::fs::read_to_string(dir.path().join("marker.txt")).unwrap();
    assert_eq!(marker.trim(), "launched");
}

#[tokio::test]
async fn test_crashing_child_is_respawned() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = format!(
        r#"
nodes:
  flaky:
    executable: /bin/sh
    arguments: ["-c", "echo run >> {}/runs; exit 1"]
    respawn: true
"#,
        dir.path().display()
    );
    let prepared = prepare(&yaml, &[], PackageIndex::new()).unwrap();
    let supervisor = Supervisor::new(prepared, Arc::new(TokioLauncher), fast_config());
    let handle = supervisor.handle();
    let task = tokio::spawn(supervisor.run());

    let runs = dir.path().join("runs");
    common::wait_for(10, || {
        std::fs::read_to_string(&runs)
            .map(|s| s.lines().count() >= 3)
            .unwrap_or(false)
    })
    .await
    .unwrap();

    handle.cancel();
    let report = task.await.unwrap();
    assert_eq!(report.outcome("flaky"), Some(&ActionOutcome::Killed));
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_cancel_terminates_running_children() {
    let prepared = prepare(
        r#"
nodes:
  sleeper:
    executable: /bin/sh
    arguments: ["-c", "exec sleep 30"]
  logger:
    executable: /bin/sh
    arguments: ["-c", "echo ready; exec sleep 30"]
    output: log
"#,
        &[],
        PackageIndex::new(),
    )
    .unwrap();
    let supervisor = Supervisor::new(prepared, Arc::new(TokioLauncher), fast_config());
    let handle = supervisor.handle();
    let task = tokio::spawn(supervisor.run());

    wait_for_state(&handle, "logger", ProcessState::Running)
        .await
        .unwrap();
    handle.cancel();
    handle.cancel();

    let report = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("shutdown took too long")
        .unwrap();
    assert_eq!(report.outcome("sleeper"), Some(&ActionOutcome::Killed));
    assert_eq!(report.outcome("logger"), Some(&ActionOutcome::Killed));
    assert_eq!(report.exit_code(), 0);
}

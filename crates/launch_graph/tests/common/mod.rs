//! Test helpers for supervision integration tests

#![allow(dead_code)]

use launch_graph::config::PackageIndex;
use launch_graph::runtime::{PreparedLaunch, ProcessState, SupervisorConfig, SupervisorHandle};
use launch_graph::{ConfigurationError, LaunchFile, LaunchGraph};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Supervisor settings scaled down for tests
pub fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        grace_period: Duration::from_millis(200),
        respawn_delay: Duration::from_millis(10),
        max_respawn_delay: Duration::from_millis(50),
        stable_after: Duration::from_secs(10),
        max_respawns: None,
    }
}

/// Parse, build and resolve a launch description
pub fn prepare(
    yaml: &str,
    overrides: &[(&str, &str)],
    index: PackageIndex,
) -> Result<PreparedLaunch, ConfigurationError> {
    let launch_file = LaunchFile::from_yaml(yaml)?;
    let env = launch_file.env.clone();
    let graph = LaunchGraph::from_launch_file(launch_file)?;
    let overrides: HashMap<String, String> = overrides
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    PreparedLaunch::prepare(&graph, &overrides, Arc::new(index), env)
}

/// Fake ament install prefix with one executable per package
pub fn install_prefix(packages: &[(&str, &str)]) -> tempfile::TempDir {
    let prefix = tempfile::tempdir().unwrap();
    let markers = prefix
        .path()
        .join("share/ament_index/resource_index/packages");
    std::fs::create_dir_all(&markers).unwrap();
    for (package, executable) in packages {
        std::fs::write(markers.join(package), "").unwrap();
        std::fs::create_dir_all(prefix.path().join("share").join(package).join("config")).unwrap();
        let lib = prefix.path().join("lib").join(package);
        std::fs::create_dir_all(&lib).unwrap();
        std::fs::write(lib.join(executable), "").unwrap();
    }
    prefix
}

pub fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

/// Wait until `condition` holds, polling every 10ms
pub async fn wait_for<F>(timeout_secs: u64, mut condition: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnMut() -> bool,
{
    let result = timeout(Duration::from_secs(timeout_secs), async {
        loop {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(_) => Err("Timeout waiting for condition".into()),
    }
}

/// Wait until the supervisor reports `name` in `state`
pub async fn wait_for_state(
    handle: &SupervisorHandle,
    name: &str,
    state: ProcessState,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = timeout(Duration::from_secs(5), async {
        loop {
            let status = handle.status().await;
            if status.iter().any(|s| s.name == name && s.state == state) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(_) => Err(format!("Timeout waiting for '{}' to reach {:?}", name, state).into()),
    }
}

//! End-to-end supervision against real child processes.
#![cfg(unix)]

use pmon_process::{kill_by_name, process_is_running, ProcessTable};
use pmon_registry::{MemoryRegistry, RegistryValue, RootKey};
use pmon_supervisor::{ProcessMonitorConfig, SupervisionRoot, DEFAULT_SHUTDOWN_GRACE};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    condition()
}

fn write_script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

#[tokio::test]
async fn test_killed_process_is_restarted_and_killed_on_exit() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "pmon_e2e_worker_41c2.sh",
        "#!/bin/sh\nwhile true; do sleep 1; done\n",
    );
    let config = ProcessMonitorConfig::load_from_string(&format!(
        "processes:\n  - name: {}\n    check_interval: 1\n    startup_grace: 0\n    kill_on_exit: true\n",
        script
    ))
    .unwrap();

    let handle = SupervisionRoot::new(config).spawn();
    assert!(wait_until(Duration::from_secs(5), || process_is_running("pmon_e2e_worker_41c2.sh")).await);

    let killed = kill_by_name("pmon_e2e_worker_41c2.sh");
    assert!(!killed.is_empty());

    // Running again under a new pid.
    assert!(
        wait_until(Duration::from_secs(8), || {
            running_pids("pmon_e2e_worker_41c2.sh")
                .iter()
                .any(|pid| !killed.contains(pid))
        })
        .await
    );

    assert!(handle.shutdown(DEFAULT_SHUTDOWN_GRACE).await);
    assert!(wait_until(Duration::from_secs(3), || !process_is_running("pmon_e2e_worker_41c2.sh")).await);
}

fn running_pids(needle: &str) -> Vec<u32> {
    ProcessTable::snapshot().find(needle).map(|entry| entry.pid).collect()
}

#[tokio::test]
async fn test_registry_change_runs_command_with_env() {
    let dir = tempfile::tempdir().unwrap();
    let hive = MemoryRegistry::new();
    hive.set_value(
        RootKey::CurrentUser,
        "SOFTWARE\\TestRegistryMonitor",
        "testValue",
        RegistryValue::String("initial".into()),
    );

    let config = ProcessMonitorConfig::load_from_string(&format!(
        r#"
registry_monitors:
  - name: test
    root_key: HKCU
    path: SOFTWARE\TestRegistryMonitor
    check_interval: 1
    values:
      - name: testValue
        type: string
        expect_value: initial
    execute_on_change: true
    command: sh
    args: ["-c", "echo \"$CHANGED_VALUES $EXPECT_VALUE_MATCH\" > changed.txt"]
    work_dir: {}
"#,
        dir.path().display()
    ))
    .unwrap();

    let handle = SupervisionRoot::new(config)
        .with_registry_hive(Arc::new(hive.clone()))
        .spawn();

    tokio::time::sleep(Duration::from_millis(300)).await;
    hive.set_value(
        RootKey::CurrentUser,
        "SOFTWARE\\TestRegistryMonitor",
        "testValue",
        RegistryValue::String("modified".into()),
    );

    let output = dir.path().join("changed.txt");
    assert!(
        wait_until(Duration::from_secs(5), || {
            fs::read_to_string(&output).map(|s| s.ends_with('\n')).unwrap_or(false)
        })
        .await
    );
    assert_eq!(fs::read_to_string(&output).unwrap().trim(), "testValue false");
    assert_eq!(
        hive.value(RootKey::CurrentUser, "SOFTWARE\\TestRegistryMonitor", "testValue"),
        Some(RegistryValue::String("initial".into()))
    );

    assert!(handle.shutdown(DEFAULT_SHUTDOWN_GRACE).await);
}

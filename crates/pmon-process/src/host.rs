//! The host seam used by the process supervisor.

use crate::check::{port_in_use, ProcessTable};
use crate::exclusion::check_exclude_processes_with;
use crate::execute::{spawn_detached, LaunchSpec};
use crate::terminate::kill_by_name;
use async_trait::async_trait;
use pmon_common::{ProcessError, ProcessResult};
use tokio::process::Child;
use tracing::warn;

/// A process started by the supervisor and owned by it.
#[async_trait]
pub trait ManagedChild: Send {
    fn pid(&self) -> Option<u32>;

    /// Non-blocking exit check.
    fn has_exited(&mut self) -> bool;

    /// Kill the process and reap it.
    async fn kill_and_wait(&mut self) -> ProcessResult<()>;
}

/// Observations and actions the supervisor performs on the host.
#[async_trait]
pub trait ProcessHost: Send + Sync {
    async fn process_is_running(&self, name: &str) -> bool;

    /// The exclusion gate: which of `names` are currently running.
    async fn find_running(&self, names: &[String]) -> (bool, Vec<String>);

    /// Kill every process matching `name`; returns the PIDs signalled.
    async fn kill_by_name(&self, name: &str) -> Vec<u32>;

    async fn port_in_use(&self, port: u16) -> bool;

    async fn health_check_ok(&self, url: &str) -> bool;

    fn spawn(&self, spec: &LaunchSpec) -> ProcessResult<Box<dyn ManagedChild>>;
}

/// [`ManagedChild`] over a tokio child process.
pub struct TokioChild {
    child: Child,
    pid: Option<u32>,
}

impl TokioChild {
    pub fn new(child: Child) -> Self {
        let pid = child.id();
        Self { child, pid }
    }
}

#[async_trait]
impl ManagedChild for TokioChild {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn has_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(e) => {
                warn!("Failed to query process state (PID: {:?}): {}", self.pid, e);
                false
            }
        }
    }

    async fn kill_and_wait(&mut self) -> ProcessResult<()> {
        let name = self.pid.map(|p| p.to_string()).unwrap_or_default();
        // start_kill fails once the child has already been reaped.
        if let Err(e) = self.child.start_kill() {
            if self.child.try_wait().ok().flatten().is_none() {
                return Err(ProcessError::kill_failed(name, e.to_string()));
            }
        }
        self.child
            .wait()
            .await
            .map(|_| ())
            .map_err(|e| ProcessError::kill_failed(name, e.to_string()))
    }
}

/// The real host.
///
/// Process table scans run on the blocking pool so a slow enumeration does
/// not hold up other targets' tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHost;

impl SystemHost {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessHost for SystemHost {
    async fn process_is_running(&self, name: &str) -> bool {
        let name = name.to_string();
        tokio::task::spawn_blocking(move || ProcessTable::snapshot().contains_name(&name))
            .await
            .unwrap_or_else(|e| {
                warn!("Process table scan failed: {}", e);
                false
            })
    }

    async fn find_running(&self, names: &[String]) -> (bool, Vec<String>) {
        if names.is_empty() {
            return (false, Vec::new());
        }
        let names = names.to_vec();
        tokio::task::spawn_blocking(move || check_exclude_processes_with(&names, ProcessTable::snapshot))
            .await
            .unwrap_or_else(|e| {
                warn!("Process table scan failed: {}", e);
                (false, Vec::new())
            })
    }

    async fn kill_by_name(&self, name: &str) -> Vec<u32> {
        let name = name.to_string();
        tokio::task::spawn_blocking(move || kill_by_name(&name))
            .await
            .unwrap_or_else(|e| {
                warn!("Process kill sweep failed: {}", e);
                Vec::new()
            })
    }

    async fn port_in_use(&self, port: u16) -> bool {
        port_in_use(port).await
    }

    async fn health_check_ok(&self, url: &str) -> bool {
        pmon_monitoring::health_check_ok(url).await
    }

    fn spawn(&self, spec: &LaunchSpec) -> ProcessResult<Box<dyn ManagedChild>> {
        spawn_detached(spec).map(|child| Box::new(TokioChild::new(child)) as Box<dyn ManagedChild>)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_system_host_child_lifecycle() {
        let host = SystemHost::new();
        let spec = LaunchSpec::new("sh").with_args(["-c", "sleep 30"]);
        let mut child = host.spawn(&spec).unwrap();

        assert!(child.pid().is_some());
        assert!(!child.has_exited());

        child.kill_and_wait().await.unwrap();
        assert!(child.has_exited());
        // Killing an already reaped child is not an error.
        child.kill_and_wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_system_host_notices_exit() {
        let host = SystemHost::new();
        let mut child = host.spawn(&LaunchSpec::new("true")).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(child.has_exited());
    }

    #[tokio::test]
    async fn test_system_host_sees_script_child() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("pmon_host_script_3a7f.sh");
        std::fs::write(&script, "#!/bin/sh\nwhile true; do sleep 1; done\n").unwrap();

        let host = SystemHost::new();
        let spec = LaunchSpec::new("sh").with_args([script.to_string_lossy().into_owned()]);
        let mut child = host.spawn(&spec).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let name = script.to_string_lossy().into_owned();
        assert!(host.process_is_running(&name).await);

        child.kill_and_wait().await.unwrap();
        assert!(!host.process_is_running(&name).await);
    }

    #[tokio::test]
    async fn test_empty_exclusions_skip_scan() {
        assert_eq!(SystemHost::new().find_running(&[]).await, (false, Vec::new()));
    }
}

//! The supervision root: one task per enabled target, one shared stop signal.

use crate::config::ProcessMonitorConfig;
use crate::supervisor::ProcessSupervisor;
use pmon_process::{ProcessHost, SystemHost};
use pmon_registry::{RegistryEnforcer, RegistryHive};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long [`SupervisionHandle::shutdown`] waits for tasks by default.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub struct SupervisionRoot {
    config: ProcessMonitorConfig,
    host: Arc<dyn ProcessHost>,
    hive: Option<Arc<dyn RegistryHive>>,
}

impl SupervisionRoot {
    pub fn new(config: ProcessMonitorConfig) -> Self {
        Self {
            config,
            host: Arc::new(SystemHost::new()),
            hive: default_hive(),
        }
    }

    pub fn with_host(mut self, host: Arc<dyn ProcessHost>) -> Self {
        self.host = host;
        self
    }

    pub fn with_registry_hive(mut self, hive: Arc<dyn RegistryHive>) -> Self {
        self.hive = Some(hive);
        self
    }

    /// Start every enabled target. Must be called inside a tokio runtime.
    pub fn spawn(self) -> SupervisionHandle {
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let mut processes = 0;
        let mut registry_monitors = 0;

        for target in self.config.enabled_processes() {
            info!("Monitoring process {} every {:?}", target.name, target.check_interval);
            let supervisor = ProcessSupervisor::new(target.clone(), self.host.clone());
            tasks.spawn(supervisor.run(cancel.child_token()));
            processes += 1;
        }

        for monitor in self.config.enabled_registry_monitors() {
            let label = monitor.label();
            let (target, dropped) = match monitor.to_target() {
                Ok(resolved) => resolved,
                Err(e) => {
                    error!("Registry monitor {} not started: {}", label, e);
                    continue;
                }
            };
            for e in &dropped {
                warn!("Ignoring registry value: {}", e);
            }

            let Some(hive) = self.hive.clone() else {
                warn!("Registry monitoring is not available on this platform, skipping {}", label);
                continue;
            };

            let enforcer = RegistryEnforcer::new(target, hive);
            tasks.spawn(enforcer.run(cancel.child_token()));
            registry_monitors += 1;
        }

        info!(
            "Supervising {} processes and {} registry monitors",
            processes, registry_monitors
        );

        SupervisionHandle {
            cancel,
            tasks,
            processes,
            registry_monitors,
        }
    }
}

#[cfg(windows)]
fn default_hive() -> Option<Arc<dyn RegistryHive>> {
    Some(Arc::new(pmon_registry::WindowsRegistry::new()))
}

#[cfg(not(windows))]
fn default_hive() -> Option<Arc<dyn RegistryHive>> {
    None
}

/// Running supervision tasks.
pub struct SupervisionHandle {
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    processes: usize,
    registry_monitors: usize,
}

impl SupervisionHandle {
    pub fn process_tasks(&self) -> usize {
        self.processes
    }

    pub fn registry_tasks(&self) -> usize {
        self.registry_monitors
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signal every task and wait up to `grace` for them to finish.
    ///
    /// Returns `false` if some task had to be aborted.
    pub async fn shutdown(mut self, grace: Duration) -> bool {
        info!("Stopping all monitors");
        self.cancel.cancel();

        let tasks = &mut self.tasks;
        let drained = timeout(grace, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    error!("Monitor task failed: {}", e);
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("Monitors did not stop within {:?}, aborting {} tasks", grace, self.tasks.len());
            self.tasks.abort_all();
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmon_registry::{MemoryRegistry, RegistryValue, RootKey};

    const REGISTRY_ONLY: &str = r#"
registry_monitors:
  - name: settings
    root_key: HKCU
    path: SOFTWARE\PmonRootTest
    check_interval: 1
    values:
      - name: mode
        type: string
        expect_value: strict
  - name: broken
    root_key: HKEY_NOWHERE
    path: SOFTWARE\PmonRootTest
  - name: disabled
    enable: false
    root_key: HKCU
    path: SOFTWARE\PmonRootTest
"#;

    #[tokio::test(start_paused = true)]
    async fn test_registry_drift_corrected_until_shutdown() {
        let hive = MemoryRegistry::new();
        hive.set_value(
            RootKey::CurrentUser,
            "SOFTWARE\\PmonRootTest",
            "mode",
            RegistryValue::String("strict".into()),
        );

        let config = ProcessMonitorConfig::load_from_string(REGISTRY_ONLY).unwrap();
        let handle = SupervisionRoot::new(config)
            .with_registry_hive(Arc::new(hive.clone()))
            .spawn();
        assert_eq!(handle.process_tasks(), 0);
        assert_eq!(handle.registry_tasks(), 1);

        tokio::time::sleep(Duration::from_millis(500)).await;
        hive.set_value(
            RootKey::CurrentUser,
            "SOFTWARE\\PmonRootTest",
            "mode",
            RegistryValue::String("lenient".into()),
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            hive.value(RootKey::CurrentUser, "SOFTWARE\\PmonRootTest", "mode"),
            Some(RegistryValue::String("strict".into()))
        );

        assert!(handle.shutdown(DEFAULT_SHUTDOWN_GRACE).await);
    }

    #[tokio::test]
    async fn test_empty_config_shuts_down_immediately() {
        let handle = SupervisionRoot::new(ProcessMonitorConfig::default()).spawn();
        assert_eq!(handle.process_tasks() + handle.registry_tasks(), 0);
        assert!(handle.shutdown(Duration::from_millis(100)).await);
    }

    #[cfg(not(windows))]
    #[tokio::test]
    async fn test_registry_monitors_skipped_without_hive() {
        let config = ProcessMonitorConfig::load_from_string(REGISTRY_ONLY).unwrap();
        let handle = SupervisionRoot::new(config).spawn();
        assert_eq!(handle.registry_tasks(), 0);
        assert!(handle.shutdown(DEFAULT_SHUTDOWN_GRACE).await);
    }
}

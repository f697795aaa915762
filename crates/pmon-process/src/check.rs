//! Process table and port checks.
//!
//! Name matching is a case-sensitive substring test of the configured
//! name's last path segment against each process's executable path and
//! full command line. It does not identify a PID: a target `app.exe` also
//! matches `myapp.exe`.

use std::time::Duration;
use sysinfo::{Pid, Process, ProcessRefreshKind, System, UpdateKind};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Connect timeout for [`port_in_use`].
pub const PORT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Last path segment of `name`, splitting on both separator styles.
pub fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// One row of the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub exe: String,
    pub cmdline: String,
}

impl ProcessEntry {
    pub fn matches(&self, needle: &str) -> bool {
        !needle.is_empty() && (self.exe.contains(needle) || self.cmdline.contains(needle))
    }
}

pub(crate) fn entry_of(pid: &Pid, process: &Process) -> ProcessEntry {
    ProcessEntry {
        pid: pid.as_u32(),
        exe: process
            .exe()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default(),
        cmdline: process.cmd().join(" "),
    }
}

// A plain `refresh_processes()` leaves `cmd` empty, and interpreted
// targets (`sh worker.sh`) are only visible through their command line.
pub(crate) fn refreshed_system() -> System {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessRefreshKind::new()
            .with_exe(UpdateKind::OnlyIfNotSet)
            .with_cmd(UpdateKind::OnlyIfNotSet),
    );
    system
}

/// A point-in-time view of running processes, excluding this process.
#[derive(Debug, Clone, Default)]
pub struct ProcessTable {
    entries: Vec<ProcessEntry>,
}

impl ProcessTable {
    /// Enumerate the host's processes once.
    pub fn snapshot() -> Self {
        let own_pid = std::process::id();
        let system = refreshed_system();
        let entries = system
            .processes()
            .iter()
            .filter(|(pid, _)| pid.as_u32() != own_pid)
            .map(|(pid, process)| entry_of(pid, process))
            .collect::<Vec<_>>();
        debug!("Process table snapshot: {} processes", entries.len());
        Self { entries }
    }

    pub fn from_entries(entries: Vec<ProcessEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ProcessEntry] {
        &self.entries
    }

    /// Entries whose exe or command line contain `needle` verbatim.
    pub fn find<'a>(&'a self, needle: &'a str) -> impl Iterator<Item = &'a ProcessEntry> + 'a {
        self.entries.iter().filter(move |entry| entry.matches(needle))
    }

    /// Whether a process for the configured `name` is present.
    pub fn contains_name(&self, name: &str) -> bool {
        self.find(base_name(name)).next().is_some()
    }
}

/// Whether any process matches the base name of `name`.
pub fn process_is_running(name: &str) -> bool {
    ProcessTable::snapshot().contains_name(name)
}

/// Whether something accepts TCP connections on `localhost:port`.
pub async fn port_in_use(port: u16) -> bool {
    matches!(
        timeout(PORT_PROBE_TIMEOUT, TcpStream::connect(("localhost", port))).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn entry(pid: u32, exe: &str, cmdline: &str) -> ProcessEntry {
        ProcessEntry {
            pid,
            exe: exe.to_string(),
            cmdline: cmdline.to_string(),
        }
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("C:\\apps\\test_app.exe"), "test_app.exe");
        assert_eq!(base_name("/opt/apps/server"), "server");
        assert_eq!(base_name("./server"), "server");
        assert_eq!(base_name("server"), "server");
    }

    #[test]
    fn test_name_matching_uses_exe_and_cmdline() {
        let table = ProcessTable::from_entries(vec![
            entry(10, "/usr/bin/python3", "python3 /srv/worker.py --fast"),
            entry(11, "C:\\tools\\test_app.exe", "test_app.exe --port 8080"),
        ]);

        assert!(table.contains_name("worker.py"));
        assert!(table.contains_name("D:\\other\\test_app.exe"));
        assert!(!table.contains_name("Test_App.exe"));
        assert!(!table.contains_name("missing"));
        assert!(!table.contains_name(""));
    }

    #[test]
    fn test_substring_matching_is_imprecise() {
        let table = ProcessTable::from_entries(vec![entry(12, "/opt/myapp.exe", "myapp.exe")]);
        assert!(table.contains_name("app.exe"));
    }

    #[test]
    fn test_snapshot_excludes_self() {
        let table = ProcessTable::snapshot();
        let own = std::process::id();
        assert!(table.entries().iter().all(|e| e.pid != own));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_child_found_by_command_line() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("pmon_observed_script_5d1e.sh");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\nexit 0\n").unwrap();

        let mut child = tokio::process::Command::new("sh").arg(&script).spawn().unwrap();
        let pid = child.id().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        let table = ProcessTable::snapshot();
        let entry = table.entries().iter().find(|e| e.pid == pid).unwrap();
        assert!(entry.cmdline.contains("pmon_observed_script_5d1e.sh"));
        assert!(process_is_running(&script.to_string_lossy()));

        child.kill().await.unwrap();
    }

    #[tokio::test]
    async fn test_port_in_use() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(port_in_use(port).await);

        drop(listener);
        assert!(!port_in_use(port).await);
    }
}

//! Process spawning.
//!
//! Children are started detached from the supervisor: they get their own
//! process group, inherit stdout/stderr, and are not killed when their
//! handle is dropped.

use pmon_common::{ProcessError, ProcessResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, error, info};

/// Everything needed to start one process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub work_dir: Option<PathBuf>,
    /// Added on top of the inherited environment, in order.
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_work_dir(mut self, dir: Option<impl Into<PathBuf>>) -> Self {
        self.work_dir = dir.map(Into::into);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Resolve the program to execute.
///
/// A relative program that exists as a file under the working directory
/// (or the current directory when none is set) runs from there. Anything
/// else is passed through for `PATH` lookup.
pub fn resolve_program(program: &str, work_dir: Option<&Path>) -> PathBuf {
    let path = Path::new(program);
    if path.is_absolute() {
        return path.to_path_buf();
    }

    let Ok(cwd) = std::env::current_dir() else {
        return path.to_path_buf();
    };
    let base = match work_dir {
        Some(dir) => cwd.join(dir),
        None => cwd,
    };

    let candidate = base.join(path);
    if candidate.is_file() {
        candidate
    } else {
        path.to_path_buf()
    }
}

fn build_command(spec: &LaunchSpec) -> Command {
    let program = resolve_program(&spec.program, spec.work_dir.as_deref());
    let mut cmd = Command::new(&program);
    cmd.args(&spec.args);

    if let Some(ref dir) = spec.work_dir {
        cmd.current_dir(dir);
    }
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(false);

    // Keep console and terminal signals aimed at the supervisor away from
    // the child, so a process configured to survive shutdown does.
    #[cfg(windows)]
    {
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }

    cmd
}

/// Start a process and hand back its handle.
pub fn spawn_detached(spec: &LaunchSpec) -> ProcessResult<Child> {
    debug!("Spawning {} {:?}", spec.program, spec.args);
    let child = build_command(spec)
        .spawn()
        .map_err(|e| ProcessError::spawn_failed(&spec.program, e.to_string()))?;
    info!(
        "Process spawned successfully: {} (PID: {})",
        spec.program,
        child.id().unwrap_or(0)
    );
    Ok(child)
}

/// Start a process without keeping its handle.
///
/// The exit is awaited on a background task and a failure is logged;
/// nothing is reported back to the caller.
pub fn launch_detached(spec: &LaunchSpec) -> ProcessResult<Option<u32>> {
    let mut child = spawn_detached(spec)?;
    let pid = child.id();
    let program = spec.program.clone();

    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) if status.success() => debug!("Command {} finished", program),
            Ok(status) => error!("Command execution failed: {} - {}", program, status),
            Err(e) => error!("Command execution failed: {} - {}", program, e),
        }
    });

    Ok(pid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_spec_builder() {
        let spec = LaunchSpec::new("cmd.exe")
            .with_args(["/c", "echo"])
            .with_work_dir(Some("C:\\work"))
            .with_env("CHANGED_VALUES", "a,b")
            .with_env("EXPECT_VALUE_MATCH", "true");

        assert_eq!(spec.args, vec!["/c".to_string(), "echo".to_string()]);
        assert_eq!(spec.work_dir, Some(PathBuf::from("C:\\work")));
        assert_eq!(spec.env_value("CHANGED_VALUES"), Some("a,b"));
        assert_eq!(spec.env_value("EXPECT_VALUE_MATCH"), Some("true"));
        assert_eq!(spec.env_value("MISSING"), None);
    }

    #[test]
    fn test_resolve_program_prefers_local_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("local_tool"), b"").unwrap();

        let resolved = resolve_program("local_tool", Some(dir.path()));
        assert_eq!(resolved, dir.path().join("local_tool"));

        let resolved = resolve_program("not_here_tool", Some(dir.path()));
        assert_eq!(resolved, PathBuf::from("not_here_tool"));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let spec = LaunchSpec::new("definitely-not-a-real-program-pmon");
        let err = spawn_detached(&spec).unwrap_err();
        assert!(matches!(err, ProcessError::SpawnFailed { .. }));
        assert!(launch_detached(&spec).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawned_child_sees_extra_env() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("env.txt");
        let spec = LaunchSpec::new("sh")
            .with_args(["-c", "printf '%s' \"$PMON_TEST_VALUE\" > env.txt"])
            .with_work_dir(Some(dir.path()))
            .with_env("PMON_TEST_VALUE", "hello");

        let mut child = spawn_detached(&spec).unwrap();
        assert!(child.wait().await.unwrap().success());
        assert_eq!(std::fs::read_to_string(out).unwrap(), "hello");
    }
}

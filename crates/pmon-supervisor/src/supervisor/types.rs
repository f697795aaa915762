//! States and outcomes reported by a [`ProcessSupervisor`](super::ProcessSupervisor).

use pmon_common::ProcessError;
use std::fmt;

/// Lifecycle state of one supervised target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
    Restarting,
}

/// Why a poll decided the target needs a restart
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartReason {
    /// The child we spawned has exited.
    Exited,
    /// The child handle looks alive but the name is gone from the process table.
    Vanished,
    /// No owned child and nothing by that name is running.
    NotRunning,
    PortClosed(u16),
    HealthCheckFailed(String),
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartReason::Exited => write!(f, "process exited"),
            RestartReason::Vanished => write!(f, "process no longer in process table"),
            RestartReason::NotRunning => write!(f, "process not running"),
            RestartReason::PortClosed(port) => write!(f, "port {} is not in use", port),
            RestartReason::HealthCheckFailed(url) => write!(f, "health check failed for {}", url),
        }
    }
}

/// Result of an attempt to bring the target up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started { pid: Option<u32> },
    /// A process with the target's name was already running; nothing spawned.
    AlreadyRunning,
    /// Vetoed by an exclusion process or the spawn failed.
    NotStarted(ProcessError),
}

impl StartOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, StartOutcome::Started { .. })
    }
}

/// What a single poll cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A restart was still in progress.
    Skipped,
    Healthy,
    /// The initial start had not happened yet and was retried.
    DeferredStart(StartOutcome),
    Restarted { reason: RestartReason, outcome: StartOutcome },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// No child owned by this supervisor.
    NoProcess,
    /// The child was left running (`kill_on_exit` is off).
    LeftRunning { pid: Option<u32> },
    Killed { pid: Option<u32> },
    KillFailed(ProcessError),
}

//! By-name kill sweep.

use crate::check::{base_name, entry_of, refreshed_system};
use tracing::{info, warn};

/// Kill every process whose exe or command line contains the base name of
/// `name`. This process is never a candidate.
///
/// Returns the PIDs that were signalled.
pub fn kill_by_name(name: &str) -> Vec<u32> {
    let needle = base_name(name);
    if needle.is_empty() {
        return Vec::new();
    }

    let own_pid = std::process::id();
    let system = refreshed_system();
    let mut killed = Vec::new();

    for (pid, process) in system.processes() {
        if pid.as_u32() == own_pid || !entry_of(pid, process).matches(needle) {
            continue;
        }
        info!("Killing existing process: {} (PID: {})", name, pid);
        if process.kill() {
            killed.push(pid.as_u32());
        } else {
            warn!("Failed to kill process: {} (PID: {})", name, pid);
        }
    }

    killed
}

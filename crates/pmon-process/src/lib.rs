//! # pmon-process
//!
//! Host-level process operations used by the supervisor:
//! - process table lookups by name
//! - TCP port probes
//! - the exclusion gate
//! - detached spawning and by-name kill sweeps
//!
//! [`ProcessHost`] bundles these behind one trait so supervision logic can
//! be exercised without touching the real process table.

pub mod check;
pub mod exclusion;
pub mod execute;
pub mod host;
pub mod terminate;

pub use check::{base_name, port_in_use, process_is_running, ProcessEntry, ProcessTable, PORT_PROBE_TIMEOUT};
pub use exclusion::{check_exclude_processes, check_exclude_processes_with};
pub use execute::{launch_detached, resolve_program, spawn_detached, LaunchSpec};
pub use host::{ManagedChild, ProcessHost, SystemHost, TokioChild};
pub use terminate::kill_by_name;

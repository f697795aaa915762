//! # pmon-supervisor
//!
//! Configuration loading and the supervision tasks built from it.
//!
//! - [`config`]: YAML configuration and its validation
//! - [`supervisor`]: the per-process supervision state machine
//! - [`root`]: spawns one task per enabled target and stops them together

pub mod config;
pub mod root;
pub mod supervisor;

pub use config::{ProcessMonitorConfig, ProcessTarget, RegistryMonitorConfig, RegistryValueConfig};
pub use root::{SupervisionHandle, SupervisionRoot, DEFAULT_SHUTDOWN_GRACE};
pub use supervisor::{
    PollOutcome, ProcessSupervisor, RestartReason, ShutdownOutcome, StartOutcome, SupervisorState,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Error types for process supervision and registry enforcement.
//!
//! Errors are plain `thiserror` enums with struct-like variants and a
//! constructor per variant, so call sites read as
//! `ProcessError::spawn_failed(name, err.to_string())`.
//!
//! ```rust
//! use pmon_common::{ProcessError, ProcessResult};
//!
//! fn start(name: &str) -> ProcessResult<u32> {
//!     Err(ProcessError::excluded(name, vec!["notepad.exe".to_string()]))
//! }
//!
//! assert!(start("app").unwrap_err().is_exclusion());
//! ```

use thiserror::Error;

/// Result type for process operations.
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;

/// Result type for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Result type for target configuration checks.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Failures while starting, stopping or probing a supervised process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("Process spawn failed: {name} - {reason}")]
    SpawnFailed { name: String, reason: String },

    /// Not a failure of the host: an exclusion process vetoed the start.
    #[error("Process start skipped: {name} - exclusion processes running: {found:?}")]
    Excluded { name: String, found: Vec<String> },

    #[error("Process kill failed: {name} - {reason}")]
    KillFailed { name: String, reason: String },
}

impl ProcessError {
    pub fn spawn_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn excluded(name: impl Into<String>, found: Vec<String>) -> Self {
        Self::Excluded {
            name: name.into(),
            found,
        }
    }

    pub fn kill_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::KillFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// True for an intentional skip rather than a host failure.
    pub fn is_exclusion(&self) -> bool {
        matches!(self, Self::Excluded { .. })
    }
}

/// Failures talking to the registry or converting values for it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown root key: {0}")]
    UnknownRootKey(String),

    #[error("unknown registry value type: {0}")]
    UnknownValueKind(String),

    #[error("unknown registry storage type: {0}")]
    UnknownStorageKind(u32),

    #[error("registry value not found: {path}\\{name}")]
    NotFound { path: String, name: String },

    #[error("registry key not found: {path}")]
    KeyNotFound { path: String },

    #[error("registry access denied: {path} - {reason}")]
    Access { path: String, reason: String },

    #[error("cannot convert {found} to {kind}")]
    Coercion { kind: String, found: String },

    #[error("registry operation failed: {path} - {reason}")]
    Os { path: String, reason: String },
}

impl RegistryError {
    pub fn not_found(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            path: path.into(),
            name: name.into(),
        }
    }

    pub fn key_not_found(path: impl Into<String>) -> Self {
        Self::KeyNotFound { path: path.into() }
    }

    pub fn access(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Access {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn coercion(kind: impl Into<String>, found: impl Into<String>) -> Self {
        Self::Coercion {
            kind: kind.into(),
            found: found.into(),
        }
    }

    pub fn os(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Os {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// A missing value is recoverable by writing the expectation.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// A single target's configuration cannot be used. Siblings keep running.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid target {target}: {source}")]
    Registry {
        target: String,
        #[source]
        source: RegistryError,
    },

    #[error("invalid target {target}: {reason}")]
    Invalid { target: String, reason: String },
}

impl ConfigError {
    pub fn registry(target: impl Into<String>, source: RegistryError) -> Self {
        Self::Registry {
            target: target.into(),
            source,
        }
    }

    pub fn invalid(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

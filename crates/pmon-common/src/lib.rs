//! # pmon-common
//!
//! Error types shared across the process monitor crates.
//!
//! Every enforcement crate reports failures through one of the enums
//! defined here so the owning task can decide whether to log, retry or
//! give up without string matching.

pub mod errors;

pub use errors::{
    ConfigError, ConfigResult, ProcessError, ProcessResult, RegistryError, RegistryResult,
};

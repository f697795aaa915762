//! # pmon-registry
//!
//! Typed registry values and drift enforcement.
//!
//! - [`kind`]: root keys and the six supported value kinds
//! - [`value`]: canonical registry values and loose configuration values
//! - [`codec`]: coercion, comparison and writes, all driven by the kind
//! - [`hive`]: the key access seam, with [`MemoryRegistry`] and, on
//!   Windows, [`WindowsRegistry`] behind it
//! - [`enforcer`]: the per-key watch loop

pub mod codec;
pub mod enforcer;
pub mod hive;
pub mod kind;
pub mod memory;
pub mod value;

#[cfg(windows)]
pub mod windows;

pub use codec::{coerce, compare_values, matches_expectation, set_registry_value};
pub use enforcer::{
    ChangeCommand, CycleReport, RegistryEnforcer, RegistryTarget, RestoreOutcome, RestorePolicy, StartupReport,
    ValueSnapshot, ValueSpec, CHANGED_VALUES_ENV, EXPECT_VALUE_MATCH_ENV,
};
pub use hive::{KeyAccess, RegistryHive, RegistryKey};
pub use kind::{RootKey, ValueKind};
pub use memory::MemoryRegistry;
pub use value::{ConfigValue, RegistryValue};

#[cfg(windows)]
pub use windows::WindowsRegistry;

//! Access to registry keys.
//!
//! The enforcer only talks to these traits, so it runs unchanged against
//! the real Windows registry and the in-memory hive used in tests.

use crate::kind::RootKey;
use crate::value::RegistryValue;
use pmon_common::RegistryResult;

/// Rights requested when opening a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAccess {
    /// Query values only.
    Read,
    /// Query and set values.
    ReadWrite,
    /// Query values and receive change notifications.
    Poll,
    /// Full control. Used as the last restoration attempt.
    All,
}

impl KeyAccess {
    pub fn can_write(&self) -> bool {
        matches!(self, KeyAccess::ReadWrite | KeyAccess::All)
    }
}

/// A source of registry keys.
pub trait RegistryHive: Send + Sync {
    fn open(&self, root: RootKey, path: &str, access: KeyAccess) -> RegistryResult<Box<dyn RegistryKey>>;
}

/// An open key. Dropping it closes the underlying handle.
pub trait RegistryKey: Send {
    /// Read a value in its canonical form. A missing value is
    /// [`RegistryError::NotFound`](pmon_common::RegistryError::NotFound).
    fn read(&self, name: &str) -> RegistryResult<RegistryValue>;

    fn write(&self, name: &str, value: &RegistryValue) -> RegistryResult<()>;
}

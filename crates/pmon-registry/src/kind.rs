//! Root keys and declared value kinds.

use pmon_common::{RegistryError, RegistryResult};
use std::fmt;
use std::str::FromStr;

/// Native storage type codes as the registry reports them.
pub mod storage {
    pub const REG_SZ: u32 = 1;
    pub const REG_EXPAND_SZ: u32 = 2;
    pub const REG_BINARY: u32 = 3;
    pub const REG_DWORD: u32 = 4;
    pub const REG_MULTI_SZ: u32 = 7;
    pub const REG_QWORD: u32 = 11;
}

/// The declared type of a watched value.
///
/// A value's kind decides how it is read, compared and written. Parsing is
/// case-insensitive so `DWORD` and `dword` are the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    String,
    ExpandString,
    Binary,
    Dword,
    Qword,
    MultiString,
}

impl ValueKind {
    pub const ALL: [ValueKind; 6] = [
        ValueKind::String,
        ValueKind::ExpandString,
        ValueKind::Binary,
        ValueKind::Dword,
        ValueKind::Qword,
        ValueKind::MultiString,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::ExpandString => "expand_string",
            ValueKind::Binary => "binary",
            ValueKind::Dword => "dword",
            ValueKind::Qword => "qword",
            ValueKind::MultiString => "multi_string",
        }
    }

    pub fn storage_type(&self) -> u32 {
        match self {
            ValueKind::String => storage::REG_SZ,
            ValueKind::ExpandString => storage::REG_EXPAND_SZ,
            ValueKind::Binary => storage::REG_BINARY,
            ValueKind::Dword => storage::REG_DWORD,
            ValueKind::Qword => storage::REG_QWORD,
            ValueKind::MultiString => storage::REG_MULTI_SZ,
        }
    }

    pub fn from_storage_type(code: u32) -> RegistryResult<Self> {
        match code {
            storage::REG_SZ => Ok(ValueKind::String),
            storage::REG_EXPAND_SZ => Ok(ValueKind::ExpandString),
            storage::REG_BINARY => Ok(ValueKind::Binary),
            storage::REG_DWORD => Ok(ValueKind::Dword),
            storage::REG_QWORD => Ok(ValueKind::Qword),
            storage::REG_MULTI_SZ => Ok(ValueKind::MultiString),
            other => Err(RegistryError::UnknownStorageKind(other)),
        }
    }
}

impl FromStr for ValueKind {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" => Ok(ValueKind::String),
            "expand_string" => Ok(ValueKind::ExpandString),
            "binary" => Ok(ValueKind::Binary),
            "dword" => Ok(ValueKind::Dword),
            "qword" => Ok(ValueKind::Qword),
            "multi_string" => Ok(ValueKind::MultiString),
            _ => Err(RegistryError::UnknownValueKind(s.to_string())),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predefined hive a watched key lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootKey {
    ClassesRoot,
    CurrentUser,
    LocalMachine,
    Users,
    CurrentConfig,
}

impl RootKey {
    pub fn short_name(&self) -> &'static str {
        match self {
            RootKey::ClassesRoot => "HKCR",
            RootKey::CurrentUser => "HKCU",
            RootKey::LocalMachine => "HKLM",
            RootKey::Users => "HKU",
            RootKey::CurrentConfig => "HKCC",
        }
    }
}

impl FromStr for RootKey {
    type Err = RegistryError;

    /// Accepts the short and long symbolic names, matched exactly.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HKCR" | "HKEY_CLASSES_ROOT" => Ok(RootKey::ClassesRoot),
            "HKCU" | "HKEY_CURRENT_USER" => Ok(RootKey::CurrentUser),
            "HKLM" | "HKEY_LOCAL_MACHINE" => Ok(RootKey::LocalMachine),
            "HKU" | "HKEY_USERS" => Ok(RootKey::Users),
            "HKCC" | "HKEY_CURRENT_CONFIG" => Ok(RootKey::CurrentConfig),
            _ => Err(RegistryError::UnknownRootKey(s.to_string())),
        }
    }
}

impl fmt::Display for RootKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

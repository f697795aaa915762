//! Windows registry backend.

use crate::hive::{KeyAccess, RegistryHive, RegistryKey};
use crate::kind::{RootKey, ValueKind};
use crate::value::RegistryValue;
use pmon_common::{RegistryError, RegistryResult};
use windows::core::PCWSTR;
use windows::Win32::Foundation::{
    ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND, ERROR_MORE_DATA, ERROR_SUCCESS, WIN32_ERROR,
};
use windows::Win32::System::Registry::{
    RegCloseKey, RegOpenKeyExW, RegQueryValueExW, RegSetValueExW, HKEY, HKEY_CLASSES_ROOT,
    HKEY_CURRENT_CONFIG, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, HKEY_USERS, KEY_ALL_ACCESS,
    KEY_NOTIFY, KEY_QUERY_VALUE, KEY_SET_VALUE, REG_SAM_FLAGS, REG_VALUE_TYPE,
};

/// The live registry of the current machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsRegistry;

impl WindowsRegistry {
    pub fn new() -> Self {
        Self
    }
}

fn root_handle(root: RootKey) -> HKEY {
    match root {
        RootKey::ClassesRoot => HKEY_CLASSES_ROOT,
        RootKey::CurrentUser => HKEY_CURRENT_USER,
        RootKey::LocalMachine => HKEY_LOCAL_MACHINE,
        RootKey::Users => HKEY_USERS,
        RootKey::CurrentConfig => HKEY_CURRENT_CONFIG,
    }
}

fn desired_access(access: KeyAccess) -> REG_SAM_FLAGS {
    match access {
        KeyAccess::Read => KEY_QUERY_VALUE,
        KeyAccess::ReadWrite => KEY_QUERY_VALUE | KEY_SET_VALUE,
        KeyAccess::Poll => KEY_QUERY_VALUE | KEY_NOTIFY,
        KeyAccess::All => KEY_ALL_ACCESS,
    }
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn status_error(path: &str, status: WIN32_ERROR) -> RegistryError {
    if status == ERROR_ACCESS_DENIED {
        RegistryError::access(path, format!("error code {}", status.0))
    } else {
        RegistryError::os(path, format!("error code {}", status.0))
    }
}

impl RegistryHive for WindowsRegistry {
    fn open(&self, root: RootKey, path: &str, access: KeyAccess) -> RegistryResult<Box<dyn RegistryKey>> {
        let full_path = format!("{}\\{}", root, path);
        let subkey = wide(path);
        let mut handle = HKEY::default();

        // SAFETY: `subkey` is NUL-terminated and outlives the call.
        let status = unsafe {
            RegOpenKeyExW(
                root_handle(root),
                PCWSTR(subkey.as_ptr()),
                0,
                desired_access(access),
                &mut handle,
            )
        };

        if status == ERROR_FILE_NOT_FOUND {
            return Err(RegistryError::key_not_found(full_path));
        }
        if status != ERROR_SUCCESS {
            return Err(status_error(&full_path, status));
        }

        Ok(Box::new(WindowsKey {
            handle,
            path: full_path,
        }))
    }
}

struct WindowsKey {
    handle: HKEY,
    path: String,
}

// The handle is only used through &self calls on one task at a time.
unsafe impl Send for WindowsKey {}

impl WindowsKey {
    fn query(&self, name: &str) -> RegistryResult<(u32, Vec<u8>)> {
        let value_name = wide(name);
        let mut size: u32 = 0;
        let mut value_type = REG_VALUE_TYPE::default();

        loop {
            let mut data = vec![0u8; size as usize];
            // SAFETY: the buffer holds `size` bytes and the name is NUL-terminated.
            let status = unsafe {
                RegQueryValueExW(
                    self.handle,
                    PCWSTR(value_name.as_ptr()),
                    None,
                    Some(&mut value_type as *mut REG_VALUE_TYPE),
                    if data.is_empty() { None } else { Some(data.as_mut_ptr()) },
                    Some(&mut size as *mut u32),
                )
            };

            if status == ERROR_FILE_NOT_FOUND {
                return Err(RegistryError::not_found(&self.path, name));
            }
            if status == ERROR_MORE_DATA || (status == ERROR_SUCCESS && data.len() < size as usize) {
                continue;
            }
            if status != ERROR_SUCCESS {
                return Err(status_error(&self.path, status));
            }
            data.truncate(size as usize);
            return Ok((value_type.0, data));
        }
    }
}

impl RegistryKey for WindowsKey {
    fn read(&self, name: &str) -> RegistryResult<RegistryValue> {
        let (code, data) = self.query(name)?;
        let decoded = ValueKind::from_storage_type(code).and_then(|kind| decode(kind, &data));
        Ok(decoded.unwrap_or(RegistryValue::Other {
            storage_type: code,
            data,
        }))
    }

    fn write(&self, name: &str, value: &RegistryValue) -> RegistryResult<()> {
        let value_name = wide(name);
        let data = encode(value);
        // SAFETY: `data` and the name outlive the call.
        let status = unsafe {
            RegSetValueExW(
                self.handle,
                PCWSTR(value_name.as_ptr()),
                0,
                REG_VALUE_TYPE(value.storage_type()),
                Some(data.as_slice()),
            )
        };
        if status != ERROR_SUCCESS {
            return Err(status_error(&self.path, status));
        }
        Ok(())
    }
}

impl Drop for WindowsKey {
    fn drop(&mut self) {
        // SAFETY: the handle came from a successful RegOpenKeyExW.
        let _ = unsafe { RegCloseKey(self.handle) };
    }
}

fn utf16_units(data: &[u8]) -> Vec<u16> {
    data.chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

fn decode(kind: ValueKind, data: &[u8]) -> RegistryResult<RegistryValue> {
    match kind {
        ValueKind::String | ValueKind::ExpandString => {
            let units = utf16_units(data);
            let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
            let text = String::from_utf16_lossy(&units[..end]);
            Ok(if kind == ValueKind::String {
                RegistryValue::String(text)
            } else {
                RegistryValue::ExpandString(text)
            })
        }
        ValueKind::MultiString => {
            let units = utf16_units(data);
            let items = units
                .split(|&u| u == 0)
                .take_while(|part| !part.is_empty())
                .map(String::from_utf16_lossy)
                .collect();
            Ok(RegistryValue::MultiString(items))
        }
        ValueKind::Binary => Ok(RegistryValue::Binary(data.to_vec())),
        ValueKind::Dword => {
            let bytes: [u8; 4] = data
                .get(..4)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| RegistryError::coercion("dword", "truncated data"))?;
            Ok(RegistryValue::Dword(u32::from_le_bytes(bytes)))
        }
        ValueKind::Qword => {
            let bytes: [u8; 8] = data
                .get(..8)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| RegistryError::coercion("qword", "truncated data"))?;
            Ok(RegistryValue::Qword(u64::from_le_bytes(bytes)))
        }
    }
}

fn encode(value: &RegistryValue) -> Vec<u8> {
    fn utf16z(s: &str, out: &mut Vec<u8>) {
        for unit in s.encode_utf16().chain(std::iter::once(0)) {
            out.extend_from_slice(&unit.to_le_bytes());
        }
    }

    let mut out = Vec::new();
    match value {
        RegistryValue::String(s) | RegistryValue::ExpandString(s) => utf16z(s, &mut out),
        RegistryValue::MultiString(items) => {
            for item in items {
                utf16z(item, &mut out);
            }
            out.extend_from_slice(&0u16.to_le_bytes());
        }
        RegistryValue::Binary(bytes) | RegistryValue::Other { data: bytes, .. } => out.extend_from_slice(bytes),
        RegistryValue::Dword(d) => out.extend_from_slice(&d.to_le_bytes()),
        RegistryValue::Qword(q) => out.extend_from_slice(&q.to_le_bytes()),
    }
    out
}

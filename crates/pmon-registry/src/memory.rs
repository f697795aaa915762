//! In-process registry hive.
//!
//! Behaves like the real registry for the operations the enforcer uses:
//! keys must exist before they are opened, and writes through a key opened
//! without write rights are refused. Tests can also inject write failures
//! and inspect which access modes were requested.

use crate::hive::{KeyAccess, RegistryHive, RegistryKey};
use crate::kind::RootKey;
use crate::value::RegistryValue;
use parking_lot::Mutex;
use pmon_common::{RegistryError, RegistryResult};
use std::collections::HashMap;
use std::sync::Arc;

type KeyId = (RootKey, String);

#[derive(Default)]
struct HiveState {
    keys: HashMap<KeyId, HashMap<String, RegistryValue>>,
    opens: Vec<KeyAccess>,
    failing_writes: usize,
    writes_need_full_access: bool,
}

/// Cloning shares the same underlying hive.
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    state: Arc<Mutex<HiveState>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_key(&self, root: RootKey, path: &str) {
        self.state
            .lock()
            .keys
            .entry((root, normalize(path)))
            .or_default();
    }

    /// Set a value directly, bypassing access checks. Creates the key.
    pub fn set_value(&self, root: RootKey, path: &str, name: &str, value: RegistryValue) {
        self.state
            .lock()
            .keys
            .entry((root, normalize(path)))
            .or_default()
            .insert(name.to_string(), value);
    }

    pub fn value(&self, root: RootKey, path: &str, name: &str) -> Option<RegistryValue> {
        self.state
            .lock()
            .keys
            .get(&(root, normalize(path)))
            .and_then(|values| values.get(name).cloned())
    }

    pub fn delete_value(&self, root: RootKey, path: &str, name: &str) -> Option<RegistryValue> {
        self.state
            .lock()
            .keys
            .get_mut(&(root, normalize(path)))
            .and_then(|values| values.remove(name))
    }

    /// Make the next `count` writes fail with an access error.
    pub fn fail_next_writes(&self, count: usize) {
        self.state.lock().failing_writes = count;
    }

    /// Refuse writes unless the key was opened with [`KeyAccess::All`].
    pub fn require_full_access_for_writes(&self, enabled: bool) {
        self.state.lock().writes_need_full_access = enabled;
    }

    /// Access modes requested so far, in order.
    pub fn opened_with(&self) -> Vec<KeyAccess> {
        self.state.lock().opens.clone()
    }

    pub fn clear_open_log(&self) {
        self.state.lock().opens.clear();
    }
}

impl RegistryHive for MemoryRegistry {
    fn open(&self, root: RootKey, path: &str, access: KeyAccess) -> RegistryResult<Box<dyn RegistryKey>> {
        let id = (root, normalize(path));
        let mut state = self.state.lock();
        state.opens.push(access);
        if !state.keys.contains_key(&id) {
            return Err(RegistryError::key_not_found(display_path(&id)));
        }
        Ok(Box::new(MemoryKey {
            state: Arc::clone(&self.state),
            id,
            access,
        }))
    }
}

struct MemoryKey {
    state: Arc<Mutex<HiveState>>,
    id: KeyId,
    access: KeyAccess,
}

impl RegistryKey for MemoryKey {
    fn read(&self, name: &str) -> RegistryResult<RegistryValue> {
        let state = self.state.lock();
        let values = state
            .keys
            .get(&self.id)
            .ok_or_else(|| RegistryError::key_not_found(display_path(&self.id)))?;
        values
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::not_found(display_path(&self.id), name))
    }

    fn write(&self, name: &str, value: &RegistryValue) -> RegistryResult<()> {
        let mut state = self.state.lock();
        let path = display_path(&self.id);

        if !self.access.can_write() {
            return Err(RegistryError::access(path, "key not opened for writing"));
        }
        if state.writes_need_full_access && self.access != KeyAccess::All {
            return Err(RegistryError::access(path, "full access required"));
        }
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(RegistryError::access(path, "write refused"));
        }

        state
            .keys
            .get_mut(&self.id)
            .ok_or_else(|| RegistryError::key_not_found(path.clone()))?
            .insert(name.to_string(), value.clone());
        Ok(())
    }
}

// Registry paths are case-insensitive.
fn normalize(path: &str) -> String {
    path.trim_matches('\\').to_ascii_lowercase()
}

fn display_path(id: &KeyId) -> String {
    format!("{}\\{}", id.0, id.1)
}

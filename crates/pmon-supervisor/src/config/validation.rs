use super::*;
use anyhow::{anyhow, Result};
use std::collections::HashSet;

/// Validate the complete configuration
pub fn validate_config(config: &ProcessMonitorConfig) -> Result<()> {
    validate_processes(&config.processes)?;
    for monitor in &config.registry_monitors {
        validate_registry_monitor(monitor)?;
    }
    Ok(())
}

fn validate_processes(processes: &[ProcessTarget]) -> Result<()> {
    let mut names = HashSet::new();
    for process in processes {
        if process.name.trim().is_empty() {
            return Err(anyhow!("Process name cannot be empty"));
        }
        if !names.insert(process.name.as_str()) {
            return Err(anyhow!("Duplicate process name: {}", process.name));
        }
        if process.check_interval.is_zero() {
            return Err(anyhow!("Check interval must be greater than 0 for process: {}", process.name));
        }
    }
    Ok(())
}

// Root keys and value types are resolved per target when its task starts.
fn validate_registry_monitor(monitor: &RegistryMonitorConfig) -> Result<()> {
    if monitor.path.trim().is_empty() {
        return Err(anyhow!("Registry path cannot be empty for monitor: {}", monitor.label()));
    }
    if monitor.check_interval.is_zero() {
        return Err(anyhow!(
            "Check interval must be greater than 0 for registry monitor: {}",
            monitor.label()
        ));
    }
    if monitor.values.iter().any(|v| v.name.trim().is_empty()) {
        return Err(anyhow!("Registry value name cannot be empty for monitor: {}", monitor.label()));
    }
    Ok(())
}

//! Exclusion gate.
//!
//! A target may name processes whose presence forbids starting it. The
//! check is evaluated fresh before every start and restart.

use crate::check::ProcessTable;

/// Report which of `names` currently have a running process.
pub fn check_exclude_processes(names: &[String]) -> (bool, Vec<String>) {
    check_exclude_processes_with(names, ProcessTable::snapshot)
}

/// Same as [`check_exclude_processes`] with an explicit table source.
///
/// `scan` is not called when `names` is empty.
pub fn check_exclude_processes_with<F>(names: &[String], scan: F) -> (bool, Vec<String>)
where
    F: FnOnce() -> ProcessTable,
{
    if names.is_empty() {
        return (false, Vec::new());
    }

    let table = scan();
    let found: Vec<String> = names
        .iter()
        .filter(|name| table.find(name).next().is_some())
        .cloned()
        .collect();
    (!found.is_empty(), found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::ProcessEntry;
    use std::cell::Cell;

    fn table() -> ProcessTable {
        ProcessTable::from_entries(vec![ProcessEntry {
            pid: 42,
            exe: "C:\\Windows\\System32\\notepad.exe".to_string(),
            cmdline: "notepad.exe readme.txt".to_string(),
        }])
    }

    #[test]
    fn test_empty_list_never_scans() {
        let scans = Cell::new(0);
        let result = check_exclude_processes_with(&[], || {
            scans.set(scans.get() + 1);
            table()
        });
        assert_eq!(result, (false, Vec::new()));
        assert_eq!(scans.get(), 0);
    }

    #[test]
    fn test_reports_every_present_name() {
        let scans = Cell::new(0);
        let names = vec![
            "notepad.exe".to_string(),
            "calc.exe".to_string(),
            "readme".to_string(),
        ];
        let (found_any, found) = check_exclude_processes_with(&names, || {
            scans.set(scans.get() + 1);
            table()
        });
        assert!(found_any);
        assert_eq!(found, vec!["notepad.exe".to_string(), "readme".to_string()]);
        assert_eq!(scans.get(), 1);
    }

    #[test]
    fn test_absent_names() {
        let names = vec!["calc.exe".to_string()];
        assert_eq!(check_exclude_processes_with(&names, table), (false, Vec::new()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_on_command_line_vetoes() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("pmon_exclusion_script_8b2c.sh");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\nexit 0\n").unwrap();

        let mut child = tokio::process::Command::new("sh").arg(&script).spawn().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        let names = vec!["pmon_exclusion_script_8b2c.sh".to_string()];
        assert_eq!(check_exclude_processes(&names), (true, names.clone()));

        child.kill().await.unwrap();
    }
}

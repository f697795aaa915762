//! Self-monitoring script generation.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Seconds between watchdog checks.
const CHECK_PERIOD_SECS: u32 = 30;

pub struct WatchdogScript {
    pub file_name: &'static str,
    pub content: String,
}

/// Batch script that relaunches the monitor when it is missing from `tasklist`.
pub fn windows_script(exe: &str, config: &str) -> WatchdogScript {
    let content = format!(
        "@echo off\r\n\
         :loop\r\n\
         tasklist /FI \"IMAGENAME eq processmonitor.exe\" 2>NUL | find /I /N \"processmonitor.exe\">NUL\r\n\
         if \"%ERRORLEVEL%\"==\"1\" (\r\n\
         \x20   echo Process monitor not running, restarting...\r\n\
         \x20   start \"\" \"{exe}\" --config \"{config}\"\r\n\
         )\r\n\
         timeout /t {period} /nobreak >nul\r\n\
         goto loop\r\n",
        exe = exe,
        config = config,
        period = CHECK_PERIOD_SECS,
    );
    WatchdogScript {
        file_name: "monitor_watchdog.bat",
        content,
    }
}

/// Shell loop that relaunches the monitor when `pgrep` cannot find it.
pub fn unix_script(exe: &str, config: &str) -> WatchdogScript {
    let content = format!(
        "#!/bin/sh\n\
         while true; do\n\
         \x20   if ! pgrep -f \"processmonitor\" > /dev/null; then\n\
         \x20       echo \"Process monitor not running, restarting...\"\n\
         \x20       nohup \"{exe}\" --config \"{config}\" > /dev/null 2>&1 &\n\
         \x20   fi\n\
         \x20   sleep {period}\n\
         done\n",
        exe = exe,
        config = config,
        period = CHECK_PERIOD_SECS,
    );
    WatchdogScript {
        file_name: "monitor_watchdog.sh",
        content,
    }
}

/// Write the platform's watchdog script into `dir`.
pub fn create_watchdog_script(dir: &Path, config: &str) -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate the running executable")?;
    let exe = exe.to_string_lossy();

    let script = if cfg!(windows) {
        windows_script(&exe, config)
    } else {
        unix_script(&exe, config)
    };

    let path = dir.join(script.file_name);
    std::fs::write(&path, script.content)
        .with_context(|| format!("Failed to write watchdog script: {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("Failed to make {} executable", path.display()))?;
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_script_relaunches_with_config() {
        let script = unix_script("/opt/pmon/processmonitor", "/etc/pmon/config.yaml");
        assert_eq!(script.file_name, "monitor_watchdog.sh");
        assert!(script.content.starts_with("#!/bin/sh\n"));
        assert!(script
            .content
            .contains("nohup \"/opt/pmon/processmonitor\" --config \"/etc/pmon/config.yaml\""));
        assert!(script.content.contains("    sleep 30\n"));
    }

    #[test]
    fn test_windows_script_uses_tasklist() {
        let script = windows_script("C:\\pmon\\processmonitor.exe", "config.yaml");
        assert_eq!(script.file_name, "monitor_watchdog.bat");
        assert!(script.content.contains("IMAGENAME eq processmonitor.exe"));
        assert!(script.content.contains("%ERRORLEVEL%"));
        assert!(script
            .content
            .contains("start \"\" \"C:\\pmon\\processmonitor.exe\" --config \"config.yaml\""));
        assert!(script.content.contains("timeout /t 30 /nobreak"));
    }

    #[test]
    fn test_create_writes_script() {
        let dir = tempfile::tempdir().unwrap();
        let path = create_watchdog_script(dir.path(), "config.yaml").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("--config \"config.yaml\""));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
            assert!(path.ends_with("monitor_watchdog.sh"));
        }
    }
}

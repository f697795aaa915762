use anyhow::{Context, Result};
use pmon_common::{ConfigError, ConfigResult};
use pmon_process::LaunchSpec;
use pmon_registry::{ChangeCommand, ConfigValue, RegistryTarget, RootKey, ValueKind, ValueSpec};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod validation;

/// Top-level configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessMonitorConfig {
    #[serde(default)]
    pub processes: Vec<ProcessTarget>,
    #[serde(default)]
    pub registry_monitors: Vec<RegistryMonitorConfig>,
}

/// A process that must stay running and healthy.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProcessTarget {
    /// Executable path or name. Its last path segment is also the key used
    /// to find the process in the process table.
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Alternate executable used for restarts.
    #[serde(default)]
    pub restart_command: Option<String>,
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub health_checks: Vec<String>,
    #[serde(default = "default_check_interval", with = "duration_serde")]
    pub check_interval: Duration,
    #[serde(default, with = "duration_serde")]
    pub restart_delay: Duration,
    /// Pause after every successful start before polling resumes.
    #[serde(default = "default_startup_grace", with = "duration_serde")]
    pub startup_grace: Duration,
    #[serde(default)]
    pub kill_on_exit: bool,
    #[serde(default)]
    pub exclude_processes: Vec<String>,
    #[serde(default = "default_enabled", alias = "enabled")]
    pub enable: bool,
}

impl ProcessTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            restart_command: None,
            work_dir: None,
            ports: Vec::new(),
            health_checks: Vec::new(),
            check_interval: default_check_interval(),
            restart_delay: Duration::ZERO,
            startup_grace: default_startup_grace(),
            kill_on_exit: false,
            exclude_processes: Vec::new(),
            enable: true,
        }
    }

    /// Program used for restarts: `restart_command` when set, else `name`.
    pub fn restart_program(&self) -> &str {
        self.restart_command
            .as_deref()
            .filter(|cmd| !cmd.is_empty())
            .unwrap_or(&self.name)
    }

    pub fn launch_spec(&self, program: &str) -> LaunchSpec {
        LaunchSpec::new(program)
            .with_args(self.args.iter().cloned())
            .with_work_dir(self.work_dir.clone())
    }
}

/// A registry key whose values are watched and enforced.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegistryMonitorConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled", alias = "enabled")]
    pub enable: bool,
    pub root_key: String,
    pub path: String,
    #[serde(default)]
    pub values: Vec<RegistryValueConfig>,
    #[serde(default = "default_check_interval", with = "duration_serde")]
    pub check_interval: Duration,
    #[serde(default)]
    pub execute_on_change: bool,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegistryValueConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: String,
    #[serde(default)]
    pub expect_value: Option<ConfigValue>,
}

impl RegistryMonitorConfig {
    /// Name used in logs: the configured name, else the key path.
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("{}\\{}", self.root_key, self.path)
        } else {
            self.name.clone()
        }
    }

    /// Resolve symbolic names into a runnable target.
    ///
    /// An unknown root key rejects the whole target. An unknown value type
    /// only drops that value; the dropped values are returned alongside.
    pub fn to_target(&self) -> ConfigResult<(RegistryTarget, Vec<ConfigError>)> {
        let label = self.label();
        let root: RootKey = self
            .root_key
            .parse()
            .map_err(|e| ConfigError::registry(&label, e))?;

        let mut dropped = Vec::new();
        let mut values = Vec::with_capacity(self.values.len());
        for value in &self.values {
            match value.value_type.parse::<ValueKind>() {
                Ok(kind) => values.push(ValueSpec {
                    name: value.name.clone(),
                    kind,
                    expect: value.expect_value.clone(),
                }),
                Err(e) => dropped.push(ConfigError::registry(format!("{}:{}", label, value.name), e)),
            }
        }

        let on_change = match self.command.as_deref() {
            Some(command) if self.execute_on_change && !command.is_empty() => Some(ChangeCommand {
                command: command.to_string(),
                args: self.args.clone(),
                work_dir: self.work_dir.clone(),
            }),
            _ => None,
        };

        Ok((
            RegistryTarget {
                name: label,
                root,
                path: self.path.clone(),
                check_interval: self.check_interval,
                values,
                on_change,
            },
            dropped,
        ))
    }
}

impl ProcessMonitorConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: ProcessMonitorConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    pub fn enabled_processes(&self) -> Vec<&ProcessTarget> {
        self.processes.iter().filter(|p| p.enable).collect()
    }

    pub fn enabled_registry_monitors(&self) -> Vec<&RegistryMonitorConfig> {
        self.registry_monitors.iter().filter(|r| r.enable).collect()
    }
}

fn default_check_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_startup_grace() -> Duration {
    Duration::from_secs(2)
}

fn default_enabled() -> bool {
    true
}

// Durations are written either as whole seconds (`5`) or with a unit
// suffix (`500ms`, `5s`, `1m`).
mod duration_serde {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Seconds(u64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawDuration::deserialize(deserializer)? {
            RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
            RawDuration::Text(s) => parse_duration(&s).map_err(serde::de::Error::custom),
        }
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let invalid = || format!("Invalid duration: {}", s);
        // "ms" before "s": "ms" also ends with 's'
        if let Some(num) = s.strip_suffix("ms") {
            num.trim().parse().map(Duration::from_millis).map_err(|_| invalid())
        } else if let Some(num) = s.strip_suffix('s') {
            num.trim().parse().map(Duration::from_secs).map_err(|_| invalid())
        } else if let Some(num) = s.strip_suffix('m') {
            num.trim()
                .parse::<u64>()
                .ok()
                .and_then(|mins| mins.checked_mul(60))
                .map(Duration::from_secs)
                .ok_or_else(invalid)
        } else {
            s.parse().map(Duration::from_secs).map_err(|_| {
                format!("Duration must be whole seconds or end with 's', 'ms', or 'm': {}", s)
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
processes:
  - name: test_app.exe
    args: ["--port", "8080"]
    ports: [8080]
    health_checks:
      - http://localhost:8080/health
    check_interval: 5
    restart_delay: 2
    kill_on_exit: true
    exclude_processes: [notepad.exe]
  - name: worker
    restart_command: ./worker-recover
    work_dir: /srv/worker
    check_interval: 500ms
    startup_grace: 0s
    enable: false
registry_monitors:
  - name: test
    root_key: HKCU
    path: SOFTWARE\TestRegistryMonitor
    check_interval: 1
    values:
      - name: testValue
        type: string
        expect_value: initial
      - name: Threshold
        type: DWORD
        expect_value: 90
      - name: Watched
        type: multi_string
    execute_on_change: true
    command: cmd.exe
    args: ["/c", "echo changed"]
"#;

    #[test]
    fn test_load_sample() {
        let config = ProcessMonitorConfig::load_from_string(SAMPLE).unwrap();
        assert_eq!(config.processes.len(), 2);

        let app = &config.processes[0];
        assert_eq!(app.name, "test_app.exe");
        assert_eq!(app.args, vec!["--port", "8080"]);
        assert_eq!(app.ports, vec![8080]);
        assert_eq!(app.check_interval, Duration::from_secs(5));
        assert_eq!(app.restart_delay, Duration::from_secs(2));
        assert_eq!(app.startup_grace, Duration::from_secs(2));
        assert!(app.kill_on_exit);
        assert!(app.enable);
        assert_eq!(app.restart_program(), "test_app.exe");

        let worker = &config.processes[1];
        assert_eq!(worker.check_interval, Duration::from_millis(500));
        assert_eq!(worker.startup_grace, Duration::ZERO);
        assert_eq!(worker.restart_program(), "./worker-recover");
        assert!(!worker.enable);

        assert_eq!(config.enabled_processes().len(), 1);
        assert_eq!(config.enabled_registry_monitors().len(), 1);
    }

    #[test]
    fn test_registry_monitor_to_target() {
        let config = ProcessMonitorConfig::load_from_string(SAMPLE).unwrap();
        let (target, dropped) = config.registry_monitors[0].to_target().unwrap();

        assert!(dropped.is_empty());
        assert_eq!(target.root, RootKey::CurrentUser);
        assert_eq!(target.path, "SOFTWARE\\TestRegistryMonitor");
        assert_eq!(target.check_interval, Duration::from_secs(1));
        assert_eq!(target.values.len(), 3);
        assert_eq!(target.values[0].expect, Some(ConfigValue::Text("initial".into())));
        assert_eq!(target.values[1].kind, ValueKind::Dword);
        assert_eq!(target.values[1].expect, Some(ConfigValue::Int(90)));
        assert_eq!(target.values[2].expect, None);

        let on_change = target.on_change.unwrap();
        assert_eq!(on_change.command, "cmd.exe");
        assert_eq!(on_change.args, vec!["/c", "echo changed"]);
    }

    #[test]
    fn test_bad_root_key_rejects_only_that_target() {
        let mut monitor = ProcessMonitorConfig::load_from_string(SAMPLE).unwrap().registry_monitors[0].clone();
        monitor.root_key = "HKEY_NOWHERE".to_string();
        let err = monitor.to_target().unwrap_err();
        assert!(err.to_string().contains("unknown root key"));
    }

    #[test]
    fn test_bad_value_type_drops_only_that_value() {
        let mut monitor = ProcessMonitorConfig::load_from_string(SAMPLE).unwrap().registry_monitors[0].clone();
        monitor.values[1].value_type = "REG_FANCY".to_string();
        monitor.execute_on_change = false;

        let (target, dropped) = monitor.to_target().unwrap();
        assert_eq!(target.values.len(), 2);
        assert_eq!(dropped.len(), 1);
        assert!(dropped[0].to_string().contains("Threshold"));
        assert!(target.on_change.is_none());
    }

    #[test]
    fn test_parse_duration() {
        use duration_serde::parse_duration;
        assert_eq!(parse_duration("100ms").unwrap(), Duration::from_millis(100));
        assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("7").unwrap(), Duration::from_secs(7));
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("-1s").is_err());
    }

    #[test]
    fn test_parse_duration_minutes_overflow() {
        use duration_serde::parse_duration;
        assert!(parse_duration(&format!("{}m", u64::MAX)).is_err());
        assert!(parse_duration(&format!("{}m", u64::MAX / 60 + 1)).is_err());
        assert_eq!(
            parse_duration(&format!("{}m", u64::MAX / 60)).unwrap(),
            Duration::from_secs(u64::MAX / 60 * 60)
        );

        let yaml = format!("processes:\n  - name: app\n    check_interval: {}m\n", u64::MAX);
        assert!(ProcessMonitorConfig::load_from_string(&yaml).is_err());
    }

    #[test]
    fn test_minimal_target_defaults() {
        let config = ProcessMonitorConfig::load_from_string("processes:\n  - name: app\n").unwrap();
        let app = &config.processes[0];
        assert_eq!(app, &ProcessTarget::new("app"));
        assert!(config.registry_monitors.is_empty());
    }
}

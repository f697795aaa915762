//! Registry drift enforcement.
//!
//! One [`RegistryEnforcer`] owns one key. It keeps the last observed value
//! of every watched name, notices when a value changes between polls,
//! writes the expected value back when one is configured, and optionally
//! launches a command describing what changed.

use crate::codec::{coerce, matches_expectation, set_registry_value};
use crate::hive::{KeyAccess, RegistryHive, RegistryKey};
use crate::kind::{RootKey, ValueKind};
use crate::value::{ConfigValue, RegistryValue};
use pmon_common::{RegistryError, RegistryResult};
use pmon_process::{launch_detached, LaunchSpec};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Comma-joined names of the values that changed in a cycle.
pub const CHANGED_VALUES_ENV: &str = "CHANGED_VALUES";
/// `"false"` when a cycle saw a value violating its expectation.
pub const EXPECT_VALUE_MATCH_ENV: &str = "EXPECT_VALUE_MATCH";

/// One watched value.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSpec {
    pub name: String,
    pub kind: ValueKind,
    /// `None` watches without enforcing.
    pub expect: Option<ConfigValue>,
}

/// Command launched after a cycle in which values changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeCommand {
    pub command: String,
    pub args: Vec<String>,
    pub work_dir: Option<PathBuf>,
}

/// A fully validated registry target.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryTarget {
    pub name: String,
    pub root: RootKey,
    pub path: String,
    pub check_interval: Duration,
    pub values: Vec<ValueSpec>,
    pub on_change: Option<ChangeCommand>,
}

impl RegistryTarget {
    pub fn display_path(&self) -> String {
        format!("{}\\{}", self.root, self.path)
    }
}

/// Retry schedule for restoring a drifted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestorePolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RestorePolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// How a restoration attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored { attempt: u32 },
    /// The regular attempts failed; the full-access fallback worked.
    RestoredWithFullAccess,
    Failed { last_error: RegistryError },
}

impl RestoreOutcome {
    pub fn is_restored(&self) -> bool {
        !matches!(self, RestoreOutcome::Failed { .. })
    }
}

/// What startup did with each watched value.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StartupReport {
    /// Values read and recorded as the baseline.
    pub seeded: Vec<String>,
    /// Missing values created from their expectation.
    pub bootstrapped: Vec<String>,
    /// Values left out of the baseline, with the reason.
    pub skipped: Vec<(String, String)>,
}

/// What one poll did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleReport {
    /// Values that changed this cycle, in detection order.
    pub changed: Vec<String>,
    /// A value violated its expectation when it was detected.
    pub expect_mismatch: bool,
    pub restorations: Vec<(String, RestoreOutcome)>,
    /// Values that had to be read again next cycle, with the reason.
    pub failures: Vec<(String, RegistryError)>,
    /// Command to launch for this cycle, if any.
    pub command: Option<LaunchSpec>,
}

impl CycleReport {
    pub fn expect_value_match(&self) -> bool {
        !self.expect_mismatch
    }
}

/// Last observed value per name. Replaced entry by entry on every read.
pub type ValueSnapshot = HashMap<String, RegistryValue>;

/// Watches and repairs the values of one registry key.
pub struct RegistryEnforcer {
    target: RegistryTarget,
    hive: Arc<dyn RegistryHive>,
    policy: RestorePolicy,
    snapshot: ValueSnapshot,
    /// Values whose last restoration failed; retried every poll.
    unresolved: HashSet<String>,
}

impl RegistryEnforcer {
    pub fn new(target: RegistryTarget, hive: Arc<dyn RegistryHive>) -> Self {
        Self {
            target,
            hive,
            policy: RestorePolicy::default(),
            snapshot: ValueSnapshot::new(),
            unresolved: HashSet::new(),
        }
    }

    pub fn with_restore_policy(mut self, policy: RestorePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn target(&self) -> &RegistryTarget {
        &self.target
    }

    pub fn snapshot(&self) -> &ValueSnapshot {
        &self.snapshot
    }

    fn open(&self, access: KeyAccess) -> RegistryResult<Box<dyn RegistryKey>> {
        self.hive.open(self.target.root, &self.target.path, access)
    }

    /// Record the baseline, creating missing values that have an expectation.
    ///
    /// Fails only when the key cannot be opened.
    pub fn start(&mut self) -> RegistryResult<StartupReport> {
        let key = self.open(KeyAccess::ReadWrite)?;
        let mut report = StartupReport::default();

        for spec in &self.target.values {
            match key.read(&spec.name) {
                Ok(value) if value.kind() == Some(spec.kind) => {
                    self.snapshot.insert(spec.name.clone(), value);
                    report.seeded.push(spec.name.clone());
                }
                Ok(value) => {
                    report.skipped.push((
                        spec.name.clone(),
                        format!("type mismatch: expected {}, got {}", spec.kind, value.kind_name()),
                    ));
                }
                Err(e) if e.is_not_found() => match spec.expect.as_ref() {
                    Some(expect) => match set_registry_value(key.as_ref(), &spec.name, spec.kind, expect) {
                        Ok(written) => {
                            self.snapshot.insert(spec.name.clone(), written);
                            report.bootstrapped.push(spec.name.clone());
                        }
                        Err(e) => report.skipped.push((spec.name.clone(), e.to_string())),
                    },
                    None => report.skipped.push((spec.name.clone(), e.to_string())),
                },
                Err(e) => report.skipped.push((spec.name.clone(), e.to_string())),
            }
        }

        Ok(report)
    }

    /// Run one detection and enforcement pass.
    ///
    /// Fails only when the key cannot be opened for reading at the start of
    /// the pass. A failed reopen mid-pass ends the scan but keeps the report.
    pub async fn poll(&mut self) -> RegistryResult<CycleReport> {
        let mut key = self.open(KeyAccess::Read)?;
        let mut report = CycleReport::default();
        let values = self.target.values.clone();

        for spec in &values {
            let observed = match key.read(&spec.name) {
                Ok(value) => value,
                Err(e) if e.is_not_found() && spec.expect.is_some() => {
                    drop(key);
                    self.recreate_missing(spec, &mut report);
                    match self.reopen(KeyAccess::Read, spec, &mut report) {
                        Some(reopened) => key = reopened,
                        None => break,
                    }
                    continue;
                }
                Err(e) => {
                    report.failures.push((spec.name.clone(), e));
                    continue;
                }
            };

            let type_mismatch = observed.kind() != Some(spec.kind);
            let value_mismatch = match self.snapshot.get(&spec.name) {
                Some(previous) => !matches_expectation(
                    previous,
                    Some(&observed.as_config_value()),
                    spec.kind,
                ),
                None => true,
            };
            let violates_expectation =
                type_mismatch || !matches_expectation(&observed, spec.expect.as_ref(), spec.kind);

            if type_mismatch || value_mismatch {
                debug!(
                    "Registry value {}\\{} changed: type_match={} value_match={} now={}",
                    self.target.display_path(),
                    spec.name,
                    !type_mismatch,
                    !value_mismatch,
                    observed
                );
                report.changed.push(spec.name.clone());
                self.snapshot.insert(spec.name.clone(), observed);
            }

            let Some(expect) = spec.expect.as_ref() else {
                continue;
            };
            let retry_unresolved = self.unresolved.contains(&spec.name) && violates_expectation;
            if !(type_mismatch || value_mismatch || retry_unresolved) {
                continue;
            }
            if violates_expectation {
                report.expect_mismatch = true;
            }

            drop(key);
            let outcome = self.restore(spec, expect).await;
            if outcome.is_restored() {
                self.unresolved.remove(&spec.name);
                if let Ok(value) = coerce(spec.kind, expect) {
                    self.snapshot.insert(spec.name.clone(), value);
                }
            } else {
                self.unresolved.insert(spec.name.clone());
            }
            report.restorations.push((spec.name.clone(), outcome));
            match self.reopen(KeyAccess::Poll, spec, &mut report) {
                Some(reopened) => key = reopened,
                None => break,
            }
        }

        if !report.changed.is_empty() {
            report.command = self.change_command(&report);
        }
        Ok(report)
    }

    fn reopen(&self, access: KeyAccess, spec: &ValueSpec, report: &mut CycleReport) -> Option<Box<dyn RegistryKey>> {
        match self.open(access) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(
                    "Failed to reopen {} after handling {}, skipping the rest of this cycle: {}",
                    self.target.display_path(),
                    spec.name,
                    e
                );
                report.failures.push((spec.name.clone(), e));
                None
            }
        }
    }

    fn recreate_missing(&mut self, spec: &ValueSpec, report: &mut CycleReport) {
        let Some(expect) = spec.expect.as_ref() else {
            return;
        };
        let written = self
            .open(KeyAccess::ReadWrite)
            .and_then(|key| set_registry_value(key.as_ref(), &spec.name, spec.kind, expect));
        match written {
            Ok(value) => {
                self.snapshot.insert(spec.name.clone(), value);
                self.unresolved.remove(&spec.name);
                report.changed.push(spec.name.clone());
            }
            Err(e) => report.failures.push((spec.name.clone(), e)),
        }
    }

    /// Write `expect` back, verifying by reading it again.
    async fn restore(&self, spec: &ValueSpec, expect: &ConfigValue) -> RestoreOutcome {
        let mut last_error = RegistryError::os(self.target.display_path(), "no restoration attempted");

        for attempt in 1..=self.policy.attempts {
            match self.write_and_verify(KeyAccess::ReadWrite, spec, expect) {
                Ok(()) => return RestoreOutcome::Restored { attempt },
                Err(e) => {
                    debug!("Restore attempt {} for {} failed: {}", attempt, spec.name, e);
                    last_error = e;
                }
            }
            tokio::time::sleep(self.policy.backoff).await;
        }

        match self.write_and_verify(KeyAccess::All, spec, expect) {
            Ok(()) => RestoreOutcome::RestoredWithFullAccess,
            Err(e) => {
                debug!("Full access restore for {} failed: {}", spec.name, e);
                RestoreOutcome::Failed { last_error }
            }
        }
    }

    fn write_and_verify(&self, access: KeyAccess, spec: &ValueSpec, expect: &ConfigValue) -> RegistryResult<()> {
        let key = self.open(access)?;
        set_registry_value(key.as_ref(), &spec.name, spec.kind, expect)?;
        let read_back = key.read(&spec.name)?;
        if read_back.kind() == Some(spec.kind) && matches_expectation(&read_back, Some(expect), spec.kind) {
            Ok(())
        } else {
            Err(RegistryError::os(
                self.target.display_path(),
                format!("{} still reads {} after restore", spec.name, read_back),
            ))
        }
    }

    fn change_command(&self, report: &CycleReport) -> Option<LaunchSpec> {
        let cmd = self.target.on_change.as_ref()?;
        Some(
            LaunchSpec::new(cmd.command.clone())
                .with_args(cmd.args.iter().cloned())
                .with_work_dir(cmd.work_dir.clone())
                .with_env(CHANGED_VALUES_ENV, report.changed.join(","))
                .with_env(EXPECT_VALUE_MATCH_ENV, report.expect_value_match().to_string()),
        )
    }

    /// Enforce until `cancel` fires. Cancellation is checked between polls.
    pub async fn run(mut self, cancel: CancellationToken) {
        let path = self.target.display_path();
        info!("Starting registry monitor for {}", path);

        match self.start() {
            Ok(report) => log_startup(&path, &report),
            Err(e) => {
                error!("Failed to open registry key {}: {}", path, e);
                return;
            }
        }

        let period = self.target.check_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Stopping registry monitor for {}", path);
                    return;
                }

                _ = ticker.tick() => {
                    match self.poll().await {
                        Ok(report) => {
                            log_cycle(&path, &report);
                            if let Some(spec) = report.command {
                                launch_change_command(&spec);
                            }
                        }
                        Err(e) => error!("Failed to open registry key {}: {}", path, e),
                    }
                }
            }
        }
    }
}

fn launch_change_command(spec: &LaunchSpec) {
    info!(
        "Executing command due to registry change: {} {:?} ({}={})",
        spec.program,
        spec.args,
        CHANGED_VALUES_ENV,
        spec.env_value(CHANGED_VALUES_ENV).unwrap_or_default()
    );
    if let Err(e) = launch_detached(spec) {
        error!("Failed to execute command: {}", e);
    }
}

fn log_startup(path: &str, report: &StartupReport) {
    for name in &report.seeded {
        debug!("Initial registry value recorded: {}\\{}", path, name);
    }
    for name in &report.bootstrapped {
        info!("Value {}\\{} did not exist, set expected value", path, name);
    }
    for (name, reason) in &report.skipped {
        warn!("Skipping initial value {}\\{}: {}", path, name, reason);
    }
}

fn log_cycle(path: &str, report: &CycleReport) {
    for (name, err) in &report.failures {
        warn!("Failed to read registry value {}\\{}: {}", path, name, err);
    }
    for (name, outcome) in &report.restorations {
        match outcome {
            RestoreOutcome::Restored { attempt } => {
                info!("Restored expected value for {}\\{} (attempt {})", path, name, attempt)
            }
            RestoreOutcome::RestoredWithFullAccess => {
                info!("Restored expected value for {}\\{} with full access", path, name)
            }
            RestoreOutcome::Failed { last_error } => error!(
                "Could not restore {}\\{}, will retry next poll: {}",
                path, name, last_error
            ),
        }
    }
    if !report.changed.is_empty() {
        warn!(
            "Registry values changed under {}: {} (expect_value_match={})",
            path,
            report.changed.join(","),
            report.expect_value_match()
        );
    }
}

//! Per-target process supervision.
//!
//! A [`ProcessSupervisor`] owns one [`ProcessTarget`] and at most one child
//! it spawned. It runs as its own task:
//!
//! 1. entry: adopt an already-running process by name, otherwise start it
//!    through the exclusion gate
//! 2. every `check_interval`: check liveness, then ports, then health URLs,
//!    stopping at the first failure and restarting
//! 3. on cancellation: kill the owned child when `kill_on_exit` is set
//!
//! A restart runs inline in the poll loop, so ticks that fall due while it
//! sleeps are skipped and restarts for one target never overlap.

mod types;


pub use types::{PollOutcome, RestartReason, ShutdownOutcome, StartOutcome, SupervisorState};

use crate::config::ProcessTarget;
use pmon_common::ProcessError;
use pmon_process::{ManagedChild, ProcessHost};
use std::sync::Arc;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct ProcessSupervisor {
    target: ProcessTarget,
    host: Arc<dyn ProcessHost>,
    child: Option<Box<dyn ManagedChild>>,
    state: SupervisorState,
    // Entry start was vetoed or failed; the next poll retries it.
    start_pending: bool,
}

impl ProcessSupervisor {
    pub fn new(target: ProcessTarget, host: Arc<dyn ProcessHost>) -> Self {
        Self {
            target,
            host,
            child: None,
            state: SupervisorState::Stopped,
            start_pending: false,
        }
    }

    pub fn target(&self) -> &ProcessTarget {
        &self.target
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn child_pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.pid())
    }

    /// Entry action: adopt a running instance or start one.
    pub async fn enter(&mut self) -> StartOutcome {
        if self.host.process_is_running(&self.target.name).await {
            self.start_pending = false;
            self.state = SupervisorState::Running;
            return StartOutcome::AlreadyRunning;
        }

        self.state = SupervisorState::Starting;
        let outcome = self.launch(&self.target.name.clone()).await;
        self.start_pending = !outcome.is_started();
        self.state = if outcome.is_started() {
            SupervisorState::Running
        } else {
            SupervisorState::Stopped
        };
        outcome
    }

    /// One supervision cycle.
    pub async fn poll(&mut self) -> PollOutcome {
        if self.state == SupervisorState::Restarting {
            return PollOutcome::Skipped;
        }
        if self.start_pending {
            return PollOutcome::DeferredStart(self.enter().await);
        }

        match self.check().await {
            None => PollOutcome::Healthy,
            Some(reason) => {
                let outcome = self.restart().await;
                PollOutcome::Restarted { reason, outcome }
            }
        }
    }

    // Liveness, then ports, then health URLs; first failure wins.
    async fn check(&mut self) -> Option<RestartReason> {
        let name = &self.target.name;
        match self.child.as_mut() {
            Some(child) => {
                if child.has_exited() {
                    return Some(RestartReason::Exited);
                }
                if !self.host.process_is_running(name).await {
                    return Some(RestartReason::Vanished);
                }
            }
            None => {
                if !self.host.process_is_running(name).await {
                    return Some(RestartReason::NotRunning);
                }
            }
        }

        for &port in &self.target.ports {
            if !self.host.port_in_use(port).await {
                return Some(RestartReason::PortClosed(port));
            }
        }

        for url in &self.target.health_checks {
            if !self.host.health_check_ok(url).await {
                return Some(RestartReason::HealthCheckFailed(url.clone()));
            }
        }

        None
    }

    /// Kill what is running, wait `restart_delay`, then start again with
    /// the restart command.
    pub async fn restart(&mut self) -> StartOutcome {
        self.state = SupervisorState::Restarting;

        if let Some(mut child) = self.child.take() {
            info!("Terminating current process {} (PID: {:?})", self.target.name, child.pid());
            if let Err(e) = child.kill_and_wait().await {
                warn!("Failed to terminate {}: {}", self.target.name, e);
            }
        }

        let swept = self.host.kill_by_name(&self.target.name).await;
        if !swept.is_empty() {
            debug!("Killed remaining {} processes: {:?}", self.target.name, swept);
        }

        if !self.target.restart_delay.is_zero() {
            debug!("Waiting {:?} before restarting {}", self.target.restart_delay, self.target.name);
            sleep(self.target.restart_delay).await;
        }

        let program = self.target.restart_program().to_string();
        let outcome = self.launch(&program).await;
        self.state = if outcome.is_started() {
            SupervisorState::Running
        } else {
            SupervisorState::Stopped
        };
        outcome
    }

    async fn launch(&mut self, program: &str) -> StartOutcome {
        let (excluded, found) = self.host.find_running(&self.target.exclude_processes).await;
        if excluded {
            return StartOutcome::NotStarted(ProcessError::excluded(&self.target.name, found));
        }

        let spec = self.target.launch_spec(program);
        match self.host.spawn(&spec) {
            Ok(child) => {
                let pid = child.pid();
                self.child = Some(child);
                if !self.target.startup_grace.is_zero() {
                    sleep(self.target.startup_grace).await;
                }
                StartOutcome::Started { pid }
            }
            Err(e) => StartOutcome::NotStarted(e),
        }
    }

    /// Exit action, run once when the supervision root stops.
    pub async fn shutdown(&mut self) -> ShutdownOutcome {
        self.state = SupervisorState::Stopped;
        self.start_pending = false;

        let Some(mut child) = self.child.take() else {
            return ShutdownOutcome::NoProcess;
        };
        let pid = child.pid();
        if !self.target.kill_on_exit {
            return ShutdownOutcome::LeftRunning { pid };
        }

        match child.kill_and_wait().await {
            Ok(()) => ShutdownOutcome::Killed { pid },
            Err(e) => ShutdownOutcome::KillFailed(e),
        }
    }

    /// Drive the target until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        let name = self.target.name.clone();

        info!("Starting initial process: {}", name);
        let outcome = self.enter().await;
        log_start(&name, &outcome);

        let period = self.target.check_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let outcome = self.poll().await;
                    log_poll(&name, &outcome);
                }
            }
        }

        match self.shutdown().await {
            ShutdownOutcome::Killed { pid } => info!("Killed {} (PID: {:?}) on exit", name, pid),
            ShutdownOutcome::KillFailed(e) => error!("Failed to kill {} on exit: {}", name, e),
            ShutdownOutcome::LeftRunning { pid } => debug!("Leaving {} (PID: {:?}) running", name, pid),
            ShutdownOutcome::NoProcess => {}
        }
        info!("Stopped monitoring process: {}", name);
    }
}

fn log_start(name: &str, outcome: &StartOutcome) {
    match outcome {
        StartOutcome::Started { pid } => info!("Started process {} (PID: {:?})", name, pid),
        StartOutcome::AlreadyRunning => info!("Process {} is already running", name),
        StartOutcome::NotStarted(e) if e.is_exclusion() => warn!("{}", e),
        StartOutcome::NotStarted(e) => error!("Failed to start process {}: {}", name, e),
    }
}

fn log_poll(name: &str, outcome: &PollOutcome) {
    match outcome {
        PollOutcome::Skipped => debug!("Restart of {} still in progress, skipping check", name),
        PollOutcome::Healthy => debug!("Process {} is healthy", name),
        PollOutcome::DeferredStart(outcome) => log_start(name, outcome),
        PollOutcome::Restarted { reason, outcome } => {
            warn!("Process {} needs restart: {}", name, reason);
            match outcome {
                StartOutcome::Started { pid } => info!("Restarted process {} (PID: {:?})", name, pid),
                StartOutcome::NotStarted(e) if e.is_exclusion() => warn!("{}", e),
                StartOutcome::NotStarted(e) => error!("Failed to restart process {}: {}", name, e),
                StartOutcome::AlreadyRunning => {}
            }
        }
    }
}

//! # Daemon and Timer Launcher
//!
//! Every entry under `daemons:` and `timers:` in the configuration gets one
//! detached background thread, started once alongside the HTTP listener.
//!
//! The launcher only starts tasks. It does not supervise, restart or join
//! them and shares no state with request sessions; what a task does when it
//! fails belongs to the [`BackgroundRunner`]. Graceful shutdown is not
//! provided here; layer a supervisor around the runner if it is needed.

use crate::config::{Config, DaemonConfig, TimerConfig};
use crate::params::{global_params, substitute, ParamStore};
use std::io;
use std::process::{Command, ExitStatus};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// Business logic behind daemons and timers.
///
/// Both entry points are expected to run for the lifetime of the process.
pub trait BackgroundRunner: Send + Sync {
    fn run_daemon(&self, name: &str, config: &DaemonConfig);
    fn run_timer(&self, name: &str, config: &TimerConfig);
}

/// Start one thread per configured daemon. Returns how many were started.
pub fn start_daemons(config: &Config, runner: &Arc<dyn BackgroundRunner>) -> io::Result<usize> {
    for (name, daemon) in &config.daemons {
        let runner = Arc::clone(runner);
        let (name, daemon) = (name.clone(), daemon.clone());
        thread::Builder::new()
            .name(format!("daemon-{name}"))
            .spawn(move || runner.run_daemon(&name, &daemon))?;
    }
    info!(count = config.daemons.len(), "daemons started");
    Ok(config.daemons.len())
}

/// Start one thread per configured timer. Returns how many were started.
pub fn start_timers(config: &Config, runner: &Arc<dyn BackgroundRunner>) -> io::Result<usize> {
    for (name, timer) in &config.timers {
        let runner = Arc::clone(runner);
        let (name, timer) = (name.clone(), timer.clone());
        thread::Builder::new()
            .name(format!("timer-{name}"))
            .spawn(move || runner.run_timer(&name, &timer))?;
    }
    info!(count = config.timers.len(), "timers started");
    Ok(config.timers.len())
}

/// Default runner: executes the configured shell code.
///
/// A daemon is run with `sh -c`, and started again `retry_delay_secs` after
/// every exit. A timer runs its code once per `interval_secs`. Placeholders in
/// the code resolve against the global parameter store only.
pub struct CommandRunner {
    params: Arc<dyn ParamStore>,
}

impl CommandRunner {
    pub fn new(params: Arc<dyn ParamStore>) -> Self {
        Self { params }
    }

    /// Resolve placeholders in `code` and run it to completion.
    pub fn run_once(&self, code: &str) -> io::Result<ExitStatus> {
        let code = substitute(code, global_params(self.params.as_ref()));
        Command::new("sh").arg("-c").arg(&code).status()
    }
}

impl BackgroundRunner for CommandRunner {
    fn run_daemon(&self, name: &str, config: &DaemonConfig) {
        loop {
            info!(daemon = %name, "daemon starting");
            match self.run_once(&config.code) {
                Ok(status) => warn!(daemon = %name, %status, "daemon exited"),
                Err(e) => error!(daemon = %name, error = %e, "daemon failed to start"),
            }
            thread::sleep(Duration::from_secs(config.retry_delay_secs));
        }
    }

    fn run_timer(&self, name: &str, config: &TimerConfig) {
        let interval = Duration::from_secs(config.interval_secs);
        loop {
            thread::sleep(interval);
            match self.run_once(&config.code) {
                Ok(status) if status.success() => info!(timer = %name, "timer run finished"),
                Ok(status) => warn!(timer = %name, %status, "timer run failed"),
                Err(e) => error!(timer = %name, error = %e, "timer failed to start"),
            }
        }
    }
}

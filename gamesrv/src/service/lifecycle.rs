//! Start, stop and restart of one service.
//!
//! State is always read back from the [`Supervisor`]. The controller only
//! remembers which transition it asked for, so that a transition nobody
//! here requested can be logged as external.
//!
//! ```text
//! Stopped -> Starting -> Running -> Stopping -> Stopped
//!               |           |
//!               +-> Failed <+
//! ```

use std::{
    cell::Cell,
    rc::Rc,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

use super::{ConsoleError, RemoteConsole, ServiceState, Supervisor};
use crate::{
    clock::Clock,
    manager::{LifecycleConfig, RconConfig},
    utils::{format_elapsed, format_memory},
};

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("game failed to start, ExecMainStatus: {status}\n{logs}")]
    ProcessCrashed { status: i32, logs: String },

    #[error("game failed to start, no PID found\n{logs}")]
    NoProcess { logs: String },

    /// The process kept running but never became ready. It is left running.
    #[error("game did not become ready after {attempts} checks, it is still running")]
    StartTimeout { attempts: u32 },

    #[error(transparent)]
    Supervisor(#[from] anyhow::Error),
}

/// Result of a lifecycle request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// Refused because the service was in this state.
    Rejected(ServiceState),
    /// The start wait was interrupted; the process keeps running.
    Abandoned,
}

/// Notifications around lifecycle transitions.
pub trait LifecycleHooks {
    fn on_started(&self, _unit: &str) {}

    fn on_stopping(&self, _unit: &str) {}
}

/// Hooks that do nothing.
pub struct NoHooks;

impl LifecycleHooks for NoHooks {}

/// Console commands the controller issues.
#[derive(Debug, Clone)]
pub struct ConsoleCommands {
    pub list: String,
    pub empty_reply: String,
    pub save: String,
    pub broadcast: String,
}

impl From<&RconConfig> for ConsoleCommands {
    fn from(config: &RconConfig) -> Self {
        Self {
            list: config.list_command.clone(),
            empty_reply: config.empty_reply.clone(),
            save: config.save_command.clone(),
            broadcast: config.broadcast_command.clone(),
        }
    }
}

impl Default for ConsoleCommands {
    fn default() -> Self {
        Self::from(&RconConfig::default())
    }
}

/// One resolved shutdown warning.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub message: String,
    pub wait: Duration,
}

/// Lifecycle controller of one service.
pub struct Lifecycle {
    unit: String,
    supervisor: Rc<dyn Supervisor>,
    clock: Rc<dyn Clock>,
    console: Option<Rc<dyn RemoteConsole>>,
    commands: ConsoleCommands,
    config: LifecycleConfig,
    warnings: Vec<Warning>,
    hooks: Rc<dyn LifecycleHooks>,
    interrupt: Arc<AtomicBool>,
    intent: Cell<Option<ServiceState>>,
}

impl Lifecycle {
    /// A controller without a console; warnings use their fallback texts.
    pub fn new(
        unit: &str,
        supervisor: Rc<dyn Supervisor>,
        clock: Rc<dyn Clock>,
        config: LifecycleConfig,
    ) -> Self {
        let warnings = config
            .warnings
            .iter()
            .map(|w| Warning {
                message: w.fallback.clone(),
                wait: Duration::from_secs(w.wait_secs),
            })
            .collect();
        Self {
            unit: unit.to_string(),
            supervisor,
            clock,
            console: None,
            commands: ConsoleCommands::default(),
            config,
            warnings,
            hooks: Rc::new(NoHooks),
            interrupt: Arc::new(AtomicBool::new(false)),
            intent: Cell::new(None),
        }
    }

    pub fn with_console(mut self, console: Rc<dyn RemoteConsole>, commands: ConsoleCommands) -> Self {
        self.console = Some(console);
        self.commands = commands;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<Warning>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_hooks(mut self, hooks: Rc<dyn LifecycleHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Flag raised by the interrupt handler; checked between polls.
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn has_console(&self) -> bool {
        self.console.is_some()
    }

    /// Current state, queried live.
    pub fn state(&self) -> anyhow::Result<ServiceState> {
        let state = self.supervisor.state(&self.unit)?;
        match self.intent.get() {
            Some(expected) if expected == state => {
                debug!("{} reached {state} as requested", self.unit);
                self.intent.set(None);
            }
            Some(_) => {}
            None if matches!(state, ServiceState::Starting | ServiceState::Stopping) => {
                info!("{} is {state}, not requested by this process", self.unit);
            }
            None => {}
        }
        Ok(state)
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Relaxed)
    }

    fn recent_logs(&self) -> String {
        self.supervisor
            .logs(&self.unit, self.config.log_lines)
            .unwrap_or_else(|e| format!("(logs unavailable: {e})"))
    }

    /// Asks the console for the player list regardless of service state.
    fn query_players(&self) -> Result<u32, ConsoleError> {
        let console = self
            .console
            .as_ref()
            .ok_or_else(|| ConsoleError::Unavailable("not configured".to_string()))?;
        let reply = console.run(&self.commands.list)?;
        let reply = reply.trim();
        if reply.is_empty() || reply == self.commands.empty_reply {
            return Ok(0);
        }
        Ok(reply.lines().filter(|l| !l.trim().is_empty()).count() as u32)
    }

    /// Connected players, `None` when unknown.
    pub fn player_count(&self) -> Option<u32> {
        self.console.as_ref()?;
        if !self.state().ok()?.is_up() {
            return None;
        }
        self.query_players().ok()
    }

    /// Runs a console command, logging instead of failing.
    fn console_run(&self, command: &str) -> Option<String> {
        let console = self.console.as_ref()?;
        match console.run(command) {
            Ok(reply) => Some(reply),
            Err(e) => {
                warn!("`{command}` failed: {e}");
                None
            }
        }
    }

    /// Starts the service and waits until it is ready.
    ///
    /// Readiness is an answer from the console, or the grace period when
    /// there is no console. Interrupting the wait leaves the process running.
    pub fn start(&self) -> Result<Outcome, LifecycleError> {
        let state = self.state()?;
        if state.is_up() {
            println!("{}", format!("{} is already {state}", self.unit).yellow());
            return Ok(Outcome::Rejected(state));
        }

        println!("Starting {} via systemd, please wait a minute...", self.unit);
        let started = self.clock.now();
        self.intent.set(Some(ServiceState::Running));
        self.supervisor.start(&self.unit)?;
        self.clock.sleep(self.config.initial_delay());

        let spinner = spinner();
        let result = self.wait_ready(started, &spinner);
        spinner.finish_and_clear();
        if !matches!(result, Ok(Outcome::Done)) {
            self.intent.set(None);
        }
        result
    }

    fn wait_ready(&self, started: Duration, spinner: &ProgressBar) -> Result<Outcome, LifecycleError> {
        for _ in 0..self.config.max_polls {
            if self.interrupted() {
                println!(
                    "{}",
                    "Cancelled startup wait check, the game is probably still starting".yellow()
                );
                return Ok(Outcome::Abandoned);
            }

            let pid = self.supervisor.main_pid(&self.unit)?;
            let status = self.supervisor.exit_status(&self.unit)?;
            if status != 0 {
                return Err(LifecycleError::ProcessCrashed {
                    status,
                    logs: self.recent_logs(),
                });
            }
            if pid == 0 {
                return Err(LifecycleError::NoProcess {
                    logs: self.recent_logs(),
                });
            }

            let elapsed = self.clock.now().saturating_sub(started);
            let (ready, api) = match self.console {
                Some(_) => match self.query_players() {
                    Ok(_) => (true, "CONNECTED"),
                    Err(ConsoleError::AuthFailure) => (true, "password rejected"),
                    Err(ConsoleError::Unavailable(_)) => (false, "waiting"),
                },
                None => (elapsed >= self.config.grace_period(), "not enabled"),
            };

            let usage = self.supervisor.usage(pid).unwrap_or_default();
            spinner.set_message(format!(
                "Time: {}, PID: {pid}, CPU: {:.0}%, Memory: {}, API: {api}",
                format_elapsed(elapsed),
                usage.cpu_percent,
                format_memory(usage.memory_bytes),
            ));
            spinner.tick();

            if ready {
                println!("{}", format!("{} has started successfully!", self.unit).green());
                self.hooks.on_started(&self.unit);
                return Ok(Outcome::Done);
            }
            self.clock.sleep(self.config.poll_interval());
        }
        Err(LifecycleError::StartTimeout {
            attempts: self.config.max_polls,
        })
    }

    /// Warns connected players, then saves the world. Does not stop.
    ///
    /// Each stage first re-counts players. Nobody online skips to the save;
    /// an unreachable console skips the save as well. Returns whether a
    /// save was issued.
    pub fn pre_stop(&self) -> bool {
        if self.console.is_none() {
            return false;
        }
        for warning in &self.warnings {
            match self.query_players() {
                Ok(0) => break,
                Ok(n) => {
                    println!("{n} players online, sending warning: {}", warning.message);
                    self.console_run(&format!("{} {}", self.commands.broadcast, warning.message));
                    if !warning.wait.is_zero() {
                        self.clock.sleep(warning.wait);
                    }
                }
                Err(e) => {
                    warn!("{e}, skipping shutdown warnings and save");
                    return false;
                }
            }
        }

        println!("Saving world...");
        self.console_run(&self.commands.save);
        self.clock.sleep(self.config.save_flush());
        true
    }

    /// Warns players, saves and stops the service.
    pub fn stop(&self) -> Result<Outcome, LifecycleError> {
        let state = self.state()?;
        if matches!(state, ServiceState::Stopped | ServiceState::Failed) {
            println!("{}", format!("{} is not running", self.unit).yellow());
            return Ok(Outcome::Rejected(state));
        }

        println!("Stopping {}, please wait...", self.unit);
        self.intent.set(Some(ServiceState::Stopped));
        self.hooks.on_stopping(&self.unit);
        self.pre_stop();
        self.supervisor.stop(&self.unit)?;
        self.clock.sleep(self.config.stop_settle());
        Ok(Outcome::Done)
    }

    /// Graceful stop followed by a start; only from `Running`.
    pub fn restart(&self) -> Result<Outcome, LifecycleError> {
        let state = self.state()?;
        if state != ServiceState::Running {
            println!("{}", format!("{} is not currently running", self.unit).yellow());
            return Ok(Outcome::Rejected(state));
        }
        self.stop()?;
        self.start()
    }

    /// Waits for the console to answer after an external start.
    ///
    /// Returns `true` right away when there is no console.
    pub fn post_start(&self) -> bool {
        if self.console.is_none() {
            return true;
        }
        println!("Waiting for API to become available...");
        for _ in 0..self.config.post_start_polls {
            if self.interrupted() {
                return false;
            }
            match self.query_players() {
                Ok(_) | Err(ConsoleError::AuthFailure) => {
                    self.hooks.on_started(&self.unit);
                    return true;
                }
                Err(ConsoleError::Unavailable(_)) => println!("API not available yet"),
            }
            self.clock.sleep(self.config.post_start_interval());
        }
        println!("{}", "API did not reply within the allowed time!".red());
        false
    }
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb
}

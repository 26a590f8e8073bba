//! Common utilities and helper functions.
//!
//! Command execution for the supervisor adapter plus the formatting helpers
//! used by status output.

use std::{
    ffi::OsStr,
    ops::{Deref, DerefMut},
    time::Duration,
};

use anyhow::{Context, bail};
use byte_unit::{Byte, UnitType};
use colored::Colorize;

/// A command builder that echoes what it runs.
///
/// `Command` wraps `std::process::Command`. [`Command::run`] prints the
/// command line before running it; [`Command::output_text`] is for queries
/// whose output is parsed and is only logged at debug level.
pub struct Command {
    inner: std::process::Command,
}

impl Deref for Command {
    type Target = std::process::Command;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for Command {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl Command {
    /// Creates a new command builder.
    pub fn new<S>(program: S) -> Command
    where
        S: AsRef<OsStr>,
    {
        Self {
            inner: std::process::Command::new(program),
        }
    }

    fn cmd_line(&self) -> String {
        let mut cmd_str = self.get_program().to_string_lossy().to_string();
        for arg in self.get_args() {
            cmd_str += " ";
            cmd_str += arg.to_string_lossy().as_ref();
        }
        cmd_str
    }

    /// Prints the command to stdout with colored formatting.
    pub fn print_cmd(&self) {
        println!("{}", self.cmd_line().purple().bold());
    }

    /// Executes the command and waits for it to complete.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails to execute or exits with non-zero status.
    pub fn run(&mut self) -> anyhow::Result<()> {
        self.print_cmd();
        let status = self
            .status()
            .with_context(|| format!("failed to run `{}`", self.cmd_line()))?;
        if !status.success() {
            bail!("`{}` failed with status: {status}", self.cmd_line());
        }
        Ok(())
    }

    /// Executes the command and returns its trimmed stdout.
    ///
    /// The exit status is ignored; tools such as `systemctl is-active`
    /// report their answer through a non-zero status.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be started.
    pub fn output_text(&mut self) -> anyhow::Result<String> {
        let line = self.cmd_line();
        debug!("$ {line}");
        let output = self
            .output()
            .with_context(|| format!("failed to run `{line}`"))?;
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        trace!("{line} -> {text}");
        Ok(text)
    }

    /// Adds an argument to the command.
    pub fn arg<S>(&mut self, arg: S) -> &mut Command
    where
        S: AsRef<OsStr>,
    {
        self.inner.arg(arg);
        self
    }

    /// Adds multiple arguments to the command.
    pub fn args<I, S>(&mut self, args: I) -> &mut Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.arg(arg.as_ref());
        }
        self
    }
}

/// Whether the process runs with root privileges.
pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Bails unless running as root.
///
/// # Errors
///
/// Returns an error naming `action` when not root.
pub fn require_root(action: &str) -> anyhow::Result<()> {
    if !is_root() {
        bail!("{action} requires sudo / root privileges");
    }
    Ok(())
}

/// Formats an elapsed time as `m:ss`, or `h:mm:ss` past one hour.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (h, m, s) = (secs / 3600, secs % 3600 / 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

/// Formats a byte count with a binary unit, e.g. `1.50 GiB`.
pub fn format_memory(bytes: u64) -> String {
    let adjusted = Byte::from_u64(bytes).get_appropriate_unit(UnitType::Binary);
    format!("{adjusted:.2}")
}

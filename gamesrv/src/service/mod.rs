//! Game services and their lifecycle.
//!
//! - [`supervisor`] - OS supervisor queries and commands
//! - [`console`] - Remote console access
//! - [`lifecycle`] - Start, stop and restart state machine

use std::{
    fmt::{self, Display},
    fs,
    path::Path,
};

use anyhow::Context;
use confstore::{CommandLineStore, OptionSet};
use regex::Regex;
use serde::Serialize;

use crate::manager::ServicesConfig;

/// Remote console access.
pub mod console;

/// Start, stop and restart state machine.
pub mod lifecycle;

/// OS supervisor adapter.
pub mod supervisor;

pub use console::{ConsoleError, RconConsole, RemoteConsole};
pub use lifecycle::{Lifecycle, LifecycleError, LifecycleHooks, Outcome};
pub use supervisor::{ResourceUsage, Supervisor, Systemd};

/// State of a service as reported by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl ServiceState {
    /// Maps the output of `systemctl is-active`.
    pub fn from_active(text: &str) -> Self {
        match text.trim() {
            "active" | "reloading" => Self::Running,
            "activating" => Self::Starting,
            "deactivating" => Self::Stopping,
            "failed" => Self::Failed,
            _ => Self::Stopped,
        }
    }

    /// Running or on its way there.
    pub fn is_up(self) -> bool {
        matches!(self, Self::Running | Self::Starting)
    }
}

impl Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One service definition found on disk.
#[derive(Debug)]
pub struct Service {
    name: String,
    unit: String,
    cli: CommandLineStore,
}

impl Service {
    pub fn new(name: &str, unit: &str, cli: CommandLineStore) -> Self {
        Self {
            name: name.to_string(),
            unit: unit.to_string(),
            cli,
        }
    }

    /// Identifier, the definition file's stem.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Supervisor unit name.
    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn cli(&self) -> &CommandLineStore {
        &self.cli
    }

    pub fn cli_mut(&mut self) -> &mut CommandLineStore {
        &mut self.cli
    }

    /// Instance label captured from the launch line, e.g. the map.
    ///
    /// Empty until the launch line has been loaded.
    pub fn instance(&self) -> &str {
        self.cli.capture("instance").unwrap_or_default()
    }
}

/// Finds every service definition under `base`/`config.dir`.
///
/// A missing directory yields no services. Services are sorted by name.
pub fn discover(base: &Path, config: &ServicesConfig, options: &OptionSet) -> anyhow::Result<Vec<Service>> {
    let dir = base.join(&config.dir);
    if !dir.is_dir() {
        warn!("service directory {} not found", dir.display());
        return Ok(Vec::new());
    }
    let pattern = Regex::new(&config.exec_pattern)
        .with_context(|| format!("invalid exec_pattern `{}`", config.exec_pattern))?;

    let mut services = Vec::new();
    for entry in fs::read_dir(&dir).with_context(|| format!("can not read {}", dir.display()))? {
        let path = entry?.path();
        if !path.is_file() || path.extension().is_none_or(|e| e != config.extension.as_str()) {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let unit = format!("{name}{}", config.unit_suffix);
        debug!("found service {name} ({})", path.display());
        let cli = CommandLineStore::new(
            options.clone(),
            &path,
            pattern.clone(),
            config.flag_separator.into(),
        );
        services.push(Service::new(name, &unit, cli));
    }
    services.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(services)
}

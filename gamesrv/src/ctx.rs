//! Application context and state management.
//!
//! [`AppContext`] owns the global config stores, the discovered services and
//! the collaborators shared by every lifecycle controller. Options are found
//! by name: a service's launch line store is asked first, then each global
//! store in configuration order. Option names must be unique across all of
//! them.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    rc::Rc,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyhow::Context;
use colored::Colorize;
use confstore::{
    ConfigError, ConfigStore, KeyFileStore, OptionSet, Registry, UnrealStore, Value, ValueType,
};
use serde::Serialize;

use crate::{
    clock::{Clock, SystemClock},
    manager::{ManagerConfig, StoreKind},
    mods::ModLibrary,
    service::{
        self, Lifecycle, LifecycleHooks, Outcome, RconConsole, Service,
        ServiceState, Supervisor, Systemd,
        lifecycle::{ConsoleCommands, Warning},
    },
    utils::{format_memory, is_root},
};

/// Service selector meaning every discovered service.
pub const ALL: &str = "ALL";

/// An effective option change, passed to every [`OptionObserver`].
#[derive(Debug, Clone, PartialEq)]
pub struct OptionChange {
    /// Service whose launch line changed, `None` for global options.
    pub service: Option<String>,
    pub group: String,
    pub name: String,
    pub old: Value,
    pub new: Value,
}

/// Reacts to option changes that were saved.
///
/// Called exactly once per effective change and never for no-op sets.
pub trait OptionObserver {
    fn option_value_updated(&self, change: &OptionChange);
}

/// Reloads unit definitions after launch line edits and flags port changes.
struct ReloadObserver {
    supervisor: Rc<dyn Supervisor>,
}

impl OptionObserver for ReloadObserver {
    fn option_value_updated(&self, change: &OptionChange) {
        if change.service.is_some() {
            if is_root() {
                if let Err(e) = self.supervisor.reload() {
                    warn!("daemon-reload failed: {e:#}");
                }
            } else {
                println!(
                    "{}",
                    "WARNING: run `sudo systemctl daemon-reload` to apply changes to the service"
                        .yellow()
                );
            }
        }
        if change.name.ends_with("Port") {
            warn!(
                "`{}` changed from {} to {}, update firewall rules to match",
                change.name, change.old, change.new
            );
        }
    }
}

/// Logs lifecycle transitions of one service.
struct NoticeHooks {
    label: String,
}

impl LifecycleHooks for NoticeHooks {
    fn on_started(&self, unit: &str) {
        info!("{unit} ({}) started", self.label);
    }

    fn on_stopping(&self, unit: &str) {
        info!("{unit} ({}) stopping", self.label);
    }
}

/// One row of `--get-services`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServiceStatus {
    pub service: String,
    pub instance: String,
    pub status: ServiceState,
    pub enabled: bool,
    pub player_count: Option<u32>,
    pub max_players: u32,
    pub memory_usage: Option<String>,
    pub cpu_usage: Option<String>,
    pub pid: u32,
    pub mods: Vec<String>,
}

impl ServiceStatus {
    /// One line for `--monitor`.
    pub fn summary(&self) -> String {
        let players = match self.player_count {
            Some(n) => format!("{n}/{}", self.max_players),
            None => "-".to_string(),
        };
        format!(
            "{}: {}, PID: {}, CPU: {}, Memory: {}, Players: {players}",
            self.service,
            self.status,
            self.pid,
            self.cpu_usage.as_deref().unwrap_or("-"),
            self.memory_usage.as_deref().unwrap_or("-"),
        )
    }
}

/// One row of `--get-configs`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OptionReport {
    pub option: String,
    pub default: Value,
    pub value: Value,
    #[serde(rename = "type")]
    pub kind: ValueType,
    pub help: String,
    pub choices: Option<Vec<String>>,
}

/// One row of `--get-ports`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PortReport {
    pub service: Option<String>,
    pub option: String,
    pub value: Value,
}

#[derive(Clone, Copy)]
enum Slot {
    Global(usize),
    Cli(usize),
}

/// The main application context holding all state.
pub struct AppContext {
    config: ManagerConfig,
    base: PathBuf,
    stores: Vec<Box<dyn ConfigStore>>,
    services: Vec<Service>,
    supervisor: Rc<dyn Supervisor>,
    clock: Rc<dyn Clock>,
    mods: Option<ModLibrary>,
    interrupt: Arc<AtomicBool>,
    observers: Vec<Box<dyn OptionObserver>>,
}

impl AppContext {
    /// Loads the manager config at `path` and everything it points to.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config = ManagerConfig::load(path)?;
        let base = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let registry = Registry::load(&base.join(&config.schema))?;
        Self::new(
            config,
            &base,
            &registry,
            Rc::new(Systemd),
            Rc::new(SystemClock::new()),
        )
    }

    /// Builds a context over explicit collaborators.
    ///
    /// # Errors
    ///
    /// Fails when two stores declare the same option name, or when services
    /// can not be discovered.
    pub fn new(
        config: ManagerConfig,
        base: &Path,
        registry: &Registry,
        supervisor: Rc<dyn Supervisor>,
        clock: Rc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let mut sets = Vec::new();
        let mut stores: Vec<Box<dyn ConfigStore>> = Vec::new();
        for sc in &config.stores {
            let options = registry.group(&sc.group)?;
            let path = base.join(&sc.path);
            sets.push(options.clone());
            let store: Box<dyn ConfigStore> = match sc.kind {
                StoreKind::Unreal => Box::new(UnrealStore::new(options, &path)),
                StoreKind::Keyfile => Box::new(KeyFileStore::new(options, &path)),
            };
            stores.push(store);
        }
        let cli = registry.group(&config.services.cli_group)?;
        sets.push(cli.clone());
        check_unique(&sets)?;

        let services = service::discover(base, &config.services, &cli)?;
        let mods = config.mod_library.as_ref().map(|p| {
            ModLibrary::new(
                &base.join(p),
                clock.clone(),
                Duration::from_secs(config.mod_cache_secs),
            )
        });
        debug!(
            "{}: {} stores, {} services",
            config.name,
            stores.len(),
            services.len()
        );

        Ok(Self {
            observers: vec![Box::new(ReloadObserver {
                supervisor: supervisor.clone(),
            })],
            config,
            base: base.to_path_buf(),
            stores,
            services,
            supervisor,
            clock,
            mods,
            interrupt: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// Raised by the interrupt handler to end waits and the monitor.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    pub fn add_observer(&mut self, observer: Box<dyn OptionObserver>) {
        self.observers.push(observer);
    }

    /// Index of the service called `name`.
    pub fn service_index(&self, name: &str) -> anyhow::Result<usize> {
        self.services
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| anyhow!("service `{name}` not found"))
    }

    /// Services addressed by `selector`, a name or [`ALL`].
    pub fn targets(&self, selector: &str) -> anyhow::Result<Vec<usize>> {
        if selector == ALL {
            return Ok((0..self.services.len()).collect());
        }
        Ok(vec![self.service_index(selector)?])
    }

    /// The one service addressed by `selector`.
    pub fn single(&self, selector: &str) -> anyhow::Result<usize> {
        if selector == ALL {
            return match self.services.len() {
                1 => Ok(0),
                0 => bail!("no services found"),
                _ => bail!("this action needs a single service, pick one with --service"),
            };
        }
        self.service_index(selector)
    }

    fn locate(&self, service: Option<usize>, name: &str) -> Option<Slot> {
        if let Some(i) = service
            && self.services[i].cli().contains(name)
        {
            return Some(Slot::Cli(i));
        }
        self.stores
            .iter()
            .position(|s| s.contains(name))
            .map(Slot::Global)
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut dyn ConfigStore {
        match slot {
            Slot::Global(i) => self.stores[i].as_mut(),
            Slot::Cli(i) => self.services[i].cli_mut(),
        }
    }

    fn scope_name(&self, service: Option<usize>) -> String {
        service.map_or_else(|| "global".to_string(), |i| self.services[i].name().to_string())
    }

    /// Typed value of `name`, or `None` when it is not registered.
    ///
    /// Load failures are logged and the default is returned.
    fn option(&mut self, service: Option<usize>, name: &str) -> Option<Value> {
        let slot = self.locate(service, name)?;
        let store = self.slot_mut(slot);
        if let Err(e) = store.ensure_loaded() {
            error!("{e}");
        }
        match store.get_value(name) {
            Ok(v) => Some(v),
            Err(e) => {
                error!("{e}");
                None
            }
        }
    }

    fn option_is_set(&mut self, service: Option<usize>, name: &str) -> bool {
        self.option(service, name).is_some_and(|v| !v.is_unset())
    }

    /// Text value of `name`, empty when the option is unknown.
    pub fn get_option_value(&mut self, service: Option<&str>, name: &str) -> String {
        let service = match service.map(|s| self.service_index(s)).transpose() {
            Ok(s) => s,
            Err(e) => {
                error!("{e}");
                return String::new();
            }
        };
        if self.locate(service, name).is_none() {
            let err = ConfigError::UnknownOption {
                group: self.scope_name(service),
                name: name.to_string(),
            };
            error!("{err}");
            return String::new();
        }
        self.option(service, name)
            .map(|v| v.to_text())
            .unwrap_or_default()
    }

    /// Parses `text` for option `name`, saves it and notifies observers.
    ///
    /// Returns whether the value changed. A store whose file is missing
    /// is skipped with a warning.
    ///
    /// # Errors
    ///
    /// Unknown options, values that do not convert, and failed saves.
    pub fn set_option(&mut self, service: Option<&str>, name: &str, text: &str) -> anyhow::Result<bool> {
        let service = service.map(|s| self.service_index(s)).transpose()?;
        let slot = self
            .locate(service, name)
            .ok_or_else(|| ConfigError::UnknownOption {
                group: self.scope_name(service),
                name: name.to_string(),
            })?;

        let service_name = service.map(|i| self.services[i].name().to_string());

        let store = self.slot_mut(slot);
        store.ensure_loaded()?;
        let value = Value::parse(name, text, store.get_type(name)?)?;
        let old = store.get_value(name)?;
        match store.set_value(name, &value) {
            Ok(true) => {}
            Ok(false) => {
                debug!("`{name}` already {value}");
                return Ok(false);
            }
            Err(ConfigError::StoreUnavailable { path }) => {
                warn!("{} does not exist, `{name}` not changed", path.display());
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }
        store.save()?;
        let change = OptionChange {
            service: service_name,
            group: store.group().to_string(),
            name: name.to_string(),
            new: store.get_value(name)?,
            old,
        };
        info!("{} = {}", change.name, change.new);

        for observer in &self.observers {
            observer.option_value_updated(&change);
        }
        Ok(true)
    }

    fn reports(store: &dyn ConfigStore) -> Vec<OptionReport> {
        store
            .options()
            .iter()
            .map(|opt| OptionReport {
                option: opt.name.clone(),
                default: opt.default_value().unwrap_or_else(|_| Value::unset()),
                value: store.get_value(&opt.name).unwrap_or_else(|e| {
                    error!("{e}");
                    Value::unset()
                }),
                kind: opt.kind,
                help: opt.help.clone(),
                choices: opt.choices.clone(),
            })
            .collect()
    }

    fn load_all(&mut self) {
        for store in self.stores.iter_mut() {
            if let Err(e) = store.ensure_loaded() {
                error!("{e}");
            }
        }
        for service in self.services.iter_mut() {
            if let Err(e) = service.cli_mut().ensure_loaded() {
                error!("{e}");
            }
        }
    }

    /// Every global option, or every launch line option of `service`.
    pub fn configs(&mut self, service: Option<&str>) -> anyhow::Result<Vec<OptionReport>> {
        let service = service.map(|s| self.service_index(s)).transpose()?;
        self.load_all();
        Ok(match service {
            Some(i) => Self::reports(self.services[i].cli()),
            None => self
                .stores
                .iter()
                .flat_map(|s| Self::reports(s.as_ref()))
                .collect(),
        })
    }

    /// Every option whose name ends in `Port`, global and per service.
    pub fn ports(&mut self) -> Vec<PortReport> {
        self.load_all();
        let mut ports = Vec::new();
        let scoped = self
            .stores
            .iter()
            .map(|s| (None, s.as_ref()))
            .chain(
                self.services
                    .iter()
                    .map(|s| (Some(s.name().to_string()), s.cli() as &dyn ConfigStore)),
            );
        for (service, store) in scoped {
            for report in Self::reports(store) {
                if report.option.ends_with("Port") {
                    ports.push(PortReport {
                        service: service.clone(),
                        option: report.option,
                        value: report.value,
                    });
                }
            }
        }
        ports
    }

    /// The console of service `i`, if enabled and fully configured.
    fn console(&mut self, i: usize) -> Option<RconConsole> {
        let rcon = self.config.rcon.clone();
        if let Some(enabled) = &rcon.enabled_option
            && self.option(Some(i), enabled).and_then(|v| v.as_bool()) != Some(true)
        {
            return None;
        }
        let port = self.option(Some(i), &rcon.port_option)?.as_int()?;
        let port = u16::try_from(port).ok().filter(|p| *p > 0)?;
        let password = self.option(Some(i), &rcon.password_option)?.to_text();
        if password.is_empty() {
            return None;
        }
        Some(RconConsole::new(
            &rcon.host,
            port,
            &password,
            Duration::from_secs(rcon.timeout_secs),
        ))
    }

    /// Warning messages with texts taken from their options.
    fn warnings(&mut self, i: usize) -> Vec<Warning> {
        let stages = self.config.lifecycle.warnings.clone();
        stages
            .into_iter()
            .map(|stage| {
                let message = self
                    .option(Some(i), &stage.option)
                    .map(|v| v.to_text())
                    .filter(|t| !t.is_empty())
                    .unwrap_or(stage.fallback);
                Warning {
                    message,
                    wait: Duration::from_secs(stage.wait_secs),
                }
            })
            .collect()
    }

    /// The lifecycle controller of service `i`.
    pub fn lifecycle(&mut self, i: usize) -> Lifecycle {
        if let Err(e) = self.services[i].cli_mut().ensure_loaded() {
            error!("{e}");
        }
        let service = &self.services[i];
        let label = match service.instance() {
            "" => service.name().to_string(),
            instance => instance.to_string(),
        };
        let unit = service.unit().to_string();

        let mut lc = Lifecycle::new(
            &unit,
            self.supervisor.clone(),
            self.clock.clone(),
            self.config.lifecycle.clone(),
        )
        .with_warnings(self.warnings(i))
        .with_hooks(Rc::new(NoticeHooks { label }))
        .with_interrupt(self.interrupt.clone());
        if let Some(console) = self.console(i) {
            lc = lc.with_console(Rc::new(console), ConsoleCommands::from(&self.config.rcon));
        }
        lc
    }

    /// Configured player limit of service `i`.
    pub fn player_max(&mut self, i: usize) -> u32 {
        let default = self.config.rcon.default_max_players;
        let Some(name) = self.config.rcon.max_players_option.clone() else {
            return default;
        };
        if !self.option_is_set(Some(i), &name) {
            return default;
        }
        self.option(Some(i), &name)
            .and_then(|v| v.as_int())
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(default)
    }

    fn mod_labels(&mut self, i: usize) -> Vec<String> {
        let Some(name) = self.config.services.mods_option.clone() else {
            return Vec::new();
        };
        let ids = match self.option(Some(i), &name) {
            Some(Value::List(ids)) => ids,
            Some(Value::Str(s)) => s.split(',').map(str::to_string).collect(),
            _ => Vec::new(),
        };
        ids.iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .map(|id| match &self.mods {
                Some(library) => library.label(id),
                None => id.to_string(),
            })
            .collect()
    }

    /// Live status of service `i`.
    pub fn service_status(&mut self, i: usize) -> anyhow::Result<ServiceStatus> {
        let lc = self.lifecycle(i);
        let unit = lc.unit().to_string();
        let status = lc.state()?;
        let pid = if status.is_up() {
            self.supervisor.main_pid(&unit)?
        } else {
            0
        };
        let usage = match pid {
            0 => None,
            pid => self.supervisor.usage(pid).ok(),
        };
        Ok(ServiceStatus {
            service: self.services[i].name().to_string(),
            instance: self.services[i].instance().to_string(),
            status,
            enabled: self.supervisor.is_enabled(&unit)?,
            player_count: lc.player_count(),
            max_players: self.player_max(i),
            memory_usage: usage.map(|u| format_memory(u.memory_bytes)),
            cpu_usage: usage.map(|u| format!("{:.0}%", u.cpu_percent)),
            pid,
            mods: self.mod_labels(i),
        })
    }

    /// Status of every service, keyed by name.
    pub fn services_status(&mut self) -> anyhow::Result<HashMap<String, ServiceStatus>> {
        let mut all = HashMap::new();
        for i in 0..self.services.len() {
            let status = self.service_status(i)?;
            all.insert(status.service.clone(), status);
        }
        Ok(all)
    }

    /// Starts the selected services; with [`ALL`] only enabled ones.
    pub fn start(&mut self, selector: &str) -> anyhow::Result<()> {
        for i in self.targets(selector)? {
            let unit = self.services[i].unit().to_string();
            if selector == ALL && !self.supervisor.is_enabled(&unit)? {
                println!("{}", format!("Skipping {unit}, not enabled").yellow());
                continue;
            }
            let outcome = self.lifecycle(i).start()?;
            if outcome == Outcome::Abandoned {
                break;
            }
        }
        Ok(())
    }

    pub fn stop(&mut self, selector: &str) -> anyhow::Result<()> {
        for i in self.targets(selector)? {
            self.lifecycle(i).stop()?;
        }
        Ok(())
    }

    pub fn restart(&mut self, selector: &str) -> anyhow::Result<()> {
        for i in self.targets(selector)? {
            if self.lifecycle(i).restart()? == Outcome::Abandoned {
                break;
            }
        }
        Ok(())
    }

    pub fn enable(&mut self, selector: &str) -> anyhow::Result<()> {
        for i in self.targets(selector)? {
            self.supervisor
                .enable(self.services[i].unit())
                .with_context(|| format!("failed to enable {}", self.services[i].name()))?;
        }
        Ok(())
    }

    pub fn disable(&mut self, selector: &str) -> anyhow::Result<()> {
        for i in self.targets(selector)? {
            self.supervisor
                .disable(self.services[i].unit())
                .with_context(|| format!("failed to disable {}", self.services[i].name()))?;
        }
        Ok(())
    }

    /// Runs the warning ladder and save without stopping.
    pub fn pre_stop(&mut self, selector: &str) -> anyhow::Result<bool> {
        let i = self.single(selector)?;
        Ok(self.lifecycle(i).pre_stop())
    }

    /// Waits for the console after an external start.
    pub fn post_start(&mut self, selector: &str) -> anyhow::Result<bool> {
        let i = self.single(selector)?;
        Ok(self.lifecycle(i).post_start())
    }

    pub fn logs(&mut self, selector: &str) -> anyhow::Result<String> {
        let i = self.single(selector)?;
        self.supervisor
            .logs(self.services[i].unit(), self.config.lifecycle.log_lines)
    }

    /// Whether every selected service is running.
    pub fn is_running(&mut self, selector: &str) -> anyhow::Result<bool> {
        let targets = self.targets(selector)?;
        if targets.is_empty() {
            return Ok(false);
        }
        for i in targets {
            if self.supervisor.state(self.services[i].unit())? != ServiceState::Running {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether any selected service has players online.
    pub fn has_players(&mut self, selector: &str) -> anyhow::Result<bool> {
        for i in self.targets(selector)? {
            if self.lifecycle(i).player_count().is_some_and(|n| n > 0) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Prints the status of one service every `every` until interrupted.
    pub fn monitor(&mut self, selector: &str, every: Duration) -> anyhow::Result<()> {
        let i = self.single(selector)?;
        while !self.interrupt.load(Ordering::Relaxed) {
            if let Some(mods) = &self.mods {
                mods.invalidate();
            }
            let status = self.service_status(i)?;
            println!("{}", status.summary());
            self.clock.sleep(every);
        }
        Ok(())
    }
}

/// Fails when an option name appears in more than one set.
fn check_unique(sets: &[OptionSet]) -> confstore::Result<()> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for set in sets {
        for opt in set.iter() {
            if let Some(first) = seen.insert(&opt.name, set.group()) {
                return Err(ConfigError::DuplicateOption {
                    name: opt.name.clone(),
                    first: first.to_string(),
                    second: set.group().to_string(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, fs};

    use super::*;
    use crate::{
        clock::ManualClock,
        manager::{Separator, StoreConfig},
        service::ResourceUsage,
    };

    const SCHEMA: &str = r#"
[[gus]]
name = "RCON Port"
section = "ServerSettings"
key = "RCONPort"
default = 27020
type = "int"

[[gus]]
name = "Server Admin Password"
section = "ServerSettings"
key = "ServerAdminPassword"
default = ""

[[gus]]
name = "Bar"
section = "Foo"
key = "Bar"
default = ""
type = "list"

[[manager]]
name = "Shutdown Warning 5 Minutes"
section = "Messages"
key = "shutdown_5min"
default = "Server is shutting down in 5 minutes"

[[cli]]
name = "Session Name"
section = "option"
key = "SessionName"
default = ""

[[cli]]
name = "Port"
section = "flag"
key = "port"
default = 7777
type = "int"

[[cli]]
name = "Mods"
section = "flag"
key = "mods"
default = ""
type = "list"

[[cli]]
name = "RCON Enabled"
section = "option"
key = "RCONEnabled"
default = false
type = "bool"
"#;

    const GUS: &str = "[ServerSettings]\nRCONPort=27020\nServerAdminPassword=secret\n\n[Foo]\nBar=1\nBar=2\n";

    const LAUNCH: &str = "[Service]\nExecStart=/opt/proton run ArkAscendedServer.exe TheIsland_WP?listen?SessionName=Test -port=7777 -mods=928793,1\n";

    struct StaticSupervisor {
        state: ServiceState,
        enabled: bool,
        calls: RefCell<Vec<String>>,
    }

    impl StaticSupervisor {
        fn new(state: ServiceState, enabled: bool) -> Rc<Self> {
            Rc::new(Self {
                state,
                enabled,
                calls: RefCell::new(Vec::new()),
            })
        }
    }

    impl Supervisor for StaticSupervisor {
        fn state(&self, _unit: &str) -> anyhow::Result<ServiceState> {
            Ok(self.state)
        }

        fn is_enabled(&self, _unit: &str) -> anyhow::Result<bool> {
            Ok(self.enabled)
        }

        fn main_pid(&self, _unit: &str) -> anyhow::Result<u32> {
            Ok(if self.state.is_up() { 4242 } else { 0 })
        }

        fn exit_status(&self, _unit: &str) -> anyhow::Result<i32> {
            Ok(0)
        }

        fn start(&self, unit: &str) -> anyhow::Result<()> {
            self.calls.borrow_mut().push(format!("start {unit}"));
            Ok(())
        }

        fn stop(&self, unit: &str) -> anyhow::Result<()> {
            self.calls.borrow_mut().push(format!("stop {unit}"));
            Ok(())
        }

        fn enable(&self, unit: &str) -> anyhow::Result<()> {
            self.calls.borrow_mut().push(format!("enable {unit}"));
            Ok(())
        }

        fn disable(&self, unit: &str) -> anyhow::Result<()> {
            self.calls.borrow_mut().push(format!("disable {unit}"));
            Ok(())
        }

        fn reload(&self) -> anyhow::Result<()> {
            self.calls.borrow_mut().push("reload".to_string());
            Ok(())
        }

        fn logs(&self, unit: &str, lines: usize) -> anyhow::Result<String> {
            Ok(format!("{lines} lines of {unit}"))
        }

        fn usage(&self, _pid: u32) -> anyhow::Result<ResourceUsage> {
            Ok(ResourceUsage {
                memory_bytes: 3 << 30,
                cpu_percent: 12.4,
            })
        }
    }

    struct Recorder(Rc<RefCell<Vec<OptionChange>>>);

    impl OptionObserver for Recorder {
        fn option_value_updated(&self, change: &OptionChange) {
            self.0.borrow_mut().push(change.clone());
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        ctx: AppContext,
        changes: Rc<RefCell<Vec<OptionChange>>>,
        supervisor: Rc<StaticSupervisor>,
    }

    fn manager_config() -> ManagerConfig {
        let mut config = ManagerConfig::default();
        config.stores = vec![
            StoreConfig {
                group: "gus".to_string(),
                kind: StoreKind::Unreal,
                path: PathBuf::from("GameUserSettings.ini"),
            },
            StoreConfig {
                group: "manager".to_string(),
                kind: StoreKind::Keyfile,
                path: PathBuf::from(".settings.ini"),
            },
        ];
        config.services.exec_pattern =
            r"^ExecStart=\S+ run ArkAscendedServer\.exe (?P<instance>[^?]*)\?listen\?(?P<args>.*)$"
                .to_string();
        config.services.flag_separator = Separator::Equals;
        config.services.mods_option = Some("Mods".to_string());
        config.mod_library = Some(PathBuf::from("library.json"));
        config
    }

    fn fixture(state: ServiceState) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("configs.toml"), SCHEMA).unwrap();
        fs::write(dir.path().join("GameUserSettings.ini"), GUS).unwrap();
        fs::write(
            dir.path().join("library.json"),
            r#"{"installedMods":[{"details":{"iD":928793,"name":"Cryopods"},"pathOnDisk":"x"}]}"#,
        )
        .unwrap();
        fs::create_dir(dir.path().join("services")).unwrap();
        fs::write(dir.path().join("services/ark-island.conf"), LAUNCH).unwrap();

        let registry = Registry::load(&dir.path().join("configs.toml")).unwrap();
        let supervisor = StaticSupervisor::new(state, true);
        let mut ctx = AppContext::new(
            manager_config(),
            dir.path(),
            &registry,
            supervisor.clone(),
            Rc::new(ManualClock::new()),
        )
        .unwrap();
        let changes = Rc::new(RefCell::new(Vec::new()));
        ctx.add_observer(Box::new(Recorder(changes.clone())));
        Fixture {
            dir,
            ctx,
            changes,
            supervisor,
        }
    }

    #[test]
    fn unknown_option_reads_empty() {
        let mut f = fixture(ServiceState::Stopped);
        assert_eq!(f.ctx.get_option_value(None, "DoesNotExist"), "");
        assert_eq!(f.ctx.get_option_value(Some("nope"), "RCON Port"), "");
    }

    #[test]
    fn reads_across_stores() {
        let mut f = fixture(ServiceState::Stopped);
        assert_eq!(f.ctx.get_option_value(None, "RCON Port"), "27020");
        assert_eq!(f.ctx.get_option_value(None, "Bar"), "1,2");
        assert_eq!(
            f.ctx.get_option_value(None, "Shutdown Warning 5 Minutes"),
            "Server is shutting down in 5 minutes"
        );
        assert_eq!(
            f.ctx.get_option_value(Some("ark-island"), "Session Name"),
            "Test"
        );
        assert_eq!(
            f.ctx.get_option_value(Some("ark-island"), "RCON Port"),
            "27020"
        );
        assert_eq!(f.ctx.get_option_value(None, "Session Name"), "");
    }

    #[test]
    fn set_option_notifies_once_per_change() {
        let mut f = fixture(ServiceState::Stopped);
        assert!(f.ctx.set_option(None, "RCON Port", "27021").unwrap());
        assert!(!f.ctx.set_option(None, "RCON Port", "27021").unwrap());

        let changes = f.changes.borrow();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].group, "gus");
        assert_eq!(changes[0].old, Value::Int(27020));
        assert_eq!(changes[0].new, Value::Int(27021));
        assert!(
            fs::read_to_string(f.dir.path().join("GameUserSettings.ini"))
                .unwrap()
                .contains("RCONPort=27021\n")
        );
    }

    #[test]
    fn set_option_appends_list_occurrences() {
        let mut f = fixture(ServiceState::Stopped);
        assert!(f.ctx.set_option(None, "Bar", "1,2,3").unwrap());
        let text = fs::read_to_string(f.dir.path().join("GameUserSettings.ini")).unwrap();
        assert!(text.ends_with("[Foo]\nBar=1\nBar=2\nBar=3\n"));
    }

    #[test]
    fn set_option_rewrites_launch_line() {
        let mut f = fixture(ServiceState::Stopped);
        assert!(
            f.ctx
                .set_option(Some("ark-island"), "Session Name", "My Server")
                .unwrap()
        );
        let text = fs::read_to_string(f.dir.path().join("services/ark-island.conf")).unwrap();
        assert!(text.contains("?listen?SessionName=\"My Server\" -port=7777 -mods=928793,1\n"));

        let changes = f.changes.borrow();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].service.as_deref(), Some("ark-island"));
        assert_eq!(changes[0].group, "cli");
    }

    #[test]
    fn keyfile_is_created_on_first_write() {
        let mut f = fixture(ServiceState::Stopped);
        let path = f.dir.path().join(".settings.ini");
        assert!(!path.exists());
        assert!(
            f.ctx
                .set_option(None, "Shutdown Warning 5 Minutes", "Five minutes left")
                .unwrap()
        );
        assert!(
            fs::read_to_string(&path)
                .unwrap()
                .contains("shutdown_5min=Five minutes left")
        );
    }

    #[test]
    fn missing_unreal_file_skips_writes() {
        let mut f = fixture(ServiceState::Stopped);
        let path = f.dir.path().join("GameUserSettings.ini");
        fs::remove_file(&path).unwrap();
        assert!(!f.ctx.set_option(None, "RCON Port", "1").unwrap());
        assert!(!path.exists());
        assert!(f.changes.borrow().is_empty());
    }

    #[test]
    fn invalid_and_unknown_values_fail() {
        let mut f = fixture(ServiceState::Stopped);
        assert!(f.ctx.set_option(None, "RCON Port", "abc").is_err());
        assert!(f.ctx.set_option(None, "DoesNotExist", "1").is_err());
        assert!(f.changes.borrow().is_empty());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::default();
        let opt = confstore::ConfigOption::new("Port", "s", "Port", "1", ValueType::Int);
        registry.insert("gus", vec![opt.clone()]);
        registry.insert("cli", vec![opt]);
        let err = AppContext::new(
            manager_config(),
            dir.path(),
            &registry,
            StaticSupervisor::new(ServiceState::Stopped, true),
            Rc::new(ManualClock::new()),
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("declared by both"));
    }

    #[test]
    fn configs_and_ports_reports() {
        let mut f = fixture(ServiceState::Stopped);
        let configs = f.ctx.configs(None).unwrap();
        let names: Vec<&str> = configs.iter().map(|c| c.option.as_str()).collect();
        assert_eq!(
            names,
            ["RCON Port", "Server Admin Password", "Bar", "Shutdown Warning 5 Minutes"]
        );
        let json = serde_json::to_value(&configs[0]).unwrap();
        assert_eq!(json["type"], "int");
        assert_eq!(json["value"], 27020);

        let cli = f.ctx.configs(Some("ark-island")).unwrap();
        assert_eq!(cli.len(), 4);

        let ports = f.ctx.ports();
        assert_eq!(
            ports,
            [
                PortReport {
                    service: None,
                    option: "RCON Port".to_string(),
                    value: Value::Int(27020),
                },
                PortReport {
                    service: Some("ark-island".to_string()),
                    option: "Port".to_string(),
                    value: Value::Int(7777),
                },
            ]
        );
    }

    #[test]
    fn stopped_service_status() {
        let mut f = fixture(ServiceState::Stopped);
        let status = f.ctx.service_status(0).unwrap();
        assert_eq!(status.service, "ark-island");
        assert_eq!(status.instance, "TheIsland_WP");
        assert_eq!(status.status, ServiceState::Stopped);
        assert_eq!(status.pid, 0);
        assert_eq!(status.player_count, None);
        assert_eq!(status.max_players, 70);
        assert_eq!(status.memory_usage, None);
        assert_eq!(status.mods, ["Cryopods (928793)", "NOT INSTALLED (1)"]);
        assert!(status.summary().contains("Players: -"));
    }

    #[test]
    fn running_service_reports_usage() {
        let mut f = fixture(ServiceState::Running);
        f.ctx.config.rcon.enabled_option = Some("RCON Enabled".to_string());
        let status = f.ctx.service_status(0).unwrap();
        assert_eq!(status.pid, 4242);
        assert_eq!(status.memory_usage.as_deref(), Some("3.00 GiB"));
        assert_eq!(status.cpu_usage.as_deref(), Some("12%"));
        assert!(f.ctx.is_running(ALL).unwrap());
    }

    #[test]
    fn console_needs_enabled_flag() {
        let mut f = fixture(ServiceState::Stopped);
        f.ctx.config.rcon.enabled_option = Some("RCON Enabled".to_string());
        assert!(f.ctx.console(0).is_none());
        assert!(!f.ctx.lifecycle(0).has_console());

        f.ctx
            .set_option(Some("ark-island"), "RCON Enabled", "true")
            .unwrap();
        assert!(f.ctx.console(0).is_some());

        f.ctx.set_option(None, "Server Admin Password", "").unwrap();
        assert!(f.ctx.console(0).is_none());
    }

    #[test]
    fn warnings_use_option_texts() {
        let mut f = fixture(ServiceState::Stopped);
        f.ctx
            .set_option(None, "Shutdown Warning 5 Minutes", "Five!")
            .unwrap();
        let warnings = f.ctx.warnings(0);
        assert_eq!(warnings.len(), 7);
        assert_eq!(warnings[0].message, "Five!");
        assert_eq!(warnings[1].message, "Server is shutting down in 4 minutes");
    }

    #[test]
    fn start_all_skips_disabled() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("services")).unwrap();
        fs::write(dir.path().join("services/a.conf"), LAUNCH).unwrap();
        let supervisor = StaticSupervisor::new(ServiceState::Stopped, false);
        let mut ctx = AppContext::new(
            manager_config(),
            dir.path(),
            &Registry::default(),
            supervisor.clone(),
            Rc::new(ManualClock::new()),
        )
        .unwrap();

        ctx.start(ALL).unwrap();
        assert!(supervisor.calls.borrow().is_empty());

        ctx.enable("a").unwrap();
        assert_eq!(*supervisor.calls.borrow(), ["enable a"]);
    }

    #[test]
    fn single_target_selection() {
        let f = fixture(ServiceState::Stopped);
        assert_eq!(f.ctx.single(ALL).unwrap(), 0);
        assert_eq!(f.ctx.single("ark-island").unwrap(), 0);
        assert!(f.ctx.single("missing").is_err());
        assert!(f.ctx.targets("missing").is_err());
    }

    #[test]
    fn logs_come_from_supervisor() {
        let mut f = fixture(ServiceState::Stopped);
        assert_eq!(f.ctx.logs(ALL).unwrap(), "20 lines of ark-island");
        assert!(f.supervisor.calls.borrow().is_empty());
    }
}

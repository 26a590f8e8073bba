//! Manager configuration types.
//!
//! The manager reads one `gamesrv.toml` describing where the game keeps its
//! files and how its services are launched. Relative paths are resolved
//! against the directory holding that file.
//!
//! # Configuration File Format
//!
//! ```toml
//! name = "ARK:SA"
//! description = "ARK: Survival Ascended"
//! schema = "configs.toml"
//! mod_library = "AppFiles/ShooterGame/Binaries/Win64/ShooterGame/ModsUserData/83374/library.json"
//!
//! [[stores]]
//! group = "gus"
//! kind = "unreal"
//! path = "AppFiles/ShooterGame/Saved/Config/WindowsServer/GameUserSettings.ini"
//!
//! [services]
//! dir = "services"
//! exec_pattern = '^ExecStart=\S+ run ArkAscendedServer\.exe (?P<instance>[^?]*)\?listen\?(?P<args>.*)$'
//!
//! [rcon]
//! port_option = "RCON Port"
//! password_option = "Server Admin Password"
//! enabled_option = "RCON Enabled"
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use confstore::FlagSeparator;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Root manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct ManagerConfig {
    /// Short display name of the game.
    pub name: String,
    /// Long display name of the game.
    pub description: String,
    /// Option schema file, TOML or JSON.
    pub schema: PathBuf,
    /// Global config files.
    pub stores: Vec<StoreConfig>,
    pub services: ServicesConfig,
    pub rcon: RconConfig,
    pub lifecycle: LifecycleConfig,
    /// JSON mod library written by the game.
    pub mod_library: Option<PathBuf>,
    /// Seconds the mod library stays cached.
    pub mod_cache_secs: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            name: "game".to_string(),
            description: "Game server".to_string(),
            schema: PathBuf::from("configs.toml"),
            stores: Vec::new(),
            services: ServicesConfig::default(),
            rcon: RconConfig::default(),
            lifecycle: LifecycleConfig::default(),
            mod_library: None,
            mod_cache_secs: 30,
        }
    }
}

/// Format of a global config file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Unreal Engine ini with struct values and repeated keys.
    Unreal,
    /// Plain ini owned by the manager.
    Keyfile,
}

/// One global config file bound to a schema group.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct StoreConfig {
    pub group: String,
    pub kind: StoreKind,
    pub path: PathBuf,
}

/// How flags and their values are joined on the launch line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum Separator {
    #[default]
    #[serde(rename = "=")]
    Equals,
    #[serde(rename = " ")]
    Space,
}

impl From<Separator> for FlagSeparator {
    fn from(value: Separator) -> Self {
        match value {
            Separator::Equals => FlagSeparator::Equals,
            Separator::Space => FlagSeparator::Space,
        }
    }
}

/// Service discovery and launch line settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct ServicesConfig {
    /// Directory holding one definition file per service.
    pub dir: PathBuf,
    /// Extension of definition files, without the dot.
    pub extension: String,
    /// Appended to the service name to form the systemd unit name.
    pub unit_suffix: String,
    /// Regex matching the launch line; the `args` group holds the options,
    /// an optional `instance` group the map or instance label.
    pub exec_pattern: String,
    /// Schema group of the launch line options.
    pub cli_group: String,
    pub flag_separator: Separator,
    /// Launch line option listing the service's mod ids.
    pub mods_option: Option<String>,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("services"),
            extension: "conf".to_string(),
            unit_suffix: String::new(),
            exec_pattern: r"^ExecStart=(?P<args>.*)$".to_string(),
            cli_group: "cli".to_string(),
            flag_separator: Separator::Equals,
            mods_option: None,
        }
    }
}

/// Remote console settings.
///
/// The port, password and enabled flag are read from options so that they
/// always match what the server was started with.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct RconConfig {
    pub host: String,
    pub timeout_secs: u64,
    pub port_option: String,
    pub password_option: String,
    /// When unset, the console counts as enabled whenever port and password are set.
    pub enabled_option: Option<String>,
    pub list_command: String,
    /// Reply of `list_command` when nobody is online.
    pub empty_reply: String,
    pub save_command: String,
    /// Prefix of a broadcast; the message follows after a space.
    pub broadcast_command: String,
    pub max_players_option: Option<String>,
    pub default_max_players: u32,
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            timeout_secs: 2,
            port_option: "RCON Port".to_string(),
            password_option: "Server Admin Password".to_string(),
            enabled_option: None,
            list_command: "ListPlayers".to_string(),
            empty_reply: "No Players Connected".to_string(),
            save_command: "SaveWorld".to_string(),
            broadcast_command: "ServerChat".to_string(),
            max_players_option: None,
            default_max_players: 70,
        }
    }
}

/// One shutdown warning stage.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct WarningStage {
    /// Option holding the message text.
    pub option: String,
    /// Message used when the option is unset or unknown.
    pub fallback: String,
    /// Seconds to wait after broadcasting.
    pub wait_secs: u64,
}

impl WarningStage {
    fn new(option: &str, fallback: &str, wait_secs: u64) -> Self {
        Self {
            option: option.to_string(),
            fallback: fallback.to_string(),
            wait_secs,
        }
    }
}

/// Timing of start, stop and the shutdown warning ladder.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct LifecycleConfig {
    pub initial_delay_secs: u64,
    pub poll_interval_secs: u64,
    pub max_polls: u32,
    /// Seconds after which a service without a console counts as ready.
    pub grace_period_secs: u64,
    pub save_flush_secs: u64,
    pub stop_settle_secs: u64,
    pub log_lines: usize,
    pub post_start_polls: u32,
    pub post_start_interval_secs: u64,
    pub warnings: Vec<WarningStage>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: 10,
            poll_interval_secs: 1,
            max_polls: 240,
            grace_period_secs: 60,
            save_flush_secs: 5,
            stop_settle_secs: 10,
            log_lines: 20,
            post_start_polls: 24,
            post_start_interval_secs: 10,
            warnings: vec![
                WarningStage::new("Shutdown Warning 5 Minutes", "Server is shutting down in 5 minutes", 60),
                WarningStage::new("Shutdown Warning 4 Minutes", "Server is shutting down in 4 minutes", 60),
                WarningStage::new("Shutdown Warning 3 Minutes", "Server is shutting down in 3 minutes", 60),
                WarningStage::new("Shutdown Warning 2 Minutes", "Server is shutting down in 2 minutes", 60),
                WarningStage::new("Shutdown Warning 1 Minute", "Server is shutting down in 1 minute", 30),
                WarningStage::new("Shutdown Warning 30 Seconds", "Server is shutting down in 30 seconds", 30),
                WarningStage::new("Shutdown Warning NOW", "Server is shutting down NOW", 0),
            ],
        }
    }
}

impl LifecycleConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn save_flush(&self) -> Duration {
        Duration::from_secs(self.save_flush_secs)
    }

    pub fn stop_settle(&self) -> Duration {
        Duration::from_secs(self.stop_settle_secs)
    }

    pub fn post_start_interval(&self) -> Duration {
        Duration::from_secs(self.post_start_interval_secs)
    }
}

impl ManagerConfig {
    /// Loads the manager configuration, or the defaults when `path` does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            warn!("{} not found, using built-in defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("can not open config file: {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// JSON schema of the configuration file, for editors.
    pub fn json_schema() -> anyhow::Result<String> {
        let schema = schemars::schema_for!(ManagerConfig);
        Ok(serde_json::to_string_pretty(&schema)?)
    }
}

//! # confstore
//!
//! Typed configuration options bound to interchangeable backing stores.
//!
//! Options are declared per group in a schema file (see [`option`]) and
//! exposed through the [`ConfigStore`] trait. Three stores are provided:
//!
//! - [`KeyFileStore`] - a plain `[section]` / `key=value` file
//! - [`UnrealStore`] - an Unreal Engine ini with struct values and repeated keys
//! - [`CommandLineStore`] - options and flags inside a service's launch line
//!
//! Every store saves through [`persist::atomic_write`], so a failed write
//! never leaves a truncated file behind.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use confstore::{ConfigStore, Registry, UnrealStore, Value};
//!
//! let registry = Registry::load(Path::new("configs.toml")).unwrap();
//! let mut gus = UnrealStore::new(
//!     registry.group("gus").unwrap(),
//!     Path::new("GameUserSettings.ini"),
//! );
//! gus.load().unwrap();
//!
//! let port = gus.get_value("RCON Port").unwrap();
//! gus.set_value("RCON Port", &Value::Int(27021)).unwrap();
//! gus.save().unwrap();
//! ```

#[macro_use]
extern crate log;

/// Launch command line tokenizer and store.
pub mod cmdline;

/// Error types.
pub mod error;

mod ini;

/// Plain ini store.
pub mod keyfile;

/// Option declarations and schema loading.
pub mod option;

/// Atomic file replacement.
pub mod persist;

/// The store trait.
pub mod store;

/// Unreal Engine ini store.
pub mod unreal;

/// Typed values.
pub mod value;

pub use cmdline::{CommandLine, CommandLineStore, FlagSeparator, Token};
pub use error::{ConfigError, Result};
pub use keyfile::KeyFileStore;
pub use option::{ConfigOption, OptionSet, Registry};
pub use store::ConfigStore;
pub use unreal::UnrealStore;
pub use value::{Value, ValueType};

//! # gamesrv
//!
//! Configuration and lifecycle manager for dedicated game servers that run
//! as systemd services.
//!
//! ## Features
//!
//! - **Typed options**: one option namespace over Unreal Engine ini files,
//!   plain ini files and each service's launch command line
//! - **Lifecycle**: start, stop and restart with crash detection and
//!   readiness polling
//! - **Graceful shutdown**: timed warnings to connected players, gated on the
//!   live player count, followed by a world save
//! - **Dashboard data**: service status, options and ports as JSON
//!
//! ## Modules
//!
//! - [`clock`] - Time source for polling loops and caches
//! - [`ctx`] - Application context and option lookup
//! - [`manager`] - Manager configuration file
//! - [`mods`] - Installed mod lookup
//! - [`service`] - Services, supervisor, console and lifecycle
//! - [`utils`] - Command execution and formatting helpers

#[macro_use]
extern crate log;

#[macro_use]
extern crate anyhow;

/// Time source for polling loops and caches.
pub mod clock;

/// Application context and option lookup.
pub mod ctx;

/// Manager configuration file.
pub mod manager;

/// Installed mod lookup.
pub mod mods;

/// Services, supervisor, console and lifecycle.
pub mod service;

/// Common utilities and helper functions.
pub mod utils;

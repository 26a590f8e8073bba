//! Installed mod lookup.

use std::{
    cell::RefCell,
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    rc::Rc,
    time::Duration,
};

use anyhow::Context;
use serde::Deserialize;

use crate::clock::Clock;

/// A single cached value refreshed after a time-to-live.
pub struct Cache<T> {
    clock: Rc<dyn Clock>,
    ttl: Duration,
    entry: RefCell<Option<(Duration, Rc<T>)>>,
}

impl<T> Cache<T> {
    pub fn new(clock: Rc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            clock,
            ttl,
            entry: RefCell::new(None),
        }
    }

    /// The cached value, calling `refresh` when it is missing or stale.
    ///
    /// A failed refresh leaves the cache empty.
    pub fn get_or_refresh<E>(&self, refresh: impl FnOnce() -> Result<T, E>) -> Result<Rc<T>, E> {
        let now = self.clock.now();
        if let Some((at, value)) = self.entry.borrow().as_ref()
            && now.saturating_sub(*at) < self.ttl
        {
            return Ok(value.clone());
        }
        let value = Rc::new(refresh()?);
        *self.entry.borrow_mut() = Some((now, value.clone()));
        Ok(value)
    }

    /// Drops the cached value so the next read refreshes.
    pub fn invalidate(&self) {
        self.entry.borrow_mut().take();
    }
}

/// One installed mod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModInfo {
    pub name: String,
    pub path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LibraryFile {
    #[serde(default)]
    installed_mods: Vec<InstalledMod>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstalledMod {
    details: ModDetails,
    #[serde(default)]
    path_on_disk: String,
}

#[derive(Deserialize)]
struct ModDetails {
    #[serde(rename = "iD")]
    id: serde_json::Value,
    name: String,
}

/// The game's JSON mod library, keyed by mod id.
pub struct ModLibrary {
    path: PathBuf,
    cache: Cache<HashMap<String, ModInfo>>,
}

impl ModLibrary {
    pub fn new(path: &Path, clock: Rc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            path: path.to_path_buf(),
            cache: Cache::new(clock, ttl),
        }
    }

    fn read(&self) -> anyhow::Result<HashMap<String, ModInfo>> {
        if !self.path.exists() {
            debug!("mod library {} not found", self.path.display());
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("can not read {}", self.path.display()))?;
        let content = content.trim_start_matches('\u{feff}');
        let library: LibraryFile = serde_json::from_str(content)
            .with_context(|| format!("invalid mod library {}", self.path.display()))?;

        Ok(library
            .installed_mods
            .into_iter()
            .map(|m| {
                let id = match m.details.id {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                let info = ModInfo {
                    name: m.details.name,
                    path: m.path_on_disk,
                };
                (id, info)
            })
            .collect())
    }

    fn mods(&self) -> Rc<HashMap<String, ModInfo>> {
        self.cache
            .get_or_refresh(|| self.read())
            .unwrap_or_else(|e| {
                warn!("{e:#}");
                Rc::new(HashMap::new())
            })
    }

    pub fn get(&self, mod_id: &str) -> Option<ModInfo> {
        self.mods().get(mod_id.trim()).cloned()
    }

    /// Display name of an installed mod.
    pub fn resolve(&self, mod_id: &str) -> Option<String> {
        self.get(mod_id).map(|m| m.name)
    }

    /// `Name (id)`, or `NOT INSTALLED (id)`.
    pub fn label(&self, mod_id: &str) -> String {
        let mod_id = mod_id.trim();
        match self.resolve(mod_id) {
            Some(name) => format!("{name} ({mod_id})"),
            None => format!("NOT INSTALLED ({mod_id})"),
        }
    }

    pub fn invalidate(&self) {
        self.cache.invalidate();
    }
}

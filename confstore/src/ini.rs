//! File handling shared by the ini backed stores.

use std::{
    fs,
    path::{Path, PathBuf},
};

use ueini::{Document, Mode};

use crate::{
    error::{ConfigError, Result},
    persist::atomic_write,
};

#[derive(Debug)]
pub(crate) struct IniFile {
    pub path: PathBuf,
    pub doc: Document,
    mode: Mode,
    loaded: bool,
    create_missing: bool,
}

impl IniFile {
    pub fn new(path: &Path, mode: Mode, create_missing: bool) -> Self {
        Self {
            path: path.to_path_buf(),
            doc: Document::new(mode),
            mode,
            loaded: false,
            create_missing,
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn load(&mut self) -> Result<()> {
        self.doc = if self.exists() {
            let text = fs::read_to_string(&self.path)?;
            Document::parse_with(&text, self.mode).map_err(|source| ConfigError::Parse {
                path: self.path.clone(),
                source,
            })?
        } else {
            debug!("{} not found, using defaults", self.path.display());
            Document::new(self.mode)
        };
        self.loaded = true;
        Ok(())
    }

    /// Loads on first write and refuses writes to a file that is not there.
    pub fn prepare_write(&mut self) -> Result<()> {
        if !self.loaded {
            self.load()?;
        }
        if !self.create_missing && !self.exists() {
            return Err(ConfigError::StoreUnavailable {
                path: self.path.clone(),
            });
        }
        Ok(())
    }

    pub fn save(&mut self) -> Result<()> {
        if !self.doc.is_changed() {
            return Ok(());
        }
        atomic_write(&self.path, &self.doc.to_string())?;
        self.doc.mark_saved();
        info!("saved {}", self.path.display());
        Ok(())
    }
}

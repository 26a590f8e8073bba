//! Plain `[section]` / `key=value` files.

use std::path::Path;

use ueini::Mode;

use crate::{
    error::Result,
    ini::IniFile,
    option::OptionSet,
    store::ConfigStore,
    value::Value,
};

/// Store over a plain ini file such as the manager's own settings.
///
/// Values are plain text; lists are comma joined on one line. The file is
/// created on the first save when it does not exist yet.
#[derive(Debug)]
pub struct KeyFileStore {
    options: OptionSet,
    file: IniFile,
}

impl KeyFileStore {
    pub fn new(options: OptionSet, path: &Path) -> Self {
        Self {
            options,
            file: IniFile::new(path, Mode::Plain, true),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }
}

impl ConfigStore for KeyFileStore {
    fn options(&self) -> &OptionSet {
        &self.options
    }

    fn get_value(&self, name: &str) -> Result<Value> {
        let opt = self.options.get(name)?;
        opt.typed(self.file.doc.get(&opt.section, &opt.key).as_deref())
    }

    fn set_value(&mut self, name: &str, value: &Value) -> Result<bool> {
        let opt = self.options.get(name)?;
        let value = opt.accept(value)?;
        self.file.prepare_write()?;
        if self.get_value(name)? == value {
            return Ok(false);
        }
        let opt = self.options.get(name)?;
        self.file
            .doc
            .set(&opt.section, &opt.key, &value.to_text())
            .map_err(|source| crate::ConfigError::Parse {
                path: self.file.path.clone(),
                source,
            })?;
        Ok(true)
    }

    fn has_value(&self, name: &str) -> bool {
        self.options.get(name).is_ok_and(|opt| {
            self.file
                .doc
                .get(&opt.section, &opt.key)
                .is_some_and(|v| !v.is_empty())
        })
    }

    fn exists(&self) -> bool {
        self.file.exists()
    }

    fn is_loaded(&self) -> bool {
        self.file.is_loaded()
    }

    fn load(&mut self) -> Result<()> {
        self.file.load()
    }

    fn save(&mut self) -> Result<()> {
        self.file.save()
    }

    fn is_dirty(&self) -> bool {
        self.file.doc.is_changed()
    }
}

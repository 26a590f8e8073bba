//! Unreal Engine style ini files.

use std::path::Path;

use ueini::Mode;

use crate::{
    error::{ConfigError, Result},
    ini::IniFile,
    option::{ConfigOption, OptionSet},
    store::ConfigStore,
    value::{Value, ValueType},
};

/// Store over an engine ini file such as `GameUserSettings.ini`.
///
/// List options map onto repeated keys, one line per item. A key of the
/// form `Key/Field` reads and writes one field of a struct value. The
/// engine owns these files, so writes are refused while the file does not
/// exist.
#[derive(Debug)]
pub struct UnrealStore {
    options: OptionSet,
    file: IniFile,
}

impl UnrealStore {
    pub fn new(options: OptionSet, path: &Path) -> Self {
        Self {
            options,
            file: IniFile::new(path, Mode::Structured, false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    fn raw(&self, opt: &ConfigOption) -> Vec<String> {
        if opt.key.contains('/') {
            self.file
                .doc
                .get_field(&opt.section, &opt.key)
                .into_iter()
                .collect()
        } else {
            self.file.doc.values(&opt.section, &opt.key)
        }
    }
}

impl ConfigStore for UnrealStore {
    fn options(&self) -> &OptionSet {
        &self.options
    }

    fn get_value(&self, name: &str) -> Result<Value> {
        let opt = self.options.get(name)?;
        let raw = self.raw(opt);
        match opt.kind {
            ValueType::List if raw.is_empty() => opt.default_value(),
            ValueType::List => Ok(Value::List(raw)),
            _ => opt.typed(raw.first().map(String::as_str)),
        }
    }

    fn set_value(&mut self, name: &str, value: &Value) -> Result<bool> {
        let value = self.options.get(name)?.accept(value)?;
        self.file.prepare_write()?;
        if self.get_value(name)? == value {
            return Ok(false);
        }

        let opt = self.options.get(name)?;
        let parse_err = |source| ConfigError::Parse {
            path: self.file.path.clone(),
            source,
        };
        let doc = &mut self.file.doc;
        if opt.key.contains('/') {
            doc.set_field(&opt.section, &opt.key, &value.to_text())?;
        } else if let Value::List(items) = &value {
            doc.set_values(&opt.section, &opt.key, items)
                .map_err(parse_err)?;
        } else {
            doc.set(&opt.section, &opt.key, &value.to_text())
                .map_err(parse_err)?;
        }
        Ok(true)
    }

    fn has_value(&self, name: &str) -> bool {
        self.options
            .get(name)
            .is_ok_and(|opt| self.raw(opt).iter().any(|v| !v.is_empty()))
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

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn options() -> OptionSet {
        OptionSet::new(
            "game",
            vec![
                ConfigOption::new("Bar", "Foo", "Bar", "", ValueType::List),
                ConfigOption::new("Port", "ServerSettings", "RCONPort", "27020", ValueType::Int),
                ConfigOption::new("Taming", "ServerSettings", "TamingSpeedMultiplier", "1.0", ValueType::Float),
                ConfigOption::new("Password", "ServerSettings", "ServerAdminPassword", "", ValueType::Str),
                ConfigOption::new(
                    "Wood Stack",
                    "/Script/ShooterGame.ShooterGameMode",
                    "ConfigOverrideItemMaxQuantity/Quantity/MaxItemQuantity",
                    "100",
                    ValueType::Int,
                ),
            ],
        )
        .unwrap()
    }

    fn store_with(content: &str) -> (tempfile::TempDir, UnrealStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Game.ini");
        fs::write(&path, content).unwrap();
        let mut store = UnrealStore::new(options(), &path);
        store.load().unwrap();
        (dir, store)
    }

    #[test]
    fn duplicate_keys_append_on_write() {
        let (_dir, mut store) = store_with("[Foo]\nBar=1\nBar=2\n");
        assert_eq!(
            store.get_value("Bar").unwrap(),
            Value::List(vec!["1".into(), "2".into()])
        );

        let three = Value::List(vec!["1".into(), "2".into(), "3".into()]);
        assert!(store.set_value("Bar", &three).unwrap());
        store.save().unwrap();
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "[Foo]\nBar=1\nBar=2\nBar=3\n"
        );
    }

    #[test]
    fn additive_documents_get_plus_lines() {
        let (_dir, mut store) = store_with("[Foo]\nBar=1\n+Bar=2\n");
        let three = Value::List(vec!["1".into(), "2".into(), "3".into()]);
        store.set_value("Bar", &three).unwrap();
        store.save().unwrap();
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "[Foo]\nBar=1\n+Bar=2\n+Bar=3\n"
        );
    }

    #[test]
    fn floats_use_engine_precision() {
        let (_dir, mut store) = store_with("[ServerSettings]\nRCONPort=27020\n");
        assert_eq!(store.get_value("Taming").unwrap(), Value::Float(1.0));
        store.set_value("Taming", &Value::Float(2.5)).unwrap();
        store.save().unwrap();
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "[ServerSettings]\nRCONPort=27020\nTamingSpeedMultiplier=2.500000\n"
        );
    }

    #[test]
    fn crlf_files_keep_their_line_endings() {
        let (_dir, mut store) = store_with(
            "[ServerSettings]\r\nServerAdminPassword=x\r\nRCONPort=27020\r\n\r\n[Foo]\r\nBar=1\r\n",
        );
        assert!(store.set_value("Port", &Value::Int(27021)).unwrap());
        store.save().unwrap();
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "[ServerSettings]\r\nServerAdminPassword=x\r\nRCONPort=27021\r\n\r\n[Foo]\r\nBar=1\r\n"
        );
    }

    #[test]
    fn same_value_is_a_no_op() {
        let (_dir, mut store) = store_with("[ServerSettings]\nRCONPort = 27020\n");
        assert!(!store.set_value("Port", &Value::Int(27020)).unwrap());
        assert!(!store.is_dirty());
    }

    #[test]
    fn empty_values_fall_back_to_default() {
        let (_dir, store) = store_with("[ServerSettings]\nRCONPort=\nServerAdminPassword=\n");
        assert_eq!(store.get_value("Port").unwrap(), Value::Int(27020));
        assert!(!store.has_value("Password"));
        assert!(store.get_value("Password").unwrap().is_unset());
    }

    #[test]
    fn struct_fields_are_addressable() {
        let (_dir, mut store) = store_with(
            "[/Script/ShooterGame.ShooterGameMode]\nConfigOverrideItemMaxQuantity=(ItemClassString=\"Wood\",Quantity=(MaxItemQuantity=500))\n",
        );
        assert_eq!(store.get_value("Wood Stack").unwrap(), Value::Int(500));
        store.set_value("Wood Stack", &Value::Int(900)).unwrap();
        store.save().unwrap();
        assert!(
            fs::read_to_string(store.path())
                .unwrap()
                .contains("Quantity=(MaxItemQuantity=900)")
        );
    }

    #[test]
    fn missing_file_refuses_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = UnrealStore::new(options(), &dir.path().join("Game.ini"));
        store.load().unwrap();
        assert_eq!(store.get_value("Port").unwrap(), Value::Int(27020));
        assert!(matches!(
            store.set_value("Port", &Value::Int(1)),
            Err(ConfigError::StoreUnavailable { .. })
        ));
    }

    #[test]
    fn parse_errors_block_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Game.ini");
        fs::write(&path, "[Foo]\nBar=(a,B=1)\n").unwrap();
        let mut store = UnrealStore::new(options(), &path);
        assert!(matches!(store.load(), Err(ConfigError::Parse { .. })));
        assert!(store.set_value("Port", &Value::Int(1)).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[Foo]\nBar=(a,B=1)\n");
    }
}

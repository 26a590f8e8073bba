//! Option declarations and the schema file they are loaded from.
//!
//! A schema maps each config group to the options it declares:
//!
//! ```toml
//! [[gus]]
//! name = "RCON Port"
//! section = "ServerSettings"
//! key = "RCONPort"
//! default = 27020
//! type = "int"
//! help = "Port for the remote console"
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::Path,
};

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    error::{ConfigError, Result},
    value::{Value, ValueType},
};

/// One registered option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigOption {
    /// Operator facing name, unique within its group.
    pub name: String,
    /// Target section. `option` or `flag` for launch command line groups.
    pub section: String,
    /// Target key. `key/field` addresses a field of a struct value.
    pub key: String,
    /// Default in on-disk text form.
    #[serde(default, deserialize_with = "default_text")]
    pub default: String,
    #[serde(default, rename = "type")]
    pub kind: ValueType,
    #[serde(default)]
    pub help: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDefault {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

fn default_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawDefault>::deserialize(deserializer)?;
    Ok(match raw {
        None => String::new(),
        Some(RawDefault::Bool(b)) => Value::Bool(b).to_text(),
        Some(RawDefault::Int(i)) => i.to_string(),
        Some(RawDefault::Float(f)) => Value::Float(f).to_text(),
        Some(RawDefault::Text(s)) => s,
        Some(RawDefault::List(items)) => items.join(","),
    })
}

impl ConfigOption {
    pub fn new(name: &str, section: &str, key: &str, default: &str, kind: ValueType) -> Self {
        Self {
            name: name.to_string(),
            section: section.to_string(),
            key: key.to_string(),
            default: default.to_string(),
            kind,
            help: String::new(),
            choices: None,
        }
    }

    pub fn with_help(mut self, help: &str) -> Self {
        self.help = help.to_string();
        self
    }

    pub fn with_choices(mut self, choices: &[&str]) -> Self {
        self.choices = Some(choices.iter().map(|c| c.to_string()).collect());
        self
    }

    /// The default converted to the declared type.
    pub fn default_value(&self) -> Result<Value> {
        Value::parse(&self.name, &self.default, self.kind)
    }

    /// Converts stored text, falling back to the default when it is empty.
    pub fn typed(&self, text: Option<&str>) -> Result<Value> {
        match text {
            Some(t) if !t.trim().is_empty() => Value::parse(&self.name, t, self.kind),
            _ => self.default_value(),
        }
    }

    /// Checks `value` against the declared type.
    ///
    /// Integers given for float options are widened.
    pub fn accept(&self, value: &Value) -> Result<Value> {
        if !value.conforms(self.kind) {
            return Err(ConfigError::InvalidValue {
                name: self.name.clone(),
                value: value.to_text(),
                expected: self.kind,
            });
        }
        Ok(match (value, self.kind) {
            (Value::Int(i), ValueType::Float) => Value::Float(*i as f64),
            _ => value.clone(),
        })
    }
}

/// The options of one config group, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct OptionSet {
    group: String,
    options: Vec<ConfigOption>,
    by_name: HashMap<String, usize>,
}

impl OptionSet {
    /// Builds a set, rejecting repeated names.
    pub fn new(group: &str, options: Vec<ConfigOption>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(options.len());
        for (i, opt) in options.iter().enumerate() {
            if by_name.insert(opt.name.clone(), i).is_some() {
                return Err(ConfigError::DuplicateOption {
                    name: opt.name.clone(),
                    first: group.to_string(),
                    second: group.to_string(),
                });
            }
        }
        Ok(Self {
            group: group.to_string(),
            options,
            by_name,
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Looks up an option by name.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownOption`] when `name` is not in this group.
    pub fn get(&self, name: &str) -> Result<&ConfigOption> {
        self.by_name
            .get(name)
            .map(|&i| &self.options[i])
            .ok_or_else(|| ConfigError::UnknownOption {
                group: self.group.clone(),
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Finds an option by its target key, ignoring case.
    pub fn by_key(&self, key: &str) -> Option<&ConfigOption> {
        self.options
            .iter()
            .find(|o| o.key.eq_ignore_ascii_case(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigOption> {
        self.options.iter()
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

/// All option groups declared by a schema file.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    groups: BTreeMap<String, Vec<ConfigOption>>,
}

impl Registry {
    /// Loads a schema, choosing the format from the file extension.
    ///
    /// A missing file yields an empty registry.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Schema`] on an unsupported extension, malformed
    /// content or an unknown option type.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("option schema {} not found, no options registered", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let schema_err = |message: String| ConfigError::Schema {
            path: path.to_path_buf(),
            message,
        };
        let groups = match path.extension().and_then(|s| s.to_str()).unwrap_or("") {
            "toml" => toml::from_str(&content).map_err(|e| schema_err(e.to_string()))?,
            "json" => serde_json::from_str(&content).map_err(|e| schema_err(e.to_string()))?,
            ext => return Err(schema_err(format!("unsupported schema extension: {ext:?}"))),
        };
        let registry = Self { groups };
        debug!(
            "loaded {} option groups from {}",
            registry.groups.len(),
            path.display()
        );
        Ok(registry)
    }

    /// Registers a group programmatically.
    pub fn insert(&mut self, group: &str, options: Vec<ConfigOption>) {
        self.groups.insert(group.to_string(), options);
    }

    /// The options of `group`; empty when the schema does not mention it.
    pub fn group(&self, group: &str) -> Result<OptionSet> {
        OptionSet::new(group, self.groups.get(group).cloned().unwrap_or_default())
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
[[gus]]
name = "RCON Port"
section = "ServerSettings"
key = "RCONPort"
default = 27020
type = "int"
help = "Remote console port"

[[gus]]
name = "RCON Enabled"
section = "ServerSettings"
key = "RCONEnabled"
default = true
type = "bool"

[[gus]]
name = "Difficulty"
section = "ServerSettings"
key = "DifficultyOffset"
default = 1.0
type = "float"
choices = ["0.5", "1.0"]

[[cli]]
name = "Mods"
section = "flag"
key = "mods"
"#;

    #[test]
    fn loads_toml_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configs.toml");
        fs::write(&path, SCHEMA).unwrap();

        let registry = Registry::load(&path).unwrap();
        assert_eq!(registry.group_names().collect::<Vec<_>>(), ["cli", "gus"]);

        let gus = registry.group("gus").unwrap();
        assert_eq!(gus.len(), 3);
        let port = gus.get("RCON Port").unwrap();
        assert_eq!(port.default, "27020");
        assert_eq!(port.default_value().unwrap(), Value::Int(27020));
        assert_eq!(gus.get("RCON Enabled").unwrap().default, "True");
        assert_eq!(gus.get("Difficulty").unwrap().default, "1.000000");
        assert_eq!(
            gus.get("Difficulty").unwrap().choices.as_deref(),
            Some(&["0.5".to_string(), "1.0".to_string()][..])
        );

        let cli = registry.group("cli").unwrap();
        let mods = cli.by_key("MODS").unwrap();
        assert_eq!(mods.kind, ValueType::Str);
        assert_eq!(mods.default, "");
    }

    #[test]
    fn loads_json_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configs.json");
        fs::write(
            &path,
            r#"{"manager": [{"name": "Warn", "section": "Messages", "key": "warn", "default": null}]}"#,
        )
        .unwrap();
        let registry = Registry::load(&path).unwrap();
        assert!(registry.group("manager").unwrap().contains("Warn"));
        assert!(registry.group("other").unwrap().is_empty());
    }

    #[test]
    fn missing_schema_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::load(&dir.path().join("configs.toml")).unwrap();
        assert_eq!(registry.group_names().count(), 0);
    }

    #[test]
    fn unknown_type_is_a_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configs.toml");
        fs::write(
            &path,
            "[[g]]\nname = \"X\"\nsection = \"S\"\nkey = \"x\"\ntype = \"color\"\n",
        )
        .unwrap();
        assert!(matches!(
            Registry::load(&path),
            Err(ConfigError::Schema { .. })
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let opt = ConfigOption::new("A", "S", "a", "", ValueType::Str);
        let err = OptionSet::new("g", vec![opt.clone(), opt]).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateOption { .. }));
    }

    #[test]
    fn unknown_option_names_the_group() {
        let set = OptionSet::new("gus", Vec::new()).unwrap();
        assert_eq!(
            set.get("Nope").unwrap_err().to_string(),
            "unknown option `Nope` in `gus`"
        );
    }

    #[test]
    fn accept_widens_ints_for_floats() {
        let opt = ConfigOption::new("F", "S", "f", "1.0", ValueType::Float);
        assert_eq!(opt.accept(&Value::Int(2)).unwrap(), Value::Float(2.0));
        assert!(opt.accept(&Value::Bool(true)).is_err());
    }
}

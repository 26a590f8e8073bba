//! Typed option values and their on-disk text form.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Declared type of an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    #[serde(alias = "string")]
    Str,
    #[serde(alias = "integer")]
    Int,
    #[serde(alias = "boolean")]
    Bool,
    List,
    Float,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueType::Str => "str",
            ValueType::Int => "int",
            ValueType::Bool => "bool",
            ValueType::List => "list",
            ValueType::Float => "float",
        })
    }
}

/// A typed option value.
///
/// An empty `Str` stands for "unset" whatever the declared type is.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<String>),
    Float(f64),
}

impl Value {
    /// The unset marker.
    pub fn unset() -> Self {
        Value::Str(String::new())
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Value::Str(s) if s.is_empty())
    }

    /// Converts on-disk text into a value of type `kind`.
    ///
    /// Empty text is unset. Booleans accept `1`, `true`, `yes` and `on` in
    /// any case as true and anything else as false. Lists are comma
    /// separated.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] when an int or float does not parse.
    pub fn parse(name: &str, text: &str, kind: ValueType) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(match kind {
                ValueType::List => Value::List(Vec::new()),
                _ => Value::unset(),
            });
        }
        let invalid = || ConfigError::InvalidValue {
            name: name.to_string(),
            value: text.to_string(),
            expected: kind,
        };
        Ok(match kind {
            ValueType::Str => Value::Str(text.to_string()),
            ValueType::Int => Value::Int(text.parse().map_err(|_| invalid())?),
            ValueType::Float => Value::Float(text.parse().map_err(|_| invalid())?),
            ValueType::Bool => Value::Bool(matches!(
                text.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )),
            ValueType::List => Value::List(
                text.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            ),
        })
    }

    /// Renders the value the way the target engine writes it.
    pub fn to_text(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::List(items) => items.join(","),
            Value::Float(f) => format!("{f:.6}"),
        }
    }

    /// Whether this value may be stored in an option of type `kind`.
    pub fn conforms(&self, kind: ValueType) -> bool {
        if self.is_unset() {
            return true;
        }
        matches!(
            (self, kind),
            (Value::Str(_), ValueType::Str)
                | (Value::Int(_), ValueType::Int)
                | (Value::Bool(_), ValueType::Bool)
                | (Value::List(_), ValueType::List)
                | (Value::Float(_), ValueType::Float)
                | (Value::Int(_), ValueType::Float)
        )
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_type() {
        assert_eq!(Value::parse("n", "42", ValueType::Int).unwrap(), Value::Int(42));
        assert_eq!(Value::parse("n", "YES", ValueType::Bool).unwrap(), Value::Bool(true));
        assert_eq!(Value::parse("n", "off", ValueType::Bool).unwrap(), Value::Bool(false));
        assert_eq!(
            Value::parse("n", "1.5", ValueType::Float).unwrap(),
            Value::Float(1.5)
        );
        assert_eq!(
            Value::parse("n", "a, b,,c", ValueType::List).unwrap(),
            Value::List(vec!["a".into(), "b".into(), "c".into()])
        );
    }

    #[test]
    fn empty_text_is_unset() {
        assert!(Value::parse("n", "  ", ValueType::Int).unwrap().is_unset());
        assert!(Value::parse("n", "", ValueType::Bool).unwrap().is_unset());
        assert_eq!(
            Value::parse("n", "", ValueType::List).unwrap(),
            Value::List(Vec::new())
        );
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let err = Value::parse("Port", "abc", ValueType::Int).unwrap_err();
        assert_eq!(err.to_string(), "invalid int value `abc` for `Port`");
    }

    #[test]
    fn renders_engine_text() {
        assert_eq!(Value::Bool(true).to_text(), "True");
        assert_eq!(Value::Bool(false).to_text(), "False");
        assert_eq!(Value::Float(1.0).to_text(), "1.000000");
        assert_eq!(Value::Float(0.25).to_text(), "0.250000");
        assert_eq!(Value::List(vec!["1".into(), "2".into()]).to_text(), "1,2");
    }

    #[test]
    fn conformance() {
        assert!(Value::unset().conforms(ValueType::Int));
        assert!(Value::Int(3).conforms(ValueType::Float));
        assert!(!Value::Str("x".into()).conforms(ValueType::Bool));
    }

    #[test]
    fn serializes_untagged() {
        let json = serde_json::to_string(&vec![
            Value::Int(1),
            Value::Bool(false),
            Value::Str("a".into()),
        ])
        .unwrap();
        assert_eq!(json, r#"[1,false,"a"]"#);
    }
}

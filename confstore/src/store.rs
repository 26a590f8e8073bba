//! The store contract shared by every backing medium.

use crate::{
    error::Result,
    option::OptionSet,
    value::{Value, ValueType},
};

/// A set of typed options bound to one backing medium.
///
/// Reads on a store that has not been loaded see only defaults. Writes load
/// the store first so the backing file is never clobbered by an empty model.
pub trait ConfigStore {
    /// The options this store answers for.
    fn options(&self) -> &OptionSet;

    /// Current value, or the typed default when unset.
    ///
    /// # Errors
    ///
    /// [`UnknownOption`](crate::ConfigError::UnknownOption) when `name` is
    /// not registered here, [`InvalidValue`](crate::ConfigError::InvalidValue)
    /// when the stored text does not convert.
    fn get_value(&self, name: &str) -> Result<Value>;

    /// Stores `value`, returning whether anything changed.
    ///
    /// Setting the current value again is a no-op and returns `false`.
    fn set_value(&mut self, name: &str, value: &Value) -> Result<bool>;

    /// Whether a non-empty value is stored for `name`.
    fn has_value(&self, name: &str) -> bool;

    /// Whether the backing medium exists at all.
    fn exists(&self) -> bool;

    fn is_loaded(&self) -> bool;

    /// Reads the backing medium into memory.
    fn load(&mut self) -> Result<()>;

    /// Writes pending changes. Does nothing when there are none.
    fn save(&mut self) -> Result<()>;

    /// Whether there are changes not yet saved.
    fn is_dirty(&self) -> bool;

    fn ensure_loaded(&mut self) -> Result<()> {
        if !self.is_loaded() {
            self.load()?;
        }
        Ok(())
    }

    fn group(&self) -> &str {
        self.options().group()
    }

    fn contains(&self, name: &str) -> bool {
        self.options().contains(name)
    }

    fn get_default(&self, name: &str) -> Result<Value> {
        self.options().get(name)?.default_value()
    }

    fn get_type(&self, name: &str) -> Result<ValueType> {
        Ok(self.options().get(name)?.kind)
    }

    fn get_help(&self, name: &str) -> Result<&str> {
        Ok(&self.options().get(name)?.help)
    }

    fn get_choices(&self, name: &str) -> Result<Option<&[String]>> {
        Ok(self.options().get(name)?.choices.as_deref())
    }
}

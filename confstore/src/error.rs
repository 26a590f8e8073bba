//! Error types for configuration stores.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::value::ValueType;

/// Errors raised by option registries and stores.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The option is not registered in the store that was asked.
    #[error("unknown option `{name}` in `{group}`")]
    UnknownOption { group: String, name: String },

    /// Two registered options share one name.
    #[error("option `{name}` is declared by both `{first}` and `{second}`")]
    DuplicateOption {
        name: String,
        first: String,
        second: String,
    },

    /// The backing file does not exist, so writes are skipped.
    #[error("{} does not exist", path.display())]
    StoreUnavailable { path: PathBuf },

    /// A value does not convert to the option's declared type.
    #[error("invalid {expected} value `{value}` for `{name}`")]
    InvalidValue {
        name: String,
        value: String,
        expected: ValueType,
    },

    /// The backing file could not be parsed.
    #[error("{}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ueini::ParseError,
    },

    #[error(transparent)]
    Edit(#[from] ueini::EditError),

    /// The launch line captured at load time is no longer in the file.
    #[error("no line starting with `{prefix}` in {}", path.display())]
    PrefixNotFound { path: PathBuf, prefix: String },

    /// Writing, renaming or re-owning the target failed. The target is untouched.
    #[error("failed to write {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    /// The option schema file is malformed.
    #[error("schema {}: {message}", path.display())]
    Schema { path: PathBuf, message: String },
}

/// Result alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

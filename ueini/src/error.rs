//! Error types for parsing and editing documents.

use thiserror::Error;

/// Errors raised while parsing a document.
///
/// Line numbers are 1-based and refer to the input text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A parenthesized value mixes bare items and `key=value` pairs at one level.
    #[error("line {line}: struct value mixes list items and key=value pairs")]
    MixedStruct { line: usize },

    /// Parentheses inside a struct value do not balance.
    #[error("line {line}: unbalanced parentheses in struct value")]
    UnbalancedParens { line: usize },

    /// A quoted string inside a struct value is never closed.
    #[error("line {line}: unterminated quote in struct value")]
    UnterminatedQuote { line: usize },

    /// An assignment line with nothing before the `=`.
    #[error("line {line}: assignment without a key")]
    MissingKey { line: usize },
}

/// Errors raised while editing struct fields.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    /// The path walks into a list where a keyed struct was expected.
    #[error("`{path}` does not address a keyed struct")]
    NotAMap { path: String },

    /// The field path is empty or has an empty component.
    #[error("empty field path")]
    EmptyPath,
}

/// Result alias for parsing.
pub type Result<T> = std::result::Result<T, ParseError>;

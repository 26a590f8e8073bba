//! # ueini
//!
//! Round-trip parser and serializer for Unreal Engine style ini files.
//!
//! The format is the usual `[Section]` / `key=value` layout with a few
//! engine specific additions:
//!
//! - parenthesized struct values such as `(A=1,B="x,y",C=(D=2))` or `(1,2,3)`
//! - `+key=value` lines that append to a key instead of replacing it
//! - the same key repeated inside one section, read back as an ordered list
//! - `;` comment lines
//!
//! Untouched lines are written back exactly as they were read, so editing
//! one key does not produce a diff anywhere else in the file. The first
//! line terminator (`\n` or `\r\n`) is used for every line written. Blank
//! lines are not retained as entries; headers and comments remember whether
//! one preceded them.
//!
//! ## Quick Start
//!
//! ```rust
//! use ueini::Document;
//!
//! let mut doc = Document::parse("[Foo]\nBar=1\nBar=2\n").unwrap();
//! assert_eq!(doc.values("Foo", "Bar"), ["1", "2"]);
//!
//! doc.set_values("Foo", "Bar", &["1".into(), "2".into(), "3".into()]).unwrap();
//! assert_eq!(doc.to_string(), "[Foo]\nBar=1\nBar=2\nBar=3\n");
//! ```
//!
//! ## Modules
//!
//! - [`composite`] - Struct value grammar
//! - [`document`] - Document model, parser and serializer
//! - [`error`] - Error types

/// Struct value grammar.
pub mod composite;

/// Document model, parser and serializer.
pub mod document;

/// Error types for parsing and editing.
pub mod error;

pub use composite::{Composite, Field};
pub use document::{Document, Entry, Item, LineEnding, Mode, Pair, Section};
pub use error::{EditError, ParseError, Result};

//! Document model, line parser and serializer.

use std::fmt;

use crate::{
    composite::{Composite, Field, strip_parens},
    error::{EditError, ParseError, Result},
};

/// The value side of an assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    /// Text after the `=`, trimmed.
    Scalar(String),
    /// A parenthesized struct value.
    Struct(Composite),
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Scalar(s) => f.write_str(s),
            Item::Struct(c) => c.fmt(f),
        }
    }
}

/// A `key=value` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub key: String,
    /// Written as `+key=value`.
    pub additive: bool,
    pub value: Item,
    /// The line as read; cleared once the pair is edited.
    raw: Option<String>,
}

impl Pair {
    fn fresh(key: &str, additive: bool, value: Item) -> Self {
        Self {
            key: key.to_string(),
            additive,
            value,
            raw: None,
        }
    }
}

/// One retained line of a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A `;` line, kept verbatim. `gap` records a blank line before it.
    Comment { text: String, gap: bool },
    /// Any other line without an assignment, kept verbatim.
    Verbatim(String),
    Pair(Pair),
}

/// A run of entries under one header.
///
/// The first section of a document has no name when lines precede the
/// first header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: Option<String>,
    header: Option<String>,
    /// A blank line preceded the header in the source.
    gap: bool,
    pub entries: Vec<Entry>,
}

impl Section {
    fn new(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            header: None,
            gap: true,
            entries: Vec::new(),
        }
    }

    fn pairs<'a, 'k>(&'a self, key: &'k str) -> impl Iterator<Item = &'a Pair> + use<'a, 'k> {
        self.entries.iter().filter_map(move |e| match e {
            Entry::Pair(p) if p.key == key => Some(p),
            _ => None,
        })
    }

    fn positions(&self, key: &str) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| match e {
                Entry::Pair(p) if p.key == key => Some(i),
                _ => None,
            })
            .collect()
    }
}

/// How assignment values are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Parenthesized values are parsed as structs.
    #[default]
    Structured,
    /// Every value is plain text.
    Plain,
}

/// Line terminator used when writing a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    /// The terminator of the first line in `text`.
    pub fn detect(text: &str) -> Self {
        match text.find('\n') {
            Some(i) if text[..i].ends_with('\r') => LineEnding::CrLf,
            _ => LineEnding::Lf,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// An ordered, round-trippable ini document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    sections: Vec<Section>,
    mode: Mode,
    newline: LineEnding,
    additive: bool,
    changed: bool,
}

impl Document {
    /// Creates an empty document.
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Parses text with struct values enabled.
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_with(text, Mode::Structured)
    }

    /// Parses text treating every value as plain text.
    pub fn parse_plain(text: &str) -> Result<Self> {
        Self::parse_with(text, Mode::Plain)
    }

    /// Parses `text` line by line.
    ///
    /// Blank lines are dropped; headers and comments remember whether one
    /// preceded them. The first line terminator decides the one written back.
    /// A `+` key marks the whole document as additive-capable.
    ///
    /// A value that looks parenthesized but does not balance is kept as a
    /// scalar.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] when a struct value mixes list items and
    /// `key=value` pairs, or on an assignment without a key.
    pub fn parse_with(text: &str, mode: Mode) -> Result<Self> {
        let mut doc = Self::new(mode);
        doc.newline = LineEnding::detect(text);
        let mut current = Section {
            name: None,
            header: None,
            gap: false,
            entries: Vec::new(),
        };
        let mut blank = false;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let raw = raw.trim_end_matches('\r');
            let line = raw.trim();

            if line.is_empty() {
                blank = true;
                continue;
            }
            let gap = std::mem::take(&mut blank);
            if line.starts_with(';') {
                current.entries.push(Entry::Comment {
                    text: raw.to_string(),
                    gap,
                });
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                let next = Section {
                    name: Some(line[1..line.len() - 1].trim().to_string()),
                    header: Some(raw.to_string()),
                    gap,
                    entries: Vec::new(),
                };
                let done = std::mem::replace(&mut current, next);
                if done.name.is_some() || !done.entries.is_empty() {
                    doc.sections.push(done);
                }
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                current.entries.push(Entry::Verbatim(raw.to_string()));
                continue;
            };

            let mut key = key.trim();
            let additive = key.starts_with('+');
            if additive {
                key = key[1..].trim_start();
                doc.additive = true;
            }
            if key.is_empty() {
                return Err(ParseError::MissingKey { line: line_no });
            }
            let value = doc.parse_item(value.trim(), line_no)?;
            current.entries.push(Entry::Pair(Pair {
                key: key.to_string(),
                additive,
                value,
                raw: Some(raw.to_string()),
            }));
        }

        if current.name.is_some() || !current.entries.is_empty() {
            doc.sections.push(current);
        }
        Ok(doc)
    }

    fn parse_item(&self, value: &str, line: usize) -> Result<Item> {
        if self.mode == Mode::Structured {
            let parsed = strip_parens(value, line)
                .and_then(|inner| inner.map(|i| Composite::parse(i, line)).transpose());
            match parsed {
                Ok(Some(c)) => return Ok(Item::Struct(c)),
                Err(e @ ParseError::MixedStruct { .. }) => return Err(e),
                // unbalanced text is an ordinary value
                Ok(None) | Err(_) => {}
            }
        }
        Ok(Item::Scalar(value.to_string()))
    }

    /// Terminator written after every line.
    pub fn line_ending(&self) -> LineEnding {
        self.newline
    }

    pub fn set_line_ending(&mut self, newline: LineEnding) {
        if self.newline != newline {
            self.newline = newline;
            self.changed = true;
        }
    }

    /// Whether any `+key` line was seen.
    pub fn is_additive(&self) -> bool {
        self.additive
    }

    /// Whether an edit changed content since parsing or the last [`Document::mark_saved`].
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Clears the change flag after a successful write.
    pub fn mark_saved(&mut self) {
        self.changed = false;
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// First section named `name`.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.name.as_deref() == Some(name))
    }

    fn section_index(&self, name: &str) -> Option<usize> {
        self.sections
            .iter()
            .position(|s| s.name.as_deref() == Some(name))
    }

    /// Text of the first occurrence of `key`.
    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        self.section(section)?
            .pairs(key)
            .next()
            .map(|p| p.value.to_string())
    }

    /// Text of every occurrence of `key`, in file order.
    pub fn values(&self, section: &str, key: &str) -> Vec<String> {
        self.section(section)
            .map(|s| s.pairs(key).map(|p| p.value.to_string()).collect())
            .unwrap_or_default()
    }

    /// The struct held by the last struct-valued occurrence of `key`.
    pub fn get_struct(&self, section: &str, key: &str) -> Option<&Composite> {
        self.section(section)?
            .pairs(key)
            .filter_map(|p| match &p.value {
                Item::Struct(c) => Some(c),
                Item::Scalar(_) => None,
            })
            .last()
    }

    /// Reads a struct field addressed as `key/field[/field...]`.
    pub fn get_field(&self, section: &str, path: &str) -> Option<String> {
        let mut parts = path.split('/');
        let key = parts.next()?;
        let rest: Vec<&str> = parts.collect();
        let field = self.get_struct(section, key)?.lookup(&rest)?;
        Some(field.to_string_unquoted())
    }

    /// Sets a single value, see [`Document::set_values`].
    pub fn set(&mut self, section: &str, key: &str, value: &str) -> Result<()> {
        self.set_values(section, key, &[value.to_string()])
    }

    /// Writes `values` onto the occurrences of `key` in `section`.
    ///
    /// Value `i` replaces occurrence `i` in place. Values beyond the
    /// existing occurrences are appended after the last one (or at the end
    /// of the section), with `+` on every line after the first when the
    /// document is additive-capable. A missing section is appended.
    /// Occurrences beyond `values.len()` are left as they are.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::MixedStruct`] when a struct value mixes list
    /// items and `key=value` pairs.
    pub fn set_values(&mut self, section: &str, key: &str, values: &[String]) -> Result<()> {
        let items = values
            .iter()
            .map(|v| self.parse_item(v.trim(), 0))
            .collect::<Result<Vec<_>>>()?;

        let idx = match self.section_index(section) {
            Some(idx) => idx,
            None => {
                if items.is_empty() {
                    return Ok(());
                }
                self.sections.push(Section::new(section));
                self.changed = true;
                self.sections.len() - 1
            }
        };
        let additive = self.additive;
        let sect = &mut self.sections[idx];
        let positions = sect.positions(key);

        let mut insert_at = positions
            .last()
            .map(|p| p + 1)
            .unwrap_or(sect.entries.len());
        let mut changed = false;

        for (i, item) in items.into_iter().enumerate() {
            match positions.get(i) {
                Some(&pos) => {
                    if let Entry::Pair(pair) = &mut sect.entries[pos] {
                        if pair.value != item {
                            pair.value = item;
                            pair.raw = None;
                            changed = true;
                        }
                    }
                }
                None => {
                    let pair = Pair::fresh(key, additive && i > 0, item);
                    sect.entries.insert(insert_at, Entry::Pair(pair));
                    insert_at += 1;
                    changed = true;
                }
            }
        }

        self.changed |= changed;
        Ok(())
    }

    /// Sets one field of a struct value addressed as `key/field[/field...]`.
    ///
    /// Edits the last struct occurrence of `key`, matching what
    /// [`Document::get_field`] reads. Creates the key when absent.
    pub fn set_field(
        &mut self,
        section: &str,
        path: &str,
        value: &str,
    ) -> std::result::Result<(), EditError> {
        let mut parts = path.split('/');
        let key = parts.next().filter(|k| !k.is_empty()).ok_or(EditError::EmptyPath)?;
        let rest: Vec<&str> = parts.collect();

        if self.get_field(section, path).as_deref() == Some(value) {
            return Ok(());
        }

        let idx = match self.section_index(section) {
            Some(idx) => idx,
            None => {
                self.sections.push(Section::new(section));
                self.sections.len() - 1
            }
        };
        let sect = &mut self.sections[idx];

        let last_struct = sect.entries.iter_mut().rev().find_map(|e| match e {
            Entry::Pair(p) if p.key == key && matches!(p.value, Item::Struct(_)) => Some(p),
            _ => None,
        });

        match last_struct {
            Some(pair) => {
                if let Item::Struct(c) = &mut pair.value {
                    c.set_path(&rest, value)?;
                }
                pair.raw = None;
            }
            None => {
                let mut c = Composite::Map(Vec::new());
                c.set_path(&rest, value)?;
                sect.entries.push(Entry::Pair(Pair::fresh(key, false, Item::Struct(c))));
            }
        }
        self.changed = true;
        Ok(())
    }
}

impl Field {
    fn to_string_unquoted(&self) -> String {
        match self {
            Field::Scalar { value, .. } => value.clone(),
            Field::Nested(c) => c.to_string(),
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nl = self.newline.as_str();
        let mut first = true;
        for section in &self.sections {
            if let Some(name) = &section.name {
                if section.gap && !first {
                    f.write_str(nl)?;
                }
                match &section.header {
                    Some(raw) => write!(f, "{raw}{nl}")?,
                    None => write!(f, "[{name}]{nl}")?,
                }
                first = false;
            }
            for entry in &section.entries {
                match entry {
                    Entry::Comment { text, gap } => {
                        if *gap && !first {
                            f.write_str(nl)?;
                        }
                        write!(f, "{text}{nl}")?;
                    }
                    Entry::Verbatim(raw) => write!(f, "{raw}{nl}")?,
                    Entry::Pair(Pair { raw: Some(raw), .. }) => write!(f, "{raw}{nl}")?,
                    Entry::Pair(p) => {
                        let op = if p.additive { "+" } else { "" };
                        write!(f, "{op}{}={}{nl}", p.key, p.value)?;
                    }
                }
                first = false;
            }
        }
        Ok(())
    }
}

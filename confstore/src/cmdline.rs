//! Configuration embedded in a service's launch command line.
//!
//! The arguments portion of a launch line looks like
//!
//! ```text
//! TheIsland_WP?listen?SessionName="My Server"?RCONPort=27020 -mods=123,456 -NoBattlEye
//! ```
//!
//! Options come first, separated by `?`. The first unquoted space ends the
//! options; after it come `-` prefixed flags separated by spaces. Both
//! accept `key=value` and bare `key`. Quotes let a value carry separators.

use std::{collections::HashMap, fs, path::Path};

use regex::Regex;

use crate::{
    error::{ConfigError, Result},
    option::OptionSet,
    persist::atomic_write,
    store::ConfigStore,
    value::{Value, ValueType},
};

/// Section name of `?` separated options in the schema.
pub const OPTION_SECTION: &str = "option";
/// Section name of `-` prefixed flags in the schema.
pub const FLAG_SECTION: &str = "flag";

/// Separator written between a flag and its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlagSeparator {
    /// `-key=value`
    #[default]
    Equals,
    /// `-key value`
    Space,
}

/// One option or flag. A bare key has no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub key: String,
    pub value: Option<String>,
}

impl Token {
    pub fn new(key: &str, value: Option<&str>) -> Self {
        Self {
            key: key.to_string(),
            value: value.map(String::from),
        }
    }
}

/// Options and flags in the order they appear.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    pub options: Vec<Token>,
    pub flags: Vec<Token>,
}

#[derive(PartialEq)]
enum Phase {
    Options,
    Flags,
}

impl CommandLine {
    /// Splits an argument string into options and flags.
    pub fn tokenize(args: &str, separator: FlagSeparator) -> Self {
        let mut line = Self::default();
        let mut phase = Phase::Options;
        let mut quote: Option<char> = None;
        let mut param = String::new();
        let mut dashed = false;

        for c in args.chars() {
            if let Some(q) = quote {
                if c == q {
                    quote = None;
                } else {
                    param.push(c);
                }
                continue;
            }
            match c {
                '"' | '\'' => quote = Some(c),
                '?' if phase == Phase::Options => line.flush_option(&mut param),
                ' ' if phase == Phase::Options => {
                    line.flush_option(&mut param);
                    phase = Phase::Flags;
                }
                '-' if param.is_empty() && !dashed => {
                    // a leading dash starts a flag, even with no options before it
                    line.flush_option(&mut param);
                    phase = Phase::Flags;
                    dashed = true;
                }
                ' ' => line.flush_flag(&mut param, &mut dashed, separator),
                _ => param.push(c),
            }
        }
        match phase {
            Phase::Options => line.flush_option(&mut param),
            Phase::Flags => line.flush_flag(&mut param, &mut dashed, separator),
        }
        line
    }

    fn flush_option(&mut self, param: &mut String) {
        if !param.is_empty() {
            self.options.push(split_token(param));
            param.clear();
        }
    }

    fn flush_flag(&mut self, param: &mut String, dashed: &mut bool, separator: FlagSeparator) {
        if param.is_empty() {
            return;
        }
        let pending_value = separator == FlagSeparator::Space
            && !*dashed
            && self.flags.last().is_some_and(|t| t.value.is_none());
        if pending_value {
            if let Some(last) = self.flags.last_mut() {
                last.value = Some(param.clone());
            }
        } else if *dashed || separator == FlagSeparator::Equals {
            // `-key=value` reads the same under either separator
            self.flags.push(split_token(param));
        } else {
            self.flags.push(Token {
                key: param.clone(),
                value: None,
            });
        }
        param.clear();
        *dashed = false;
    }

    /// Joins the tokens back into an argument string.
    pub fn render(&self, separator: FlagSeparator) -> String {
        let options: Vec<String> = self
            .options
            .iter()
            .map(|t| match &t.value {
                Some(v) => format!("{}={}", t.key, quote(v)),
                None => t.key.clone(),
            })
            .collect();
        let flags: Vec<String> = self
            .flags
            .iter()
            .map(|t| match (&t.value, separator) {
                (Some(v), FlagSeparator::Equals) => format!("-{}={}", t.key, quote(v)),
                (Some(v), FlagSeparator::Space) => format!("-{} {}", t.key, quote(v)),
                (None, _) => format!("-{}", t.key),
            })
            .collect();

        let mut out = options.join("?");
        if !flags.is_empty() {
            out.push(' ');
            out.push_str(&flags.join(" "));
        }
        out
    }
}

fn split_token(param: &str) -> Token {
    match param.split_once('=') {
        Some((k, v)) => Token::new(k, Some(v)),
        None => Token::new(param, None),
    }
}

/// Quotes `value` when it holds a character the tokenizer would split on.
pub fn quote(value: &str) -> String {
    if value.contains('"') {
        format!("'{value}'")
    } else if value.contains(['\'', ' ', '?', '=', '-']) {
        format!("\"{value}\"")
    } else {
        value.to_string()
    }
}

/// Store over the launch line inside a service definition file.
///
/// `pattern` must match the launch line and capture the arguments in a
/// group named `args`. Everything before that group is kept as the line's
/// fixed prefix; saving rewrites only the arguments of the line that still
/// starts with it. Tokens without a registered option are carried through
/// unchanged.
#[derive(Debug)]
pub struct CommandLineStore {
    options: OptionSet,
    path: std::path::PathBuf,
    pattern: Regex,
    separator: FlagSeparator,
    prefix: Option<String>,
    captures: HashMap<String, String>,
    values: HashMap<String, String>,
    extra: CommandLine,
    loaded: bool,
    dirty: bool,
}

impl CommandLineStore {
    pub fn new(options: OptionSet, path: &Path, pattern: Regex, separator: FlagSeparator) -> Self {
        Self {
            options,
            path: path.to_path_buf(),
            pattern,
            separator,
            prefix: None,
            captures: HashMap::new(),
            values: HashMap::new(),
            extra: CommandLine::default(),
            loaded: false,
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A named group of the launch line other than `args`, such as the map.
    pub fn capture(&self, group: &str) -> Option<&str> {
        self.captures.get(group).map(String::as_str)
    }

    /// Loads from an argument string directly.
    pub fn load_args(&mut self, args: &str) {
        self.values.clear();
        self.extra = CommandLine::default();
        let line = CommandLine::tokenize(args, self.separator);

        for (tokens, section) in [(line.options, OPTION_SECTION), (line.flags, FLAG_SECTION)] {
            for token in tokens {
                let Some(opt) = self.options.by_key(&token.key) else {
                    debug!("keeping unregistered {section} `{}`", token.key);
                    match section {
                        OPTION_SECTION => self.extra.options.push(token),
                        _ => self.extra.flags.push(token),
                    }
                    continue;
                };
                if opt.section != section {
                    warn!(
                        "`{}` is declared as {} but given as {section}",
                        token.key, opt.section
                    );
                    continue;
                }
                let text = match (token.value, opt.kind) {
                    (None, ValueType::Bool) => "True".to_string(),
                    (Some(v), _) => v,
                    (None, _) => String::new(),
                };
                self.values.insert(opt.name.clone(), text);
            }
        }
        self.loaded = true;
        self.dirty = false;
    }

    /// The current arguments portion of the launch line.
    pub fn render(&self) -> String {
        let mut line = CommandLine::default();
        for opt in self.options.iter() {
            let Some(text) = self.values.get(&opt.name).filter(|t| !t.is_empty()) else {
                continue;
            };
            let token = match opt.kind {
                ValueType::Bool => {
                    let on = Value::parse(&opt.name, text, ValueType::Bool)
                        .is_ok_and(|v| v == Value::Bool(true));
                    if !on {
                        continue;
                    }
                    Token::new(&opt.key, None)
                }
                _ => Token::new(&opt.key, Some(text)),
            };
            match opt.section.as_str() {
                FLAG_SECTION => line.flags.push(token),
                _ => line.options.push(token),
            }
        }
        line.options.extend(self.extra.options.iter().cloned());
        line.flags.extend(self.extra.flags.iter().cloned());
        line.render(self.separator)
    }
}

impl ConfigStore for CommandLineStore {
    fn options(&self) -> &OptionSet {
        &self.options
    }

    fn get_value(&self, name: &str) -> Result<Value> {
        let opt = self.options.get(name)?;
        opt.typed(self.values.get(name).map(String::as_str))
    }

    fn set_value(&mut self, name: &str, value: &Value) -> Result<bool> {
        let value = self.options.get(name)?.accept(value)?;
        self.ensure_loaded()?;
        if self.get_value(name)? == value {
            return Ok(false);
        }
        self.values.insert(name.to_string(), value.to_text());
        self.dirty = true;
        Ok(true)
    }

    fn has_value(&self, name: &str) -> bool {
        self.options.contains(name) && self.values.get(name).is_some_and(|v| !v.is_empty())
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Finds the launch line and tokenizes its arguments.
    ///
    /// A missing file loads as empty.
    fn load(&mut self) -> Result<()> {
        if !self.exists() {
            debug!("{} not found, using defaults", self.path.display());
            self.load_args("");
            return Ok(());
        }
        let content = fs::read_to_string(&self.path)?;
        let found = content.lines().find_map(|line| {
            let caps = self.pattern.captures(line)?;
            let args = caps.name("args")?;
            let named = self
                .pattern
                .capture_names()
                .flatten()
                .filter(|n| *n != "args")
                .filter_map(|n| Some((n.to_string(), caps.name(n)?.as_str().trim().to_string())))
                .collect::<HashMap<_, _>>();
            Some((
                line[..args.start()].to_string(),
                args.as_str().to_string(),
                named,
            ))
        });

        match found {
            Some((prefix, args, named)) => {
                self.prefix = Some(prefix);
                self.captures = named;
                self.load_args(&args);
            }
            None => {
                warn!("no launch line in {}", self.path.display());
                self.prefix = None;
                self.load_args("");
            }
        }
        Ok(())
    }

    /// Rewrites the launch line, leaving every other line untouched.
    fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let missing = || ConfigError::PrefixNotFound {
            path: self.path.clone(),
            prefix: self.prefix.clone().unwrap_or_default(),
        };
        let prefix = self.prefix.as_deref().ok_or_else(missing)?;
        let content = fs::read_to_string(&self.path)?;

        let mut replaced = false;
        let mut out = String::with_capacity(content.len());
        for line in content.lines() {
            if !replaced && line.starts_with(prefix) {
                out.push_str(prefix);
                out.push_str(&self.render());
                replaced = true;
            } else {
                out.push_str(line);
            }
            out.push('\n');
        }
        if !replaced {
            return Err(missing());
        }

        atomic_write(&self.path, &out)?;
        self.dirty = false;
        info!("saved {}", self.path.display());
        Ok(())
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }
}

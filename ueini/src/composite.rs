//! Struct grammar for parenthesized values.
//!
//! A struct value is the text between an outer pair of parentheses, for
//! example `(A=1,B="x,y",C=(D=2))` or `(1,2,3)`. Items are separated by
//! top-level commas. Quotes and nested parentheses suppress splitting.
//! A level is either a keyed map or a bare list, never both.

use std::fmt;

use crate::error::{EditError, ParseError, Result};

/// One item inside a struct value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// A plain value, remembering the quote character it was written with.
    Scalar { value: String, quote: Option<char> },
    /// A nested parenthesized struct.
    Nested(Composite),
}

/// A parsed struct value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Composite {
    /// Bare comma separated items.
    List(Vec<Field>),
    /// `key=value` items in file order.
    Map(Vec<(String, Field)>),
}

fn walk(text: &str, line: usize, mut visit: impl FnMut(usize, char, usize)) -> Result<()> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut prev: Option<char> = None;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
                prev = Some(c);
            }
            continue;
        }
        match c {
            // a quote only opens at the start of a value
            '"' | '\'' if matches!(prev, None | Some('(' | ',' | '=')) => quote = Some(c),
            '(' => {
                visit(i, c, depth);
                depth += 1;
            }
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or(ParseError::UnbalancedParens { line })?;
                visit(i, c, depth);
            }
            _ => visit(i, c, depth),
        }
        if !c.is_whitespace() {
            prev = Some(c);
        }
    }

    if quote.is_some() {
        return Err(ParseError::UnterminatedQuote { line });
    }
    if depth != 0 {
        return Err(ParseError::UnbalancedParens { line });
    }
    Ok(())
}

fn split_top_level(text: &str, line: usize) -> Result<Vec<&str>> {
    let mut cuts = Vec::new();
    walk(text, line, |i, c, depth| {
        if c == ',' && depth == 0 {
            cuts.push(i);
        }
    })?;

    let mut parts = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts {
        parts.push(&text[start..cut]);
        start = cut + 1;
    }
    parts.push(&text[start..]);
    Ok(parts)
}

fn find_top_level_eq(text: &str, line: usize) -> Result<Option<usize>> {
    let mut found = None;
    walk(text, line, |i, c, depth| {
        if c == '=' && depth == 0 && found.is_none() {
            found = Some(i);
        }
    })?;
    Ok(found)
}

/// Returns the interior of `text` when the whole of it is one parenthesized group.
///
/// `(a)(b)` is not a single group and yields `None`.
pub(crate) fn strip_parens(text: &str, line: usize) -> Result<Option<&str>> {
    if !(text.starts_with('(') && text.ends_with(')')) || text.len() < 2 {
        return Ok(None);
    }
    let mut close = None;
    walk(text, line, |i, c, depth| {
        if c == ')' && depth == 0 && close.is_none() {
            close = Some(i);
        }
    })?;
    if close == Some(text.len() - 1) {
        Ok(Some(&text[1..text.len() - 1]))
    } else {
        Ok(None)
    }
}

fn strip_quotes(text: &str) -> Option<(char, &str)> {
    let first = text.chars().next()?;
    if (first == '"' || first == '\'') && text.len() >= 2 && text.ends_with(first) {
        Some((first, &text[1..text.len() - 1]))
    } else {
        None
    }
}

impl Field {
    /// Parses one item, recursing into parentheses and unwrapping quotes.
    pub fn parse(text: &str, line: usize) -> Result<Self> {
        let text = text.trim();
        if let Some(inner) = strip_parens(text, line)? {
            return Ok(Field::Nested(Composite::parse(inner, line)?));
        }
        Ok(match strip_quotes(text) {
            Some((q, inner)) => Field::Scalar {
                value: inner.to_string(),
                quote: Some(q),
            },
            None => Field::Scalar {
                value: text.to_string(),
                quote: None,
            },
        })
    }

    /// Builds a scalar, quoting it when the text would otherwise be split.
    pub fn text(value: &str) -> Self {
        let needs_quote = value
            .chars()
            .any(|c| matches!(c, ',' | '=' | '(' | ')') || c.is_whitespace());
        let quote = match (needs_quote, value.contains('"')) {
            (false, _) => None,
            (true, false) => Some('"'),
            (true, true) => Some('\''),
        };
        Field::Scalar {
            value: value.to_string(),
            quote,
        }
    }

    /// The unquoted value of a scalar item.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Field::Scalar { value, .. } => Some(value),
            Field::Nested(_) => None,
        }
    }

    /// The nested struct, if this item is one.
    pub fn as_composite(&self) -> Option<&Composite> {
        match self {
            Field::Nested(c) => Some(c),
            Field::Scalar { .. } => None,
        }
    }
}

impl Composite {
    /// Parses the interior of a struct value, without its outer parentheses.
    ///
    /// # Errors
    ///
    /// [`ParseError::MixedStruct`] when bare items and `key=value` items share
    /// a level, plus quote and parenthesis balance errors.
    pub fn parse(inner: &str, line: usize) -> Result<Self> {
        let mut list = Vec::new();
        let mut map = Vec::new();

        for token in split_top_level(inner, line)? {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            match find_top_level_eq(token, line)? {
                Some(eq) => {
                    let key = token[..eq].trim();
                    if key.is_empty() {
                        return Err(ParseError::MissingKey { line });
                    }
                    map.push((key.to_string(), Field::parse(&token[eq + 1..], line)?));
                }
                None => list.push(Field::parse(token, line)?),
            }
            if !list.is_empty() && !map.is_empty() {
                return Err(ParseError::MixedStruct { line });
            }
        }

        Ok(if map.is_empty() {
            Composite::List(list)
        } else {
            Composite::Map(map)
        })
    }

    /// Looks up a keyed item on this level.
    pub fn get(&self, key: &str) -> Option<&Field> {
        match self {
            Composite::Map(pairs) => pairs.iter().find(|(k, _)| k == key).map(|(_, f)| f),
            Composite::List(_) => None,
        }
    }

    /// Walks nested maps along `path`.
    pub fn lookup(&self, path: &[&str]) -> Option<&Field> {
        let (first, rest) = path.split_first()?;
        let field = self.get(first)?;
        if rest.is_empty() {
            Some(field)
        } else {
            field.as_composite()?.lookup(rest)
        }
    }

    /// Sets a scalar at `path`, creating intermediate maps as needed.
    ///
    /// An existing scalar keeps its quote style.
    pub fn set_path(&mut self, path: &[&str], value: &str) -> std::result::Result<(), EditError> {
        let (first, rest) = path.split_first().ok_or(EditError::EmptyPath)?;
        if first.is_empty() {
            return Err(EditError::EmptyPath);
        }
        if matches!(self, Composite::List(items) if items.is_empty()) {
            *self = Composite::Map(Vec::new());
        }
        let Composite::Map(pairs) = self else {
            return Err(EditError::NotAMap {
                path: path.join("/"),
            });
        };

        let idx = match pairs.iter().position(|(k, _)| k == first) {
            Some(idx) => idx,
            None => {
                let fresh = if rest.is_empty() {
                    Field::text(value)
                } else {
                    Field::Nested(Composite::Map(Vec::new()))
                };
                pairs.push((first.to_string(), fresh));
                pairs.len() - 1
            }
        };

        let field = &mut pairs[idx].1;
        if rest.is_empty() {
            match field {
                Field::Scalar {
                    value: v,
                    quote: Some(_),
                } => *v = value.to_string(),
                _ => *field = Field::text(value),
            }
            return Ok(());
        }

        if let Field::Scalar { .. } = field {
            *field = Field::Nested(Composite::Map(Vec::new()));
        }
        match field {
            Field::Nested(inner) => inner.set_path(rest, value),
            Field::Scalar { .. } => Err(EditError::NotAMap {
                path: path.join("/"),
            }),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Scalar {
                value,
                quote: Some(q),
            } => write!(f, "{q}{value}{q}"),
            Field::Scalar { value, quote: None } => f.write_str(value),
            Field::Nested(c) => c.fmt(f),
        }
    }
}

impl fmt::Display for Composite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        match self {
            Composite::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    item.fmt(f)?;
                }
            }
            Composite::Map(pairs) => {
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{k}={v}")?;
                }
            }
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_commas_do_not_split() {
        let c = Composite::parse(r#"A=1,B="x,y""#, 1).unwrap();
        assert_eq!(c.get("A").and_then(Field::as_str), Some("1"));
        assert_eq!(c.get("B").and_then(Field::as_str), Some("x,y"));
        assert_eq!(c.to_string(), r#"(A=1,B="x,y")"#);
    }

    #[test]
    fn bare_items_make_a_list() {
        let c = Composite::parse("1, 2 ,3", 1).unwrap();
        let Composite::List(items) = &c else {
            panic!("expected list, got {c:?}");
        };
        let values: Vec<_> = items.iter().filter_map(Field::as_str).collect();
        assert_eq!(values, ["1", "2", "3"]);
    }

    #[test]
    fn nested_structs_recurse() {
        let c = Composite::parse("Name=Rex,Stats=(Health=10.5,Tags=(a,b))", 3).unwrap();
        let health = c.lookup(&["Stats", "Health"]).and_then(Field::as_str);
        assert_eq!(health, Some("10.5"));
        let tags = c.lookup(&["Stats", "Tags"]).and_then(Field::as_composite);
        assert!(matches!(tags, Some(Composite::List(items)) if items.len() == 2));
        assert_eq!(c.to_string(), "(Name=Rex,Stats=(Health=10.5,Tags=(a,b)))");
    }

    #[test]
    fn mixing_forms_is_rejected() {
        assert_eq!(
            Composite::parse("a,B=1", 7),
            Err(ParseError::MixedStruct { line: 7 })
        );
        assert_eq!(
            Composite::parse("B=1,a", 2),
            Err(ParseError::MixedStruct { line: 2 })
        );
    }

    #[test]
    fn balance_errors() {
        assert_eq!(
            Composite::parse("A=(1,2", 4),
            Err(ParseError::UnbalancedParens { line: 4 })
        );
        assert_eq!(
            Composite::parse(r#"A="open"#, 5),
            Err(ParseError::UnterminatedQuote { line: 5 })
        );
    }

    #[test]
    fn apostrophe_inside_word_is_not_a_quote() {
        let c = Composite::parse("Msg=Don't,Other=1", 1).unwrap();
        assert_eq!(c.get("Msg").and_then(Field::as_str), Some("Don't"));
    }

    #[test]
    fn adjacent_groups_are_not_one_group() {
        assert_eq!(strip_parens("(a)(b)", 1).unwrap(), None);
        assert_eq!(strip_parens("((a),(b))", 1).unwrap(), Some("(a),(b)"));
    }

    #[test]
    fn set_path_keeps_quotes_and_creates_maps() {
        let mut c = Composite::parse(r#"A="x",B=2"#, 1).unwrap();
        c.set_path(&["A"], "y z").unwrap();
        c.set_path(&["B"], "3").unwrap();
        c.set_path(&["C", "D"], "4").unwrap();
        assert_eq!(c.to_string(), r#"(A="y z",B=3,C=(D=4))"#);

        let mut list = Composite::parse("1,2", 1).unwrap();
        assert!(matches!(
            list.set_path(&["A"], "1"),
            Err(EditError::NotAMap { .. })
        ));
        assert_eq!(c.set_path(&[], "1"), Err(EditError::EmptyPath));
    }
}

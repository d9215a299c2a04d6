// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Name templates with fallback chains.
//!
//! A template is literal text with `{...}` placeholders. A placeholder holds a
//! `|`-separated list of alternatives tried left to right, and an optional
//! format spec after `:`:
//!
//! ```text
//! {$instanceId}                     derived variable
//! {USER_UNIT|_SYSTEMD_UNIT|"other"}  record fields with a literal fallback
//! {PRIORITY:03}                     zero padded to width 3
//! {0} {}                            positional arguments
//! ```
//!
//! `{{` and `}}` produce literal braces. Templates are parsed once; rendering
//! only walks the parsed segments.

use crate::errors::{RoutingError, TemplateError};
use std::borrow::Cow;
use std::fmt;

/// A value a placeholder can render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value<'a> {
    Str(Cow<'a, str>),
    Int(i64),
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(n) => write!(f, "{n}"),
        }
    }
}

/// Source of values for named alternatives.
pub trait Lookup {
    /// Resolves a plain alternative such as `{MESSAGE}`.
    fn field(&self, name: &str) -> Option<Value<'_>>;

    /// Resolves a derived alternative such as `{$unit}`; `name` excludes the `$`.
    fn derived(&self, name: &str) -> Option<Value<'_>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Alternative {
    Literal(String),
    Derived(String),
    Field(String),
    Positional(usize),
}

impl Alternative {
    fn resolve<'a>(&'a self, lookup: &'a dyn Lookup, args: &'a [Value<'a>]) -> Option<Value<'a>> {
        match self {
            Alternative::Literal(s) => Some(Value::Str(Cow::Borrowed(s))),
            Alternative::Derived(name) => lookup.derived(name),
            Alternative::Field(name) => lookup.field(name),
            Alternative::Positional(index) => args.get(*index).cloned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
    Center,
    AfterSign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sign {
    Minus,
    Plus,
    Space,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FormatSpec {
    fill: Option<char>,
    align: Option<Align>,
    sign: Sign,
    zero: bool,
    width: usize,
    precision: Option<usize>,
}

impl Default for FormatSpec {
    fn default() -> Self {
        FormatSpec {
            fill: None,
            align: None,
            sign: Sign::Minus,
            zero: false,
            width: 0,
            precision: None,
        }
    }
}

fn parse_align(c: char) -> Option<Align> {
    match c {
        '<' => Some(Align::Left),
        '>' => Some(Align::Right),
        '^' => Some(Align::Center),
        '=' => Some(Align::AfterSign),
        _ => None,
    }
}

impl FormatSpec {
    fn parse(spec: &str) -> Result<Self, TemplateError> {
        let invalid = || TemplateError::InvalidSpec(spec.to_string());
        let chars: Vec<char> = spec.chars().collect();
        let mut out = FormatSpec::default();
        let mut i = 0;

        match (chars.first(), chars.get(1).copied().and_then(parse_align)) {
            (Some(&fill), Some(align)) => {
                out.fill = Some(fill);
                out.align = Some(align);
                i = 2;
            }
            (Some(&c), None) => {
                if let Some(align) = parse_align(c) {
                    out.align = Some(align);
                    i = 1;
                }
            }
            _ => {}
        }

        match chars.get(i) {
            Some('+') => {
                out.sign = Sign::Plus;
                i += 1;
            }
            Some('-') => i += 1,
            Some(' ') => {
                out.sign = Sign::Space;
                i += 1;
            }
            _ => {}
        }

        if chars.get(i) == Some(&'0') {
            out.zero = true;
            i += 1;
        }

        let start = i;
        while chars.get(i).is_some_and(char::is_ascii_digit) {
            i += 1;
        }
        if i > start {
            out.width = chars[start..i]
                .iter()
                .collect::<String>()
                .parse()
                .map_err(|_| invalid())?;
        }

        if chars.get(i) == Some(&'.') {
            i += 1;
            let start = i;
            while chars.get(i).is_some_and(char::is_ascii_digit) {
                i += 1;
            }
            if i == start {
                return Err(invalid());
            }
            out.precision = Some(
                chars[start..i]
                    .iter()
                    .collect::<String>()
                    .parse()
                    .map_err(|_| invalid())?,
            );
        }

        // Only the string and decimal presentation types make sense for names.
        if matches!(chars.get(i), Some('s' | 'd')) {
            i += 1;
        }

        if i != chars.len() {
            return Err(invalid());
        }
        Ok(out)
    }

    fn apply(&self, value: &Value<'_>, out: &mut String) {
        let (sign, body, numeric) = match value {
            Value::Int(n) => {
                let sign = if *n < 0 {
                    "-"
                } else {
                    match self.sign {
                        Sign::Plus => "+",
                        Sign::Space => " ",
                        Sign::Minus => "",
                    }
                };
                (sign, Cow::Owned(n.unsigned_abs().to_string()), true)
            }
            Value::Str(s) => {
                let body = match self.precision {
                    Some(p) => Cow::Owned(s.chars().take(p).collect()),
                    None => Cow::Borrowed(&**s),
                };
                ("", body, false)
            }
        };

        let fill = self
            .fill
            .unwrap_or(if self.zero { '0' } else { ' ' });
        let align = self.align.unwrap_or(match (numeric, self.zero) {
            (true, true) => Align::AfterSign,
            (true, false) => Align::Right,
            (false, _) => Align::Left,
        });

        let len = sign.chars().count() + body.chars().count();
        let pad = self.width.saturating_sub(len);
        let push_fill = |out: &mut String, n: usize| out.extend(std::iter::repeat(fill).take(n));

        match align {
            Align::Left => {
                out.push_str(sign);
                out.push_str(&body);
                push_fill(out, pad);
            }
            Align::Right => {
                push_fill(out, pad);
                out.push_str(sign);
                out.push_str(&body);
            }
            Align::Center => {
                push_fill(out, pad / 2);
                out.push_str(sign);
                out.push_str(&body);
                push_fill(out, pad - pad / 2);
            }
            Align::AfterSign => {
                out.push_str(sign);
                push_fill(out, pad);
                out.push_str(&body);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Placeholder {
    key: String,
    alternatives: Vec<Alternative>,
    spec: FormatSpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Placeholder(Placeholder),
}

/// A parsed name template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

fn is_quoted(alternative: &str) -> bool {
    let mut chars = alternative.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) => first == last && (first == '\'' || first == '"'),
        _ => false,
    }
}

/// Byte offset of the first `target` outside a quoted alternative.
fn find_unquoted(s: &str, target: char) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut alternative_start = true;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == target => return Some(i),
            None if alternative_start && (c == '\'' || c == '"') => quote = Some(c),
            None => {}
        }
        alternative_start = c == '|' && quote.is_none();
    }
    // an unterminated quote is not a quote
    match quote {
        Some(_) => s.find(target),
        None => None,
    }
}

/// Splits a placeholder key on the `|` separators outside quotes.
fn split_alternatives(key: &str) -> Vec<&str> {
    let mut alternatives = Vec::new();
    let mut rest = key;
    while let Some(bar) = find_unquoted(rest, '|') {
        alternatives.push(&rest[..bar]);
        rest = &rest[bar + 1..];
    }
    alternatives.push(rest);
    alternatives
}

impl Template {
    /// Parses a template.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut auto_index = 0usize;
        let mut used_auto = false;
        let mut used_manual = false;
        let mut rest = source;
        let mut offset = 0usize;

        while let Some(c) = rest.chars().next() {
            match c {
                '{' if rest.starts_with("{{") => {
                    text.push('{');
                    rest = &rest[2..];
                    offset += 2;
                }
                '}' if rest.starts_with("}}") => {
                    text.push('}');
                    rest = &rest[2..];
                    offset += 2;
                }
                '}' => return Err(TemplateError::UnmatchedClose(offset)),
                '{' => {
                    let body = &rest[1..];
                    let end = find_unquoted(body, '}')
                        .ok_or(TemplateError::UnclosedPlaceholder(offset))?;
                    let inner = &body[..end];
                    let (key, spec) = match find_unquoted(inner, ':') {
                        Some(colon) => (&inner[..colon], &inner[colon + 1..]),
                        None => (inner, ""),
                    };

                    let alternatives = if key.is_empty() {
                        used_auto = true;
                        auto_index += 1;
                        vec![Alternative::Positional(auto_index - 1)]
                    } else {
                        split_alternatives(key)
                            .into_iter()
                            .map(|alternative| {
                                if alternative.is_empty() {
                                    return Err(TemplateError::EmptyAlternative(key.to_string()));
                                }
                                Ok(if alternative.len() > 1 && is_quoted(alternative) {
                                    Alternative::Literal(
                                        alternative[1..alternative.len() - 1].to_string(),
                                    )
                                } else if let Some(name) = alternative.strip_prefix('$') {
                                    Alternative::Derived(name.to_string())
                                } else if let Ok(index) = alternative.parse::<usize>() {
                                    used_manual = true;
                                    Alternative::Positional(index)
                                } else {
                                    Alternative::Field(alternative.to_string())
                                })
                            })
                            .collect::<Result<Vec<_>, _>>()?
                    };
                    if used_auto && used_manual {
                        return Err(TemplateError::MixedNumbering);
                    }

                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(Segment::Placeholder(Placeholder {
                        key: key.to_string(),
                        alternatives,
                        spec: FormatSpec::parse(spec)?,
                    }));

                    let consumed = 1 + end + 1;
                    rest = &rest[consumed..];
                    offset += consumed;
                }
                c => {
                    text.push(c);
                    rest = &rest[c.len_utf8()..];
                    offset += c.len_utf8();
                }
            }
        }
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        Ok(Template {
            source: source.to_string(),
            segments,
        })
    }

    /// Whether any placeholder uses a `$` derived variable.
    #[must_use]
    pub fn uses_derived(&self) -> bool {
        self.segments.iter().any(|segment| match segment {
            Segment::Placeholder(p) => p
                .alternatives
                .iter()
                .any(|a| matches!(a, Alternative::Derived(_))),
            Segment::Text(_) => false,
        })
    }

    /// Renders the template. Fails if some placeholder has no resolvable
    /// alternative.
    pub fn render(&self, lookup: &dyn Lookup, args: &[Value<'_>]) -> Result<String, RoutingError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Placeholder(placeholder) => {
                    let value = placeholder
                        .alternatives
                        .iter()
                        .find_map(|a| a.resolve(lookup, args))
                        .ok_or_else(|| match placeholder.alternatives.as_slice() {
                            [Alternative::Positional(index)] => {
                                RoutingError::MissingPositional(*index)
                            }
                            _ => RoutingError::Unresolved(placeholder.key.clone()),
                        })?;
                    placeholder.spec.apply(&value, &mut out);
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapLookup {
        fields: HashMap<&'static str, Value<'static>>,
        derived: HashMap<&'static str, Value<'static>>,
    }

    impl MapLookup {
        fn with(mut self, key: &'static str, value: Value<'static>) -> Self {
            self.fields.insert(key, value);
            self
        }
    }

    impl Lookup for MapLookup {
        fn field(&self, name: &str) -> Option<Value<'_>> {
            self.fields.get(name).cloned()
        }

        fn derived(&self, name: &str) -> Option<Value<'_>> {
            self.derived.get(name).cloned()
        }
    }

    fn s(v: &'static str) -> Value<'static> {
        Value::Str(Cow::Borrowed(v))
    }

    fn render(template: &str, lookup: &MapLookup) -> Result<String, RoutingError> {
        Template::parse(template).unwrap().render(lookup, &[])
    }

    #[test]
    fn test_plain_formatting() {
        let lookup = MapLookup::default()
            .with("d", Value::Int(123))
            .with("a", Value::Int(123))
            .with("b", Value::Int(456))
            .with("x", Value::Int(2));

        assert_eq!(render("string", &lookup).unwrap(), "string");
        assert_eq!(render("abc {d}", &lookup).unwrap(), "abc 123");
        assert_eq!(render("{b} {a}", &lookup).unwrap(), "456 123");
        assert_eq!(render("formatting {x:03}", &lookup).unwrap(), "formatting 002");
        assert!(matches!(
            render("{missing}", &lookup),
            Err(RoutingError::Unresolved(_))
        ));
    }

    #[test]
    fn test_positional() {
        let template = Template::parse("{} and {}").unwrap();
        let args = [Value::Int(123), s("x")];
        assert_eq!(
            template.render(&MapLookup::default(), &args).unwrap(),
            "123 and x"
        );

        let template = Template::parse("{1}-{0}").unwrap();
        assert_eq!(
            template.render(&MapLookup::default(), &args).unwrap(),
            "x-123"
        );

        assert_eq!(
            Template::parse("{}")
                .unwrap()
                .render(&MapLookup::default(), &[]),
            Err(RoutingError::MissingPositional(0))
        );
        assert_eq!(
            Template::parse("{} {0}"),
            Err(TemplateError::MixedNumbering)
        );
    }

    #[test]
    fn test_fallthrough() {
        let abc = MapLookup::default()
            .with("a", Value::Int(1))
            .with("b", Value::Int(2))
            .with("c", Value::Int(3));
        assert_eq!(render("xyz {a|b|c} 123", &abc).unwrap(), "xyz 1 123");

        let bc = MapLookup::default()
            .with("b", Value::Int(2))
            .with("c", Value::Int(3));
        assert_eq!(render("xyz {a|b|c} 123", &bc).unwrap(), "xyz 2 123");

        let c = MapLookup::default().with("c", Value::Int(3));
        assert_eq!(render("xyz {a|b|c} 123", &c).unwrap(), "xyz 3 123");

        assert!(render("xyz {a|b|c} 123", &MapLookup::default()).is_err());
    }

    #[test]
    fn test_quoted_literals() {
        let b = MapLookup::default().with("b", Value::Int(5));
        assert_eq!(render(r#"xyz {a|b|"hello"} 123"#, &b).unwrap(), "xyz 5 123");
        assert_eq!(
            render(r#"xyz {a|b|"hello"} 123"#, &MapLookup::default()).unwrap(),
            "xyz hello 123"
        );
        assert_eq!(
            render("xyz {a|b|'hello'} 123", &MapLookup::default()).unwrap(),
            "xyz hello 123"
        );
        assert_eq!(render("{a|b|'x'}", &b).unwrap(), "5");
        assert_eq!(render("{a|b|'x'}", &MapLookup::default()).unwrap(), "x");
        // quotes may hold characters that are otherwise syntax
        assert_eq!(
            render("{a|'x:}y'}", &MapLookup::default()).unwrap(),
            "x:}y"
        );
        assert_eq!(
            render("{a|'x|y'}", &MapLookup::default()).unwrap(),
            "x|y"
        );
        assert_eq!(render(r#"{a|"|"|b}"#, &b).unwrap(), "|");
    }

    #[test]
    fn test_unbalanced_quotes_are_field_names() {
        let lookup = MapLookup::default().with("'a", s("v"));
        assert_eq!(render("{'a}", &lookup).unwrap(), "v");
        assert!(render("{'}", &MapLookup::default()).is_err());
    }

    #[test]
    fn test_derived_alternatives() {
        let mut lookup = MapLookup::default();
        lookup.derived.insert("region", s("us-east-1"));
        assert_eq!(render("xyz {$region}", &lookup).unwrap(), "xyz us-east-1");
        assert_eq!(render("xyz {invalid|$region}", &lookup).unwrap(), "xyz us-east-1");
        assert!(render("{$not_found}", &lookup).is_err());
        assert!(Template::parse("{$region}").unwrap().uses_derived());
        assert!(!Template::parse("{region}").unwrap().uses_derived());
    }

    #[test]
    fn test_format_specs() {
        let lookup = MapLookup::default()
            .with("n", Value::Int(-7))
            .with("p", Value::Int(7))
            .with("s", s("abc"));
        assert_eq!(render("{n:04}", &lookup).unwrap(), "-007");
        assert_eq!(render("{p:+}", &lookup).unwrap(), "+7");
        assert_eq!(render("{p:5}", &lookup).unwrap(), "    7");
        assert_eq!(render("{s:5}", &lookup).unwrap(), "abc  ");
        assert_eq!(render("{s:>5}", &lookup).unwrap(), "  abc");
        assert_eq!(render("{s:*^7}", &lookup).unwrap(), "**abc**");
        assert_eq!(render("{s:.2}", &lookup).unwrap(), "ab");
        assert_eq!(render("{s:s}", &lookup).unwrap(), "abc");
        assert_eq!(render("{p:d}", &lookup).unwrap(), "7");
    }

    #[test]
    fn test_escapes_and_errors() {
        assert_eq!(
            render("{{literal}}", &MapLookup::default()).unwrap(),
            "{literal}"
        );
        assert_eq!(
            Template::parse("abc {def"),
            Err(TemplateError::UnclosedPlaceholder(4))
        );
        assert_eq!(Template::parse("abc}"), Err(TemplateError::UnmatchedClose(3)));
        assert!(matches!(
            Template::parse("{a||b}"),
            Err(TemplateError::EmptyAlternative(_))
        ));
        assert!(matches!(
            Template::parse("{a:xyz}"),
            Err(TemplateError::InvalidSpec(_))
        ));
    }
}

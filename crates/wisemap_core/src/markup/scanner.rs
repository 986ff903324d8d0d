//! Streaming tag/attribute scanner for mindmap markup.
//!
//! # Responsibility
//! - Tokenize markup into start/end/text events without building a tree.
//! - Decode attribute values and text entities.
//!
//! # Invariants
//! - The scanner is fused: after the first error it yields nothing more.
//! - Comments, processing instructions and DOCTYPE declarations are skipped.
//! - Attribute values must be quoted; `<` inside a value is an error.

use std::borrow::Cow;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One attribute of a start tag, value entity-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute<'a> {
    pub name: &'a str,
    pub value: Cow<'a, str>,
}

/// Scanner output event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupEvent<'a> {
    Start {
        name: &'a str,
        attributes: Vec<Attribute<'a>>,
        self_closing: bool,
    },
    End {
        name: &'a str,
    },
    Text(Cow<'a, str>),
}

impl<'a> MarkupEvent<'a> {
    /// Looks up one attribute on a start event.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        match self {
            Self::Start { attributes, .. } => attributes
                .iter()
                .find(|attr| attr.name == key)
                .map(|attr| attr.value.as_ref()),
            _ => None,
        }
    }
}

/// Malformed markup diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupError {
    /// Byte offset in the input where the problem was detected.
    pub offset: usize,
    pub message: String,
}

impl MarkupError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

impl Display for MarkupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at byte {}", self.message, self.offset)
    }
}

impl Error for MarkupError {}

/// Iterator over markup events.
pub struct MarkupScanner<'a> {
    input: &'a str,
    pos: usize,
    failed: bool,
}

impl<'a> MarkupScanner<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            failed: false,
        }
    }

    /// Current byte offset into the input.
    pub fn offset(&self) -> usize {
        self.pos
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn next_event(&mut self) -> Option<Result<MarkupEvent<'a>, MarkupError>> {
        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return None;
            }

            if rest.starts_with("<!--") {
                if let Err(err) = self.skip_past("-->") {
                    return Some(Err(err));
                }
                continue;
            }
            if rest.starts_with("<?") {
                if let Err(err) = self.skip_past("?>") {
                    return Some(Err(err));
                }
                continue;
            }
            if let Some(after) = rest.strip_prefix("<![CDATA[") {
                let start = self.pos + "<![CDATA[".len();
                return Some(match after.find("]]>") {
                    Some(end) => {
                        self.pos = start + end + "]]>".len();
                        Ok(MarkupEvent::Text(Cow::Borrowed(&self.input[start..start + end])))
                    }
                    None => Err(MarkupError::new(self.pos, "unterminated CDATA section")),
                });
            }
            if rest.starts_with("<!") {
                if let Err(err) = self.skip_declaration() {
                    return Some(Err(err));
                }
                continue;
            }
            if rest.starts_with("</") {
                return Some(self.scan_end_tag());
            }
            if rest.starts_with('<') {
                return Some(self.scan_start_tag());
            }
            return Some(self.scan_text());
        }
    }

    fn skip_past(&mut self, terminator: &str) -> Result<(), MarkupError> {
        match self.rest().find(terminator) {
            Some(idx) => {
                self.pos += idx + terminator.len();
                Ok(())
            }
            None => Err(MarkupError::new(
                self.pos,
                format!("missing `{terminator}` terminator"),
            )),
        }
    }

    fn skip_declaration(&mut self) -> Result<(), MarkupError> {
        let mut depth = 0usize;
        for (idx, ch) in self.rest().char_indices() {
            match ch {
                '[' => depth += 1,
                ']' => depth = depth.saturating_sub(1),
                '>' if depth == 0 => {
                    self.pos += idx + 1;
                    return Ok(());
                }
                _ => {}
            }
        }
        Err(MarkupError::new(self.pos, "unterminated declaration"))
    }

    fn scan_text(&mut self) -> Result<MarkupEvent<'a>, MarkupError> {
        let start = self.pos;
        let len = self.rest().find('<').unwrap_or(self.rest().len());
        self.pos += len;
        let raw = &self.input[start..start + len];
        decode_entities(raw, start).map(MarkupEvent::Text)
    }

    fn scan_end_tag(&mut self) -> Result<MarkupEvent<'a>, MarkupError> {
        self.pos += 2;
        let name = self.scan_name()?;
        self.skip_whitespace();
        if !self.rest().starts_with('>') {
            return Err(MarkupError::new(self.pos, format!("expected `>` closing `</{name}`")));
        }
        self.pos += 1;
        Ok(MarkupEvent::End { name })
    }

    fn scan_start_tag(&mut self) -> Result<MarkupEvent<'a>, MarkupError> {
        self.pos += 1;
        let name = self.scan_name()?;
        let mut attributes: Vec<Attribute<'a>> = Vec::new();

        loop {
            let had_space = self.skip_whitespace();
            let rest = self.rest();
            if rest.starts_with("/>") {
                self.pos += 2;
                return Ok(MarkupEvent::Start {
                    name,
                    attributes,
                    self_closing: true,
                });
            }
            if rest.starts_with('>') {
                self.pos += 1;
                return Ok(MarkupEvent::Start {
                    name,
                    attributes,
                    self_closing: false,
                });
            }
            if rest.is_empty() {
                return Err(MarkupError::new(self.pos, format!("unterminated tag `<{name}`")));
            }
            if !had_space {
                return Err(MarkupError::new(
                    self.pos,
                    "expected whitespace before attribute",
                ));
            }

            let attr_offset = self.pos;
            let attribute = self.scan_attribute()?;
            if attributes.iter().any(|existing| existing.name == attribute.name) {
                return Err(MarkupError::new(
                    attr_offset,
                    format!("duplicate attribute `{}`", attribute.name),
                ));
            }
            attributes.push(attribute);
        }
    }

    fn scan_attribute(&mut self) -> Result<Attribute<'a>, MarkupError> {
        let name = self.scan_name()?;
        self.skip_whitespace();
        if !self.rest().starts_with('=') {
            return Err(MarkupError::new(
                self.pos,
                format!("attribute `{name}` is missing a value"),
            ));
        }
        self.pos += 1;
        self.skip_whitespace();

        let quote = match self.rest().chars().next() {
            Some(q @ ('"' | '\'')) => q,
            _ => {
                return Err(MarkupError::new(
                    self.pos,
                    format!("attribute `{name}` value must be quoted"),
                ))
            }
        };
        self.pos += 1;
        let start = self.pos;
        let len = self.rest().find(quote).ok_or_else(|| {
            MarkupError::new(start, format!("unterminated value for attribute `{name}`"))
        })?;
        let raw = &self.input[start..start + len];
        if let Some(idx) = raw.find('<') {
            return Err(MarkupError::new(start + idx, "`<` is not allowed in attribute values"));
        }
        self.pos = start + len + 1;
        Ok(Attribute {
            name,
            value: decode_entities(raw, start)?,
        })
    }

    fn scan_name(&mut self) -> Result<&'a str, MarkupError> {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|(_, ch)| !is_name_char(*ch))
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(MarkupError::new(self.pos, "expected a name"));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn skip_whitespace(&mut self) -> bool {
        let rest = self.rest();
        let trimmed = rest.trim_start();
        let skipped = rest.len() - trimmed.len();
        self.pos += skipped;
        skipped > 0
    }
}

impl<'a> Iterator for MarkupScanner<'a> {
    type Item = Result<MarkupEvent<'a>, MarkupError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let event = self.next_event();
        if matches!(event, Some(Err(_))) {
            self.failed = true;
        }
        event
    }
}

fn is_name_char(ch: char) -> bool {
    !(ch.is_whitespace() || matches!(ch, '<' | '>' | '/' | '=' | '"' | '\'' | '&'))
}

/// Decodes the predefined and numeric character entities in `raw`.
///
/// `offset` is the byte position of `raw` in the whole input, used for
/// diagnostics.
pub fn decode_entities(raw: &str, offset: usize) -> Result<Cow<'_, str>, MarkupError> {
    if !raw.contains('&') {
        return Ok(Cow::Borrowed(raw));
    }

    let mut decoded = String::with_capacity(raw.len());
    let mut rest = raw;
    let mut consumed = 0usize;
    while let Some(amp) = rest.find('&') {
        decoded.push_str(&rest[..amp]);
        let entity_start = offset + consumed + amp;
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| MarkupError::new(entity_start, "unterminated entity"))?;
        let entity = &after[..semi];
        decoded.push(resolve_entity(entity).ok_or_else(|| {
            MarkupError::new(entity_start, format!("unknown entity `&{entity};`"))
        })?);
        let step = amp + 1 + semi + 1;
        consumed += step;
        rest = &rest[step..];
    }
    decoded.push_str(rest);
    Ok(Cow::Owned(decoded))
}

fn resolve_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}

/// Escapes a value for use inside a double-quoted attribute.
pub fn escape_attribute(value: &str) -> Cow<'_, str> {
    escape_with(value, true)
}

/// Escapes character data.
pub fn escape_text(value: &str) -> Cow<'_, str> {
    escape_with(value, false)
}

fn escape_with(value: &str, quotes: bool) -> Cow<'_, str> {
    let needs_escape = value
        .chars()
        .any(|ch| matches!(ch, '&' | '<' | '>') || (quotes && ch == '"'));
    if !needs_escape {
        return Cow::Borrowed(value);
    }

    let mut escaped = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' if quotes => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}

#[cfg(test)]
mod tests {
    use super::{decode_entities, escape_attribute, MarkupEvent, MarkupScanner};

    fn collect(input: &str) -> Vec<MarkupEvent<'_>> {
        MarkupScanner::new(input)
            .collect::<Result<Vec<_>, _>>()
            .expect("well-formed input")
    }

    #[test]
    fn scans_tags_attributes_and_text() {
        let events = collect(r#"<map name='m'><topic text="a &amp; b"/>hi</map>"#);
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].attribute("name"), Some("m"));
        assert_eq!(events[1].attribute("text"), Some("a & b"));
        assert!(matches!(
            events[1],
            MarkupEvent::Start {
                self_closing: true,
                ..
            }
        ));
        assert!(matches!(&events[2], MarkupEvent::Text(text) if text == "hi"));
        assert!(matches!(events[3], MarkupEvent::End { name: "map" }));
    }

    #[test]
    fn skips_comments_declarations_and_instructions() {
        let input = "<?xml version=\"1.0\"?><!DOCTYPE map [<!ENTITY x \"y\">]><!-- c --><map/>";
        let events = collect(input);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], MarkupEvent::Start { name: "map", .. }));
    }

    #[test]
    fn single_quoted_value_may_hold_double_quotes() {
        let events = collect(r#"<topic text='say "hi"'/>"#);
        assert_eq!(events[0].attribute("text"), Some("say \"hi\""));
    }

    #[test]
    fn rejects_unquoted_attribute_and_fuses() {
        let mut scanner = MarkupScanner::new("<topic text=abc/><x/>");
        let first = scanner.next().expect("one item");
        assert!(first.is_err());
        assert!(scanner.next().is_none());
    }

    #[test]
    fn rejects_duplicate_attribute() {
        let result = MarkupScanner::new(r#"<t a="1" a="2"/>"#).collect::<Result<Vec<_>, _>>();
        let err = result.expect_err("duplicate attribute must fail");
        assert!(err.message.contains("duplicate"));
    }

    #[test]
    fn decodes_numeric_entities_and_reports_unknown() {
        assert_eq!(decode_entities("&#65;&#x42;", 0).unwrap(), "AB");
        let err = decode_entities("x &nbsp; y", 10).expect_err("unknown entity");
        assert_eq!(err.offset, 12);
    }

    #[test]
    fn escape_attribute_covers_quotes_and_markup() {
        assert_eq!(escape_attribute(r#"a<"b">&"#), "a&lt;&quot;b&quot;&gt;&amp;");
        assert_eq!(escape_attribute("plain"), "plain");
    }
}

//! In-memory document model handed to the editor engine.
//!
//! # Responsibility
//! - Parse mindmap markup into a minimal element tree with well-formedness
//!   checks.
//! - Serialize the tree back to canonical text.
//!
//! # Invariants
//! - A parsed document has exactly one root element.
//! - Canonical output uses double-quoted attributes, escapes `& < > "`,
//!   self-closes empty elements and carries no XML declaration.
//! - Text nodes (including whitespace) are preserved in document order.
//! - Parsed trees are at most `MAX_NESTING_DEPTH` elements deep, so the
//!   recursive walks below stay within a bounded stack.

use super::scanner::{escape_attribute, escape_text, MarkupError, MarkupEvent, MarkupScanner};
use crate::metadata::{CENTRAL_ATTRIBUTE, TEXT_ATTRIBUTE, TOPIC_ELEMENT, UNTITLED};

/// Deepest element nesting `MapDocument::parse` accepts.
pub const MAX_NESTING_DEPTH: usize = 512;

/// One element with ordered attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<MapNode>,
}

/// Child node of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapNode {
    Element(MapElement),
    Text(String),
}

impl MapElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Sets or replaces one attribute, keeping its original position.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(name, _)| *name == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &MapElement> {
        self.children.iter().filter_map(|node| match node {
            MapNode::Element(element) => Some(element),
            MapNode::Text(_) => None,
        })
    }

    /// Depth-first search in document order, including `self`.
    pub fn find(&self, predicate: &impl Fn(&MapElement) -> bool) -> Option<&MapElement> {
        if predicate(self) {
            return Some(self);
        }
        self.child_elements().find_map(|child| child.find(predicate))
    }

    fn find_mut(
        &mut self,
        predicate: &impl Fn(&MapElement) -> bool,
    ) -> Option<&mut MapElement> {
        if predicate(self) {
            return Some(self);
        }
        self.children.iter_mut().find_map(|node| match node {
            MapNode::Element(child) => child.find_mut(predicate),
            MapNode::Text(_) => None,
        })
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (name, value) in &self.attributes {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape_attribute(value));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                MapNode::Element(element) => element.write_to(out),
                MapNode::Text(text) => out.push_str(&escape_text(text)),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

/// Parsed mindmap document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapDocument {
    root: MapElement,
}

impl MapDocument {
    pub fn new(root: MapElement) -> Self {
        Self { root }
    }

    /// Parses markup text into a document tree.
    ///
    /// # Errors
    /// - Returns `MarkupError` for any tokenizer failure, unbalanced or
    ///   mismatched tags, missing or multiple root elements, non-whitespace
    ///   text outside the root, or nesting deeper than `MAX_NESTING_DEPTH`.
    pub fn parse(input: &str) -> Result<Self, MarkupError> {
        let mut scanner = MarkupScanner::new(input);
        let mut stack: Vec<MapElement> = Vec::new();
        let mut root: Option<MapElement> = None;

        while let Some(event) = scanner.next() {
            let offset = scanner.offset();
            match event? {
                MarkupEvent::Start {
                    name,
                    attributes,
                    self_closing,
                } => {
                    if stack.is_empty() && root.is_some() {
                        return Err(MarkupError::new(
                            offset,
                            format!("second root element `<{name}>`"),
                        ));
                    }
                    if stack.len() >= MAX_NESTING_DEPTH {
                        return Err(MarkupError::new(
                            offset,
                            format!("elements nested deeper than {MAX_NESTING_DEPTH} levels"),
                        ));
                    }
                    let element = MapElement {
                        name: name.to_string(),
                        attributes: attributes
                            .into_iter()
                            .map(|attr| (attr.name.to_string(), attr.value.into_owned()))
                            .collect(),
                        children: Vec::new(),
                    };
                    if self_closing {
                        attach(&mut stack, &mut root, element);
                    } else {
                        stack.push(element);
                    }
                }
                MarkupEvent::End { name } => {
                    let Some(open) = stack.pop() else {
                        return Err(MarkupError::new(
                            offset,
                            format!("unexpected closing tag `</{name}>`"),
                        ));
                    };
                    if open.name != name {
                        return Err(MarkupError::new(
                            offset,
                            format!("closing tag `</{name}>` does not match `<{}>`", open.name),
                        ));
                    }
                    attach(&mut stack, &mut root, open);
                }
                MarkupEvent::Text(text) => match stack.last_mut() {
                    Some(parent) => parent.children.push(MapNode::Text(text.into_owned())),
                    None if text.trim().is_empty() => {}
                    None => {
                        return Err(MarkupError::new(offset, "text outside the root element"));
                    }
                },
            }
        }

        if let Some(open) = stack.last() {
            return Err(MarkupError::new(
                input.len(),
                format!("element `<{}>` is never closed", open.name),
            ));
        }
        root.map(Self::new)
            .ok_or_else(|| MarkupError::new(input.len(), "document has no root element"))
    }

    pub fn root(&self) -> &MapElement {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut MapElement {
        &mut self.root
    }

    /// First `topic` element flagged `central="true"`.
    pub fn central_topic(&self) -> Option<&MapElement> {
        self.root.find(&is_central_topic)
    }

    pub fn central_topic_mut(&mut self) -> Option<&mut MapElement> {
        self.root.find_mut(&is_central_topic)
    }

    /// Title carried by the central topic, or the untitled fallback.
    pub fn title(&self) -> &str {
        self.central_topic()
            .and_then(|topic| topic.attribute(TEXT_ATTRIBUTE))
            .filter(|text| !text.trim().is_empty())
            .unwrap_or(UNTITLED)
    }

    /// Canonical text form.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.root.write_to(&mut out);
        out
    }
}

fn is_central_topic(element: &MapElement) -> bool {
    element.name == TOPIC_ELEMENT && element.attribute(CENTRAL_ATTRIBUTE) == Some("true")
}

fn attach(stack: &mut [MapElement], root: &mut Option<MapElement>, element: MapElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(MapNode::Element(element)),
        None => *root = Some(element),
    }
}

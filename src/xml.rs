//! # XML Tree
//!
//! A small owned XML tree used for every request, response, directory entry
//! and template in the crate. Parsing and writing go through `quick-xml`;
//! the tree itself is plain data so it can be cloned into caches, compared
//! structurally and edited freely.
//!
//! Whitespace-only text is dropped while parsing and surrounding whitespace of
//! text nodes is trimmed, so a document that was pretty-printed and parsed
//! again compares equal to the original.

use std::collections::HashMap;
use std::fmt;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{Error, Result};

/// A child of an element: either a nested element or a run of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlChild {
    Element(XmlNode),
    Text(String),
}

/// An XML element with ordered attributes and children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlNode {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlChild>,
}

impl XmlNode {
    /// Create an empty element.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Parse a document and return its root element.
    pub fn parse(text: &str) -> Result<Self> {
        parse(text)
    }

    /// The qualified element name, including any namespace prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The element name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        local(&self.name)
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn children(&self) -> &[XmlChild] {
        &self.children
    }

    /// Look up an attribute by (local) name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name || local(key) == name)
            .map(|(_, value)| value.as_str())
    }

    /// Set or replace an attribute.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// Builder form of [`set_attr`](Self::set_attr).
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Append a child element.
    pub fn push(&mut self, child: XmlNode) {
        self.children.push(XmlChild::Element(child));
    }

    /// Builder form of [`push`](Self::push).
    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.push(child);
        self
    }

    /// Append a text node. Empty text is ignored.
    pub fn push_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if !text.is_empty() {
            self.children.push(XmlChild::Text(text));
        }
    }

    /// Builder form of [`push_text`](Self::push_text).
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.push_text(text);
        self
    }

    /// Shorthand for `<name>text</name>` appended as a child.
    pub fn with_text_child(self, name: &str, text: impl Into<String>) -> Self {
        self.with_child(XmlNode::new(name).with_text(text))
    }

    /// Iterate over child elements.
    pub fn elements(&self) -> impl Iterator<Item = &XmlNode> {
        self.children.iter().filter_map(|child| match child {
            XmlChild::Element(element) => Some(element),
            XmlChild::Text(_) => None,
        })
    }

    /// Mutable iteration over child elements.
    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlNode> {
        self.children.iter_mut().filter_map(|child| match child {
            XmlChild::Element(element) => Some(element),
            XmlChild::Text(_) => None,
        })
    }

    /// First child element with the given local name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.elements().find(|element| element.local_name() == name)
    }

    /// All child elements with the given local name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.elements()
            .filter(move |element| element.local_name() == name)
    }

    /// The first child element, whatever its name.
    pub fn first_element(&self) -> Option<&XmlNode> {
        self.elements().next()
    }

    /// Follow a `/`-separated path of local names below this element.
    pub fn path(&self, path: &str) -> Option<&XmlNode> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |node, segment| node.child(segment))
    }

    /// Every descendant element (depth first) with the given local name.
    pub fn descendants_named(&self, name: &str) -> Vec<&XmlNode> {
        let mut found = Vec::new();
        collect_descendants(self, name, &mut found);
        found
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|child| match child {
                XmlChild::Text(text) => Some(text.as_str()),
                XmlChild::Element(_) => None,
            })
            .collect()
    }

    /// Text of the first child element with the given name.
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).map(|child| child.text())
    }

    /// Remove all child elements with the given local name.
    pub fn remove_children(&mut self, name: &str) {
        self.children.retain(|child| match child {
            XmlChild::Element(element) => element.local_name() != name,
            XmlChild::Text(_) => true,
        });
    }

    /// Rewrite every attribute value and text node in the tree.
    pub fn try_map_text<F>(&self, f: &mut F) -> Result<XmlNode>
    where
        F: FnMut(&str) -> Result<String>,
    {
        let mut mapped = XmlNode::new(self.name.clone());
        for (key, value) in &self.attributes {
            mapped.attributes.push((key.clone(), f(value)?));
        }
        for child in &self.children {
            mapped.children.push(match child {
                XmlChild::Element(element) => XmlChild::Element(element.try_map_text(f)?),
                XmlChild::Text(text) => XmlChild::Text(f(text)?),
            });
        }
        Ok(mapped)
    }

    /// Serialize without indentation.
    pub fn to_xml_string(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        write_node(&mut writer, self).map_err(Error::xml)?;
        String::from_utf8(writer.into_inner()).map_err(Error::xml)
    }

    /// Serialize with two-space indentation.
    pub fn to_pretty_string(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        write_node(&mut writer, self).map_err(Error::xml)?;
        String::from_utf8(writer.into_inner()).map_err(Error::xml)
    }

    /// Flatten the tree into `path = value` lines for line-based comparison.
    pub fn flatten(&self) -> Vec<String> {
        let mut lines = Vec::new();
        flatten_into(self, "", &mut lines);
        lines
    }
}

impl fmt::Display for XmlNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_xml_string() {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "<{}/>", self.name),
        }
    }
}

/// Parse a document and return its root element.
pub fn parse(text: &str) -> Result<XmlNode> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event().map_err(Error::xml)? {
            Event::Start(start) => stack.push(start_node(&start)?),
            Event::Empty(start) => {
                let node = start_node(&start)?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| Error::xml("unexpected closing tag"))?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(Error::xml)?;
                push_trimmed(&mut stack, &text);
            }
            Event::CData(data) => {
                let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                push_trimmed(&mut stack, &text);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(Error::xml(format!("unclosed element <{}>", open.name)));
    }
    root.ok_or_else(|| Error::xml("document has no root element"))
}

/// Compare two trees line by line.
///
/// Returns `- line` for content only found in `expected` and `+ line` for
/// content only found in `actual`. An empty result means both trees carry
/// the same attributes, text and child elements.
pub fn diff_lines(expected: &XmlNode, actual: &XmlNode) -> Vec<String> {
    let expected_lines = expected.flatten();
    let actual_lines = actual.flatten();

    let mut remaining: HashMap<&str, usize> = HashMap::new();
    for line in &actual_lines {
        *remaining.entry(line.as_str()).or_default() += 1;
    }

    let mut diff = Vec::new();
    for line in &expected_lines {
        match remaining.get_mut(line.as_str()) {
            Some(count) if *count > 0 => *count -= 1,
            _ => diff.push(format!("- {}", line)),
        }
    }

    let mut expected_counts: HashMap<&str, usize> = HashMap::new();
    for line in &expected_lines {
        *expected_counts.entry(line.as_str()).or_default() += 1;
    }
    for line in &actual_lines {
        match expected_counts.get_mut(line.as_str()) {
            Some(count) if *count > 0 => *count -= 1,
            _ => diff.push(format!("+ {}", line)),
        }
    }
    diff
}

fn local(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, local)| local).unwrap_or(name)
}

fn start_node(start: &BytesStart) -> Result<XmlNode> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(Error::xml)?
        .to_string();
    let mut node = XmlNode::new(name);
    for attribute in start.attributes() {
        let attribute = attribute.map_err(Error::xml)?;
        let key = std::str::from_utf8(attribute.key.as_ref())
            .map_err(Error::xml)?
            .to_string();
        let value = attribute.unescape_value().map_err(Error::xml)?;
        node.attributes.push((key, value.into_owned()));
    }
    Ok(node)
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(XmlChild::Element(node));
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(node);
            Ok(())
        }
        None => Err(Error::xml("document has more than one root element")),
    }
}

fn push_trimmed(stack: &mut [XmlNode], text: &str) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return;
    }
    if let Some(parent) = stack.last_mut() {
        parent.children.push(XmlChild::Text(trimmed.to_string()));
    }
}

fn write_node<W: std::io::Write>(writer: &mut Writer<W>, node: &XmlNode) -> quick_xml::Result<()> {
    let mut start = BytesStart::new(node.name.as_str());
    for (key, value) in &node.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    if node.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    for child in &node.children {
        match child {
            XmlChild::Element(element) => write_node(writer, element)?,
            XmlChild::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new(node.name.as_str())))?;
    Ok(())
}

fn collect_descendants<'a>(node: &'a XmlNode, name: &str, found: &mut Vec<&'a XmlNode>) {
    for element in node.elements() {
        if element.local_name() == name {
            found.push(element);
        }
        collect_descendants(element, name, found);
    }
}

fn flatten_into(node: &XmlNode, prefix: &str, lines: &mut Vec<String>) {
    let path = format!("{}/{}", prefix, node.local_name());
    let mut attributes: Vec<&(String, String)> = node
        .attributes
        .iter()
        .filter(|(key, _)| !key.starts_with("xmlns"))
        .collect();
    attributes.sort();
    for (key, value) in attributes {
        lines.push(format!("{}/@{} = {}", path, key, value));
    }
    let text = node.text();
    if !text.is_empty() {
        lines.push(format!("{} = {}", path, text));
    }
    if node.children.is_empty() {
        lines.push(path.clone());
    }
    for element in node.elements() {
        flatten_into(element, &path, lines);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_document() {
        let node = parse(
            r#"<?xml version="1.0"?>
            <entry dn="cn=a,o=b">
              <cn><string>a</string></cn>
              <description><string>An &amp; B</string></description>
            </entry>"#,
        )
        .unwrap();

        assert_eq!(node.name(), "entry");
        assert_eq!(node.attr("dn"), Some("cn=a,o=b"));
        assert_eq!(node.elements().count(), 2);
        assert_eq!(
            node.path("description/string").map(|n| n.text()),
            Some("An & B".to_string())
        );
    }

    #[test]
    fn test_local_name_strips_prefix() {
        let node = parse(r#"<SOAP:Envelope xmlns:SOAP="urn:x"><SOAP:Body/></SOAP:Envelope>"#)
            .unwrap();
        assert_eq!(node.name(), "SOAP:Envelope");
        assert_eq!(node.local_name(), "Envelope");
        assert!(node.child("Body").is_some());
    }

    #[test]
    fn test_pretty_output_parses_back_to_equal_tree() {
        let node = XmlNode::new("root")
            .with_attr("name", "a<b")
            .with_child(XmlNode::new("item").with_text("one & two"))
            .with_child(XmlNode::new("empty"));
        let text = node.to_pretty_string().unwrap();
        assert!(text.contains("a&lt;b"));
        assert_eq!(parse(&text).unwrap(), node);
    }

    #[test]
    fn test_parse_rejects_unclosed_document() {
        assert!(parse("<a><b></b>").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_diff_lines_reports_both_sides() {
        let expected = parse(r#"<c><port>80</port><host>a</host></c>"#).unwrap();
        let actual = parse(r#"<c><port>81</port><host>a</host></c>"#).unwrap();
        let diff = diff_lines(&expected, &actual);
        assert_eq!(diff, vec!["- /c/port = 80", "+ /c/port = 81"]);
        assert!(diff_lines(&expected, &expected).is_empty());
    }

    #[test]
    fn test_try_map_text_rewrites_attributes_and_text() {
        let node = parse(r#"<a v="x"><b>x</b></a>"#).unwrap();
        let mapped = node
            .try_map_text(&mut |text| Ok(text.replace('x', "y")))
            .unwrap();
        assert_eq!(mapped.attr("v"), Some("y"));
        assert_eq!(mapped.child_text("b"), Some("y".to_string()));
    }
}

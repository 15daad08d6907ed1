//! `${name}` variable substitution.
//!
//! Templates refer to variables as `${name}`. The reserved name `dollar`
//! stands for a literal `$`, so `${dollar}{x}` survives substitution as the
//! text `${x}`. [`reverse_substitute`] is the inverse used when capturing
//! live configuration: literal `$` becomes `${dollar}` and known values are
//! turned back into placeholders.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::xml::XmlNode;

/// Escape token for a literal `$`.
pub const DOLLAR: &str = "dollar";

fn placeholder() -> Result<&'static Regex> {
    static PLACEHOLDER: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.\-]*)\}"))
        .as_ref()
        .map_err(|e| Error::Regex(e.clone()))
}

fn is_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// A set of variable bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
    values: BTreeMap<String, String>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// The implicit variables every template can use.
    pub fn with_defaults(organization: &str, root: &str, system: &str, user: &str) -> Self {
        let mut variables = Self::new();
        variables.set("org", organization);
        variables.set("root", root);
        variables.set("system", system);
        variables.set("user", user);
        variables
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Overlay `other` on top of these bindings.
    pub fn extend(&mut self, other: &Variables) {
        for (name, value) in &other.values {
            self.values.insert(name.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Variables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut variables = Self::new();
        for (name, value) in iter {
            variables.set(name, value);
        }
        variables
    }
}

/// Parse a `name=value` command line assignment.
pub fn parse_assignment(text: &str) -> Result<(String, String)> {
    let (name, value) = text.split_once('=').ok_or_else(|| Error::Template {
        message: format!("expected name=value, got '{}'", text),
        variable: None,
    })?;
    let name = name.trim();
    if !is_variable_name(name) {
        return Err(Error::Template {
            message: "invalid variable name".to_string(),
            variable: Some(name.to_string()),
        });
    }
    Ok((name.to_string(), value.to_string()))
}

/// Replace every `${name}` in `text`.
///
/// An unbound variable is an error naming that variable.
pub fn substitute(text: &str, variables: &Variables) -> Result<String> {
    let mut output = String::with_capacity(text.len());
    let mut last = 0;
    for captures in placeholder()?.captures_iter(text) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        output.push_str(&text[last..whole.start()]);
        if name.as_str() == DOLLAR {
            output.push('$');
        } else {
            let value = variables.get(name.as_str()).ok_or_else(|| Error::Template {
                message: "unbound variable".to_string(),
                variable: Some(name.as_str().to_string()),
            })?;
            output.push_str(value);
        }
        last = whole.end();
    }
    output.push_str(&text[last..]);
    Ok(output)
}

/// Turn literal values back into placeholders.
///
/// Longer values win over shorter ones at the same position; empty values
/// are never substituted. Every other `$` is escaped.
pub fn reverse_substitute(text: &str, variables: &Variables) -> String {
    let mut candidates: Vec<(&str, &str)> = variables
        .iter()
        .filter(|(name, value)| *name != DOLLAR && !value.is_empty())
        .collect();
    candidates.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then(a.0.cmp(b.0)));

    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    'scan: while let Some(c) = rest.chars().next() {
        for (name, value) in &candidates {
            if rest.starts_with(value) {
                output.push_str("${");
                output.push_str(name);
                output.push('}');
                rest = &rest[value.len()..];
                continue 'scan;
            }
        }
        if c == '$' {
            output.push_str("${dollar}");
        } else {
            output.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
    output
}

/// Escape every `$` as `${dollar}`.
pub fn escape_dollars(text: &str) -> String {
    text.replace('$', "${dollar}")
}

/// [`substitute`] applied to every attribute value and text node.
pub fn substitute_xml(node: &XmlNode, variables: &Variables) -> Result<XmlNode> {
    node.try_map_text(&mut |text| substitute(text, variables))
}

/// [`reverse_substitute`] applied to every attribute value and text node.
pub fn reverse_substitute_xml(node: &XmlNode, variables: &Variables) -> Result<XmlNode> {
    node.try_map_text(&mut |text| Ok(reverse_substitute(text, variables)))
}

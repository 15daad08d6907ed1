//! Distinguished names
//!
//! A `Dn` is the identity key of a directory entry and also encodes its
//! place in the tree: the first RDN names the entry, the remainder is the
//! parent. Comparison and hashing use a normalized, lower-cased form so
//! `cn=Foo, o=Bar` and `CN=foo,O=bar` refer to the same entry.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};

/// One `attribute=value` component of a distinguished name.
#[derive(Debug, Clone)]
pub struct Rdn {
    pub attribute: String,
    pub value: String,
}

/// A parsed distinguished name.
#[derive(Debug, Clone)]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    /// Parse a DN such as `cn=admin,cn=organizational users,o=system,cn=cordys`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut rdns = Vec::new();
        for component in split_unescaped(text) {
            let component = component.trim();
            let (attribute, value) = component.split_once('=').ok_or_else(|| {
                Error::validation(format!("malformed distinguished name '{}'", text))
            })?;
            let attribute = attribute.trim();
            let value = unescape(value.trim());
            if attribute.is_empty() || value.is_empty() {
                return Err(Error::validation(format!(
                    "malformed distinguished name '{}'",
                    text
                )));
            }
            rdns.push(Rdn {
                attribute: attribute.to_string(),
                value,
            });
        }
        if rdns.is_empty() {
            return Err(Error::validation("empty distinguished name"));
        }
        Ok(Self { rdns })
    }

    /// The naming component of this entry.
    pub fn rdn(&self) -> &Rdn {
        &self.rdns[0]
    }

    /// Value of the naming component (`cn=foo,...` gives `foo`).
    pub fn name(&self) -> &str {
        &self.rdns[0].value
    }

    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    pub fn depth(&self) -> usize {
        self.rdns.len()
    }

    /// The DN of the containing entry, if any.
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.len() < 2 {
            return None;
        }
        Some(Self {
            rdns: self.rdns[1..].to_vec(),
        })
    }

    /// Build the DN of a direct child.
    pub fn child(&self, attribute: &str, value: &str) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(Rdn {
            attribute: attribute.to_string(),
            value: value.to_string(),
        });
        rdns.extend(self.rdns.iter().cloned());
        Self { rdns }
    }

    /// True when `self` lies strictly below `ancestor`.
    pub fn is_under(&self, ancestor: &Dn) -> bool {
        self.rdns.len() > ancestor.rdns.len() && self.ends_with(ancestor)
    }

    /// True when `self` is `ancestor` or lies below it.
    pub fn is_within(&self, ancestor: &Dn) -> bool {
        self.rdns.len() >= ancestor.rdns.len() && self.ends_with(ancestor)
    }

    /// The ancestor of `self` that sits directly below `ancestor`.
    pub fn child_of_ancestor(&self, ancestor: &Dn) -> Option<Dn> {
        if !self.is_under(ancestor) {
            return None;
        }
        let keep = ancestor.rdns.len() + 1;
        Some(Self {
            rdns: self.rdns[self.rdns.len() - keep..].to_vec(),
        })
    }

    /// Lower-cased canonical form used for identity.
    pub fn normalized(&self) -> String {
        self.rdns
            .iter()
            .map(|rdn| {
                format!(
                    "{}={}",
                    rdn.attribute.to_lowercase(),
                    escape(&rdn.value.to_lowercase())
                )
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    fn ends_with(&self, ancestor: &Dn) -> bool {
        let offset = self.rdns.len() - ancestor.rdns.len();
        self.rdns[offset..]
            .iter()
            .zip(&ancestor.rdns)
            .all(|(a, b)| {
                a.attribute.eq_ignore_ascii_case(&b.attribute)
                    && a.value.to_lowercase() == b.value.to_lowercase()
            })
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for Dn {}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .rdns
            .iter()
            .map(|rdn| format!("{}={}", rdn.attribute, escape(&rdn.value)))
            .collect::<Vec<_>>()
            .join(",");
        f.write_str(&text)
    }
}

impl std::str::FromStr for Dn {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        Dn::parse(text)
    }
}

fn split_unescaped(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in text.chars() {
        if escaped {
            current.push('\\');
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == ',' {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    if !current.trim().is_empty() || !parts.is_empty() {
        parts.push(current);
    }
    parts
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut escaped = false;
    for c in value.chars() {
        if escaped {
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else {
            out.push(c);
        }
    }
    out
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

//! LDIF rendering for the add/modify tools and parsing of search output.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::HashMap;
use std::fmt::Write;

use crate::dn::DistinguishedName;
use ldapbox_core::{Error, Result};

/// Directory entry as returned by a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LdapEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute map keyed by lower-cased attribute type; value order is preserved.
    pub attributes: HashMap<String, Vec<String>>,
}

impl LdapEntry {
    /// Returns the first value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.values(attribute)
            .and_then(|values| values.first().map(String::as_str))
    }

    /// Returns all values for the attribute.
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes
            .get(&attribute.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    /// Returns true if the attribute carries at least one value.
    #[must_use]
    pub fn has(&self, attribute: &str) -> bool {
        self.values(attribute).is_some_and(|values| !values.is_empty())
    }

    fn push(&mut self, attribute: &str, value: String) {
        self.attributes
            .entry(attribute.to_ascii_lowercase())
            .or_default()
            .push(value);
    }
}

/// An entry to be created, with attributes in the order they are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    /// Distinguished name of the new entry.
    pub dn: DistinguishedName,
    /// Attribute/value pairs.
    pub attributes: Vec<(String, String)>,
}

impl NewEntry {
    /// Creates an organizational unit entry named after the leaf of `dn`.
    #[must_use]
    pub fn organizational_unit(dn: DistinguishedName) -> Self {
        let name = dn
            .leaf()
            .first()
            .map(|rdn| rdn.value().to_string())
            .unwrap_or_default();
        Self {
            attributes: vec![
                ("objectClass".to_string(), "top".to_string()),
                ("objectClass".to_string(), "organizationalUnit".to_string()),
                ("ou".to_string(), name),
            ],
            dn,
        }
    }
}

/// Modification of one attribute of an existing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryModification {
    /// Add attribute values.
    Add {
        /// Attribute to modify.
        attribute: String,
        /// Values to add.
        values: Vec<String>,
    },
    /// Delete attribute values.
    Delete {
        /// Attribute to modify.
        attribute: String,
        /// Values to delete (empty removes attribute).
        values: Vec<String>,
    },
    /// Replace attribute values.
    Replace {
        /// Attribute to modify.
        attribute: String,
        /// Replacement values.
        values: Vec<String>,
    },
}

impl DirectoryModification {
    fn parts(&self) -> (&'static str, &str, &[String]) {
        match self {
            Self::Add { attribute, values } => ("add", attribute.as_str(), values.as_slice()),
            Self::Delete { attribute, values } => ("delete", attribute.as_str(), values.as_slice()),
            Self::Replace { attribute, values } => ("replace", attribute.as_str(), values.as_slice()),
        }
    }
}

/// Renders an add record.
#[must_use]
pub fn render_add(entry: &NewEntry) -> String {
    let mut out = String::new();
    push_line(&mut out, "dn", entry.dn.as_str());
    for (attribute, value) in &entry.attributes {
        push_line(&mut out, attribute, value);
    }
    out
}

/// Renders a modify change record.
#[must_use]
pub fn render_modify(dn: &str, modifications: &[DirectoryModification]) -> String {
    let mut out = String::new();
    push_line(&mut out, "dn", dn);
    out.push_str("changetype: modify\n");
    for (index, modification) in modifications.iter().enumerate() {
        if index > 0 {
            out.push_str("-\n");
        }
        let (operation, attribute, values) = modification.parts();
        let _ = writeln!(out, "{operation}: {attribute}");
        for value in values {
            push_line(&mut out, attribute, value);
        }
    }
    out
}

fn push_line(out: &mut String, attribute: &str, value: &str) {
    if is_safe_string(value) {
        let _ = writeln!(out, "{attribute}: {value}");
    } else {
        let _ = writeln!(out, "{attribute}:: {}", STANDARD.encode(value));
    }
}

// RFC 2849 SAFE-STRING, additionally refusing a trailing space.
fn is_safe_string(value: &str) -> bool {
    let Some(first) = value.chars().next() else {
        return true;
    };
    !matches!(first, ' ' | ':' | '<')
        && !value.ends_with(' ')
        && value
            .chars()
            .all(|ch| ch.is_ascii() && !matches!(ch, '\0' | '\n' | '\r'))
}

/// Parses `ldapsearch -LLL` output into entries.
///
/// Folded lines are joined and `attr:: value` lines are base64-decoded.
///
/// # Errors
///
/// Returns [`Error::ParseError`] for attribute lines outside an entry, URL-valued
/// attributes, or invalid base64.
pub fn parse_entries(output: &str) -> Result<Vec<LdapEntry>> {
    let mut entries = Vec::new();
    let mut current: Option<LdapEntry> = None;

    for line in unfold(output) {
        if line.is_empty() {
            entries.extend(current.take());
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let (attribute, value) = parse_line(&line)?;
        if attribute.eq_ignore_ascii_case("dn") {
            entries.extend(current.take());
            current = Some(LdapEntry {
                dn: value,
                attributes: HashMap::new(),
            });
        } else {
            current
                .as_mut()
                .ok_or_else(|| Error::ParseError(format!("attribute outside entry: {line}")))?
                .push(attribute, value);
        }
    }
    entries.extend(current);

    Ok(entries)
}

fn unfold(output: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in output.lines() {
        let raw = raw.trim_end_matches('\r');
        if let Some(continuation) = raw.strip_prefix(' ') {
            if let Some(previous) = lines.last_mut().filter(|line| !line.is_empty()) {
                previous.push_str(continuation);
                continue;
            }
        }
        lines.push(raw.to_string());
    }
    lines
}

fn parse_line(line: &str) -> Result<(&str, String)> {
    let (attribute, rest) = line
        .split_once(':')
        .ok_or_else(|| Error::ParseError(format!("malformed LDIF line: {line}")))?;

    if let Some(encoded) = rest.strip_prefix(':') {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|err| Error::ParseError(format!("invalid base64 for {attribute}: {err}")))?;
        let value = String::from_utf8(bytes)
            .map_err(|err| Error::ParseError(format!("non UTF-8 value for {attribute}: {err}")))?;
        Ok((attribute, value))
    } else if rest.starts_with('<') {
        Err(Error::ParseError(format!(
            "URL values are not supported for {attribute}"
        )))
    } else {
        Ok((attribute, rest.trim_start().to_string()))
    }
}

//! Distinguished names for the fixed directory layout.
//!
//! The directory tree is small and fixed: a suffix derived from the box domain, two
//! organizational units below it, and user/group entries below those. Names handed to the
//! directory tools are built here so escaping is applied in one place.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use ldapbox_core::Error as CoreError;

/// Principal the directory maps a local process running as UID/GID 0 to, when that process
/// authenticates with SASL `EXTERNAL` over the local socket.
pub const PEER_CREDENTIAL_PRINCIPAL: &str =
    "gidNumber=0+uidNumber=0,cn=peercred,cn=external,cn=auth";

/// Errors that can occur when parsing or building distinguished names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// The distinguished name was empty.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// A component in the distinguished name was invalid.
    #[error("invalid distinguished name component: {0}")]
    InvalidComponent(String),
    /// A component was missing the attribute name to the left of the `=`.
    #[error("distinguished name component missing attribute: {0}")]
    MissingAttribute(String),
    /// A component was missing the value to the right of the `=`.
    #[error("distinguished name component missing value for attribute {0}")]
    MissingValue(String),
    /// The distinguished name ended with an escape character.
    #[error("distinguished name contains an unterminated escape sequence")]
    UnterminatedEscape,
    /// A domain could not be turned into a `dc=` suffix.
    #[error("invalid domain `{0}`")]
    InvalidDomain(String),
}

impl From<DistinguishedNameError> for CoreError {
    fn from(err: DistinguishedNameError) -> Self {
        CoreError::InvalidRequest(err.to_string())
    }
}

/// Relative distinguished name (single attribute/value pair).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativeDistinguishedName {
    attribute: String,
    value: String,
}

impl RelativeDistinguishedName {
    /// Create a new relative distinguished name.
    #[must_use]
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Attribute portion of the RDN (e.g. `ou`).
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Attribute value portion of the RDN.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    fn matches(&self, other: &Self) -> bool {
        self.attribute.eq_ignore_ascii_case(&other.attribute)
            && self.value.eq_ignore_ascii_case(&other.value)
    }
}

/// Strongly-typed distinguished name.
///
/// Keeps a canonical string form next to the parsed components. Multi-valued RDNs such as
/// `gidNumber=0+uidNumber=0` are kept as one set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DistinguishedName {
    raw: String,
    rdns: Vec<Vec<RelativeDistinguishedName>>,
}

impl DistinguishedName {
    /// Parses a distinguished name from a string.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] if the distinguished name is empty or contains invalid
    /// syntax.
    pub fn parse(input: impl AsRef<str>) -> std::result::Result<Self, DistinguishedNameError> {
        let raw = input.as_ref().trim();
        if raw.is_empty() {
            return Err(DistinguishedNameError::Empty);
        }

        let mut rdns = Vec::new();
        for component in split_escaped(raw, ',')? {
            let mut set = Vec::new();
            for part in split_escaped(&component, '+')? {
                let (attribute, value) = split_attribute_value(&part)?;
                set.push(RelativeDistinguishedName::new(attribute, value));
            }
            rdns.push(set);
        }

        Ok(Self::from_rdns(rdns))
    }

    /// Builds the suffix for a DNS-style domain: `example.org` becomes `dc=example,dc=org`.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError::InvalidDomain`] for empty labels.
    pub fn from_domain(domain: &str) -> std::result::Result<Self, DistinguishedNameError> {
        let labels = domain.trim().split('.').collect::<Vec<_>>();
        if labels.iter().any(|label| label.trim().is_empty()) {
            return Err(DistinguishedNameError::InvalidDomain(domain.to_string()));
        }

        Ok(Self::from_rdns(
            labels
                .into_iter()
                .map(|label| vec![RelativeDistinguishedName::new("dc", label.trim())])
                .collect(),
        ))
    }

    fn from_rdns(rdns: Vec<Vec<RelativeDistinguishedName>>) -> Self {
        Self {
            raw: rdns_to_string(&rdns),
            rdns,
        }
    }

    /// Borrows the canonical distinguished name string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the leftmost RDN set.
    #[must_use]
    pub fn leaf(&self) -> &[RelativeDistinguishedName] {
        self.rdns.first().map_or(&[], Vec::as_slice)
    }

    /// Looks up the value for the first attribute that matches `attribute` (case-insensitive).
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.rdns
            .iter()
            .flatten()
            .find(|rdn| rdn.attribute.eq_ignore_ascii_case(attribute))
            .map(RelativeDistinguishedName::value)
    }

    /// Creates the distinguished name of a direct child entry, e.g. `ou=users` below the suffix.
    #[must_use]
    pub fn child(&self, attribute: &str, value: &str) -> Self {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(vec![RelativeDistinguishedName::new(attribute, value)]);
        rdns.extend(self.rdns.iter().cloned());
        Self::from_rdns(rdns)
    }

    /// Compares two names the way the directory does: attribute types and values are compared
    /// case-insensitively and multi-valued RDNs are order-independent.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.rdns.len() == other.rdns.len()
            && self.rdns.iter().zip(&other.rdns).all(|(left, right)| {
                left.len() == right.len()
                    && left
                        .iter()
                        .all(|rdn| right.iter().any(|candidate| rdn.matches(candidate)))
            })
    }

    /// The peer-credential principal for the local root user.
    #[must_use]
    pub fn peer_credential_root() -> Self {
        Self::from_rdns(vec![
            vec![
                RelativeDistinguishedName::new("gidNumber", "0"),
                RelativeDistinguishedName::new("uidNumber", "0"),
            ],
            vec![RelativeDistinguishedName::new("cn", "peercred")],
            vec![RelativeDistinguishedName::new("cn", "external")],
            vec![RelativeDistinguishedName::new("cn", "auth")],
        ])
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DistinguishedName {
    type Err = DistinguishedNameError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<DistinguishedName> for String {
    fn from(value: DistinguishedName) -> Self {
        value.raw
    }
}

impl TryFrom<String> for DistinguishedName {
    type Error = DistinguishedNameError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(value)
    }
}

fn split_escaped(
    input: &str,
    delimiter: char,
) -> std::result::Result<Vec<String>, DistinguishedNameError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escape = false;

    for ch in input.chars() {
        if escape {
            current.push('\\');
            current.push(ch);
            escape = false;
        } else if ch == '\\' {
            escape = true;
        } else if ch == delimiter {
            parts.push(current.trim().to_string());
            current.clear();
        } else {
            current.push(ch);
        }
    }

    if escape {
        return Err(DistinguishedNameError::UnterminatedEscape);
    }

    parts.push(current.trim().to_string());
    if parts.iter().any(String::is_empty) {
        return Err(DistinguishedNameError::InvalidComponent(input.to_string()));
    }
    Ok(parts)
}

fn split_attribute_value(
    component: &str,
) -> std::result::Result<(String, String), DistinguishedNameError> {
    let (attribute, value) = component
        .split_once('=')
        .ok_or_else(|| DistinguishedNameError::InvalidComponent(component.to_string()))?;
    let attribute = attribute.trim();
    let value = value.trim_start();

    if attribute.is_empty() {
        return Err(DistinguishedNameError::MissingAttribute(
            component.to_string(),
        ));
    }
    if value.is_empty() {
        return Err(DistinguishedNameError::MissingValue(attribute.to_string()));
    }

    Ok((attribute.to_string(), unescape(value)?))
}

// `\XX` hex pairs decode to raw bytes, so multi-byte UTF-8 sequences survive.
fn unescape(value: &str) -> std::result::Result<String, DistinguishedNameError> {
    let mut bytes = Vec::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            push_char(&mut bytes, ch);
            continue;
        }
        let next = chars
            .next()
            .ok_or(DistinguishedNameError::UnterminatedEscape)?;
        let low = chars.clone().next().and_then(|low| low.to_digit(16));
        let byte = next
            .to_digit(16)
            .zip(low)
            .and_then(|(high, low)| u8::try_from(high * 16 + low).ok());
        match byte {
            Some(byte) => {
                chars.next();
                bytes.push(byte);
            }
            None => push_char(&mut bytes, next),
        }
    }

    String::from_utf8(bytes)
        .map_err(|_| DistinguishedNameError::InvalidComponent(value.to_string()))
}

fn push_char(bytes: &mut Vec<u8>, ch: char) {
    let mut buffer = [0; 4];
    bytes.extend_from_slice(ch.encode_utf8(&mut buffer).as_bytes());
}

fn escape(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut escaped = String::with_capacity(value.len());

    for (idx, ch) in value.chars().enumerate() {
        let needs_escape = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (idx == 0 && (ch == ' ' || ch == '#'))
            || (idx == last && ch == ' ');

        if needs_escape {
            escaped.push('\\');
        }
        escaped.push(ch);
    }

    escaped
}

fn rdns_to_string(rdns: &[Vec<RelativeDistinguishedName>]) -> String {
    rdns.iter()
        .map(|set| {
            set.iter()
                .map(|rdn| format!("{}={}", rdn.attribute(), escape(rdn.value())))
                .collect::<Vec<_>>()
                .join("+")
        })
        .collect::<Vec<_>>()
        .join(",")
}

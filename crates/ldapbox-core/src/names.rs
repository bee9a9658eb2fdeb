//! Validation of user and group names handed to directory tools.

use crate::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

/// Longest accepted user or group name.
pub const MAX_NAME_LENGTH: usize = 32;

/// Kind of account a name refers to, used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    /// A user account.
    User,
    /// A group.
    Group,
}

impl NameKind {
    const fn label(self) -> &'static str {
        match self {
            Self::User => "username",
            Self::Group => "group name",
        }
    }
}

static NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_.-]*$").expect("Failed to parse account name regex")
});

/// Checks that `name` is acceptable as a POSIX account name.
///
/// Names may not start with `-`, so they can never be mistaken for tool options.
///
/// # Errors
///
/// Returns [`Error::ValidationError`] describing the offending name.
pub fn validate_name(kind: NameKind, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::ValidationError(format!(
            "{} cannot be empty",
            kind.label()
        )));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(Error::ValidationError(format!(
            "{} `{name}` is longer than {MAX_NAME_LENGTH} characters",
            kind.label()
        )));
    }
    if !NAME_REGEX.is_match(name) {
        return Err(Error::ValidationError(format!(
            "{} `{name}` contains invalid characters",
            kind.label()
        )));
    }
    Ok(())
}

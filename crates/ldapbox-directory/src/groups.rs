//! Parsing of the identity line printed by `ldapid`.
//!
//! The line mirrors `id(1)`:
//!
//! ```text
//! uid=10001(bob) gid=10000(users) groups=10000(users),10002(admins),10003(web)
//! ```
//!
//! Grammar used here:
//!
//! ```text
//! line   = field SP field SP groups *(SP field)
//! groups = "groups=" *( [id] "(" name ")" [","] )
//! ```
//!
//! Only the third whitespace-separated field is read. Every parenthesised token in its
//! value is a group name; numeric ids and separators are ignored.

use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

static GROUP_TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^()]*)\)").expect("Failed to parse group token regex"));

/// Extracts the supplementary groups from an identity line, dropping `primary_group`.
///
/// Empty output, a missing `groups=` field, or a field without parenthesised names all
/// produce an empty list. Duplicates are reported once, in first-seen order.
#[must_use]
pub fn supplementary_groups(identity: &str, primary_group: &str) -> Vec<String> {
    let Some(line) = identity.lines().map(str::trim).find(|line| !line.is_empty()) else {
        return Vec::new();
    };

    let Some(field) = line.split_whitespace().nth(2) else {
        warn!("identity line has no group field: {line}");
        return Vec::new();
    };
    let Some((key, value)) = field.split_once('=') else {
        warn!("identity group field is not a key/value pair: {field}");
        return Vec::new();
    };
    if key != "groups" {
        warn!("unexpected identity field `{key}` where groups were expected");
        return Vec::new();
    }

    let mut groups: Vec<String> = Vec::new();
    for capture in GROUP_TOKEN_REGEX.captures_iter(value) {
        let name = capture[1].trim();
        if name.is_empty() || name == primary_group || groups.iter().any(|g| g == name) {
            continue;
        }
        groups.push(name.to_string());
    }
    groups
}

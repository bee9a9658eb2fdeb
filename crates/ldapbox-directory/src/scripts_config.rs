//! Keeps the ldapscripts configuration in line with the directory layout.
//!
//! The file is a shell fragment of `KEY="value"` assignments. Each managed key is rewritten
//! independently: active assignments are replaced, a missing key is appended, comments and
//! unrelated keys are left alone.

use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use crate::config::DirectoryConfig;
use crate::Result;

/// Values the helper scripts need to reach and lay out the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptsSettings {
    entries: Vec<(&'static str, String)>,
}

impl ScriptsSettings {
    /// Derives the settings from the directory configuration.
    ///
    /// Authentication is SASL `EXTERNAL`, which cannot carry a password chosen on the
    /// command line, so passwords are always generated (`PASSWORDGEN`) and replaced later.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed domain.
    pub fn from_config(config: &DirectoryConfig) -> Result<Self> {
        Ok(Self {
            entries: vec![
                ("SERVER", config.server_uri.clone()),
                ("SASLAUTH", "EXTERNAL".to_string()),
                ("SUFFIX", config.suffix()?.to_string()),
                ("USUFFIX", format!("ou={}", config.users_ou)),
                ("GSUFFIX", format!("ou={}", config.groups_ou)),
                ("PASSWORDGEN", config.password_generator.clone()),
            ],
        })
    }

    /// Managed keys and values, in write order.
    #[must_use]
    pub fn entries(&self) -> &[(&'static str, String)] {
        &self.entries
    }

    /// Applies every setting to `contents`.
    #[must_use]
    pub fn apply_to(&self, contents: &str) -> String {
        self.entries
            .iter()
            .fold(contents.to_string(), |text, (key, value)| {
                set_key(&text, key, value)
            })
    }
}

/// Sets `key` to `value` in a shell-style configuration text.
#[must_use]
pub fn set_key(contents: &str, key: &str, value: &str) -> String {
    let assignment = format!("{key}=\"{value}\"");
    let mut found = false;
    let mut lines = contents
        .lines()
        .map(|line| {
            if assigns(line, key) {
                found = true;
                assignment.clone()
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>();

    if !found {
        lines.push(assignment);
    }

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

fn assigns(line: &str, key: &str) -> bool {
    let line = line.trim_start();
    let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
    line.strip_prefix(key)
        .is_some_and(|rest| rest.trim_start().starts_with('='))
}

/// Rewrites the configuration file at `path`, creating it if needed.
///
/// Returns true if the file changed. The new content is written to a sibling temporary file
/// carrying the original's permissions and renamed over the original.
///
/// # Errors
///
/// Returns [`ldapbox_core::Error::IoError`] if the file cannot be read or written.
pub async fn write_scripts_config(path: &Path, settings: &ScriptsSettings) -> Result<bool> {
    let current = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err.into()),
    };

    let updated = settings.apply_to(&current);
    if updated == current {
        debug!(path = %path.display(), "scripts configuration already up to date");
        return Ok(false);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let staging = path.with_extension("ldapbox-new");
    fs::write(&staging, &updated).await?;
    match fs::metadata(path).await {
        Ok(original) => fs::set_permissions(&staging, original.permissions()).await?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }
    fs::rename(&staging, path).await?;
    info!(path = %path.display(), "scripts configuration updated");
    Ok(true)
}

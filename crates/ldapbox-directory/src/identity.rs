//! User, group, and membership primitives over the account store.

use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::AccountStore;
use crate::config::DirectoryConfig;
use crate::groups::supplementary_groups;
use crate::Result;
use ldapbox_core::Error;

/// Turns a raw standard-input payload into a password.
///
/// Exactly one trailing line terminator (`\n` or `\r\n`) is removed; everything else,
/// including inner or leading whitespace, is part of the password.
///
/// # Errors
///
/// Returns [`Error::ValidationError`] for an empty password.
pub fn password_from_input(input: &str) -> Result<SecretString> {
    let password = input
        .strip_suffix("\r\n")
        .or_else(|| input.strip_suffix('\n'))
        .unwrap_or(input);
    if password.is_empty() {
        return Err(Error::ValidationError(
            "password read from standard input is empty".to_string(),
        ));
    }
    Ok(SecretString::from(password.to_string()))
}

/// Identity operations on users and groups.
///
/// Multi-step operations (rename, removal, membership changes) are sequenced by
/// [`crate::Provisioner`]; this type provides the individual steps.
#[derive(Clone)]
pub struct IdentityOperations {
    accounts: Arc<dyn AccountStore>,
    config: Arc<DirectoryConfig>,
}

impl IdentityOperations {
    /// Creates the operations over `accounts`.
    #[must_use]
    pub fn new(accounts: Arc<dyn AccountStore>, config: Arc<DirectoryConfig>) -> Self {
        Self { accounts, config }
    }

    /// Creates a user with `primary_group` as its primary group.
    ///
    /// # Errors
    ///
    /// Propagates the helper's failure, including when the user already exists.
    pub async fn create_user(&self, user: &str, primary_group: &str) -> Result<()> {
        info!(user, primary_group, "creating user");
        self.accounts.add_user(user, primary_group).await
    }

    /// Hashes `password` and stores the hash for `user`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] for an empty password and propagates tool failures.
    pub async fn set_password(&self, user: &str, password: &SecretString) -> Result<()> {
        if password.expose_secret().is_empty() {
            return Err(Error::ValidationError("password cannot be empty".to_string()));
        }
        let hash = self.accounts.hash_password(password).await?;
        info!(user, "setting password");
        self.accounts.set_password_hash(user, &hash).await
    }

    /// Deletes a user entry.
    ///
    /// # Errors
    ///
    /// Propagates the helper's failure.
    pub async fn delete_user(&self, user: &str) -> Result<()> {
        info!(user, "deleting user");
        self.accounts.delete_user(user).await
    }

    /// Renames a user entry.
    ///
    /// # Errors
    ///
    /// Propagates the helper's failure.
    pub async fn rename_user(&self, from: &str, to: &str) -> Result<()> {
        info!(from, to, "renaming user");
        self.accounts.rename_user(from, to).await
    }

    /// Lists the supplementary groups of `user`; an unknown user has none.
    ///
    /// # Errors
    ///
    /// Returns an error only when the identity tool cannot be started.
    pub async fn user_groups(&self, user: &str) -> Result<Vec<String>> {
        let Some(identity) = self.accounts.identity(user).await? else {
            debug!(user, "user not found; reporting no groups");
            return Ok(Vec::new());
        };
        Ok(supplementary_groups(&identity, &self.config.primary_group))
    }

    /// Creates `group` unless it exists. Returns true if it was created.
    ///
    /// # Errors
    ///
    /// Propagates the helper's failure.
    pub async fn ensure_group(&self, group: &str) -> Result<bool> {
        if self.accounts.group_exists(group).await? {
            debug!(group, "group already exists");
            return Ok(false);
        }
        info!(group, "creating group");
        self.accounts.add_group(group).await?;
        Ok(true)
    }

    /// Deletes `group` if it exists. Returns true if it was deleted.
    ///
    /// # Errors
    ///
    /// Propagates the helper's failure.
    pub async fn remove_group_if_present(&self, group: &str) -> Result<bool> {
        if !self.accounts.group_exists(group).await? {
            debug!(group, "group does not exist");
            return Ok(false);
        }
        info!(group, "deleting group");
        self.accounts.delete_group(group).await?;
        Ok(true)
    }

    /// Adds `user` to each group, in order.
    ///
    /// # Errors
    ///
    /// Stops at the first failure.
    pub async fn join_groups(&self, user: &str, groups: &[String]) -> Result<()> {
        for group in groups {
            info!(user, group = group.as_str(), "adding group member");
            self.accounts.add_member(user, group).await?;
        }
        Ok(())
    }

    /// Removes `user` from each group, in order.
    ///
    /// # Errors
    ///
    /// Stops at the first failure.
    pub async fn leave_groups(&self, user: &str, groups: &[String]) -> Result<()> {
        for group in groups {
            info!(user, group = group.as_str(), "removing group member");
            self.accounts.remove_member(user, group).await?;
        }
        Ok(())
    }
}

//! Request/response seams between the provisioning logic and the outside world.
//!
//! Provisioning and identity logic only ever talks to these traits. The command-line
//! implementations live in [`crate::tools`]; tests substitute in-memory fakes.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::dn::DistinguishedName;
use crate::ldif::{DirectoryModification, LdapEntry, NewEntry};
use crate::Result;

/// Represents the search scope for LDAP queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    Subtree,
}

impl SearchScope {
    /// Value of the `-s` option understood by `ldapsearch`.
    #[must_use]
    pub const fn as_arg(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::OneLevel => "one",
            Self::Subtree => "sub",
        }
    }
}

/// Segment of the name-service cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDatabase {
    /// User lookups.
    Passwd,
    /// Group lookups.
    Group,
}

impl CacheDatabase {
    /// Every segment touched by user or group changes, in invalidation order.
    pub const ALL: [Self; 2] = [Self::Passwd, Self::Group];

    /// Name of the database as the cache daemon spells it.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passwd => "passwd",
            Self::Group => "group",
        }
    }
}

/// One debconf answer, `<owner> <question> <type> <value>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preseed {
    /// Package owning the question.
    pub owner: String,
    /// Question name, e.g. `slapd/domain`.
    pub question: String,
    /// Question type, e.g. `string` or `select`.
    pub kind: String,
    /// Answer.
    pub value: String,
}

impl Preseed {
    /// Creates an answer.
    #[must_use]
    pub fn new(owner: &str, question: &str, kind: &str, value: impl Into<String>) -> Self {
        Self {
            owner: owner.to_string(),
            question: question.to_string(),
            kind: kind.to_string(),
            value: value.into(),
        }
    }

    /// Line format accepted by `debconf-set-selections`.
    #[must_use]
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {}",
            self.owner, self.question, self.kind, self.value
        )
    }
}

/// Raw directory access authenticated as the local root peer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Directory: Send + Sync {
    /// Returns true if an entry exists at `dn`. A failed lookup means "absent".
    async fn entry_exists(&self, dn: &DistinguishedName) -> Result<bool>;

    /// Searches below `base`.
    async fn search(
        &self,
        base: &DistinguishedName,
        scope: SearchScope,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>>;

    /// Creates an entry.
    async fn add_entry(&self, entry: &NewEntry) -> Result<()>;

    /// Applies modifications to the entry at `dn`.
    async fn modify(&self, dn: &str, modifications: &[DirectoryModification]) -> Result<()>;
}

/// User and group management through the directory helper scripts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Creates a user whose primary group is `primary_group`.
    async fn add_user(&self, user: &str, primary_group: &str) -> Result<()>;

    /// Deletes a user entry.
    async fn delete_user(&self, user: &str) -> Result<()>;

    /// Renames a user entry.
    async fn rename_user(&self, from: &str, to: &str) -> Result<()>;

    /// Turns a clear-text password into its stored, hashed form.
    async fn hash_password(&self, password: &SecretString) -> Result<SecretString>;

    /// Stores an already hashed password for `user`.
    async fn set_password_hash(&self, user: &str, hash: &SecretString) -> Result<()>;

    /// Returns true if the group exists.
    async fn group_exists(&self, group: &str) -> Result<bool>;

    /// Creates a group.
    async fn add_group(&self, group: &str) -> Result<()>;

    /// Deletes a group.
    async fn delete_group(&self, group: &str) -> Result<()>;

    /// Adds `user` to `group`.
    async fn add_member(&self, user: &str, group: &str) -> Result<()>;

    /// Removes `user` from `group`.
    async fn remove_member(&self, user: &str, group: &str) -> Result<()>;

    /// Returns the `id`-style identity line for `user`, or `None` if the user is unknown.
    async fn identity(&self, user: &str) -> Result<Option<String>>;
}

/// Operating-system services the directory depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Host: Send + Sync {
    /// Enables a profile in the PAM stack.
    async fn register_pam_profile(&self, profile: &str) -> Result<()>;

    /// Records debconf answers for later reconfiguration.
    async fn preseed(&self, answers: &[Preseed]) -> Result<()>;

    /// Reconfigures an installed package non-interactively.
    async fn reconfigure_package(&self, package: &str) -> Result<()>;

    /// Returns true if the service is running.
    async fn service_running(&self, service: &str) -> Result<bool>;

    /// Starts a service.
    async fn start_service(&self, service: &str) -> Result<()>;

    /// Restarts a service.
    async fn restart_service(&self, service: &str) -> Result<()>;

    /// Drops one segment of the name-service cache.
    async fn invalidate_cache(&self, database: CacheDatabase) -> Result<()>;
}

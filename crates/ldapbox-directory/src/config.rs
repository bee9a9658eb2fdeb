//! Configuration for the local directory and its helper tools.

use crate::dn::DistinguishedName;
use crate::Result;
use ldapbox_core::Error;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;
use validator::{Validate, ValidationError};

/// Domain preseeded into the directory package when none is configured.
pub const DEFAULT_DOMAIN: &str = "thisbox";
/// Local socket endpoint of the directory service.
pub const DEFAULT_SERVER_URI: &str = "ldapi:///";
/// Default location of the ldapscripts configuration file.
pub const DEFAULT_SCRIPTS_CONFIG_PATH: &str = "/etc/ldapscripts/ldapscripts.conf";

/// Layout of the directory tree and the names of the host services around it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct DirectoryConfig {
    /// Domain handed to the directory package; the suffix is derived from it.
    #[validate(custom(function = "validate_domain"))]
    #[serde(default = "default_domain")]
    pub domain: String,

    /// URI every directory tool connects to.
    #[serde(default = "default_server_uri")]
    pub server_uri: String,

    /// Organizational unit holding user entries.
    #[validate(length(min = 1))]
    #[serde(default = "default_users_ou")]
    pub users_ou: String,

    /// Organizational unit holding group entries.
    #[validate(length(min = 1))]
    #[serde(default = "default_groups_ou")]
    pub groups_ou: String,

    /// Primary group every user belongs to.
    #[validate(length(min = 1))]
    #[serde(default = "default_primary_group")]
    pub primary_group: String,

    /// ldapscripts configuration file.
    #[serde(default = "default_scripts_config_path")]
    pub scripts_config_path: PathBuf,

    /// Password generator command written into the ldapscripts configuration.
    #[validate(length(min = 1))]
    #[serde(default = "default_password_generator")]
    pub password_generator: String,

    /// Profile registered with `pam-auth-update`.
    #[validate(length(min = 1))]
    #[serde(default = "default_pam_profile")]
    pub pam_profile: String,

    /// Directory server package and service name.
    #[validate(length(min = 1))]
    #[serde(default = "default_directory_service")]
    pub directory_service: String,

    /// Package integrating the directory with NSS.
    #[validate(length(min = 1))]
    #[serde(default = "default_name_service_package")]
    pub name_service_package: String,

    /// Name-service cache daemon; also the binary used for invalidation.
    #[validate(length(min = 1))]
    #[serde(default = "default_cache_service")]
    pub cache_service: String,
}

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

fn default_server_uri() -> String {
    DEFAULT_SERVER_URI.to_string()
}

fn default_users_ou() -> String {
    "users".to_string()
}

fn default_groups_ou() -> String {
    "groups".to_string()
}

fn default_primary_group() -> String {
    "users".to_string()
}

fn default_scripts_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_SCRIPTS_CONFIG_PATH)
}

fn default_password_generator() -> String {
    "pwgen".to_string()
}

fn default_pam_profile() -> String {
    "ldap".to_string()
}

fn default_directory_service() -> String {
    "slapd".to_string()
}

fn default_name_service_package() -> String {
    "nslcd".to_string()
}

fn default_cache_service() -> String {
    "nscd".to_string()
}

fn validate_domain(domain: &str) -> std::result::Result<(), ValidationError> {
    DistinguishedName::from_domain(domain)
        .map(|_| ())
        .map_err(|_| ValidationError::new("domain"))
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            server_uri: default_server_uri(),
            users_ou: default_users_ou(),
            groups_ou: default_groups_ou(),
            primary_group: default_primary_group(),
            scripts_config_path: default_scripts_config_path(),
            password_generator: default_password_generator(),
            pam_profile: default_pam_profile(),
            directory_service: default_directory_service(),
            name_service_package: default_name_service_package(),
            cache_service: default_cache_service(),
        }
    }
}

impl DirectoryConfig {
    /// Creates a validated configuration for `domain` with every other setting defaulted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the domain cannot be turned into a suffix.
    pub fn new(domain: impl Into<String>) -> Result<Self> {
        Self {
            domain: domain.into(),
            ..Self::default()
        }
        .validated()
    }

    /// Loads a JSON configuration file; missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] when the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|err| {
            Error::ConfigError(format!("failed to read {}: {err}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validated()
    }

    /// Validates the configuration, returning it unchanged on success.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] describing the invalid fields.
    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        Url::parse(&self.server_uri)?;
        for (label, value) in [
            ("server_uri", &self.server_uri),
            ("password_generator", &self.password_generator),
        ] {
            if value.contains('"') {
                return Err(Error::ConfigError(format!(
                    "{label} cannot contain double quotes"
                )));
            }
        }
        Ok(self)
    }

    /// Overrides the domain.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Overrides the server URI.
    #[must_use]
    pub fn with_server_uri(mut self, uri: impl Into<String>) -> Self {
        self.server_uri = uri.into();
        self
    }

    /// Overrides the ldapscripts configuration path.
    #[must_use]
    pub fn with_scripts_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.scripts_config_path = path.into();
        self
    }

    /// Overrides the primary group.
    #[must_use]
    pub fn with_primary_group(mut self, group: impl Into<String>) -> Self {
        self.primary_group = group.into();
        self
    }

    /// Suffix of the whole tree, e.g. `dc=thisbox`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] for a malformed domain.
    pub fn suffix(&self) -> Result<DistinguishedName> {
        Ok(DistinguishedName::from_domain(&self.domain)?)
    }

    /// Organizational unit holding users, e.g. `ou=users,dc=thisbox`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] for a malformed domain.
    pub fn users_dn(&self) -> Result<DistinguishedName> {
        Ok(self.suffix()?.child("ou", &self.users_ou))
    }

    /// Organizational unit holding groups, e.g. `ou=groups,dc=thisbox`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] for a malformed domain.
    pub fn groups_dn(&self) -> Result<DistinguishedName> {
        Ok(self.suffix()?.child("ou", &self.groups_ou))
    }

    /// Entry of a single group, e.g. `cn=admins,ou=groups,dc=thisbox`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] for a malformed domain.
    pub fn group_dn(&self, group: &str) -> Result<DistinguishedName> {
        Ok(self.groups_dn()?.child("cn", group))
    }
}

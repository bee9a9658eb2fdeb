//! Directory bootstrap: PAM/NSS integration, admin identity, and the fixed tree layout.
//!
//! Each step is idempotent on its own. Package reconfiguration is repeated on every run;
//! admin setup and organizational units probe the directory before changing anything.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::{Directory, Host, Preseed, SearchScope};
use crate::config::DirectoryConfig;
use crate::dn::DistinguishedName;
use crate::ldif::{DirectoryModification, NewEntry};
use crate::Result;
use ldapbox_core::Error;

const ROOT_DN_ATTRIBUTE: &str = "olcRootDN";
const ROOT_PASSWORD_ATTRIBUTE: &str = "olcRootPW";
const ADMIN_ATTRIBUTES: &[&str] = &[ROOT_DN_ATTRIBUTE, ROOT_PASSWORD_ATTRIBUTE];

/// Changes made by [`Bootstrapper::setup_admin`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdminChanges {
    /// A stored root password was deleted.
    pub removed_root_password: bool,
    /// The root DN was replaced by the peer-credential principal.
    pub replaced_root_dn: bool,
}

impl AdminChanges {
    /// Returns true if nothing had to change.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        !self.removed_root_password && !self.replaced_root_dn
    }
}

/// Brings the directory service and its host integration into the target state.
#[derive(Clone)]
pub struct Bootstrapper {
    directory: Arc<dyn Directory>,
    host: Arc<dyn Host>,
    config: Arc<DirectoryConfig>,
}

impl Bootstrapper {
    /// Creates a bootstrapper over the given backends.
    #[must_use]
    pub fn new(
        directory: Arc<dyn Directory>,
        host: Arc<dyn Host>,
        config: Arc<DirectoryConfig>,
    ) -> Self {
        Self {
            directory,
            host,
            config,
        }
    }

    /// Registers the directory profile with the PAM stack.
    ///
    /// # Errors
    ///
    /// Propagates the failure of the registration tool.
    pub async fn register_pam_profile(&self, profile: &str) -> Result<()> {
        self.host.register_pam_profile(profile).await
    }

    /// Preseeds the directory package with `domain` and reconfigures it.
    ///
    /// # Errors
    ///
    /// Propagates the failure of debconf or the package reconfiguration.
    pub async fn reconfigure_directory(&self, package: &str, domain: &str) -> Result<()> {
        self.host
            .preseed(&[
                Preseed::new(package, "slapd/no_configuration", "boolean", "false"),
                Preseed::new(package, "slapd/domain", "string", domain),
                Preseed::new(package, "shared/organization", "string", domain),
            ])
            .await?;
        self.host.reconfigure_package(package).await
    }

    /// Points the NSS integration at the local socket with peer-credential authentication.
    ///
    /// # Errors
    ///
    /// Propagates the failure of debconf or the package reconfiguration.
    pub async fn reconfigure_name_service(&self, package: &str) -> Result<()> {
        let suffix = self.config.suffix()?;
        self.host
            .preseed(&[
                Preseed::new(package, "nslcd/ldap-uris", "string", self.config.server_uri.as_str()),
                Preseed::new(package, "nslcd/ldap-base", "string", suffix.as_str()),
                Preseed::new(package, "nslcd/ldap-auth-type", "select", "SASL"),
                Preseed::new(package, "nslcd/ldap-sasl-mech", "select", "EXTERNAL"),
            ])
            .await?;
        self.host.reconfigure_package(package).await
    }

    /// Restarts the name-service cache daemon.
    ///
    /// # Errors
    ///
    /// Propagates the failure of the service tool.
    pub async fn restart_name_cache(&self, service: &str) -> Result<()> {
        self.host.restart_service(service).await
    }

    /// Starts the directory service unless it is already running.
    ///
    /// Returns whether it was running beforehand. The service is left running either way.
    ///
    /// # Errors
    ///
    /// Propagates the failure of the service tool when starting.
    pub async fn ensure_directory_running(&self, service: &str) -> Result<bool> {
        let was_running = self.host.service_running(service).await?;
        if was_running {
            debug!(service, "directory service already running");
        } else {
            info!(service, "starting directory service");
            self.host.start_service(service).await?;
        }
        Ok(was_running)
    }

    /// Makes the local root user, via peer credentials, the only admin identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no database serves `suffix`, and
    /// propagates search or modify failures.
    pub async fn setup_admin(&self, suffix: &DistinguishedName) -> Result<AdminChanges> {
        let config_base = DistinguishedName::parse("cn=config")?;
        let filter = format!("(olcSuffix={})", escape_filter_value(suffix.as_str()));

        let mut entries = self
            .directory
            .search(&config_base, SearchScope::OneLevel, &filter, ADMIN_ATTRIBUTES)
            .await?
            .into_iter();
        let database = entries.next().ok_or_else(|| {
            Error::NotFound(format!("no directory database serves suffix `{suffix}`"))
        })?;
        if entries.next().is_some() {
            warn!(suffix = %suffix, "several databases serve the suffix; using {}", database.dn);
        }

        let mut changes = AdminChanges::default();

        if database.has(ROOT_PASSWORD_ATTRIBUTE) {
            info!(database = %database.dn, "removing stored root password");
            self.directory
                .modify(
                    &database.dn,
                    &[DirectoryModification::Delete {
                        attribute: ROOT_PASSWORD_ATTRIBUTE.to_string(),
                        values: Vec::new(),
                    }],
                )
                .await?;
            changes.removed_root_password = true;
        }

        let principal = DistinguishedName::peer_credential_root();
        let current = database
            .first(ROOT_DN_ATTRIBUTE)
            .and_then(|dn| DistinguishedName::parse(dn).ok());
        if current.is_some_and(|dn| dn.matches(&principal)) {
            debug!(database = %database.dn, "root DN already uses peer credentials");
        } else {
            info!(database = %database.dn, "switching root DN to peer credentials");
            self.directory
                .modify(
                    &database.dn,
                    &[DirectoryModification::Replace {
                        attribute: ROOT_DN_ATTRIBUTE.to_string(),
                        values: vec![principal.to_string()],
                    }],
                )
                .await?;
            changes.replaced_root_dn = true;
        }

        Ok(changes)
    }

    /// Creates `ou=<name>` below the suffix if it is missing. Returns true if it was created.
    ///
    /// # Errors
    ///
    /// Propagates the failure of the add tool.
    pub async fn create_organizational_unit(&self, name: &str) -> Result<bool> {
        let dn = self.config.suffix()?.child("ou", name);
        if self.directory.entry_exists(&dn).await? {
            debug!(dn = %dn, "organizational unit already exists");
            return Ok(false);
        }

        info!(dn = %dn, "creating organizational unit");
        self.directory
            .add_entry(&NewEntry::organizational_unit(dn))
            .await?;
        Ok(true)
    }
}

fn escape_filter_value(value: &str) -> String {
    value
        .chars()
        .flat_map(|ch| match ch {
            '*' => "\\2a".chars().collect::<Vec<_>>(),
            '(' => "\\28".chars().collect(),
            ')' => "\\29".chars().collect(),
            '\\' => "\\5c".chars().collect(),
            '\0' => "\\00".chars().collect(),
            _ => vec![ch],
        })
        .collect::<String>()
}

//! Command-line implementations of the backend traits.
//!
//! Directory access goes through the OpenLDAP client tools with SASL `EXTERNAL` over the
//! configured socket; account management goes through ldapscripts; host integration goes
//! through debconf, `pam-auth-update`, `service` and the cache daemon.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

use crate::backend::{AccountStore, CacheDatabase, Directory, Host, Preseed, SearchScope};
use crate::config::DirectoryConfig;
use crate::dn::DistinguishedName;
use crate::ldif::{self, DirectoryModification, LdapEntry, NewEntry};
use crate::Result;
use ldapbox_core::{CommandRunner, Error, Invocation};

/// Directory and account backend built on external tools.
#[derive(Debug, Clone)]
pub struct LdapTools {
    runner: Arc<CommandRunner>,
    config: Arc<DirectoryConfig>,
}

impl LdapTools {
    /// Creates the backend.
    #[must_use]
    pub fn new(runner: Arc<CommandRunner>, config: Arc<DirectoryConfig>) -> Self {
        Self { runner, config }
    }

    fn ldap_tool(&self, program: &str) -> Invocation {
        Invocation::new(program).args([
            "-Q",
            "-Y",
            "EXTERNAL",
            "-H",
            self.config.server_uri.as_str(),
        ])
    }
}

#[async_trait]
impl Directory for LdapTools {
    async fn entry_exists(&self, dn: &DistinguishedName) -> Result<bool> {
        self.runner
            .probe(
                self.ldap_tool("ldapsearch")
                    .args(["-LLL", "-s", "base", "-b", dn.as_str(), "1.1"]),
            )
            .await
    }

    async fn search(
        &self,
        base: &DistinguishedName,
        scope: SearchScope,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>> {
        let output = self
            .runner
            .query(
                self.ldap_tool("ldapsearch")
                    .args(["-LLL", "-s", scope.as_arg(), "-b", base.as_str(), filter])
                    .args(attributes.iter().copied()),
            )
            .await?;
        ldif::parse_entries(&output)
    }

    async fn add_entry(&self, entry: &NewEntry) -> Result<()> {
        self.runner
            .run(self.ldap_tool("ldapadd").stdin(ldif::render_add(entry)))
            .await
    }

    async fn modify(&self, dn: &str, modifications: &[DirectoryModification]) -> Result<()> {
        self.runner
            .run(
                self.ldap_tool("ldapmodify")
                    .stdin(ldif::render_modify(dn, modifications)),
            )
            .await
    }
}

#[async_trait]
impl AccountStore for LdapTools {
    async fn add_user(&self, user: &str, primary_group: &str) -> Result<()> {
        self.runner
            .run(Invocation::new("ldapadduser").args([user, primary_group]))
            .await
    }

    async fn delete_user(&self, user: &str) -> Result<()> {
        self.runner
            .run(Invocation::new("ldapdeleteuser").arg(user))
            .await
    }

    async fn rename_user(&self, from: &str, to: &str) -> Result<()> {
        self.runner
            .run(Invocation::new("ldaprenameuser").args([from, to]))
            .await
    }

    async fn hash_password(&self, password: &SecretString) -> Result<SecretString> {
        // -n: no trailing newline; -T: read the secret from a file, here our stdin pipe.
        let output = self
            .runner
            .query(
                Invocation::new("slappasswd")
                    .args(["-n", "-T", "/dev/stdin"])
                    .stdin(password.clone()),
            )
            .await?;
        let hash = output.trim();
        if hash.is_empty() {
            return Err(Error::ParseError(
                "slappasswd produced no password hash".to_string(),
            ));
        }
        Ok(SecretString::from(hash.to_string()))
    }

    async fn set_password_hash(&self, user: &str, hash: &SecretString) -> Result<()> {
        // The hash travels in the LDIF on stdin, never on the argument list.
        let dn = self.config.users_dn()?.child("uid", user);
        self.modify(
            dn.as_str(),
            &[DirectoryModification::Replace {
                attribute: "userPassword".to_string(),
                values: vec![hash.expose_secret().to_string()],
            }],
        )
        .await
    }

    async fn group_exists(&self, group: &str) -> Result<bool> {
        self.entry_exists(&self.config.group_dn(group)?).await
    }

    async fn add_group(&self, group: &str) -> Result<()> {
        self.runner
            .run(Invocation::new("ldapaddgroup").arg(group))
            .await
    }

    async fn delete_group(&self, group: &str) -> Result<()> {
        self.runner
            .run(Invocation::new("ldapdeletegroup").arg(group))
            .await
    }

    async fn add_member(&self, user: &str, group: &str) -> Result<()> {
        self.runner
            .run(Invocation::new("ldapaddusertogroup").args([user, group]))
            .await
    }

    async fn remove_member(&self, user: &str, group: &str) -> Result<()> {
        self.runner
            .run(Invocation::new("ldapdeleteuserfromgroup").args([user, group]))
            .await
    }

    async fn identity(&self, user: &str) -> Result<Option<String>> {
        self.runner
            .query_tolerant(Invocation::new("ldapid").arg(user))
            .await
    }
}

/// Host backend built on Debian system tools.
#[derive(Debug, Clone)]
pub struct HostTools {
    runner: Arc<CommandRunner>,
    config: Arc<DirectoryConfig>,
}

impl HostTools {
    /// Creates the backend.
    #[must_use]
    pub fn new(runner: Arc<CommandRunner>, config: Arc<DirectoryConfig>) -> Self {
        Self { runner, config }
    }
}

#[async_trait]
impl Host for HostTools {
    async fn register_pam_profile(&self, profile: &str) -> Result<()> {
        self.runner
            .run(Invocation::new("pam-auth-update").args(["--package", "--enable", profile]))
            .await
    }

    async fn preseed(&self, answers: &[Preseed]) -> Result<()> {
        let selections = answers
            .iter()
            .map(|answer| answer.to_line() + "\n")
            .collect::<String>();
        self.runner
            .run(Invocation::new("debconf-set-selections").stdin(selections))
            .await
    }

    async fn reconfigure_package(&self, package: &str) -> Result<()> {
        self.runner
            .run(Invocation::new("dpkg-reconfigure").args(["-f", "noninteractive", package]))
            .await
    }

    async fn service_running(&self, service: &str) -> Result<bool> {
        self.runner
            .probe(Invocation::new("service").args([service, "status"]))
            .await
    }

    async fn start_service(&self, service: &str) -> Result<()> {
        self.runner
            .run(Invocation::new("service").args([service, "start"]))
            .await
    }

    async fn restart_service(&self, service: &str) -> Result<()> {
        self.runner
            .run(Invocation::new("service").args([service, "restart"]))
            .await
    }

    async fn invalidate_cache(&self, database: CacheDatabase) -> Result<()> {
        self.runner
            .run(
                Invocation::new(self.config.cache_service.as_str())
                    .args(["-i", database.as_str()]),
            )
            .await
    }
}

//! Executes plans against the backends.

use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::{AccountStore, Directory, Host};
use crate::bootstrap::{AdminChanges, Bootstrapper};
use crate::cache::CacheInvalidator;
use crate::config::DirectoryConfig;
use crate::dn::DistinguishedName;
use crate::identity::IdentityOperations;
use crate::plan::{Operation, Plan, Step};
use crate::scripts_config::{write_scripts_config, ScriptsSettings};
use crate::tools::{HostTools, LdapTools};
use crate::Result;
use ldapbox_core::{CommandRunner, Error};

/// The three backend seams a [`Provisioner`] drives.
#[derive(Clone)]
pub struct Backends {
    /// Raw directory access.
    pub directory: Arc<dyn Directory>,
    /// User and group helpers.
    pub accounts: Arc<dyn AccountStore>,
    /// Host services.
    pub host: Arc<dyn Host>,
}

impl Backends {
    /// Backends that run the real command-line tools.
    #[must_use]
    pub fn system(config: Arc<DirectoryConfig>) -> Self {
        let runner = Arc::new(CommandRunner::new());
        let ldap = Arc::new(LdapTools::new(runner.clone(), config.clone()));
        Self {
            directory: ldap.clone(),
            accounts: ldap,
            host: Arc::new(HostTools::new(runner, config)),
        }
    }
}

/// What an executed plan did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Steps that completed, in order.
    pub completed: Vec<Step>,
    /// Supplementary groups observed by the last group snapshot.
    pub groups: Option<Vec<String>>,
    /// Whether the directory service was already running before setup.
    pub directory_was_running: Option<bool>,
    /// Changes made to the admin identity during setup.
    pub admin_changes: Option<AdminChanges>,
    /// Whether the helper-tool configuration file was rewritten.
    pub scripts_config_changed: Option<bool>,
}

/// Runs operations step by step, stopping at the first failure.
///
/// Nothing is rolled back on failure: steps that already completed stay applied.
pub struct Provisioner {
    config: Arc<DirectoryConfig>,
    bootstrapper: Bootstrapper,
    identity: IdentityOperations,
    cache: CacheInvalidator,
}

impl Provisioner {
    /// Creates a provisioner over explicit backends.
    #[must_use]
    pub fn new(config: Arc<DirectoryConfig>, backends: Backends) -> Self {
        Self {
            bootstrapper: Bootstrapper::new(
                backends.directory,
                backends.host.clone(),
                config.clone(),
            ),
            identity: IdentityOperations::new(backends.accounts, config.clone()),
            cache: CacheInvalidator::new(backends.host),
            config,
        }
    }

    /// Creates a provisioner that runs the real command-line tools.
    #[must_use]
    pub fn from_config(config: DirectoryConfig) -> Self {
        let config = Arc::new(config);
        Self::new(config.clone(), Backends::system(config))
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Plans and executes `operation`.
    ///
    /// `password` is required by operations that set one.
    ///
    /// # Errors
    ///
    /// Returns validation errors before any external call, otherwise the first step failure.
    pub async fn execute(
        &self,
        operation: &Operation,
        password: Option<&SecretString>,
    ) -> Result<Outcome> {
        let plan = operation.plan(&self.config)?;
        self.run(&plan, password).await
    }

    /// Executes an already built plan.
    ///
    /// # Errors
    ///
    /// Returns validation errors before any external call, otherwise the first step failure.
    pub async fn run(&self, plan: &Plan, password: Option<&SecretString>) -> Result<Outcome> {
        let password = if plan.operation.needs_password() {
            match password {
                Some(password) if !password.expose_secret().is_empty() => Some(password),
                _ => {
                    return Err(Error::ValidationError(format!(
                        "{} requires a password on standard input",
                        plan.operation.handler()
                    )))
                }
            }
        } else {
            None
        };

        let handler = plan.operation.handler();
        let mut outcome = Outcome::default();
        for step in &plan.steps {
            info!(handler, step = ?step, "executing step");
            self.apply(step, password, &mut outcome).await?;
            outcome.completed.push(step.clone());
        }
        debug!(handler, steps = outcome.completed.len(), "plan complete");
        Ok(outcome)
    }

    async fn apply(
        &self,
        step: &Step,
        password: Option<&SecretString>,
        outcome: &mut Outcome,
    ) -> Result<()> {
        match step {
            Step::RegisterPamProfile { profile } => {
                self.bootstrapper.register_pam_profile(profile).await
            }
            Step::ReconfigureDirectory { package, domain } => {
                self.bootstrapper
                    .reconfigure_directory(package, domain)
                    .await
            }
            Step::ReconfigureNameService { package } => {
                self.bootstrapper.reconfigure_name_service(package).await
            }
            Step::RestartNameCache { service } => {
                self.bootstrapper.restart_name_cache(service).await
            }
            Step::EnsureDirectoryRunning { service } => {
                let was_running = self.bootstrapper.ensure_directory_running(service).await?;
                info!(was_running, "directory service ready");
                outcome.directory_was_running = Some(was_running);
                Ok(())
            }
            Step::SetupAdmin { suffix } => {
                let suffix = DistinguishedName::parse(suffix)?;
                outcome.admin_changes = Some(self.bootstrapper.setup_admin(&suffix).await?);
                Ok(())
            }
            Step::EnsureOrganizationalUnit { name } => {
                self.bootstrapper
                    .create_organizational_unit(name)
                    .await
                    .map(|_| ())
            }
            Step::WriteScriptsConfig { path } => {
                let settings = ScriptsSettings::from_config(&self.config)?;
                let changed = write_scripts_config(path, &settings).await?;
                outcome.scripts_config_changed = Some(changed);
                Ok(())
            }
            Step::AddUser {
                user,
                primary_group,
            } => self.identity.create_user(user, primary_group).await,
            Step::SetPassword { user } => {
                let password = password.ok_or_else(|| {
                    Error::InternalError("password step planned without a password".to_string())
                })?;
                self.identity.set_password(user, password).await
            }
            Step::DeleteUser { user } => self.identity.delete_user(user).await,
            Step::RenameUser { from, to } => self.identity.rename_user(from, to).await,
            Step::SnapshotGroups { user } => {
                let groups = self.identity.user_groups(user).await?;
                debug!(user = user.as_str(), ?groups, "group snapshot taken");
                outcome.groups = Some(groups);
                Ok(())
            }
            Step::StripGroups { user } => {
                self.identity
                    .leave_groups(user, snapshot(outcome, step)?)
                    .await
            }
            Step::RestoreGroups { user } => {
                self.identity
                    .join_groups(user, snapshot(outcome, step)?)
                    .await
            }
            Step::EnsureGroup { group } => self.identity.ensure_group(group).await.map(|_| ()),
            Step::RemoveGroupIfPresent { group } => self
                .identity
                .remove_group_if_present(group)
                .await
                .map(|_| ()),
            Step::AddMember { user, group } => {
                self.identity
                    .join_groups(user, std::slice::from_ref(group))
                    .await
            }
            Step::LeaveGroup { user, group } => {
                if snapshot(outcome, step)?.contains(group) {
                    self.identity
                        .leave_groups(user, std::slice::from_ref(group))
                        .await
                } else {
                    info!(
                        user = user.as_str(),
                        group = group.as_str(),
                        "user is not a member; nothing to remove"
                    );
                    Ok(())
                }
            }
            Step::FlushCache => self.cache.flush().await,
        }
    }
}

fn snapshot<'a>(outcome: &'a Outcome, step: &Step) -> Result<&'a [String]> {
    outcome.groups.as_deref().ok_or_else(|| {
        Error::InternalError(format!("{step:?} needs a group snapshot taken earlier"))
    })
}

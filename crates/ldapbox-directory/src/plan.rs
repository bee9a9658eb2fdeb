//! Subcommands as explicit, ordered plans.
//!
//! The order of steps inside a plan is what keeps the directory consistent: membership is
//! snapshotted before a rename and replayed after it, a user is stripped from its groups
//! before it is deleted, and every mutation ends with a cache flush.

use serde::Serialize;
use std::path::PathBuf;

use crate::config::DirectoryConfig;
use crate::Result;
use ldapbox_core::{validate_name, NameKind};

/// One subcommand with its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "operation", rename_all = "kebab-case")]
pub enum Operation {
    /// Bootstrap the directory service and its host integration.
    Setup,
    /// Create a user and set its password.
    CreateUser {
        /// New username.
        user: String,
    },
    /// Delete a user after removing it from its groups.
    RemoveUser {
        /// Username.
        user: String,
    },
    /// Rename a user, carrying its group memberships across.
    RenameUser {
        /// Current username.
        from: String,
        /// New username.
        to: String,
    },
    /// Replace a user's password.
    SetUserPassword {
        /// Username.
        user: String,
    },
    /// Create a group if it does not exist.
    CreateGroup {
        /// Group name.
        group: String,
    },
    /// Delete a group if it exists.
    RemoveGroup {
        /// Group name.
        group: String,
    },
    /// List a user's supplementary groups.
    GetUserGroups {
        /// Username.
        user: String,
    },
    /// Add a user to a group, creating the group when needed.
    AddUserToGroup {
        /// Username.
        user: String,
        /// Group name.
        group: String,
    },
    /// Remove a user from a group.
    RemoveUserFromGroup {
        /// Username.
        user: String,
        /// Group name.
        group: String,
    },
}

impl Operation {
    /// Name of the handler, the subcommand with underscores.
    #[must_use]
    pub const fn handler(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::CreateUser { .. } => "create_user",
            Self::RemoveUser { .. } => "remove_user",
            Self::RenameUser { .. } => "rename_user",
            Self::SetUserPassword { .. } => "set_user_password",
            Self::CreateGroup { .. } => "create_group",
            Self::RemoveGroup { .. } => "remove_group",
            Self::GetUserGroups { .. } => "get_user_groups",
            Self::AddUserToGroup { .. } => "add_user_to_group",
            Self::RemoveUserFromGroup { .. } => "remove_user_from_group",
        }
    }

    /// Returns true if the operation reads a password from standard input.
    #[must_use]
    pub const fn needs_password(&self) -> bool {
        matches!(self, Self::CreateUser { .. } | Self::SetUserPassword { .. })
    }

    /// Returns true if the operation changes users or groups and therefore flushes the
    /// name-service cache.
    #[must_use]
    pub const fn is_mutating(&self) -> bool {
        !matches!(
            self,
            Self::Setup | Self::SetUserPassword { .. } | Self::GetUserGroups { .. }
        )
    }

    /// Checks every user and group name the operation carries.
    ///
    /// # Errors
    ///
    /// Returns [`ldapbox_core::Error::ValidationError`] for the first invalid name.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Setup => Ok(()),
            Self::CreateUser { user }
            | Self::RemoveUser { user }
            | Self::SetUserPassword { user }
            | Self::GetUserGroups { user } => validate_name(NameKind::User, user),
            Self::RenameUser { from, to } => {
                validate_name(NameKind::User, from)?;
                validate_name(NameKind::User, to)
            }
            Self::CreateGroup { group } | Self::RemoveGroup { group } => {
                validate_name(NameKind::Group, group)
            }
            Self::AddUserToGroup { user, group } | Self::RemoveUserFromGroup { user, group } => {
                validate_name(NameKind::User, user)?;
                validate_name(NameKind::Group, group)
            }
        }
    }

    /// Builds the ordered plan for this operation.
    ///
    /// # Errors
    ///
    /// Returns a validation error for invalid names and an invalid-request error for a
    /// malformed domain.
    pub fn plan(&self, config: &DirectoryConfig) -> Result<Plan> {
        self.validate()?;

        let steps = match self {
            Self::Setup => vec![
                Step::RegisterPamProfile {
                    profile: config.pam_profile.clone(),
                },
                Step::ReconfigureDirectory {
                    package: config.directory_service.clone(),
                    domain: config.domain.clone(),
                },
                Step::ReconfigureNameService {
                    package: config.name_service_package.clone(),
                },
                Step::RestartNameCache {
                    service: config.cache_service.clone(),
                },
                Step::EnsureDirectoryRunning {
                    service: config.directory_service.clone(),
                },
                Step::SetupAdmin {
                    suffix: config.suffix()?.to_string(),
                },
                Step::EnsureOrganizationalUnit {
                    name: config.users_ou.clone(),
                },
                Step::EnsureOrganizationalUnit {
                    name: config.groups_ou.clone(),
                },
                Step::WriteScriptsConfig {
                    path: config.scripts_config_path.clone(),
                },
            ],
            Self::CreateUser { user } => vec![
                Step::AddUser {
                    user: user.clone(),
                    primary_group: config.primary_group.clone(),
                },
                Step::SetPassword { user: user.clone() },
            ],
            Self::RemoveUser { user } => vec![
                Step::SnapshotGroups { user: user.clone() },
                Step::StripGroups { user: user.clone() },
                Step::DeleteUser { user: user.clone() },
            ],
            Self::RenameUser { from, to } => vec![
                Step::SnapshotGroups { user: from.clone() },
                Step::StripGroups { user: from.clone() },
                Step::RenameUser {
                    from: from.clone(),
                    to: to.clone(),
                },
                Step::RestoreGroups { user: to.clone() },
            ],
            Self::SetUserPassword { user } => vec![Step::SetPassword { user: user.clone() }],
            Self::CreateGroup { group } => vec![Step::EnsureGroup {
                group: group.clone(),
            }],
            Self::RemoveGroup { group } => vec![Step::RemoveGroupIfPresent {
                group: group.clone(),
            }],
            Self::GetUserGroups { user } => vec![Step::SnapshotGroups { user: user.clone() }],
            Self::AddUserToGroup { user, group } => vec![
                Step::EnsureGroup {
                    group: group.clone(),
                },
                Step::AddMember {
                    user: user.clone(),
                    group: group.clone(),
                },
            ],
            Self::RemoveUserFromGroup { user, group } => vec![
                Step::SnapshotGroups { user: user.clone() },
                Step::LeaveGroup {
                    user: user.clone(),
                    group: group.clone(),
                },
            ],
        };

        let mut plan = Plan {
            operation: self.clone(),
            steps,
        };
        if self.is_mutating() {
            plan.steps.push(Step::FlushCache);
        }
        Ok(plan)
    }
}

/// A single named action against the directory or the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "kebab-case")]
#[allow(missing_docs)]
pub enum Step {
    /// Enable the directory profile in the PAM stack.
    RegisterPamProfile { profile: String },
    /// Preseed and reconfigure the directory package.
    ReconfigureDirectory { package: String, domain: String },
    /// Preseed and reconfigure the NSS integration for socket access.
    ReconfigureNameService { package: String },
    /// Restart the name-service cache daemon.
    RestartNameCache { service: String },
    /// Start the directory service if it is stopped.
    EnsureDirectoryRunning { service: String },
    /// Make the peer-credential principal the only admin identity.
    SetupAdmin { suffix: String },
    /// Create an organizational unit below the suffix if missing.
    EnsureOrganizationalUnit { name: String },
    /// Rewrite the helper-tool configuration.
    WriteScriptsConfig { path: PathBuf },
    /// Create a user.
    AddUser { user: String, primary_group: String },
    /// Hash the password from standard input and store it.
    SetPassword { user: String },
    /// Delete a user.
    DeleteUser { user: String },
    /// Rename a user.
    RenameUser { from: String, to: String },
    /// Remember the user's supplementary groups.
    SnapshotGroups { user: String },
    /// Remove the user from every snapshotted group.
    StripGroups { user: String },
    /// Add the user to every snapshotted group.
    RestoreGroups { user: String },
    /// Create a group if missing.
    EnsureGroup { group: String },
    /// Delete a group if present.
    RemoveGroupIfPresent { group: String },
    /// Add a user to a group.
    AddMember { user: String, group: String },
    /// Remove a user from a group if the snapshot lists it.
    LeaveGroup { user: String, group: String },
    /// Invalidate the `passwd` and `group` caches.
    FlushCache,
}

/// The ordered steps carrying out one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    /// The operation being planned.
    pub operation: Operation,
    /// Steps in execution order.
    pub steps: Vec<Step>,
}

impl Plan {
    /// Renders the plan as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

//! Command-line arguments and their translation into operations.

use clap::{Parser, Subcommand, ValueEnum};
use ldapbox_core::Result;
use ldapbox_directory::{DirectoryConfig, Operation};
use std::path::PathBuf;

/// Provision the box-local LDAP directory and manage its users and groups.
#[derive(Debug, Parser)]
#[command(name = "ldapbox", version, about, long_about = None)]
pub struct Cli {
    /// JSON configuration file; flags below override its values.
    #[arg(long, global = true, env = "LDAPBOX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Domain the directory suffix is derived from.
    #[arg(long, global = true, env = "LDAPBOX_DOMAIN")]
    pub domain: Option<String>,

    /// URI every directory tool connects to.
    #[arg(long, global = true, env = "LDAPBOX_SERVER_URI")]
    pub server_uri: Option<String>,

    /// ldapscripts configuration file rewritten by `setup`.
    #[arg(long = "scripts-config", global = true, env = "LDAPBOX_SCRIPTS_CONFIG")]
    pub scripts_config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `ldapbox_directory=debug`. `RUST_LOG` takes precedence.
    #[arg(long, global = true, env = "LDAPBOX_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Print the planned steps as JSON instead of running them.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Output format for results and errors.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// How results and errors are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text, one item per line.
    Text,
    /// JSON documents.
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Bootstrap the directory service and its PAM/NSS integration.
    Setup,
    /// Create a user; the password is read from standard input.
    CreateUser { username: String },
    /// Remove a user from all its groups, then delete it.
    RemoveUser { username: String },
    /// Rename a user, keeping its group memberships.
    RenameUser {
        oldusername: String,
        newusername: String,
    },
    /// Set a user's password from standard input.
    SetUserPassword { username: String },
    /// Create a group if it does not exist.
    CreateGroup { groupname: String },
    /// Delete a group if it exists.
    RemoveGroup { groupname: String },
    /// Print a user's supplementary groups, one per line.
    GetUserGroups { username: String },
    /// Add a user to a group, creating the group if needed.
    AddUserToGroup { username: String, groupname: String },
    /// Remove a user from a group.
    RemoveUserFromGroup { username: String, groupname: String },
}

impl Command {
    pub fn into_operation(self) -> Operation {
        match self {
            Self::Setup => Operation::Setup,
            Self::CreateUser { username } => Operation::CreateUser { user: username },
            Self::RemoveUser { username } => Operation::RemoveUser { user: username },
            Self::RenameUser {
                oldusername,
                newusername,
            } => Operation::RenameUser {
                from: oldusername,
                to: newusername,
            },
            Self::SetUserPassword { username } => Operation::SetUserPassword { user: username },
            Self::CreateGroup { groupname } => Operation::CreateGroup { group: groupname },
            Self::RemoveGroup { groupname } => Operation::RemoveGroup { group: groupname },
            Self::GetUserGroups { username } => Operation::GetUserGroups { user: username },
            Self::AddUserToGroup {
                username,
                groupname,
            } => Operation::AddUserToGroup {
                user: username,
                group: groupname,
            },
            Self::RemoveUserFromGroup {
                username,
                groupname,
            } => Operation::RemoveUserFromGroup {
                user: username,
                group: groupname,
            },
        }
    }
}

impl Cli {
    /// Merges defaults, the optional configuration file, and flag overrides.
    pub fn directory_config(&self) -> Result<DirectoryConfig> {
        let mut config = match &self.config {
            Some(path) => DirectoryConfig::from_file(path)?,
            None => DirectoryConfig::default(),
        };
        if let Some(domain) = &self.domain {
            config = config.with_domain(domain.as_str());
        }
        if let Some(uri) = &self.server_uri {
            config = config.with_server_uri(uri.as_str());
        }
        if let Some(path) = &self.scripts_config {
            config = config.with_scripts_config_path(path.as_path());
        }
        config.validated()
    }
}

/// Renders a group list for standard output.
pub fn render_groups(groups: &[String], format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Text => groups.iter().map(|group| format!("{group}\n")).collect(),
        OutputFormat::Json => serde_json::to_string(groups)? + "\n",
    })
}

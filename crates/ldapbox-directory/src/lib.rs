//! Provisioning and identity management for a box-local OpenLDAP directory.
//!
//! Every subcommand is turned into an ordered [`Plan`] of [`Step`]s which the [`Provisioner`]
//! executes against three backend seams: [`Directory`] for raw entry access, [`AccountStore`]
//! for the ldapscripts helpers, and [`Host`] for the operating-system services around the
//! directory. The command-line implementations of those seams live in [`LdapTools`] and
//! [`HostTools`].

#![deny(missing_docs)]

mod backend;
mod bootstrap;
mod cache;
mod config;
mod dn;
mod groups;
mod identity;
mod ldif;
mod plan;
mod provisioner;
mod scripts_config;
mod tools;

pub use backend::{AccountStore, CacheDatabase, Directory, Host, Preseed, SearchScope};
pub use bootstrap::{AdminChanges, Bootstrapper};
pub use cache::CacheInvalidator;
pub use config::{
    DirectoryConfig, DEFAULT_DOMAIN, DEFAULT_SCRIPTS_CONFIG_PATH, DEFAULT_SERVER_URI,
};
pub use dn::{
    DistinguishedName, DistinguishedNameError, RelativeDistinguishedName,
    PEER_CREDENTIAL_PRINCIPAL,
};
pub use groups::supplementary_groups;
pub use identity::{password_from_input, IdentityOperations};
pub use ldif::{parse_entries, render_add, render_modify, DirectoryModification, LdapEntry, NewEntry};
pub use plan::{Operation, Plan, Step};
pub use provisioner::{Backends, Outcome, Provisioner};
pub use scripts_config::{set_key, write_scripts_config, ScriptsSettings};
pub use tools::{HostTools, LdapTools};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = ldapbox_core::Result<T>;

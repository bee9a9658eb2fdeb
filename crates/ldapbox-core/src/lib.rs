//! # ldapbox-core
//!
//! Shared building blocks for provisioning a local LDAP directory.
//!
//! ## Modules
//!
//! - [`error`] - Error type and exit status mapping
//! - [`command`] - External tool execution with a fail-fast policy
//! - [`names`] - Validation of user and group names

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod command;
pub mod error;
pub mod names;

// Re-export commonly used types
pub use command::{CommandOutput, CommandRunner, Invocation, OutputMode, ProcessSpawner};
pub use error::{Error, ErrorReport, Result, USAGE_EXIT_CODE};
pub use names::{validate_name, NameKind};

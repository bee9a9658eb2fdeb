//! Error types for directory provisioning.
//!
//! Every failure in the workspace funnels into [`Error`]. External-tool failures keep the
//! tool's exit code so the command line front-end can propagate it as its own exit status.

use serde::Serialize;
use thiserror::Error;

/// Main error type for ldapbox operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// An external tool exited unsuccessfully where success was required
    #[error("`{program}` failed{}: {stderr}", exit_suffix(.code))]
    CommandFailed {
        /// Program that was executed
        program: String,
        /// Exit code, `None` when terminated by a signal
        code: Option<i32>,
        /// Captured standard error output
        stderr: String,
    },

    /// An external tool could not be started at all
    #[error("Unable to run `{program}`: {message}")]
    CommandUnavailable {
        /// Program that was requested
        program: String,
        /// Reason reported by the operating system
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Argument or input validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Output of an external tool could not be interpreted
    #[error("Failed to parse tool output: {0}")]
    ParseError(String),

    /// Directory entry not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    IoError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" with exit code {code}"),
        None => " (terminated by signal)".to_string(),
    }
}

/// Specialized result type for ldapbox operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Exit status used for usage and validation failures.
pub const USAGE_EXIT_CODE: u8 = 2;

/// Structured error report, printed by the CLI when JSON output is requested.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorReport {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Process exit status the error maps to
    pub exit_code: u8,
}

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::CommandFailed { .. } => "COMMAND_FAILED",
            Self::CommandUnavailable { .. } => "COMMAND_UNAVAILABLE",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::ParseError(_) => "PARSE_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::IoError(_) => "IO_ERROR",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the process exit status this error should terminate with.
    ///
    /// A failed tool's own non-zero exit code is propagated when it fits in a `u8`.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::CommandFailed {
                code: Some(code), ..
            } => u8::try_from(*code).ok().filter(|c| *c != 0).unwrap_or(1),
            Self::ValidationError(_) | Self::InvalidRequest(_) => USAGE_EXIT_CODE,
            _ => 1,
        }
    }

    /// Converts the error into an [`ErrorReport`].
    #[must_use]
    pub fn into_report(self) -> ErrorReport {
        ErrorReport {
            code: self.error_code().to_string(),
            exit_code: self.exit_code(),
            message: self.to_string(),
        }
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::InternalError(_)
                | Self::ConfigError(_)
                | Self::IoError(_)
                | Self::CommandUnavailable { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::ConfigError(format!("invalid server URI: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::CommandFailed {
                program: "ldapadduser".to_string(),
                code: Some(1),
                stderr: String::new(),
            }
            .error_code(),
            "COMMAND_FAILED"
        );
        assert_eq!(
            Error::CommandUnavailable {
                program: "nscd".to_string(),
                message: "not found".to_string(),
            }
            .error_code(),
            "COMMAND_UNAVAILABLE"
        );
        assert_eq!(
            Error::ConfigError("test".to_string()).error_code(),
            "CONFIG_ERROR"
        );
        assert_eq!(
            Error::ValidationError("test".to_string()).error_code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            Error::ParseError("test".to_string()).error_code(),
            "PARSE_ERROR"
        );
        assert_eq!(
            Error::NotFound("test".to_string()).error_code(),
            "NOT_FOUND"
        );
        assert_eq!(Error::IoError("test".to_string()).error_code(), "IO_ERROR");
        assert_eq!(
            Error::InternalError("test".to_string()).error_code(),
            "INTERNAL_ERROR"
        );
    }

    #[test]
    fn test_error_display() {
        let err = Error::CommandFailed {
            program: "ldapdeleteuser".to_string(),
            code: Some(1),
            stderr: "no such user".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "`ldapdeleteuser` failed with exit code 1: no such user"
        );

        let err = Error::CommandFailed {
            program: "slapd".to_string(),
            code: None,
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "`slapd` failed (terminated by signal): ");
    }

    #[test]
    fn test_exit_code_propagates_tool_status() {
        let failed = |code| Error::CommandFailed {
            program: "ldapaddgroup".to_string(),
            code,
            stderr: String::new(),
        };
        assert_eq!(failed(Some(32)).exit_code(), 32);
        assert_eq!(failed(Some(300)).exit_code(), 1);
        assert_eq!(failed(Some(-1)).exit_code(), 1);
        assert_eq!(failed(None).exit_code(), 1);
        assert_eq!(
            Error::ValidationError("bad name".to_string()).exit_code(),
            USAGE_EXIT_CODE
        );
        assert_eq!(Error::NotFound("db".to_string()).exit_code(), 1);
    }

    #[test]
    fn test_into_report() {
        let report = Error::NotFound("olcSuffix=dc=thisbox".to_string()).into_report();
        assert_eq!(report.code, "NOT_FOUND");
        assert_eq!(report.message, "Not found: olcSuffix=dc=thisbox");
        assert_eq!(report.exit_code, 1);

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("NOT_FOUND"));
    }

    #[test]
    fn test_should_log() {
        assert!(Error::InternalError("test".to_string()).should_log());
        assert!(Error::ConfigError("test".to_string()).should_log());
        assert!(!Error::NotFound("test".to_string()).should_log());
        assert!(!Error::ValidationError("test".to_string()).should_log());
    }

    #[test]
    fn test_from_io_error() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let converted: Error = err.into();
        assert!(matches!(converted, Error::IoError(_)));
    }

    #[test]
    fn test_from_url_parse_error() {
        let err = url::Url::parse("not a url").unwrap_err();
        let converted: Error = err.into();
        assert!(matches!(converted, Error::ConfigError(_)));
    }
}

//! Synchronous-in-effect execution of external tools.
//!
//! The [`CommandRunner`] owns the fail-fast contract: a non-zero exit is an error unless the
//! caller asked to inspect the exit status ([`CommandRunner::probe`]) or to tolerate it
//! ([`CommandRunner::query_tolerant`]). Process creation itself sits behind the
//! [`ProcessSpawner`] seam so callers can be tested without touching the host.

use crate::{Error, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// A single external tool invocation.
#[derive(Clone)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    stdin: Option<SecretString>,
}

impl Invocation {
    /// Creates an invocation of `program` without arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    /// Appends a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends multiple arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the payload written to the tool's standard input.
    ///
    /// The payload is kept out of `Debug` output and logs.
    #[must_use]
    pub fn stdin(mut self, payload: impl Into<SecretString>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    /// Program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Argument list.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Standard input payload, if any.
    #[must_use]
    pub fn input(&self) -> Option<&SecretString> {
        self.stdin.as_ref()
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("stdin", &self.stdin.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Whether the tool's standard output is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Standard output is discarded.
    Discard,
    /// Standard output is captured and returned.
    Capture,
}

/// Result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub code: Option<i32>,
    /// Captured standard output (empty in [`OutputMode::Discard`]).
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns true if the process exited with status zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Spawns external processes and waits for them to exit.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessSpawner: Send + Sync {
    /// Runs the invocation to completion, never interpreting its exit status.
    async fn spawn(&self, invocation: &Invocation, mode: OutputMode) -> Result<CommandOutput>;
}

/// [`ProcessSpawner`] backed by `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSpawner;

#[async_trait]
impl ProcessSpawner for TokioSpawner {
    async fn spawn(&self, invocation: &Invocation, mode: OutputMode) -> Result<CommandOutput> {
        let mut command = Command::new(invocation.program());
        command
            .args(invocation.arguments())
            .stdin(if invocation.input().is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(match mode {
                OutputMode::Capture => Stdio::piped(),
                OutputMode::Discard => Stdio::null(),
            })
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let unavailable = |err: std::io::Error| Error::CommandUnavailable {
            program: invocation.program().to_string(),
            message: err.to_string(),
        };

        let mut child = command.spawn().map_err(unavailable)?;
        let stdin = child.stdin.take();
        let feed = async move {
            if let (Some(payload), Some(mut stdin)) = (invocation.input(), stdin) {
                match stdin.write_all(payload.expose_secret().as_bytes()).await {
                    // The tool exited without reading all of its input.
                    Err(err) if err.kind() == ErrorKind::BrokenPipe => {}
                    result => result?,
                }
                // Dropping the handle closes the pipe so the tool sees end of input.
            }
            Ok::<(), std::io::Error>(())
        };

        // Output is drained while input is still being written.
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        fed.map_err(unavailable)?;
        let output = output.map_err(unavailable)?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
        })
    }
}

/// Executes external tools with the fail-fast policy.
pub struct CommandRunner {
    spawner: Box<dyn ProcessSpawner>,
}

impl fmt::Debug for CommandRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRunner").finish_non_exhaustive()
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner {
    /// Creates a runner that spawns real processes.
    #[must_use]
    pub fn new() -> Self {
        Self::with_spawner(Box::new(TokioSpawner))
    }

    /// Creates a runner over a custom spawner.
    #[must_use]
    pub fn with_spawner(spawner: Box<dyn ProcessSpawner>) -> Self {
        Self { spawner }
    }

    /// Runs the tool, discarding its output. A non-zero exit is an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] on a non-zero exit and [`Error::CommandUnavailable`]
    /// when the tool cannot be started.
    pub async fn run(&self, invocation: Invocation) -> Result<()> {
        let output = self.spawn(&invocation, OutputMode::Discard).await?;
        ensure_success(&invocation, output).map(|_| ())
    }

    /// Runs the tool and reports whether it exited successfully.
    ///
    /// Used for existence checks, where a non-zero exit means "absent".
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandUnavailable`] when the tool cannot be started.
    pub async fn probe(&self, invocation: Invocation) -> Result<bool> {
        let output = self.spawn(&invocation, OutputMode::Discard).await?;
        debug!(program = invocation.program(), code = ?output.code, "probe finished");
        Ok(output.success())
    }

    /// Runs the tool and returns its standard output. A non-zero exit is an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] on a non-zero exit and [`Error::CommandUnavailable`]
    /// when the tool cannot be started.
    pub async fn query(&self, invocation: Invocation) -> Result<String> {
        let output = self.spawn(&invocation, OutputMode::Capture).await?;
        ensure_success(&invocation, output).map(|output| output.stdout)
    }

    /// Runs the tool and returns its standard output, or `None` on a non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandUnavailable`] when the tool cannot be started.
    pub async fn query_tolerant(&self, invocation: Invocation) -> Result<Option<String>> {
        let output = self.spawn(&invocation, OutputMode::Capture).await?;
        if output.success() {
            Ok(Some(output.stdout))
        } else {
            debug!(program = invocation.program(), code = ?output.code, "query tolerated failure");
            Ok(None)
        }
    }

    async fn spawn(&self, invocation: &Invocation, mode: OutputMode) -> Result<CommandOutput> {
        debug!(
            program = invocation.program(),
            args = ?invocation.arguments(),
            stdin = invocation.input().is_some(),
            "running external tool"
        );
        self.spawner.spawn(invocation, mode).await
    }
}

fn ensure_success(invocation: &Invocation, output: CommandOutput) -> Result<CommandOutput> {
    if output.success() {
        Ok(output)
    } else {
        Err(Error::CommandFailed {
            program: invocation.program().to_string(),
            code: output.code,
            stderr: output.stderr,
        })
    }
}

#[cfg(test)]
impl Invocation {
    pub(crate) fn is(&self, program: &str, args: &[&str]) -> bool {
        self.program == program
            && self.args.len() == args.len()
            && self.args.iter().zip(args).all(|(a, b)| a == b)
    }
}

#[cfg(test)]
impl CommandOutput {
    pub(crate) fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            ..Self::default()
        }
    }

    pub(crate) fn printed(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }
}

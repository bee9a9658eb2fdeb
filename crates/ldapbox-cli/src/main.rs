//! `ldapbox`: directory provisioning and identity management for a single box.

mod cli;

use anyhow::Context;
use clap::Parser;
use ldapbox_core::{Error, ErrorReport};
use ldapbox_directory::{password_from_input, Operation, Provisioner};
use secrecy::{ExposeSecret, SecretString};
use std::process::ExitCode;
use tokio::io::AsyncReadExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cli::{render_groups, Cli, OutputFormat};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let format = cli.format;
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err, format),
    }
}

fn init_tracing(level: &str) {
    // Logs go to stderr so command output on stdout stays machine readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli
        .directory_config()
        .context("failed to load configuration")?;
    let operation = cli.command.into_operation();
    let plan = operation.plan(&config)?;

    if cli.dry_run {
        println!("{}", plan.to_json()?);
        return Ok(());
    }

    let password = if operation.needs_password() {
        Some(read_password().await?)
    } else {
        None
    };

    let outcome = Provisioner::from_config(config)
        .run(&plan, password.as_ref())
        .await
        .with_context(|| format!("{} failed", operation.handler()))?;

    match operation {
        Operation::GetUserGroups { .. } => {
            let groups = outcome.groups.unwrap_or_default();
            print!("{}", render_groups(&groups, cli.format)?);
        }
        Operation::Setup => info!(
            directory_was_running = ?outcome.directory_was_running,
            admin_changes = ?outcome.admin_changes,
            scripts_config_changed = ?outcome.scripts_config_changed,
            "setup complete"
        ),
        _ => {}
    }
    Ok(())
}

async fn read_password() -> anyhow::Result<SecretString> {
    let mut buffer = String::new();
    tokio::io::stdin()
        .read_to_string(&mut buffer)
        .await
        .context("failed to read password from standard input")?;
    let input = SecretString::from(buffer);
    Ok(password_from_input(input.expose_secret())?)
}

fn report(err: &anyhow::Error, format: OutputFormat) -> ExitCode {
    let cause = err.downcast_ref::<Error>();
    if let Some(cause) = cause.filter(|cause| cause.should_log()) {
        error!(code = cause.error_code(), "unexpected failure");
    }

    let exit_code = cause.map_or(1, Error::exit_code);
    match format {
        OutputFormat::Text => eprintln!("ldapbox: {err:#}"),
        OutputFormat::Json => {
            let report = ErrorReport {
                code: cause.map_or("INTERNAL_ERROR", Error::error_code).to_string(),
                message: format!("{err:#}"),
                exit_code,
            };
            match serde_json::to_string(&report) {
                Ok(json) => eprintln!("{json}"),
                Err(_) => eprintln!("ldapbox: {err:#}"),
            }
        }
    }
    ExitCode::from(exit_code)
}

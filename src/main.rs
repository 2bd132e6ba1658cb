//! Binary entry point for the Stackwright CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use stackwright::{
    AwsContext, ConfigError, DeployConfig, DeployError, Orchestrator, PackageError,
    TeardownCoordinator, load_source_dir, package,
};

mod cli;

use cli::{Cli, Mode};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("packaging error: {0}")]
    Package(#[from] PackageError),
    #[error("deployment failed: {0}")]
    Deploy(#[from] DeployError),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let exit_code = match dispatch(cli.mode()).await {
        Ok(()) => 0,
        Err(err) => {
            if let CliError::Deploy(ref deploy) = err {
                error!(step = deploy.step(), "deployment aborted");
            }
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();
}

async fn dispatch(mode: Mode) -> Result<(), CliError> {
    let config = DeployConfig::load_without_cli_args()?;
    config.validate()?;

    match mode {
        Mode::Deploy { test_invoke } => deploy(&config, test_invoke).await,
        Mode::Destroy => {
            destroy(&config).await;
            Ok(())
        }
    }
}

async fn deploy(config: &DeployConfig, test_invoke: bool) -> Result<(), CliError> {
    let sources = load_source_dir(&config.source_dir())?;
    let payload = package(sources)?;
    info!(bytes = payload.len(), source = %config.source_dir(), "function payload built");

    let plan = config.deployment_plan(payload, test_invoke);
    let context = AwsContext::new(&config.aws_region).await;
    let orchestrator = Orchestrator::new(context.providers(&plan.monitoring), context.checks());
    let report = orchestrator.deploy(&plan).await?;

    info!(
        created = report.created.len(),
        warnings = report.warnings.len(),
        region = %config.aws_region,
        "stack deployed"
    );
    Ok(())
}

async fn destroy(config: &DeployConfig) {
    let context = AwsContext::new(&config.aws_region).await;
    let targets = config.teardown_targets();
    let providers = context.providers(&config.monitoring_spec());
    let report = TeardownCoordinator::new(&providers).run(&targets).await;

    for entry in &report.entries {
        info!(kind = %entry.kind, outcome = %entry.outcome, "teardown result");
    }
    if !report.is_clean() {
        warn!(
            failed = report.failures().count(),
            "some resources could not be deleted; check the console"
        );
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

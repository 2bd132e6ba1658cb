//! Command-line interface definitions for the `stackwright` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `stackwright` binary.
///
/// Without flags the binary deploys the stack, creating whatever is missing
/// and reusing whatever already exists.
#[derive(Debug, Parser)]
#[command(
    name = "stackwright",
    version,
    about = "Deploy or tear down a serverless data-ingestion stack"
)]
pub(crate) struct Cli {
    /// Delete every resource of the stack instead of deploying it.
    #[arg(long, conflicts_with = "test")]
    pub(crate) destroy: bool,
    /// Invoke the function once after a successful deployment.
    #[arg(long)]
    pub(crate) test: bool,
}

/// Operation selected on the command line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Mode {
    /// Deploy, optionally invoking the function afterwards.
    Deploy {
        /// Whether to invoke the function after deploying.
        test_invoke: bool,
    },
    /// Tear the stack down.
    Destroy,
}

impl Cli {
    /// Resolves the flags into a single operation.
    pub(crate) const fn mode(&self) -> Mode {
        if self.destroy {
            Mode::Destroy
        } else {
            Mode::Deploy {
                test_invoke: self.test,
            }
        }
    }
}

//! Core library for the Stackwright provisioner.
//!
//! The crate reconciles a small serverless stack (notification topic,
//! execution role, data table, compute function, monitoring) against AWS:
//! existing resources are reused, missing ones are created and waited on,
//! and a destroy run removes everything in reverse dependency order.
//!
//! Cloud calls sit behind the [`ResourceProvider`] trait. The [`aws`] module
//! implements it with the AWS SDK; [`test_support`] implements it in memory.

pub mod aws;
pub mod config;
pub mod deploy;
pub mod package;
pub mod provider;
pub mod reconcile;
pub mod retry;
pub mod spec;
pub mod teardown;
pub mod test_support;
pub mod wait;

pub use aws::AwsContext;
pub use config::{ConfigError, DeployConfig};
pub use deploy::{
    DEPLOYMENT_STEPS, DeployError, DeploymentPlan, DeploymentReport, Orchestrator, RoleSource,
    StepError, StepWarning,
};
pub use package::{PackageError, load_source_dir, package, unpack};
pub use provider::{
    CREATION_ORDER, InvocationOutcome, PostDeployChecks, ProviderError, ProviderSet, Readiness,
    ResourceHandle, ResourceKind, ResourceProvider, SecondaryCall,
};
pub use reconcile::{Origin, ReconcileError, Reconciled, reconcile};
pub use retry::{RetryError, RetryPolicy, retry};
pub use teardown::{
    TeardownCoordinator, TeardownEntry, TeardownOutcome, TeardownReport, TeardownTargets,
};
pub use wait::{PollError, PollPolicy, poll_until};

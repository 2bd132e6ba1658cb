//! Ordered deployment of every resource kind.
//!
//! The [`Orchestrator`] walks [`DEPLOYMENT_STEPS`] strictly in declaration
//! order, threading handles from upstream steps into the specs of
//! downstream ones: the function binds the role handle, and monitoring binds
//! the function and topic handles. The first mandatory failure aborts the
//! run; nothing created earlier is rolled back. Optional post-steps only
//! produce warnings.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::provider::{
    CREATION_ORDER, InvocationOutcome, PostDeployChecks, ProviderError, ProviderSet,
    ResourceHandle, ResourceKind, ResourceProvider,
};
use crate::reconcile::{Origin, ReconcileError, reconcile};
use crate::retry::{RetryError, RetryPolicy, retry};
use crate::spec::{FunctionSpec, MonitoringSpec, RoleSpec, TableSpec, TopicSpec};

/// Work performed by a [`DeploymentStep`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepAction {
    /// Reconcile one resource kind.
    Reconcile(ResourceKind),
    /// Check the table is reachable, retrying with backoff.
    HealthCheck,
    /// Invoke the function once; skipped unless requested.
    TestInvoke,
}

/// Named unit of work in a deployment.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DeploymentStep {
    /// Name reported in logs and errors.
    pub name: &'static str,
    /// Whether failure aborts the run.
    pub mandatory: bool,
    /// Work performed.
    pub action: StepAction,
}

impl DeploymentStep {
    const fn resource(kind: ResourceKind) -> Self {
        Self {
            name: kind.as_str(),
            mandatory: true,
            action: StepAction::Reconcile(kind),
        }
    }
}

/// Every deployment step in execution order. Resource steps follow
/// [`CREATION_ORDER`].
pub const DEPLOYMENT_STEPS: [DeploymentStep; 7] = [
    DeploymentStep::resource(CREATION_ORDER[0]),
    DeploymentStep::resource(CREATION_ORDER[1]),
    DeploymentStep::resource(CREATION_ORDER[2]),
    DeploymentStep::resource(CREATION_ORDER[3]),
    DeploymentStep::resource(CREATION_ORDER[4]),
    DeploymentStep {
        name: "health-check",
        mandatory: false,
        action: StepAction::HealthCheck,
    },
    DeploymentStep {
        name: "test-invoke",
        mandatory: false,
        action: StepAction::TestInvoke,
    },
];

/// Where the execution role comes from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RoleSource {
    /// Reconcile the role from a spec.
    Managed(RoleSpec),
    /// Use an existing role; no role calls are made.
    External {
        /// ARN supplied by the operator.
        arn: String,
    },
}

/// Specs for one deployment run.
///
/// `function.role_arn`, `monitoring.function_arn`, and `monitoring.topic_arn`
/// are bound from upstream handles during the run.
#[derive(Clone, Debug, PartialEq)]
pub struct DeploymentPlan {
    /// Notification topic.
    pub topic: TopicSpec,
    /// Execution role.
    pub role: RoleSource,
    /// Data table.
    pub table: TableSpec,
    /// Compute function.
    pub function: FunctionSpec,
    /// Log group, alarms, and dashboard.
    pub monitoring: MonitoringSpec,
    /// Backoff applied to the post-deploy health check.
    pub health_check: RetryPolicy,
    /// Whether to invoke the function once after deployment.
    pub test_invoke: bool,
}

/// Failure of a single step.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum StepError {
    /// Reconciling the resource failed.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    /// An upstream handle the step depends on is missing.
    #[error("{0} handle is not available")]
    MissingHandle(ResourceKind),
    /// The health check kept failing.
    #[error("health check failed: {0}")]
    HealthCheck(#[source] RetryError<ProviderError>),
    /// The invoke call failed.
    #[error("test invocation failed: {0}")]
    Invoke(#[source] ProviderError),
    /// The function ran but reported an error.
    #[error("function reported {error}: {payload}")]
    FunctionError {
        /// Error type reported by the runtime.
        error: String,
        /// Response payload.
        payload: String,
    },
}

/// Errors that abort a deployment.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DeployError {
    /// A mandatory step failed; later steps were not run.
    #[error("step '{step}' failed: {source}")]
    Step {
        /// Name of the failing step.
        step: &'static str,
        /// Cause.
        #[source]
        source: StepError,
    },
}

impl DeployError {
    /// Name of the step that failed.
    #[must_use]
    pub const fn step(&self) -> &'static str {
        match self {
            Self::Step { step, .. } => step,
        }
    }
}

/// Optional failure downgraded to a warning.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StepWarning {
    /// Step that produced the warning.
    pub step: &'static str,
    /// Rendered cause.
    pub message: String,
}

impl fmt::Display for StepWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.message)
    }
}

/// Outcome of a successful deployment.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeploymentReport {
    /// Handle of every resource, keyed by kind.
    pub handles: BTreeMap<ResourceKind, ResourceHandle>,
    /// Kinds created by this run, in creation order.
    pub created: Vec<ResourceKind>,
    /// Optional failures.
    pub warnings: Vec<StepWarning>,
    /// Result of the test invocation, when one ran.
    pub invocation: Option<InvocationOutcome>,
    /// Wall time of the run.
    pub elapsed: Duration,
}

impl DeploymentReport {
    fn require(&self, kind: ResourceKind) -> Result<ResourceHandle, StepError> {
        self.handles
            .get(&kind)
            .cloned()
            .ok_or(StepError::MissingHandle(kind))
    }
}

/// Runs deployments against a provider set.
#[derive(Debug)]
pub struct Orchestrator<C> {
    providers: ProviderSet,
    checks: C,
}

impl<C: PostDeployChecks> Orchestrator<C> {
    /// Creates an orchestrator.
    #[must_use]
    pub const fn new(providers: ProviderSet, checks: C) -> Self {
        Self { providers, checks }
    }

    /// Runs every step of the plan in order.
    ///
    /// All log events of the run carry a fresh `run_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Step`] naming the first mandatory step that
    /// failed. Later steps are not attempted.
    pub async fn deploy(&self, plan: &DeploymentPlan) -> Result<DeploymentReport, DeployError> {
        let span = info_span!("deploy", run_id = %Uuid::new_v4());
        self.run(plan).instrument(span).await
    }

    async fn run(&self, plan: &DeploymentPlan) -> Result<DeploymentReport, DeployError> {
        let started = Instant::now();
        let mut report = DeploymentReport::default();

        for step in DEPLOYMENT_STEPS {
            if step.action == StepAction::TestInvoke && !plan.test_invoke {
                continue;
            }

            info!(step = step.name, "running step");
            match self.run_step(step.action, plan, &mut report).await {
                Ok(()) => {}
                Err(source) if step.mandatory => {
                    error!(step = step.name, error = %source, "mandatory step failed; aborting");
                    return Err(DeployError::Step {
                        step: step.name,
                        source,
                    });
                }
                Err(err) => {
                    warn!(step = step.name, error = %err, "optional step failed");
                    report.warnings.push(StepWarning {
                        step: step.name,
                        message: err.to_string(),
                    });
                }
            }
        }

        report.elapsed = started.elapsed();
        for (kind, handle) in &report.handles {
            info!(%kind, id = %handle.id, "deployed");
        }
        info!(
            created = report.created.len(),
            warnings = report.warnings.len(),
            elapsed_secs = report.elapsed.as_secs_f64(),
            "deployment complete"
        );
        Ok(report)
    }

    async fn run_step(
        &self,
        action: StepAction,
        plan: &DeploymentPlan,
        report: &mut DeploymentReport,
    ) -> Result<(), StepError> {
        match action {
            StepAction::Reconcile(kind) => self.reconcile_kind(kind, plan, report).await,
            StepAction::HealthCheck => {
                let table = plan.table.name.as_str();
                retry(plan.health_check, || self.checks.health_check(table))
                    .await
                    .map_err(StepError::HealthCheck)?;
                info!(table, "health check passed");
                Ok(())
            }
            StepAction::TestInvoke => {
                let outcome = self
                    .checks
                    .test_invoke(&plan.function.name)
                    .await
                    .map_err(StepError::Invoke)?;
                info!(
                    status_code = outcome.status_code,
                    payload = %outcome.payload,
                    "test invocation returned"
                );
                let failure = outcome.function_error.clone().map(|error| StepError::FunctionError {
                    error,
                    payload: outcome.payload.clone(),
                });
                report.invocation = Some(outcome);
                failure.map_or(Ok(()), Err)
            }
        }
    }

    async fn reconcile_kind(
        &self,
        kind: ResourceKind,
        plan: &DeploymentPlan,
        report: &mut DeploymentReport,
    ) -> Result<(), StepError> {
        match kind {
            ResourceKind::Topic => record(report, &*self.providers.topic, &plan.topic).await,
            ResourceKind::Role => match &plan.role {
                RoleSource::Managed(spec) => record(report, &*self.providers.role, spec).await,
                RoleSource::External { arn } => {
                    info!(role_arn = %arn, "using supplied role; skipping role reconcile");
                    report.handles.insert(
                        ResourceKind::Role,
                        ResourceHandle::new(arn.clone()).with_status("external"),
                    );
                    Ok(())
                }
            },
            ResourceKind::Table => record(report, &*self.providers.table, &plan.table).await,
            ResourceKind::Function => {
                let role = report.require(ResourceKind::Role)?;
                let spec = plan.function.clone().with_role(&role);
                record(report, &*self.providers.function, &spec).await
            }
            ResourceKind::Monitoring => {
                let function = report.require(ResourceKind::Function)?;
                let topic = report.require(ResourceKind::Topic)?;
                let spec = plan.monitoring.clone().with_targets(&function, &topic);
                record(report, &*self.providers.monitoring, &spec).await
            }
        }
    }
}

async fn record<P>(
    report: &mut DeploymentReport,
    provider: &P,
    spec: &P::Spec,
) -> Result<(), StepError>
where
    P: ResourceProvider + ?Sized,
{
    let kind = provider.kind();
    let reconciled = reconcile(provider, spec).await?;
    for skipped in reconciled.skipped {
        report.warnings.push(StepWarning {
            step: kind.as_str(),
            message: format!("{} failed: {}", skipped.call, skipped.message),
        });
    }
    if reconciled.origin == Origin::Created {
        report.created.push(kind);
    }
    report.handles.insert(kind, reconciled.handle);
    Ok(())
}

//! BDD step definitions for deploy runs.

use std::sync::Arc;

use rstest_bdd_macros::{given, then, when};
use stackwright::test_support::{ScriptedChecks, sample_plan};
use stackwright::{Orchestrator, RoleSource};
use tokio::runtime::Runtime;

use super::test_helpers::{DeployContext, DeployOutcome};
use crate::stack_script::{kind_named, kinds_named};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("an empty account")]
fn empty_account(deploy_context: DeployContext) -> DeployContext {
    deploy_context
}

#[given("the \"{kind}\" already exists")]
fn already_exists(mut deploy_context: DeployContext, kind: String) -> DeployContext {
    deploy_context.script.existing.push(kind_named(&kind));
    deploy_context
}

#[given("creating the \"{kind}\" fails")]
fn creation_fails(mut deploy_context: DeployContext, kind: String) -> DeployContext {
    deploy_context.script.failing_create = Some(kind_named(&kind));
    deploy_context
}

#[given("the execution role \"{arn}\" is supplied")]
fn external_role(mut deploy_context: DeployContext, arn: String) -> DeployContext {
    deploy_context.external_role = Some(arn);
    deploy_context
}

#[given("a test invocation is requested")]
fn test_invocation_requested(mut deploy_context: DeployContext) -> DeployContext {
    deploy_context.test_invoke = true;
    deploy_context
}

#[when("I deploy the stack")]
fn deploy_stack(mut deploy_context: DeployContext) -> Result<DeployContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let (providers, journal) = deploy_context.script.build().into_providers();
    let checks = Arc::new(ScriptedChecks::new());
    let orchestrator = Orchestrator::new(providers, Arc::clone(&checks));

    let mut plan = sample_plan();
    plan.test_invoke = deploy_context.test_invoke;
    if let Some(arn) = deploy_context.external_role.clone() {
        plan.role = RoleSource::External { arn };
    }

    let result = runtime.block_on(orchestrator.deploy(&plan));
    deploy_context.outcome = Some(match result {
        Ok(report) => DeployOutcome::Success {
            created: report.created,
            handles: report
                .handles
                .into_iter()
                .map(|(kind, handle)| (kind, handle.id))
                .collect(),
            invocations: checks.invocations(),
        },
        Err(err) => DeployOutcome::Failure {
            step: err.step().to_owned(),
            message: err.to_string(),
        },
    });
    deploy_context.journal = journal.entries();
    Ok(deploy_context)
}

#[then("the deployment succeeds")]
fn deployment_succeeds(deploy_context: &DeployContext) -> Result<(), StepError> {
    match deploy_context.outcome {
        Some(DeployOutcome::Success { .. }) => Ok(()),
        Some(DeployOutcome::Failure { ref message, .. }) => Err(StepError::Assertion(format!(
            "expected success, got failure: {message}"
        ))),
        None => Err(StepError::Assertion(String::from("deploy did not run"))),
    }
}

#[then("the kinds \"{kinds}\" were created in that order")]
fn created_in_order(deploy_context: &DeployContext, kinds: String) -> Result<(), StepError> {
    let expected = kinds_named(&kinds);
    let Some(DeployOutcome::Success { ref created, .. }) = deploy_context.outcome else {
        return Err(StepError::Assertion(String::from(
            "expected a successful deploy",
        )));
    };
    if *created == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected:?} to be created, got {created:?}"
        )))
    }
}

#[then("the deployment fails at step \"{step}\"")]
fn deployment_fails_at(deploy_context: &DeployContext, step: String) -> Result<(), StepError> {
    match deploy_context.outcome {
        Some(DeployOutcome::Failure {
            step: ref failed, ..
        }) if *failed == step => Ok(()),
        ref other => Err(StepError::Assertion(format!(
            "expected failure at step {step}, got {other:?}"
        ))),
    }
}

#[then("the \"{kind}\" provider was never called")]
fn provider_never_called(deploy_context: &DeployContext, kind: String) -> Result<(), StepError> {
    let kind = kind_named(&kind);
    let calls: Vec<_> = deploy_context
        .journal
        .iter()
        .filter(|(called, _)| *called == kind)
        .collect();
    if calls.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no {kind} calls, got {calls:?}"
        )))
    }
}

#[then("the \"{kind}\" handle is \"{id}\"")]
fn handle_is(deploy_context: &DeployContext, kind: String, id: String) -> Result<(), StepError> {
    let kind = kind_named(&kind);
    let Some(DeployOutcome::Success { ref handles, .. }) = deploy_context.outcome else {
        return Err(StepError::Assertion(String::from(
            "expected a successful deploy",
        )));
    };
    match handles.get(&kind) {
        Some(actual) if *actual == id => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected {kind} handle {id}, got {other:?}"
        ))),
    }
}

#[then("the function was invoked once")]
fn invoked_once(deploy_context: &DeployContext) -> Result<(), StepError> {
    match deploy_context.outcome {
        Some(DeployOutcome::Success { invocations: 1, .. }) => Ok(()),
        ref other => Err(StepError::Assertion(format!(
            "expected one invocation, got {other:?}"
        ))),
    }
}

//! BDD step definitions for destroy runs.

use rstest_bdd_macros::{given, then, when};
use stackwright::test_support::{Call, sample_targets};
use stackwright::{CREATION_ORDER, TeardownCoordinator, TeardownReport};
use tokio::runtime::Runtime;

use super::test_helpers::TeardownContext;
use crate::stack_script::{kind_named, kinds_named};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a fully deployed stack")]
fn fully_deployed(mut teardown_context: TeardownContext) -> TeardownContext {
    teardown_context.script.existing = CREATION_ORDER.to_vec();
    teardown_context
}

#[given("an empty account")]
fn empty_account(teardown_context: TeardownContext) -> TeardownContext {
    teardown_context
}

#[given("deleting the \"{kind}\" fails")]
fn deletion_fails(mut teardown_context: TeardownContext, kind: String) -> TeardownContext {
    teardown_context.script.failing_delete = Some(kind_named(&kind));
    teardown_context
}

#[when("I destroy the stack")]
fn destroy_stack(mut teardown_context: TeardownContext) -> Result<TeardownContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let (providers, journal) = teardown_context.script.build().into_providers();

    let report = runtime.block_on(TeardownCoordinator::new(&providers).run(&sample_targets()));

    teardown_context.report = Some(report);
    teardown_context.journal = journal.entries();
    Ok(teardown_context)
}

fn report(teardown_context: &TeardownContext) -> Result<&TeardownReport, StepError> {
    teardown_context
        .report
        .as_ref()
        .ok_or_else(|| StepError::Assertion(String::from("destroy did not run")))
}

#[then("the kinds \"{kinds}\" were deleted in that order")]
fn deleted_in_order(teardown_context: &TeardownContext, kinds: String) -> Result<(), StepError> {
    let expected = kinds_named(&kinds);
    let deleted: Vec<_> = teardown_context
        .journal
        .iter()
        .filter(|(_, call)| matches!(call, Call::Delete(_)))
        .map(|(kind, _)| *kind)
        .collect();
    if deleted == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected deletions {expected:?}, got {deleted:?}"
        )))
    }
}

#[then("the teardown is clean")]
fn teardown_clean(teardown_context: &TeardownContext) -> Result<(), StepError> {
    let report = report(teardown_context)?;
    if report.is_clean() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected a clean teardown, got {report:?}"
        )))
    }
}

#[then("the \"{kind}\" outcome is \"{outcome}\"")]
fn outcome_is(
    teardown_context: &TeardownContext,
    kind: String,
    outcome: String,
) -> Result<(), StepError> {
    let kind = kind_named(&kind);
    let actual = report(teardown_context)?
        .outcome(kind)
        .map(ToString::to_string)
        .unwrap_or_default();
    if actual.starts_with(outcome.trim()) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {kind} outcome {outcome}, got `{actual}`"
        )))
    }
}

#[then("every outcome is \"{outcome}\"")]
fn every_outcome_is(teardown_context: &TeardownContext, outcome: String) -> Result<(), StepError> {
    let report = report(teardown_context)?;
    let mismatched: Vec<_> = report
        .entries
        .iter()
        .filter(|entry| entry.outcome.to_string() != outcome.trim())
        .collect();
    if mismatched.is_empty() && report.entries.len() == CREATION_ORDER.len() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected every outcome to be {outcome}, got {:?}",
            report.entries
        )))
    }
}

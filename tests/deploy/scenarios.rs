//! BDD scenarios for deploy runs.

use rstest_bdd_macros::scenario;

use super::test_helpers::{DeployContext, deploy_context};

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Create a fresh stack in dependency order"
)]
fn scenario_fresh_stack(deploy_context: DeployContext) {
    let _ = deploy_context;
}

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Reuse resources that already exist"
)]
fn scenario_reuse_existing(deploy_context: DeployContext) {
    let _ = deploy_context;
}

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Abort at the table step when table creation fails"
)]
fn scenario_table_failure(deploy_context: DeployContext) {
    let _ = deploy_context;
}

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Use an externally supplied role"
)]
fn scenario_external_role(deploy_context: DeployContext) {
    let _ = deploy_context;
}

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Invoke the function after deploying"
)]
fn scenario_test_invoke(deploy_context: DeployContext) {
    let _ = deploy_context;
}

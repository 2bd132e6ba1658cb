//! BDD scenarios for destroy runs.

use rstest_bdd_macros::scenario;

use super::test_helpers::{TeardownContext, teardown_context};

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Delete every resource in reverse order"
)]
fn scenario_reverse_order(teardown_context: TeardownContext) {
    let _ = teardown_context;
}

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Continue past a failed function deletion"
)]
fn scenario_function_failure(teardown_context: TeardownContext) {
    let _ = teardown_context;
}

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Treat missing resources as already deleted"
)]
fn scenario_missing_resources(teardown_context: TeardownContext) {
    let _ = teardown_context;
}

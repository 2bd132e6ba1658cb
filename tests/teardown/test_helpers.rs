//! Shared fixtures for teardown BDD scenarios.

use rstest::fixture;
use stackwright::ResourceKind;
use stackwright::TeardownReport;
use stackwright::test_support::Call;

use crate::stack_script::StackScript;

#[derive(Clone, Debug, Default)]
pub struct TeardownContext {
    pub script: StackScript,
    pub journal: Vec<(ResourceKind, Call)>,
    pub report: Option<TeardownReport>,
}

#[fixture]
pub fn teardown_context() -> TeardownContext {
    TeardownContext::default()
}

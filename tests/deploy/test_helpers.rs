//! Shared fixtures for deploy BDD scenarios.

use std::collections::BTreeMap;

use rstest::fixture;
use stackwright::ResourceKind;
use stackwright::test_support::Call;

use crate::stack_script::StackScript;

#[derive(Clone, Debug)]
pub enum DeployOutcome {
    Success {
        created: Vec<ResourceKind>,
        handles: BTreeMap<ResourceKind, String>,
        invocations: u32,
    },
    Failure {
        step: String,
        message: String,
    },
}

#[derive(Clone, Debug, Default)]
pub struct DeployContext {
    pub script: StackScript,
    pub external_role: Option<String>,
    pub test_invoke: bool,
    pub journal: Vec<(ResourceKind, Call)>,
    pub outcome: Option<DeployOutcome>,
}

#[fixture]
pub fn deploy_context() -> DeployContext {
    DeployContext::default()
}

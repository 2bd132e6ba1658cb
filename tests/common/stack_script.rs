//! Scripted provider stack shared by the behaviour suites.

use stackwright::test_support::{ScriptedStack, sample_targets};
use stackwright::{CREATION_ORDER, ResourceKind};

/// What the scripted account holds and which calls fail.
#[derive(Clone, Debug, Default)]
pub struct StackScript {
    pub existing: Vec<ResourceKind>,
    pub failing_create: Option<ResourceKind>,
    pub failing_delete: Option<ResourceKind>,
}

macro_rules! script_kind {
    ($stack:ident, $kind:expr, $method:ident($($arg:expr),*)) => {
        match $kind {
            ResourceKind::Topic => $stack.topic = $stack.topic.$method($($arg),*),
            ResourceKind::Role => $stack.role = $stack.role.$method($($arg),*),
            ResourceKind::Table => $stack.table = $stack.table.$method($($arg),*),
            ResourceKind::Function => $stack.function = $stack.function.$method($($arg),*),
            ResourceKind::Monitoring => {
                $stack.monitoring = $stack.monitoring.$method($($arg),*);
            }
        }
    };
}

impl StackScript {
    /// Builds providers matching the script. Existing resources use the
    /// names of the sample plan.
    pub fn build(&self) -> ScriptedStack {
        let targets = sample_targets();
        let mut stack = ScriptedStack::new();
        for kind in &self.existing {
            let name = targets.name(*kind).unwrap_or_default();
            script_kind!(stack, *kind, with_existing(name));
        }
        if let Some(kind) = self.failing_create {
            script_kind!(stack, kind, failing_create("scripted create failure"));
        }
        if let Some(kind) = self.failing_delete {
            script_kind!(stack, kind, failing_delete("scripted delete failure"));
        }
        stack
    }
}

/// Parses a kind name as written in feature files.
pub fn kind_named(name: &str) -> ResourceKind {
    CREATION_ORDER
        .into_iter()
        .find(|kind| kind.as_str() == name.trim())
        .unwrap_or_else(|| panic!("unknown resource kind `{name}`"))
}

/// Parses a comma-separated list of kind names.
pub fn kinds_named(list: &str) -> Vec<ResourceKind> {
    list.split(',').map(kind_named).collect()
}

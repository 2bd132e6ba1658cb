//! Best-effort teardown of a deployment.
//!
//! Kinds are deleted in the reverse of [`CREATION_ORDER`]: monitoring,
//! function, table, role, topic. Only the first two positions are implied by
//! dependencies; topic, role, and table have no dependencies on each other,
//! so their relative order simply mirrors declaration order.
//!
//! Teardown never aborts. Absence counts as success, every other failure is
//! logged and recorded in the [`TeardownReport`], and the next kind is
//! attempted regardless. Deletions are not waited on.

use std::fmt;

use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::provider::{CREATION_ORDER, ProviderSet, ResourceKind, ResourceProvider};

/// Names of the resources to delete.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TeardownTargets {
    /// Topic name.
    pub topic: String,
    /// Role name; `None` when the role was supplied externally and must be
    /// left alone.
    pub role: Option<String>,
    /// Table name.
    pub table: String,
    /// Function name.
    pub function: String,
    /// Log group name identifying the monitoring resources.
    pub monitoring: String,
}

impl TeardownTargets {
    /// Name to delete for `kind`, if any.
    #[must_use]
    pub fn name(&self, kind: ResourceKind) -> Option<&str> {
        match kind {
            ResourceKind::Topic => Some(&self.topic),
            ResourceKind::Role => self.role.as_deref(),
            ResourceKind::Table => Some(&self.table),
            ResourceKind::Function => Some(&self.function),
            ResourceKind::Monitoring => Some(&self.monitoring),
        }
    }
}

/// Result of deleting one kind.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TeardownOutcome {
    /// The resource was deleted.
    Deleted,
    /// The resource did not exist.
    AlreadyAbsent,
    /// Deletion was not attempted.
    Skipped,
    /// Deletion failed with the given message.
    Failed(String),
}

impl fmt::Display for TeardownOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deleted => f.write_str("deleted"),
            Self::AlreadyAbsent => f.write_str("already absent"),
            Self::Skipped => f.write_str("skipped"),
            Self::Failed(message) => write!(f, "failed: {message}"),
        }
    }
}

/// Outcome for one kind.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TeardownEntry {
    /// Kind deleted.
    pub kind: ResourceKind,
    /// What happened.
    pub outcome: TeardownOutcome,
}

/// Per-kind outcomes of a teardown, in the order attempted.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TeardownReport {
    /// One entry per kind.
    pub entries: Vec<TeardownEntry>,
}

impl TeardownReport {
    /// Entries whose deletion failed.
    pub fn failures(&self) -> impl Iterator<Item = &TeardownEntry> {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.outcome, TeardownOutcome::Failed(_)))
    }

    /// Returns `true` when no deletion failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Outcome recorded for `kind`.
    #[must_use]
    pub fn outcome(&self, kind: ResourceKind) -> Option<&TeardownOutcome> {
        self.entries
            .iter()
            .find(|entry| entry.kind == kind)
            .map(|entry| &entry.outcome)
    }
}

/// Deletes every kind in reverse creation order.
#[derive(Debug)]
pub struct TeardownCoordinator<'a> {
    providers: &'a ProviderSet,
}

impl<'a> TeardownCoordinator<'a> {
    /// Creates a coordinator over the given providers.
    #[must_use]
    pub const fn new(providers: &'a ProviderSet) -> Self {
        Self { providers }
    }

    /// Attempts deletion of every target and reports each outcome.
    pub async fn run(&self, targets: &TeardownTargets) -> TeardownReport {
        let span = info_span!("destroy", run_id = %Uuid::new_v4());
        self.delete_all(targets).instrument(span).await
    }

    async fn delete_all(&self, targets: &TeardownTargets) -> TeardownReport {
        let mut report = TeardownReport::default();
        for kind in CREATION_ORDER.into_iter().rev() {
            let outcome = match targets.name(kind) {
                Some(name) => self.delete(kind, name).await,
                None => {
                    info!(%kind, "not managed by this deployment; skipping");
                    TeardownOutcome::Skipped
                }
            };
            report.entries.push(TeardownEntry { kind, outcome });
        }

        let failed = report.failures().count();
        info!(
            attempted = report.entries.len(),
            failed, "teardown complete"
        );
        report
    }

    async fn delete(&self, kind: ResourceKind, name: &str) -> TeardownOutcome {
        match kind {
            ResourceKind::Topic => delete_one(&*self.providers.topic, name).await,
            ResourceKind::Role => delete_one(&*self.providers.role, name).await,
            ResourceKind::Table => delete_one(&*self.providers.table, name).await,
            ResourceKind::Function => delete_one(&*self.providers.function, name).await,
            ResourceKind::Monitoring => delete_one(&*self.providers.monitoring, name).await,
        }
    }
}

async fn delete_one<P>(provider: &P, name: &str) -> TeardownOutcome
where
    P: ResourceProvider + ?Sized,
{
    let kind = provider.kind();
    match provider.delete(name).await {
        Ok(()) => {
            info!(%kind, resource = name, "deleted");
            TeardownOutcome::Deleted
        }
        Err(err) if err.is_not_found() => {
            info!(%kind, resource = name, "already absent");
            TeardownOutcome::AlreadyAbsent
        }
        Err(err) => {
            warn!(%kind, resource = name, error = %err, "delete failed; continuing");
            TeardownOutcome::Failed(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedStack, sample_targets};
    use rstest::rstest;

    #[rstest]
    #[tokio::test]
    async fn deletes_in_reverse_creation_order() {
        let stack = ScriptedStack::new();
        let journal = stack.journal.clone();
        let (providers, _) = stack.into_providers();

        let report = TeardownCoordinator::new(&providers)
            .run(&sample_targets())
            .await;

        let mut expected = CREATION_ORDER.to_vec();
        expected.reverse();
        assert_eq!(journal.deleted_kinds(), expected);
        assert!(report.is_clean());
    }

    #[rstest]
    #[tokio::test]
    async fn missing_resources_count_as_absent() {
        let (providers, _) = ScriptedStack::new().into_providers();

        let report = TeardownCoordinator::new(&providers)
            .run(&sample_targets())
            .await;

        assert!(
            report
                .entries
                .iter()
                .all(|entry| entry.outcome == TeardownOutcome::AlreadyAbsent)
        );
    }

    #[rstest]
    #[tokio::test]
    async fn function_failure_does_not_stop_later_kinds() {
        let mut stack = ScriptedStack::new();
        stack.function = stack.function.failing_delete("access denied");
        stack.table = stack.table.with_existing("events");
        let journal = stack.journal.clone();
        let (providers, _) = stack.into_providers();

        let report = TeardownCoordinator::new(&providers)
            .run(&sample_targets())
            .await;

        let deleted = journal.deleted_kinds();
        assert!(deleted.contains(&ResourceKind::Table));
        assert!(deleted.contains(&ResourceKind::Role));
        assert!(deleted.contains(&ResourceKind::Topic));
        assert_eq!(report.failures().count(), 1);
        assert_eq!(
            report.outcome(ResourceKind::Table),
            Some(&TeardownOutcome::Deleted)
        );
        assert!(matches!(
            report.outcome(ResourceKind::Function),
            Some(TeardownOutcome::Failed(message)) if message.contains("access denied")
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn externally_supplied_role_is_left_alone() {
        let stack = ScriptedStack::new();
        let journal = stack.journal.clone();
        let (providers, _) = stack.into_providers();
        let targets = TeardownTargets {
            role: None,
            ..sample_targets()
        };

        let report = TeardownCoordinator::new(&providers).run(&targets).await;

        assert!(!journal.deleted_kinds().contains(&ResourceKind::Role));
        assert_eq!(
            report.outcome(ResourceKind::Role),
            Some(&TeardownOutcome::Skipped)
        );
    }
}

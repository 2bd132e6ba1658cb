//! Describe-then-create reconciliation shared by every resource kind.
//!
//! [`reconcile`] looks the resource up by name and returns the existing
//! handle untouched when it is found. Only an absent resource is created,
//! waited on according to the provider's [`Readiness`] model, and finished
//! with the provider's secondary calls.

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::provider::{
    ProviderError, Readiness, Requirement, ResourceHandle, ResourceKind, ResourceProvider,
    SecondaryCall,
};
use crate::spec::ResourceSpec;
use crate::wait::{PollError, PollPolicy, poll_until};

/// Errors that abort a reconcile.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ReconcileError {
    /// The existence check failed for a reason other than absence.
    #[error("failed to look up {kind} '{name}': {source}")]
    Describe {
        /// Kind being reconciled.
        kind: ResourceKind,
        /// Logical name looked up.
        name: String,
        /// Provider failure.
        #[source]
        source: ProviderError,
    },
    /// The create call failed.
    #[error("failed to create {kind} '{name}': {source}")]
    Create {
        /// Kind being reconciled.
        kind: ResourceKind,
        /// Logical name being created.
        name: String,
        /// Provider failure.
        #[source]
        source: ProviderError,
    },
    /// The resource never became ready.
    #[error("{kind} '{name}' did not become ready: {source}")]
    Readiness {
        /// Kind being reconciled.
        kind: ResourceKind,
        /// Logical name being waited on.
        name: String,
        /// Timeout or predicate failure.
        #[source]
        source: PollError<ProviderError>,
    },
    /// A mandatory secondary call failed.
    #[error("{kind} '{name}': {call} failed: {source}")]
    Secondary {
        /// Kind being reconciled.
        kind: ResourceKind,
        /// Logical name of the resource.
        name: String,
        /// Secondary call that failed.
        call: &'static str,
        /// Provider failure.
        #[source]
        source: ProviderError,
    },
}

/// Whether the handle came from describe or from create.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Origin {
    /// The resource already existed.
    Existing,
    /// The resource was created by this run.
    Created,
}

/// Optional secondary call that failed and was downgraded to a warning.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SkippedCall {
    /// Name of the call.
    pub call: &'static str,
    /// Provider failure, rendered.
    pub message: String,
}

/// Successful reconcile result.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reconciled {
    /// Handle of the existing or created resource.
    pub handle: ResourceHandle,
    /// Where the handle came from.
    pub origin: Origin,
    /// Optional calls that failed.
    pub skipped: Vec<SkippedCall>,
}

/// Ensures the resource described by `spec` exists.
///
/// Running this twice with the same spec issues at most one create call:
/// the second run finds the resource through describe and makes no further
/// calls.
///
/// # Errors
///
/// Returns [`ReconcileError`] when describe fails with anything other than
/// absence, when create fails, when readiness polling fails, or when a
/// mandatory secondary call fails. Optional secondary failures are logged
/// and reported in [`Reconciled::skipped`].
pub async fn reconcile<P>(provider: &P, spec: &P::Spec) -> Result<Reconciled, ReconcileError>
where
    P: ResourceProvider + ?Sized,
{
    let kind = provider.kind();
    let name = spec.name();

    let existing = provider
        .describe(name)
        .await
        .map_err(|source| ReconcileError::Describe {
            kind,
            name: name.to_owned(),
            source,
        })?;
    if let Some(handle) = existing {
        info!(%kind, resource = name, id = %handle.id, "resource exists; reusing");
        return Ok(Reconciled {
            handle,
            origin: Origin::Existing,
            skipped: Vec::new(),
        });
    }

    info!(%kind, resource = name, "creating resource");
    let handle = provider
        .create(spec)
        .await
        .map_err(|source| ReconcileError::Create {
            kind,
            name: name.to_owned(),
            source,
        })?;

    let settle = match provider.readiness() {
        Readiness::Immediate => None,
        Readiness::Poll(policy) => {
            wait_ready(provider, name, policy).await?;
            None
        }
        Readiness::PollThenSettle { policy, settle } => {
            wait_ready(provider, name, policy).await?;
            Some(settle)
        }
    };

    let mut skipped = Vec::new();
    for call in provider.secondary_calls(spec) {
        if let Some(skip) = apply_secondary(provider, spec, &handle, call).await? {
            skipped.push(skip);
        }
    }

    if let Some(delay) = settle {
        debug!(%kind, resource = name, delay_secs = delay.as_secs(), "waiting for propagation");
        sleep(delay).await;
    }

    info!(%kind, resource = name, id = %handle.id, "resource created");
    Ok(Reconciled {
        handle,
        origin: Origin::Created,
        skipped,
    })
}

async fn wait_ready<P>(provider: &P, name: &str, policy: PollPolicy) -> Result<(), ReconcileError>
where
    P: ResourceProvider + ?Sized,
{
    let kind = provider.kind();
    debug!(%kind, resource = name, timeout_secs = policy.timeout.as_secs(), "waiting for readiness");
    poll_until(policy, || provider.is_ready(name))
        .await
        .map_err(|source| ReconcileError::Readiness {
            kind,
            name: name.to_owned(),
            source,
        })
}

async fn apply_secondary<P>(
    provider: &P,
    spec: &P::Spec,
    handle: &ResourceHandle,
    call: SecondaryCall,
) -> Result<Option<SkippedCall>, ReconcileError>
where
    P: ResourceProvider + ?Sized,
{
    let kind = provider.kind();
    let name = spec.name();
    match (provider.apply(call, spec, handle).await, call.requirement) {
        (Ok(()), _) => {
            debug!(%kind, resource = name, call = call.name, "secondary call applied");
            Ok(None)
        }
        (Err(source), Requirement::Mandatory) => Err(ReconcileError::Secondary {
            kind,
            name: name.to_owned(),
            call: call.name,
            source,
        }),
        (Err(err), Requirement::Optional) => {
            warn!(%kind, resource = name, call = call.name, error = %err, "optional call failed; continuing");
            Ok(Some(SkippedCall {
                call: call.name,
                message: err.to_string(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::TableSpec;
    use crate::test_support::{Call, ScriptedProvider, table_spec};
    use rstest::{fixture, rstest};
    use std::time::Duration;

    #[fixture]
    fn spec() -> TableSpec {
        table_spec("events")
    }

    #[rstest]
    #[tokio::test]
    async fn existing_resource_is_returned_without_create(spec: TableSpec) {
        let provider = ScriptedProvider::<TableSpec>::new(ResourceKind::Table).with_existing("events");

        let reconciled = reconcile(&provider, &spec).await.expect("reconcile");

        assert_eq!(reconciled.origin, Origin::Existing);
        assert_eq!(reconciled.handle.id, "arn:table/events");
        assert_eq!(provider.calls(), vec![Call::Describe(String::from("events"))]);
    }

    #[rstest]
    #[tokio::test]
    async fn second_run_reuses_the_first_runs_resource(spec: TableSpec) {
        let provider = ScriptedProvider::<TableSpec>::new(ResourceKind::Table);

        let first = reconcile(&provider, &spec).await.expect("first run");
        let second = reconcile(&provider, &spec).await.expect("second run");

        assert_eq!(first.origin, Origin::Created);
        assert_eq!(second.origin, Origin::Existing);
        assert_eq!(first.handle, second.handle);
        assert_eq!(provider.create_count(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn describe_failure_other_than_absence_propagates(spec: TableSpec) {
        let provider = ScriptedProvider::<TableSpec>::new(ResourceKind::Table)
            .failing_describe("throttled");

        let err = reconcile(&provider, &spec).await.expect_err("describe fails");

        assert!(matches!(err, ReconcileError::Describe { .. }), "{err:?}");
        assert_eq!(provider.create_count(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn create_failure_propagates(spec: TableSpec) {
        let provider =
            ScriptedProvider::<TableSpec>::new(ResourceKind::Table).failing_create("limit exceeded");

        let err = reconcile(&provider, &spec).await.expect_err("create fails");

        assert!(matches!(err, ReconcileError::Create { .. }), "{err:?}");
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn polls_until_ready_after_create(spec: TableSpec) {
        let policy = PollPolicy::new(Duration::from_secs(120), Duration::from_secs(5));
        let provider = ScriptedProvider::<TableSpec>::new(ResourceKind::Table)
            .with_readiness(Readiness::Poll(policy))
            .ready_after(3);

        let reconciled = reconcile(&provider, &spec).await.expect("reconcile");

        assert_eq!(reconciled.origin, Origin::Created);
        assert_eq!(provider.readiness_checks(), 3);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn readiness_timeout_propagates(spec: TableSpec) {
        let policy = PollPolicy::new(Duration::from_secs(10), Duration::from_secs(5));
        let provider = ScriptedProvider::<TableSpec>::new(ResourceKind::Table)
            .with_readiness(Readiness::Poll(policy))
            .never_ready();

        let err = reconcile(&provider, &spec).await.expect_err("timeout");

        assert!(
            matches!(
                err,
                ReconcileError::Readiness {
                    source: PollError::Timeout { .. },
                    ..
                }
            ),
            "{err:?}"
        );
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn settle_delay_follows_polling(spec: TableSpec) {
        let policy = PollPolicy::new(Duration::from_secs(60), Duration::from_secs(5));
        let provider = ScriptedProvider::<TableSpec>::new(ResourceKind::Table).with_readiness(
            Readiness::PollThenSettle {
                policy,
                settle: Duration::from_secs(10),
            },
        );
        let started = tokio::time::Instant::now();

        reconcile(&provider, &spec).await.expect("reconcile");

        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[rstest]
    #[tokio::test]
    async fn mandatory_secondary_failure_aborts(spec: TableSpec) {
        let provider = ScriptedProvider::<TableSpec>::new(ResourceKind::Table)
            .with_secondary(SecondaryCall::mandatory("attach-policy"))
            .with_secondary(SecondaryCall::optional("dashboard"))
            .failing_secondary("attach-policy");

        let err = reconcile(&provider, &spec).await.expect_err("mandatory fails");

        assert!(
            matches!(
                err,
                ReconcileError::Secondary {
                    call: "attach-policy",
                    ..
                }
            ),
            "{err:?}"
        );
        assert!(!provider.calls().contains(&Call::Apply("dashboard")));
    }

    #[rstest]
    #[tokio::test]
    async fn optional_secondary_failure_is_reported_not_raised(spec: TableSpec) {
        let provider = ScriptedProvider::<TableSpec>::new(ResourceKind::Table)
            .with_secondary(SecondaryCall::optional("point-in-time-recovery"))
            .with_secondary(SecondaryCall::mandatory("tags"))
            .failing_secondary("point-in-time-recovery");

        let reconciled = reconcile(&provider, &spec).await.expect("reconcile");

        assert_eq!(reconciled.skipped.len(), 1);
        assert_eq!(reconciled.skipped[0].call, "point-in-time-recovery");
        assert!(provider.calls().contains(&Call::Apply("tags")));
    }
}

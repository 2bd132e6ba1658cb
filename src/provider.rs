//! Provider abstraction for the resource kinds managed by a deployment.
//!
//! Each kind (topic, role, table, function, monitoring) is backed by one
//! [`ResourceProvider`]. The reconciler, orchestrator, and teardown
//! coordinator only ever talk to this trait, so the AWS implementations in
//! [`crate::aws`] and the scripted doubles in [`crate::test_support`] are
//! interchangeable.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::spec::{FunctionSpec, MonitoringSpec, ResourceSpec, RoleSpec, TableSpec, TopicSpec};
use crate::wait::PollPolicy;

/// Resource kinds managed by a deployment.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ResourceKind {
    /// Notification topic used as the alarm action target.
    Topic,
    /// Execution role assumed by the compute function.
    Role,
    /// Data table written by the compute function.
    Table,
    /// Compute function.
    Function,
    /// Log group, metric alarms, and dashboard for the function.
    Monitoring,
}

/// Creation order of every kind. Teardown walks this slice in reverse.
///
/// Topic, role, and table do not depend on each other; their relative order
/// is fixed by declaration only.
pub const CREATION_ORDER: [ResourceKind; 5] = [
    ResourceKind::Topic,
    ResourceKind::Role,
    ResourceKind::Table,
    ResourceKind::Function,
    ResourceKind::Monitoring,
];

impl ResourceKind {
    /// Returns the step name used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Topic => "topic",
            Self::Role => "role",
            Self::Table => "table",
            Self::Function => "function",
            Self::Monitoring => "monitoring",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-assigned identity of a created or discovered resource.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceHandle {
    /// Opaque identifier, typically an ARN.
    pub id: String,
    /// Status reported alongside the identifier, when the provider has one.
    pub status: Option<String>,
}

impl ResourceHandle {
    /// Builds a handle without a status.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: None,
        }
    }

    /// Attaches a status to the handle.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

/// Errors raised by providers.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProviderError {
    /// The named resource does not exist. Describe maps this to `Ok(None)`
    /// and teardown treats it as success.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Kind of the missing resource.
        kind: ResourceKind,
        /// Logical name that was looked up.
        name: String,
    },
    /// Any other provider failure.
    #[error("{kind} {operation} failed: {message}")]
    Transport {
        /// Kind the call was made for.
        kind: ResourceKind,
        /// Provider operation that failed (for example `CreateTable`).
        operation: String,
        /// Message reported by the provider.
        message: String,
    },
}

impl ProviderError {
    /// Builds a [`ProviderError::NotFound`].
    #[must_use]
    pub fn not_found(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Builds a [`ProviderError::Transport`].
    #[must_use]
    pub fn transport(
        kind: ResourceKind,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Transport {
            kind,
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Returns `true` when the error signals absence.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Future returned by provider operations.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// How a provider models the transition from "created" to "usable".
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Readiness {
    /// The create response is final.
    Immediate,
    /// Poll [`ResourceProvider::is_ready`] until it reports `true`.
    Poll(PollPolicy),
    /// Poll, then wait a fixed settle delay once secondary calls are done.
    /// Used for propagation lag that no status field exposes.
    PollThenSettle {
        /// Polling policy applied first.
        policy: PollPolicy,
        /// Extra delay applied after polling succeeds.
        settle: Duration,
    },
}

/// Whether a secondary configuration call must succeed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Requirement {
    /// Failure aborts the reconcile.
    Mandatory,
    /// Failure is logged and swallowed.
    Optional,
}

/// Secondary, non-identity configuration call applied after creation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SecondaryCall {
    /// Name used in logs and errors (for example `attach-execution-policy`).
    pub name: &'static str,
    /// Whether failure aborts the reconcile.
    pub requirement: Requirement,
}

impl SecondaryCall {
    /// Declares a call that must succeed.
    #[must_use]
    pub const fn mandatory(name: &'static str) -> Self {
        Self {
            name,
            requirement: Requirement::Mandatory,
        }
    }

    /// Declares a call whose failure is only a warning.
    #[must_use]
    pub const fn optional(name: &'static str) -> Self {
        Self {
            name,
            requirement: Requirement::Optional,
        }
    }
}

/// Capability set implemented once per resource kind.
pub trait ResourceProvider: Send + Sync {
    /// Desired-state descriptor consumed by this provider.
    type Spec: ResourceSpec + Send + Sync;

    /// Kind managed by this provider.
    fn kind(&self) -> ResourceKind;

    /// Looks up a resource by logical name. Absence is `Ok(None)`; every
    /// other failure is an error.
    fn describe<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<ResourceHandle>>;

    /// Creates the resource described by `spec`.
    fn create<'a>(&'a self, spec: &'a Self::Spec) -> ProviderFuture<'a, ResourceHandle>;

    /// Deletes the named resource, returning [`ProviderError::NotFound`]
    /// when it does not exist.
    fn delete<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, ()>;

    /// Kind-specific readiness predicate used while polling.
    fn is_ready<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, bool>;

    /// Readiness model applied after a create call.
    fn readiness(&self) -> Readiness;

    /// Secondary calls to apply after creation, in order.
    fn secondary_calls(&self, spec: &Self::Spec) -> Vec<SecondaryCall>;

    /// Applies one secondary call returned by [`Self::secondary_calls`].
    fn apply<'a>(
        &'a self,
        call: SecondaryCall,
        spec: &'a Self::Spec,
        handle: &'a ResourceHandle,
    ) -> ProviderFuture<'a, ()>;
}

/// Boxed provider for a given spec type.
pub type DynProvider<S> = Box<dyn ResourceProvider<Spec = S>>;

/// One provider per resource kind.
pub struct ProviderSet {
    /// Notification topic provider.
    pub topic: DynProvider<TopicSpec>,
    /// Execution role provider.
    pub role: DynProvider<RoleSpec>,
    /// Data table provider.
    pub table: DynProvider<TableSpec>,
    /// Compute function provider.
    pub function: DynProvider<FunctionSpec>,
    /// Log group, alarm, and dashboard provider.
    pub monitoring: DynProvider<MonitoringSpec>,
}

impl fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSet").finish_non_exhaustive()
    }
}

/// Optional checks run after every mandatory step succeeded.
pub trait PostDeployChecks: Send + Sync {
    /// Verifies the table is active and reachable.
    fn health_check<'a>(&'a self, table_name: &'a str) -> ProviderFuture<'a, ()>;

    /// Invokes the function once and reports the result.
    fn test_invoke<'a>(&'a self, function_name: &'a str) -> ProviderFuture<'a, InvocationOutcome>;
}

impl<T: PostDeployChecks + ?Sized> PostDeployChecks for Arc<T> {
    fn health_check<'a>(&'a self, table_name: &'a str) -> ProviderFuture<'a, ()> {
        (**self).health_check(table_name)
    }

    fn test_invoke<'a>(&'a self, function_name: &'a str) -> ProviderFuture<'a, InvocationOutcome> {
        (**self).test_invoke(function_name)
    }
}

/// Result of a test invocation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InvocationOutcome {
    /// Status code returned by the invoke call.
    pub status_code: i32,
    /// Error type reported by the function runtime, if the handler failed.
    pub function_error: Option<String>,
    /// Response payload rendered as UTF-8 (lossy).
    pub payload: String,
}

//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::ffi::OsString;
use std::future::ready;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};

use crate::deploy::{DeploymentPlan, RoleSource};
use crate::provider::{
    InvocationOutcome, PostDeployChecks, ProviderError, ProviderFuture, ProviderSet, Readiness,
    ResourceHandle, ResourceKind, ResourceProvider, SecondaryCall,
};
use crate::retry::RetryPolicy;
use crate::spec::{
    BillingMode, FunctionSpec, MonitoringSpec, ResourceSpec, RoleSpec, TableSpec, TopicSpec,
    default_alarms,
};
use crate::teardown::TeardownTargets;

/// Provider call recorded by [`ScriptedProvider`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Call {
    /// `describe(name)`.
    Describe(String),
    /// `create(spec)` for the named spec.
    Create(String),
    /// `delete(name)`.
    Delete(String),
    /// `apply(call, ..)` for the named secondary call.
    Apply(&'static str),
}

/// Ordered record of calls made across several providers.
#[derive(Clone, Debug, Default)]
pub struct Journal {
    entries: Arc<StdMutex<Vec<(ResourceKind, Call)>>>,
}

impl Journal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every entry in call order.
    #[must_use]
    pub fn entries(&self) -> Vec<(ResourceKind, Call)> {
        self.lock().clone()
    }

    /// Returns the kinds that received a call matching `predicate`, in order.
    #[must_use]
    pub fn kinds_where(&self, predicate: impl Fn(&Call) -> bool) -> Vec<ResourceKind> {
        self.lock()
            .iter()
            .filter(|(_, call)| predicate(call))
            .map(|(kind, _)| *kind)
            .collect()
    }

    /// Returns the kinds that received a create call, in order.
    #[must_use]
    pub fn created_kinds(&self) -> Vec<ResourceKind> {
        self.kinds_where(|call| matches!(call, Call::Create(_)))
    }

    /// Returns the kinds that received a delete call, in order.
    #[must_use]
    pub fn deleted_kinds(&self) -> Vec<ResourceKind> {
        self.kinds_where(|call| matches!(call, Call::Delete(_)))
    }

    fn record(&self, kind: ResourceKind, call: Call) {
        self.lock().push((kind, call));
    }

    fn lock(&self) -> StdMutexGuard<'_, Vec<(ResourceKind, Call)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Default)]
struct ProviderState {
    existing: BTreeSet<String>,
    readiness_checks: u32,
}

/// In-memory provider driven by a script of failures.
///
/// Created resources are remembered, so a second reconcile finds them.
/// Handle identifiers take the form `arn:<kind>/<name>`.
#[derive(Debug)]
pub struct ScriptedProvider<S> {
    kind: ResourceKind,
    journal: Journal,
    state: StdMutex<ProviderState>,
    readiness: Readiness,
    ready_after: Option<u32>,
    secondary: Vec<SecondaryCall>,
    failing_secondary: BTreeSet<&'static str>,
    describe_error: Option<String>,
    create_error: Option<String>,
    delete_error: Option<String>,
    _spec: PhantomData<fn() -> S>,
}

impl<S> ScriptedProvider<S> {
    /// Creates a provider with no resources and no scripted failures.
    #[must_use]
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            journal: Journal::new(),
            state: StdMutex::new(ProviderState::default()),
            readiness: Readiness::Immediate,
            ready_after: Some(1),
            secondary: Vec::new(),
            failing_secondary: BTreeSet::new(),
            describe_error: None,
            create_error: None,
            delete_error: None,
            _spec: PhantomData,
        }
    }

    /// Records calls into a shared journal.
    #[must_use]
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// Seeds an existing resource.
    #[must_use]
    pub fn with_existing(self, name: &str) -> Self {
        self.lock().existing.insert(name.to_owned());
        self
    }

    /// Sets the readiness model reported to the reconciler.
    #[must_use]
    pub const fn with_readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    /// Reports ready from the `checks`-th readiness check onwards.
    #[must_use]
    pub const fn ready_after(mut self, checks: u32) -> Self {
        self.ready_after = Some(checks);
        self
    }

    /// Never reports ready.
    #[must_use]
    pub const fn never_ready(mut self) -> Self {
        self.ready_after = None;
        self
    }

    /// Appends a secondary call applied after creation.
    #[must_use]
    pub fn with_secondary(mut self, call: SecondaryCall) -> Self {
        self.secondary.push(call);
        self
    }

    /// Makes the named secondary call fail.
    #[must_use]
    pub fn failing_secondary(mut self, call: &'static str) -> Self {
        self.failing_secondary.insert(call);
        self
    }

    /// Makes describe fail with a transport error.
    #[must_use]
    pub fn failing_describe(mut self, message: &str) -> Self {
        self.describe_error = Some(message.to_owned());
        self
    }

    /// Makes create fail with a transport error.
    #[must_use]
    pub fn failing_create(mut self, message: &str) -> Self {
        self.create_error = Some(message.to_owned());
        self
    }

    /// Makes delete fail with a transport error.
    #[must_use]
    pub fn failing_delete(mut self, message: &str) -> Self {
        self.delete_error = Some(message.to_owned());
        self
    }

    /// Calls received by this provider, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.journal
            .entries()
            .into_iter()
            .filter(|(kind, _)| *kind == self.kind)
            .map(|(_, call)| call)
            .collect()
    }

    /// Number of create calls received.
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Create(_)))
            .count()
    }

    /// Number of readiness checks performed.
    #[must_use]
    pub fn readiness_checks(&self) -> u32 {
        self.lock().readiness_checks
    }

    fn handle(&self, name: &str) -> ResourceHandle {
        ResourceHandle::new(format!("arn:{}/{name}", self.kind))
    }

    fn lock(&self) -> StdMutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transport(&self, operation: &str, message: &str) -> ProviderError {
        ProviderError::transport(self.kind, operation, message)
    }
}

impl<S> ResourceProvider for ScriptedProvider<S>
where
    S: ResourceSpec + Send + Sync,
{
    type Spec = S;

    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn describe<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<ResourceHandle>> {
        self.journal.record(self.kind, Call::Describe(name.to_owned()));
        let result = match &self.describe_error {
            Some(message) => Err(self.transport("Describe", message)),
            None => Ok(self
                .lock()
                .existing
                .contains(name)
                .then(|| self.handle(name))),
        };
        Box::pin(ready(result))
    }

    fn create<'a>(&'a self, spec: &'a S) -> ProviderFuture<'a, ResourceHandle> {
        let name = spec.name();
        self.journal.record(self.kind, Call::Create(name.to_owned()));
        let result = match &self.create_error {
            Some(message) => Err(self.transport("Create", message)),
            None => {
                self.lock().existing.insert(name.to_owned());
                Ok(self.handle(name))
            }
        };
        Box::pin(ready(result))
    }

    fn delete<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, ()> {
        self.journal.record(self.kind, Call::Delete(name.to_owned()));
        let result = match &self.delete_error {
            Some(message) => Err(self.transport("Delete", message)),
            None if self.lock().existing.remove(name) => Ok(()),
            None => Err(ProviderError::not_found(self.kind, name)),
        };
        Box::pin(ready(result))
    }

    fn is_ready<'a>(&'a self, _name: &'a str) -> ProviderFuture<'a, bool> {
        let checks = {
            let mut state = self.lock();
            state.readiness_checks += 1;
            state.readiness_checks
        };
        let ready_now = self.ready_after.is_some_and(|after| checks >= after);
        Box::pin(ready(Ok(ready_now)))
    }

    fn readiness(&self) -> Readiness {
        self.readiness
    }

    fn secondary_calls(&self, _spec: &S) -> Vec<SecondaryCall> {
        self.secondary.clone()
    }

    fn apply<'a>(
        &'a self,
        call: SecondaryCall,
        _spec: &'a S,
        _handle: &'a ResourceHandle,
    ) -> ProviderFuture<'a, ()> {
        self.journal.record(self.kind, Call::Apply(call.name));
        let result = if self.failing_secondary.contains(call.name) {
            Err(self.transport(call.name, "scripted failure"))
        } else {
            Ok(())
        };
        Box::pin(ready(result))
    }
}

/// Scripted post-deploy checks.
#[derive(Debug)]
pub struct ScriptedChecks {
    health_failures: StdMutex<u32>,
    health_calls: StdMutex<u32>,
    invocation: Result<InvocationOutcome, String>,
    invocations: StdMutex<u32>,
}

impl Default for ScriptedChecks {
    fn default() -> Self {
        Self {
            health_failures: StdMutex::new(0),
            health_calls: StdMutex::new(0),
            invocation: Ok(InvocationOutcome {
                status_code: 200,
                function_error: None,
                payload: String::from("{\"statusCode\": 200}"),
            }),
            invocations: StdMutex::new(0),
        }
    }
}

impl ScriptedChecks {
    /// Creates checks that always pass.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the first `count` health checks.
    #[must_use]
    pub fn failing_health_checks(self, count: u32) -> Self {
        *lock(&self.health_failures) = count;
        self
    }

    /// Sets the result of the test invocation.
    #[must_use]
    pub fn with_invocation(mut self, invocation: Result<InvocationOutcome, String>) -> Self {
        self.invocation = invocation;
        self
    }

    /// Number of health checks performed.
    #[must_use]
    pub fn health_calls(&self) -> u32 {
        *lock(&self.health_calls)
    }

    /// Number of test invocations performed.
    #[must_use]
    pub fn invocations(&self) -> u32 {
        *lock(&self.invocations)
    }
}

impl PostDeployChecks for ScriptedChecks {
    fn health_check<'a>(&'a self, table_name: &'a str) -> ProviderFuture<'a, ()> {
        *lock(&self.health_calls) += 1;
        let mut remaining = lock(&self.health_failures);
        let result = if *remaining > 0 {
            *remaining -= 1;
            Err(ProviderError::transport(
                ResourceKind::Table,
                "DescribeTable",
                format!("table {table_name} not active"),
            ))
        } else {
            Ok(())
        };
        Box::pin(ready(result))
    }

    fn test_invoke<'a>(&'a self, _function_name: &'a str) -> ProviderFuture<'a, InvocationOutcome> {
        *lock(&self.invocations) += 1;
        let result = self
            .invocation
            .clone()
            .map_err(|message| ProviderError::transport(ResourceKind::Function, "Invoke", message));
        Box::pin(ready(result))
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> StdMutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Table spec with the standard key schema.
#[must_use]
pub fn table_spec(name: &str) -> TableSpec {
    TableSpec {
        name: name.to_owned(),
        partition_key: String::from("id"),
        sort_key: String::from("timestamp"),
        billing_mode: BillingMode::PayPerRequest,
    }
}

/// Deployment plan with fixed names and an unbound function and monitoring
/// spec.
#[must_use]
pub fn sample_plan() -> DeploymentPlan {
    DeploymentPlan {
        topic: TopicSpec {
            name: String::from("alerts"),
            alert_email: None,
        },
        role: RoleSource::Managed(RoleSpec {
            name: String::from("fetcher-role"),
            permissions_boundary_arn: None,
            table_name: String::from("events"),
            region: String::from("eu-west-1"),
        }),
        table: table_spec("events"),
        function: FunctionSpec {
            name: String::from("fetcher"),
            description: String::from("fetches records"),
            role_arn: String::new(),
            runtime: String::from("python3.12"),
            handler: String::from("handler.lambda_handler"),
            memory_mb: 256,
            timeout_secs: 60,
            environment: BTreeMap::from([(
                String::from("DYNAMODB_TABLE_NAME"),
                String::from("events"),
            )]),
            package: b"PK".to_vec(),
        },
        monitoring: MonitoringSpec {
            log_group_name: String::from("/aws/lambda/fetcher"),
            retention_days: 30,
            function_name: String::from("fetcher"),
            function_arn: String::new(),
            topic_arn: None,
            table_name: String::from("events"),
            alarms: default_alarms("fetcher", 60),
            dashboard_name: String::from("fetcher-dashboard"),
        },
        health_check: RetryPolicy::new(3).with_base_delay(Duration::from_millis(10)),
        test_invoke: false,
    }
}

/// Teardown targets matching [`sample_plan`].
#[must_use]
pub fn sample_targets() -> TeardownTargets {
    TeardownTargets {
        topic: String::from("alerts"),
        role: Some(String::from("fetcher-role")),
        table: String::from("events"),
        function: String::from("fetcher"),
        monitoring: String::from("/aws/lambda/fetcher"),
    }
}

/// Scripted providers for every kind, sharing one journal.
#[derive(Debug)]
pub struct ScriptedStack {
    /// Topic provider.
    pub topic: ScriptedProvider<TopicSpec>,
    /// Role provider.
    pub role: ScriptedProvider<RoleSpec>,
    /// Table provider.
    pub table: ScriptedProvider<TableSpec>,
    /// Function provider.
    pub function: ScriptedProvider<FunctionSpec>,
    /// Monitoring provider.
    pub monitoring: ScriptedProvider<MonitoringSpec>,
    /// Journal shared by every provider.
    pub journal: Journal,
}

impl Default for ScriptedStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedStack {
    /// Creates providers with no resources and no scripted failures.
    #[must_use]
    pub fn new() -> Self {
        let journal = Journal::new();
        Self {
            topic: ScriptedProvider::new(ResourceKind::Topic).with_journal(journal.clone()),
            role: ScriptedProvider::new(ResourceKind::Role).with_journal(journal.clone()),
            table: ScriptedProvider::new(ResourceKind::Table).with_journal(journal.clone()),
            function: ScriptedProvider::new(ResourceKind::Function).with_journal(journal.clone()),
            monitoring: ScriptedProvider::new(ResourceKind::Monitoring)
                .with_journal(journal.clone()),
            journal,
        }
    }

    /// Boxes the providers, returning them with the shared journal.
    #[must_use]
    pub fn into_providers(self) -> (ProviderSet, Journal) {
        let providers = ProviderSet {
            topic: Box::new(self.topic),
            role: Box::new(self.role),
            table: Box::new(self.table),
            function: Box::new(self.function),
            monitoring: Box::new(self.monitoring),
        };
        (providers, self.journal)
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in self.previous.iter().rev() {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}

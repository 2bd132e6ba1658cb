//! Compute function backed by Lambda.

use std::time::Duration;

use aws_sdk_lambda::Client;
use aws_sdk_lambda::operation::get_function_configuration::GetFunctionConfigurationOutput;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{Environment, FunctionCode, LastUpdateStatus, Runtime, State};

use super::error::{absent_as_none, classify, missing_field};
use super::{AwsContext, tag_map};
use crate::provider::{
    InvocationOutcome, ProviderError, ProviderFuture, Readiness, ResourceHandle, ResourceKind,
    ResourceProvider, SecondaryCall,
};
use crate::spec::FunctionSpec;
use crate::wait::PollPolicy;

const KIND: ResourceKind = ResourceKind::Function;

/// Function provider. The function is ready once its state is `Active` and
/// no configuration update is in progress.
#[derive(Clone, Debug)]
pub struct FunctionProvider {
    client: Client,
}

impl FunctionProvider {
    /// Creates a provider from a loaded context.
    #[must_use]
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.lambda_client(),
        }
    }

    async fn get(&self, name: &str) -> Result<Option<ResourceHandle>, ProviderError> {
        let result = self
            .client
            .get_function_configuration()
            .function_name(name)
            .send()
            .await
            .map_err(|err| classify(KIND, "GetFunctionConfiguration", name, &err));
        let Some(config) = absent_as_none(result)? else {
            return Ok(None);
        };
        let arn = config
            .function_arn()
            .ok_or_else(|| missing_field(KIND, "GetFunctionConfiguration", "function ARN"))?;
        let handle = ResourceHandle::new(arn);
        Ok(Some(match config.state() {
            Some(state) => handle.with_status(state.as_str()),
            None => handle,
        }))
    }

    async fn create_function(&self, spec: &FunctionSpec) -> Result<ResourceHandle, ProviderError> {
        let code = FunctionCode::builder()
            .zip_file(Blob::new(spec.package.clone()))
            .build();
        let environment = Environment::builder()
            .set_variables(Some(spec.environment.clone().into_iter().collect()))
            .build();

        let output = self
            .client
            .create_function()
            .function_name(&spec.name)
            .description(&spec.description)
            .runtime(Runtime::from(spec.runtime.as_str()))
            .role(&spec.role_arn)
            .handler(&spec.handler)
            .code(code)
            .timeout(spec.timeout_secs)
            .memory_size(spec.memory_mb)
            .environment(environment)
            .set_tags(Some(tag_map()))
            .send()
            .await
            .map_err(|err| classify(KIND, "CreateFunction", &spec.name, &err))?;
        let arn = output
            .function_arn()
            .ok_or_else(|| missing_field(KIND, "CreateFunction", "function ARN"))?;
        Ok(ResourceHandle::new(arn))
    }

    async fn ready(&self, name: &str) -> Result<bool, ProviderError> {
        let result = self
            .client
            .get_function_configuration()
            .function_name(name)
            .send()
            .await
            .map_err(|err| classify(KIND, "GetFunctionConfiguration", name, &err));
        readiness_of(absent_as_none(result)?.as_ref())
    }

    async fn delete_function(&self, name: &str) -> Result<(), ProviderError> {
        self.client
            .delete_function()
            .function_name(name)
            .send()
            .await
            .map_err(|err| classify(KIND, "DeleteFunction", name, &err))?;
        Ok(())
    }

    /// Invokes the function synchronously with an empty JSON event.
    pub(super) async fn invoke(&self, name: &str) -> Result<InvocationOutcome, ProviderError> {
        let output = self
            .client
            .invoke()
            .function_name(name)
            .payload(Blob::new("{}"))
            .send()
            .await
            .map_err(|err| classify(KIND, "Invoke", name, &err))?;
        Ok(InvocationOutcome {
            status_code: output.status_code(),
            function_error: output.function_error().map(str::to_owned),
            payload: output
                .payload()
                .map(|blob| String::from_utf8_lossy(blob.as_ref()).into_owned())
                .unwrap_or_default(),
        })
    }
}

/// A function not yet visible is not ready; a `Failed` state is an error.
fn readiness_of(config: Option<&GetFunctionConfigurationOutput>) -> Result<bool, ProviderError> {
    let Some(config) = config else {
        return Ok(false);
    };
    if config.state() == Some(&State::Failed) {
        let reason = config.state_reason().unwrap_or("no reason given");
        return Err(ProviderError::transport(
            KIND,
            "GetFunctionConfiguration",
            format!("function entered Failed state: {reason}"),
        ));
    }
    Ok(config.state() == Some(&State::Active)
        && config.last_update_status() != Some(&LastUpdateStatus::InProgress))
}

impl ResourceProvider for FunctionProvider {
    type Spec = FunctionSpec;

    fn kind(&self) -> ResourceKind {
        KIND
    }

    fn describe<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<ResourceHandle>> {
        Box::pin(self.get(name))
    }

    fn create<'a>(&'a self, spec: &'a FunctionSpec) -> ProviderFuture<'a, ResourceHandle> {
        Box::pin(self.create_function(spec))
    }

    fn delete<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(self.delete_function(name))
    }

    fn is_ready<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, bool> {
        Box::pin(self.ready(name))
    }

    fn readiness(&self) -> Readiness {
        Readiness::Poll(PollPolicy::new(
            Duration::from_secs(120),
            Duration::from_secs(5),
        ))
    }

    fn secondary_calls(&self, _spec: &FunctionSpec) -> Vec<SecondaryCall> {
        Vec::new()
    }

    fn apply<'a>(
        &'a self,
        call: SecondaryCall,
        _spec: &'a FunctionSpec,
        _handle: &'a ResourceHandle,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(std::future::ready(Err(ProviderError::transport(
            KIND,
            call.name,
            "unsupported call",
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn config(state: State, update: Option<LastUpdateStatus>) -> GetFunctionConfigurationOutput {
        GetFunctionConfigurationOutput::builder()
            .state(state)
            .set_last_update_status(update)
            .build()
    }

    #[rstest]
    fn unseen_function_is_not_ready_yet() {
        assert_eq!(readiness_of(None), Ok(false));
    }

    #[rstest]
    #[case(State::Pending, None, false)]
    #[case(State::Active, Some(LastUpdateStatus::InProgress), false)]
    #[case(State::Active, Some(LastUpdateStatus::Successful), true)]
    #[case(State::Active, None, true)]
    fn active_without_pending_update_is_ready(
        #[case] state: State,
        #[case] update: Option<LastUpdateStatus>,
        #[case] expected: bool,
    ) {
        assert_eq!(readiness_of(Some(&config(state, update))), Ok(expected));
    }

    #[rstest]
    fn failed_state_stops_the_wait() {
        let failed = GetFunctionConfigurationOutput::builder()
            .state(State::Failed)
            .state_reason("role cannot be assumed")
            .build();

        let err = readiness_of(Some(&failed)).expect_err("failed state");

        assert!(err.to_string().contains("role cannot be assumed"));
    }
}

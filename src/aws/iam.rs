//! Execution role backed by IAM.

use std::time::Duration;

use aws_sdk_iam::Client;
use aws_sdk_iam::types::Tag;
use tracing::debug;

use super::AwsContext;
use super::error::{absent_as_none, build_error, classify, missing_field};
use crate::provider::{
    ProviderError, ProviderFuture, Readiness, ResourceHandle, ResourceKind, ResourceProvider,
    SecondaryCall,
};
use crate::spec::{PROJECT_TAGS, RoleSpec};
use crate::wait::PollPolicy;

/// Managed policy granting the function permission to write logs.
pub const EXECUTION_POLICY_ARN: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";

/// Name of the inline policy granting table and metric access.
pub const INLINE_POLICY_NAME: &str = "stackwright-function-access";

const ATTACH_EXECUTION_POLICY: &str = "attach-execution-policy";
const PUT_INLINE_POLICY: &str = "put-inline-policy";

const KIND: ResourceKind = ResourceKind::Role;

fn trust_policy() -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Principal": { "Service": "lambda.amazonaws.com" },
                "Action": "sts:AssumeRole"
            }
        ]
    })
    .to_string()
}

/// Inline policy scoped to the configured table.
pub(crate) fn inline_policy(spec: &RoleSpec) -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Action": [
                    "dynamodb:PutItem",
                    "dynamodb:GetItem",
                    "dynamodb:BatchWriteItem",
                    "dynamodb:DescribeTable",
                    "dynamodb:Query",
                    "dynamodb:Scan"
                ],
                "Resource": format!(
                    "arn:aws:dynamodb:{}:*:table/{}",
                    spec.region, spec.table_name
                )
            },
            {
                "Effect": "Allow",
                "Action": ["cloudwatch:PutMetricData"],
                "Resource": "*"
            }
        ]
    })
    .to_string()
}

/// Role provider.
///
/// IAM is eventually consistent: after creation the role is polled until
/// `GetRole` sees it, and a settle delay follows the policy attachments so
/// the function service can assume it.
#[derive(Clone, Debug)]
pub struct RoleProvider {
    client: Client,
}

impl RoleProvider {
    /// Creates a provider from a loaded context.
    #[must_use]
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.iam_client(),
        }
    }

    async fn get(&self, name: &str) -> Result<Option<ResourceHandle>, ProviderError> {
        let result = self
            .client
            .get_role()
            .role_name(name)
            .send()
            .await
            .map_err(|err| classify(KIND, "GetRole", name, &err));
        let Some(output) = absent_as_none(result)? else {
            return Ok(None);
        };
        let role = output
            .role()
            .ok_or_else(|| missing_field(KIND, "GetRole", "role"))?;
        Ok(Some(ResourceHandle::new(role.arn())))
    }

    async fn create_role(&self, spec: &RoleSpec) -> Result<ResourceHandle, ProviderError> {
        let tags = PROJECT_TAGS
            .iter()
            .map(|(key, value)| Tag::builder().key(*key).value(*value).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| build_error(KIND, "CreateRole", err))?;

        let output = self
            .client
            .create_role()
            .role_name(&spec.name)
            .assume_role_policy_document(trust_policy())
            .description("Execution role managed by stackwright")
            .set_permissions_boundary(spec.permissions_boundary_arn.clone())
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|err| classify(KIND, "CreateRole", &spec.name, &err))?;
        let role = output
            .role()
            .ok_or_else(|| missing_field(KIND, "CreateRole", "role"))?;
        Ok(ResourceHandle::new(role.arn()))
    }

    async fn apply_call(&self, call: SecondaryCall, spec: &RoleSpec) -> Result<(), ProviderError> {
        match call.name {
            ATTACH_EXECUTION_POLICY => {
                self.client
                    .attach_role_policy()
                    .role_name(&spec.name)
                    .policy_arn(EXECUTION_POLICY_ARN)
                    .send()
                    .await
                    .map_err(|err| classify(KIND, "AttachRolePolicy", &spec.name, &err))?;
            }
            PUT_INLINE_POLICY => {
                self.client
                    .put_role_policy()
                    .role_name(&spec.name)
                    .policy_name(INLINE_POLICY_NAME)
                    .policy_document(inline_policy(spec))
                    .send()
                    .await
                    .map_err(|err| classify(KIND, "PutRolePolicy", &spec.name, &err))?;
            }
            other => return Err(ProviderError::transport(KIND, other, "unsupported call")),
        }
        Ok(())
    }

    /// Detaches managed policies and removes inline policies, then deletes
    /// the role itself.
    async fn delete_role(&self, name: &str) -> Result<(), ProviderError> {
        let attached = self
            .client
            .list_attached_role_policies()
            .role_name(name)
            .send()
            .await
            .map_err(|err| classify(KIND, "ListAttachedRolePolicies", name, &err))?;
        for policy_arn in attached
            .attached_policies()
            .iter()
            .filter_map(|policy| policy.policy_arn())
        {
            self.client
                .detach_role_policy()
                .role_name(name)
                .policy_arn(policy_arn)
                .send()
                .await
                .map_err(|err| classify(KIND, "DetachRolePolicy", name, &err))?;
            debug!(role = name, policy_arn, "detached managed policy");
        }

        let inline = self
            .client
            .list_role_policies()
            .role_name(name)
            .send()
            .await
            .map_err(|err| classify(KIND, "ListRolePolicies", name, &err))?;
        for policy_name in inline.policy_names() {
            self.client
                .delete_role_policy()
                .role_name(name)
                .policy_name(policy_name)
                .send()
                .await
                .map_err(|err| classify(KIND, "DeleteRolePolicy", name, &err))?;
            debug!(role = name, policy_name, "deleted inline policy");
        }

        self.client
            .delete_role()
            .role_name(name)
            .send()
            .await
            .map_err(|err| classify(KIND, "DeleteRole", name, &err))?;
        Ok(())
    }
}

impl ResourceProvider for RoleProvider {
    type Spec = RoleSpec;

    fn kind(&self) -> ResourceKind {
        KIND
    }

    fn describe<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<ResourceHandle>> {
        Box::pin(self.get(name))
    }

    fn create<'a>(&'a self, spec: &'a RoleSpec) -> ProviderFuture<'a, ResourceHandle> {
        Box::pin(self.create_role(spec))
    }

    fn delete<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(self.delete_role(name))
    }

    fn is_ready<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, bool> {
        Box::pin(async move { Ok(self.get(name).await?.is_some()) })
    }

    fn readiness(&self) -> Readiness {
        Readiness::PollThenSettle {
            policy: PollPolicy::new(Duration::from_secs(60), Duration::from_secs(5)),
            settle: Duration::from_secs(10),
        }
    }

    fn secondary_calls(&self, _spec: &RoleSpec) -> Vec<SecondaryCall> {
        vec![
            SecondaryCall::mandatory(ATTACH_EXECUTION_POLICY),
            SecondaryCall::mandatory(PUT_INLINE_POLICY),
        ]
    }

    fn apply<'a>(
        &'a self,
        call: SecondaryCall,
        spec: &'a RoleSpec,
        _handle: &'a ResourceHandle,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(self.apply_call(call, spec))
    }
}

//! Data table backed by DynamoDB.

use std::time::Duration;

use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode as SdkBillingMode, KeySchemaElement, KeyType,
    PointInTimeRecoverySpecification, ScalarAttributeType, TableDescription, TableStatus, Tag,
};
use tracing::info;

use super::AwsContext;
use super::error::{absent_as_none, build_error, classify, error_code, missing_field};
use crate::provider::{
    ProviderError, ProviderFuture, Readiness, ResourceHandle, ResourceKind, ResourceProvider,
    SecondaryCall,
};
use crate::spec::{BillingMode, PROJECT_TAGS, TableSpec};
use crate::wait::PollPolicy;

const ENABLE_POINT_IN_TIME_RECOVERY: &str = "enable-point-in-time-recovery";

const KIND: ResourceKind = ResourceKind::Table;

fn handle_for(table: &TableDescription, name: &str) -> ResourceHandle {
    let handle = ResourceHandle::new(table.table_arn().unwrap_or(name));
    match table.table_status() {
        Some(status) => handle.with_status(status.as_str()),
        None => handle,
    }
}

/// Table provider. Creation is asynchronous; the table is polled until its
/// status is `ACTIVE`.
#[derive(Clone, Debug)]
pub struct TableProvider {
    client: Client,
}

impl TableProvider {
    /// Creates a provider from a loaded context.
    #[must_use]
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.dynamodb_client(),
        }
    }

    pub(super) async fn describe_table(
        &self,
        name: &str,
    ) -> Result<Option<TableDescription>, ProviderError> {
        let result = self
            .client
            .describe_table()
            .table_name(name)
            .send()
            .await
            .map_err(|err| classify(KIND, "DescribeTable", name, &err));
        Ok(absent_as_none(result)?.and_then(|output| output.table().cloned()))
    }

    async fn get(&self, name: &str) -> Result<Option<ResourceHandle>, ProviderError> {
        Ok(self
            .describe_table(name)
            .await?
            .map(|table| handle_for(&table, name)))
    }

    async fn create_table(&self, spec: &TableSpec) -> Result<ResourceHandle, ProviderError> {
        let build = |err| build_error(KIND, "CreateTable", err);
        let attributes = [&spec.partition_key, &spec.sort_key]
            .into_iter()
            .map(|attribute| {
                AttributeDefinition::builder()
                    .attribute_name(attribute)
                    .attribute_type(ScalarAttributeType::S)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(build)?;
        let key_schema = [
            (&spec.partition_key, KeyType::Hash),
            (&spec.sort_key, KeyType::Range),
        ]
        .into_iter()
        .map(|(attribute, key_type)| {
            KeySchemaElement::builder()
                .attribute_name(attribute)
                .key_type(key_type)
                .build()
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(build)?;
        let tags = PROJECT_TAGS
            .iter()
            .map(|(key, value)| Tag::builder().key(*key).value(*value).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(build)?;
        let billing_mode = match spec.billing_mode {
            BillingMode::PayPerRequest => SdkBillingMode::PayPerRequest,
        };

        let result = self
            .client
            .create_table()
            .table_name(&spec.name)
            .set_attribute_definitions(Some(attributes))
            .set_key_schema(Some(key_schema))
            .billing_mode(billing_mode)
            .set_tags(Some(tags))
            .send()
            .await;

        match result {
            Ok(output) => output
                .table_description()
                .map(|table| handle_for(table, &spec.name))
                .ok_or_else(|| missing_field(KIND, "CreateTable", "table description")),
            Err(err) if error_code(&err) == Some("ResourceInUseException") => {
                info!(table = %spec.name, "table created concurrently; using it");
                self.get(&spec.name)
                    .await?
                    .ok_or_else(|| ProviderError::not_found(KIND, &spec.name))
            }
            Err(err) => Err(classify(KIND, "CreateTable", &spec.name, &err)),
        }
    }

    async fn enable_recovery(&self, name: &str) -> Result<(), ProviderError> {
        let specification = PointInTimeRecoverySpecification::builder()
            .point_in_time_recovery_enabled(true)
            .build()
            .map_err(|err| build_error(KIND, "UpdateContinuousBackups", err))?;
        self.client
            .update_continuous_backups()
            .table_name(name)
            .point_in_time_recovery_specification(specification)
            .send()
            .await
            .map_err(|err| classify(KIND, "UpdateContinuousBackups", name, &err))?;
        Ok(())
    }

    async fn delete_table(&self, name: &str) -> Result<(), ProviderError> {
        self.client
            .delete_table()
            .table_name(name)
            .send()
            .await
            .map_err(|err| classify(KIND, "DeleteTable", name, &err))?;
        Ok(())
    }
}

impl ResourceProvider for TableProvider {
    type Spec = TableSpec;

    fn kind(&self) -> ResourceKind {
        KIND
    }

    fn describe<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<ResourceHandle>> {
        Box::pin(self.get(name))
    }

    fn create<'a>(&'a self, spec: &'a TableSpec) -> ProviderFuture<'a, ResourceHandle> {
        Box::pin(self.create_table(spec))
    }

    fn delete<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(self.delete_table(name))
    }

    fn is_ready<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, bool> {
        Box::pin(async move {
            let table = self.describe_table(name).await?;
            Ok(table.is_some_and(|table| table.table_status() == Some(&TableStatus::Active)))
        })
    }

    fn readiness(&self) -> Readiness {
        Readiness::Poll(PollPolicy::new(
            Duration::from_secs(120),
            Duration::from_secs(5),
        ))
    }

    fn secondary_calls(&self, _spec: &TableSpec) -> Vec<SecondaryCall> {
        vec![SecondaryCall::optional(ENABLE_POINT_IN_TIME_RECOVERY)]
    }

    fn apply<'a>(
        &'a self,
        call: SecondaryCall,
        spec: &'a TableSpec,
        _handle: &'a ResourceHandle,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            match call.name {
                ENABLE_POINT_IN_TIME_RECOVERY => self.enable_recovery(&spec.name).await,
                other => Err(ProviderError::transport(KIND, other, "unsupported call")),
            }
        })
    }
}

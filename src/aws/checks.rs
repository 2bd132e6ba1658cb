//! Post-deploy health check and test invocation.

use aws_sdk_dynamodb::types::TableStatus;
use tracing::info;

use super::AwsContext;
use super::dynamodb::TableProvider;
use super::lambda::FunctionProvider;
use crate::provider::{
    InvocationOutcome, PostDeployChecks, ProviderError, ProviderFuture, ResourceKind,
};

/// Checks backed by the table and function providers.
#[derive(Clone, Debug)]
pub struct AwsChecks {
    table: TableProvider,
    function: FunctionProvider,
}

impl AwsChecks {
    /// Creates checks from a loaded context.
    #[must_use]
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            table: TableProvider::from_context(ctx),
            function: FunctionProvider::from_context(ctx),
        }
    }

    async fn table_health(&self, table_name: &str) -> Result<(), ProviderError> {
        let table = self
            .table
            .describe_table(table_name)
            .await?
            .ok_or_else(|| ProviderError::not_found(ResourceKind::Table, table_name))?;
        match table.table_status() {
            Some(TableStatus::Active) => {
                info!(
                    table = table_name,
                    item_count = table.item_count().unwrap_or_default(),
                    "table is active"
                );
                Ok(())
            }
            status => Err(ProviderError::transport(
                ResourceKind::Table,
                "DescribeTable",
                format!(
                    "table {table_name} is {}",
                    status.map_or("in an unknown state", TableStatus::as_str)
                ),
            )),
        }
    }
}

impl PostDeployChecks for AwsChecks {
    fn health_check<'a>(&'a self, table_name: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(self.table_health(table_name))
    }

    fn test_invoke<'a>(&'a self, function_name: &'a str) -> ProviderFuture<'a, InvocationOutcome> {
        Box::pin(self.function.invoke(function_name))
    }
}

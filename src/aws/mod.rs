//! AWS implementations of the resource providers.
//!
//! [`AwsContext`] loads the SDK configuration once and hands out one client
//! per service; each provider module wraps the calls for one resource kind.

mod checks;
mod dynamodb;
pub(crate) mod error;
mod iam;
mod lambda;
mod monitoring;
mod sns;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use aws_config::{BehaviorVersion, Region, SdkConfig};

pub use checks::AwsChecks;
pub use dynamodb::TableProvider;
pub use iam::{EXECUTION_POLICY_ARN, INLINE_POLICY_NAME, RoleProvider};
pub use lambda::FunctionProvider;
pub use monitoring::MonitoringProvider;
pub use sns::TopicProvider;

use crate::provider::ProviderSet;
use crate::spec::{MonitoringSpec, PROJECT_TAGS};

/// Loaded SDK configuration shared by every client.
#[derive(Clone)]
pub struct AwsContext {
    config: Arc<SdkConfig>,
    region: String,
}

impl AwsContext {
    /// Loads credentials and settings from the environment for `region`.
    pub async fn new(region: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_owned()))
            .load()
            .await;

        Self {
            config: Arc::new(config),
            region: region.to_owned(),
        }
    }

    /// Region the context was loaded for.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// IAM client.
    #[must_use]
    pub fn iam_client(&self) -> aws_sdk_iam::Client {
        aws_sdk_iam::Client::new(&self.config)
    }

    /// DynamoDB client.
    #[must_use]
    pub fn dynamodb_client(&self) -> aws_sdk_dynamodb::Client {
        aws_sdk_dynamodb::Client::new(&self.config)
    }

    /// Lambda client.
    #[must_use]
    pub fn lambda_client(&self) -> aws_sdk_lambda::Client {
        aws_sdk_lambda::Client::new(&self.config)
    }

    /// SNS client.
    #[must_use]
    pub fn sns_client(&self) -> aws_sdk_sns::Client {
        aws_sdk_sns::Client::new(&self.config)
    }

    /// CloudWatch metrics client.
    #[must_use]
    pub fn cloudwatch_client(&self) -> aws_sdk_cloudwatch::Client {
        aws_sdk_cloudwatch::Client::new(&self.config)
    }

    /// CloudWatch Logs client.
    #[must_use]
    pub fn logs_client(&self) -> aws_sdk_cloudwatchlogs::Client {
        aws_sdk_cloudwatchlogs::Client::new(&self.config)
    }

    /// Builds one provider per kind.
    ///
    /// `monitoring` names the alarms and dashboard removed alongside the log
    /// group during teardown.
    #[must_use]
    pub fn providers(&self, monitoring: &MonitoringSpec) -> ProviderSet {
        ProviderSet {
            topic: Box::new(TopicProvider::from_context(self)),
            role: Box::new(RoleProvider::from_context(self)),
            table: Box::new(TableProvider::from_context(self)),
            function: Box::new(FunctionProvider::from_context(self)),
            monitoring: Box::new(MonitoringProvider::from_context(
                self,
                monitoring.alarm_names(),
                monitoring.dashboard_name.clone(),
            )),
        }
    }

    /// Post-deploy checks backed by DynamoDB and Lambda.
    #[must_use]
    pub fn checks(&self) -> AwsChecks {
        AwsChecks::from_context(self)
    }
}

impl fmt::Debug for AwsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsContext")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

/// Project tags as a map, for services that take tags that way.
pub(crate) fn tag_map() -> HashMap<String, String> {
    PROJECT_TAGS
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

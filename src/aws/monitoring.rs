//! Log group, metric alarms, and dashboard backed by CloudWatch.
//!
//! The log group is the identity of the monitoring resources: describe and
//! create act on it, while alarms, retention, and the dashboard are
//! secondary calls.

use aws_sdk_cloudwatch::types::{ComparisonOperator, Dimension, Statistic as SdkStatistic};
use aws_sdk_cloudwatchlogs::types::LogGroup;
use tracing::{debug, info, warn};

use super::error::{classify, error_code};
use super::{AwsContext, tag_map};
use crate::provider::{
    ProviderError, ProviderFuture, Readiness, ResourceHandle, ResourceKind, ResourceProvider,
    SecondaryCall,
};
use crate::spec::{AlarmSpec, Comparison, MonitoringSpec, Statistic};

const SET_LOG_RETENTION: &str = "set-log-retention";
const PUT_METRIC_ALARMS: &str = "put-metric-alarms";
const PUT_DASHBOARD: &str = "put-dashboard";

const FUNCTION_NAMESPACE: &str = "AWS/Lambda";

/// Namespace the packaged handler publishes its custom metrics to.
pub(crate) const CUSTOM_NAMESPACE: &str = "IaC/Lambda";
/// Custom metrics published per invocation, dimensioned by `FunctionName`.
pub(crate) const CUSTOM_METRICS: [&str; 2] = ["ProcessedRecords", "Errors"];

const KIND: ResourceKind = ResourceKind::Monitoring;

/// Dashboard body with invocation, duration, table, and custom metric
/// widgets.
pub(crate) fn dashboard_body(spec: &MonitoringSpec, region: &str) -> String {
    let function = spec.function_name.as_str();
    let table = spec.table_name.as_str();
    let widget = |title: &str, stat: &str, metrics: serde_json::Value| {
        serde_json::json!({
            "type": "metric",
            "width": 12,
            "height": 6,
            "properties": {
                "title": title,
                "region": region,
                "stat": stat,
                "period": 300,
                "metrics": metrics
            }
        })
    };
    serde_json::json!({
        "widgets": [
            widget(
                "Function invocations",
                "Sum",
                serde_json::json!([
                    [FUNCTION_NAMESPACE, "Invocations", "FunctionName", function],
                    [FUNCTION_NAMESPACE, "Errors", "FunctionName", function],
                    [FUNCTION_NAMESPACE, "Throttles", "FunctionName", function]
                ]),
            ),
            widget(
                "Function duration",
                "Average",
                serde_json::json!([[FUNCTION_NAMESPACE, "Duration", "FunctionName", function]]),
            ),
            widget(
                "Table health",
                "Average",
                serde_json::json!([
                    ["AWS/DynamoDB", "SuccessfulRequestLatency", "TableName", table, "Operation", "PutItem"],
                    ["AWS/DynamoDB", "SystemErrors", "TableName", table]
                ]),
            ),
            widget(
                "Processed records",
                "Sum",
                serde_json::Value::Array(
                    CUSTOM_METRICS
                        .iter()
                        .map(|metric| {
                            serde_json::json!([CUSTOM_NAMESPACE, metric, "FunctionName", function])
                        })
                        .collect(),
                ),
            )
        ]
    })
    .to_string()
}

fn sdk_statistic(statistic: Statistic) -> SdkStatistic {
    match statistic {
        Statistic::Sum => SdkStatistic::Sum,
        Statistic::Average => SdkStatistic::Average,
    }
}

fn sdk_comparison(comparison: Comparison) -> ComparisonOperator {
    match comparison {
        Comparison::GreaterThanOrEqual => ComparisonOperator::GreaterThanOrEqualToThreshold,
        Comparison::GreaterThan => ComparisonOperator::GreaterThanThreshold,
    }
}

/// Monitoring provider.
#[derive(Clone, Debug)]
pub struct MonitoringProvider {
    logs: aws_sdk_cloudwatchlogs::Client,
    metrics: aws_sdk_cloudwatch::Client,
    region: String,
    alarm_names: Vec<String>,
    dashboard_name: String,
}

impl MonitoringProvider {
    /// Creates a provider from a loaded context. `alarm_names` and
    /// `dashboard_name` are removed alongside the log group on delete.
    #[must_use]
    pub fn from_context(ctx: &AwsContext, alarm_names: Vec<String>, dashboard_name: String) -> Self {
        Self {
            logs: ctx.logs_client(),
            metrics: ctx.cloudwatch_client(),
            region: ctx.region().to_owned(),
            alarm_names,
            dashboard_name,
        }
    }

    async fn find_log_group(&self, name: &str) -> Result<Option<ResourceHandle>, ProviderError> {
        let mut next_token = None;
        loop {
            let page = self
                .logs
                .describe_log_groups()
                .log_group_name_prefix(name)
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|err| classify(KIND, "DescribeLogGroups", name, &err))?;
            if let Some(handle) = exact_group(page.log_groups(), name) {
                return Ok(Some(handle));
            }
            next_token = page.next_token().map(str::to_owned);
            if next_token.is_none() {
                return Ok(None);
            }
        }
    }

    async fn create_log_group(&self, spec: &MonitoringSpec) -> Result<ResourceHandle, ProviderError> {
        let name = spec.log_group_name.as_str();
        let result = self
            .logs
            .create_log_group()
            .log_group_name(name)
            .set_tags(Some(tag_map()))
            .send()
            .await;
        match result {
            Ok(_) => {}
            Err(err) if error_code(&err) == Some("ResourceAlreadyExistsException") => {
                debug!(log_group = name, "log group already exists");
            }
            Err(err) => return Err(classify(KIND, "CreateLogGroup", name, &err)),
        }
        Ok(self
            .find_log_group(name)
            .await?
            .unwrap_or_else(|| ResourceHandle::new(name)))
    }

    async fn set_retention(&self, spec: &MonitoringSpec) -> Result<(), ProviderError> {
        self.logs
            .put_retention_policy()
            .log_group_name(&spec.log_group_name)
            .retention_in_days(spec.retention_days)
            .send()
            .await
            .map_err(|err| classify(KIND, "PutRetentionPolicy", &spec.log_group_name, &err))?;
        Ok(())
    }

    async fn put_alarm(&self, spec: &MonitoringSpec, alarm: &AlarmSpec) -> Result<(), ProviderError> {
        let actions = spec.topic_arn.clone().map(|arn| vec![arn]);
        self.metrics
            .put_metric_alarm()
            .alarm_name(&alarm.name)
            .alarm_description(&alarm.description)
            .namespace(FUNCTION_NAMESPACE)
            .metric_name(&alarm.metric)
            .statistic(sdk_statistic(alarm.statistic))
            .period(alarm.period_secs)
            .evaluation_periods(1)
            .threshold(alarm.threshold)
            .comparison_operator(sdk_comparison(alarm.comparison))
            .dimensions(
                Dimension::builder()
                    .name("FunctionName")
                    .value(&spec.function_name)
                    .build(),
            )
            .treat_missing_data("notBreaching")
            .set_alarm_actions(actions.clone())
            .set_ok_actions(actions)
            .send()
            .await
            .map_err(|err| classify(KIND, "PutMetricAlarm", &alarm.name, &err))?;
        debug!(alarm = %alarm.name, "alarm configured");
        Ok(())
    }

    async fn put_dashboard(&self, spec: &MonitoringSpec) -> Result<(), ProviderError> {
        self.metrics
            .put_dashboard()
            .dashboard_name(&spec.dashboard_name)
            .dashboard_body(dashboard_body(spec, &self.region))
            .send()
            .await
            .map_err(|err| classify(KIND, "PutDashboard", &spec.dashboard_name, &err))?;
        Ok(())
    }

    /// Removes alarms, the dashboard, and the log group. Every deletion is
    /// attempted; missing alarms or dashboards are ignored and the log group
    /// outcome decides whether the whole kind was absent.
    async fn delete_all(&self, name: &str) -> Result<(), ProviderError> {
        let mut failures = Vec::new();
        if !self.alarm_names.is_empty() {
            let result = self
                .metrics
                .delete_alarms()
                .set_alarm_names(Some(self.alarm_names.clone()))
                .send()
                .await
                .map_err(|err| classify(KIND, "DeleteAlarms", name, &err));
            failures.extend(ignore_absent(result).err());
        }

        let result = self
            .metrics
            .delete_dashboards()
            .dashboard_names(&self.dashboard_name)
            .send()
            .await
            .map_err(|err| classify(KIND, "DeleteDashboards", &self.dashboard_name, &err));
        failures.extend(ignore_absent(result).err());

        let log_group = self
            .logs
            .delete_log_group()
            .log_group_name(name)
            .send()
            .await
            .map(|_| info!(log_group = name, "log group deleted"))
            .map_err(|err| classify(KIND, "DeleteLogGroup", name, &err));
        settle_deletion(log_group, &failures)
    }
}

/// Folds the log group outcome and any alarm or dashboard failures into one
/// result. A log group error takes precedence.
fn settle_deletion(
    log_group: Result<(), ProviderError>,
    failures: &[ProviderError],
) -> Result<(), ProviderError> {
    for failure in failures {
        warn!(error = %failure, "monitoring cleanup failed");
    }
    log_group?;
    if failures.is_empty() {
        return Ok(());
    }
    let message = failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    Err(ProviderError::transport(KIND, "DeleteMonitoring", message))
}

fn exact_group(groups: &[LogGroup], name: &str) -> Option<ResourceHandle> {
    groups
        .iter()
        .find(|group| group.log_group_name() == Some(name))
        .map(|group| ResourceHandle::new(group.arn().unwrap_or(name)))
}

fn ignore_absent<T>(result: Result<T, ProviderError>) -> Result<(), ProviderError> {
    match result {
        Ok(_) => Ok(()),
        Err(err) if err.is_not_found() => Ok(()),
        Err(err) => Err(err),
    }
}

impl ResourceProvider for MonitoringProvider {
    type Spec = MonitoringSpec;

    fn kind(&self) -> ResourceKind {
        KIND
    }

    fn describe<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<ResourceHandle>> {
        Box::pin(self.find_log_group(name))
    }

    fn create<'a>(&'a self, spec: &'a MonitoringSpec) -> ProviderFuture<'a, ResourceHandle> {
        Box::pin(self.create_log_group(spec))
    }

    fn delete<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(self.delete_all(name))
    }

    fn is_ready<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, bool> {
        Box::pin(async move { Ok(self.find_log_group(name).await?.is_some()) })
    }

    fn readiness(&self) -> Readiness {
        Readiness::Immediate
    }

    fn secondary_calls(&self, _spec: &MonitoringSpec) -> Vec<SecondaryCall> {
        vec![
            SecondaryCall::optional(SET_LOG_RETENTION),
            SecondaryCall::mandatory(PUT_METRIC_ALARMS),
            SecondaryCall::optional(PUT_DASHBOARD),
        ]
    }

    fn apply<'a>(
        &'a self,
        call: SecondaryCall,
        spec: &'a MonitoringSpec,
        _handle: &'a ResourceHandle,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            match call.name {
                SET_LOG_RETENTION => self.set_retention(spec).await,
                PUT_METRIC_ALARMS => {
                    for alarm in &spec.alarms {
                        self.put_alarm(spec, alarm).await?;
                    }
                    Ok(())
                }
                PUT_DASHBOARD => self.put_dashboard(spec).await,
                other => Err(ProviderError::transport(KIND, other, "unsupported call")),
            }
        })
    }
}

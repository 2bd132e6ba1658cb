//! Desired-state descriptors for each resource kind.
//!
//! Specs are built once per run by [`crate::config::DeployConfig`]. Specs for
//! downstream kinds bind the handles of the resources they depend on at
//! construction time, so a spec never changes after it has been built.

use std::collections::BTreeMap;

use crate::provider::{ResourceHandle, ResourceKind};

/// Tags applied to every taggable resource.
pub const PROJECT_TAGS: [(&str, &str); 2] = [("Project", "stackwright"), ("ManagedBy", "stackwright")];

/// Common view of a spec used by the reconciler.
pub trait ResourceSpec {
    /// Kind this spec describes.
    fn kind(&self) -> ResourceKind;

    /// Logical name used to describe, create, and delete the resource.
    fn name(&self) -> &str;
}

/// Notification topic used for alarm notifications.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TopicSpec {
    /// Topic name.
    pub name: String,
    /// Email address subscribed to the topic, if any.
    pub alert_email: Option<String>,
}

/// Execution role assumed by the function.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RoleSpec {
    /// Role name.
    pub name: String,
    /// Permissions boundary required by some accounts.
    pub permissions_boundary_arn: Option<String>,
    /// Table the inline policy grants access to.
    pub table_name: String,
    /// Region used to scope the table ARN in the inline policy.
    pub region: String,
}

/// Billing mode of the table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BillingMode {
    /// Billed per request; no capacity planning.
    PayPerRequest,
}

/// Data table written by the function.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableSpec {
    /// Table name.
    pub name: String,
    /// String partition key attribute.
    pub partition_key: String,
    /// String sort key attribute.
    pub sort_key: String,
    /// Billing mode.
    pub billing_mode: BillingMode,
}

/// Compute function and its deployment payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FunctionSpec {
    /// Function name.
    pub name: String,
    /// Human readable description.
    pub description: String,
    /// ARN of the execution role (from the role handle).
    pub role_arn: String,
    /// Runtime identifier (for example `python3.12`).
    pub runtime: String,
    /// Entry point inside the payload.
    pub handler: String,
    /// Memory size in megabytes.
    pub memory_mb: i32,
    /// Timeout in seconds.
    pub timeout_secs: i32,
    /// Environment variables passed to the function.
    pub environment: BTreeMap<String, String>,
    /// Zip archive produced by [`crate::package::package`].
    pub package: Vec<u8>,
}

impl FunctionSpec {
    /// Returns a copy bound to the given role handle.
    #[must_use]
    pub fn with_role(mut self, role: &ResourceHandle) -> Self {
        self.role_arn.clone_from(&role.id);
        self
    }
}

/// Aggregation applied to an alarm metric.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Statistic {
    /// Sum over the period.
    Sum,
    /// Average over the period.
    Average,
}

/// Comparison between the metric and the threshold.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Comparison {
    /// Alarm when the metric is greater than or equal to the threshold.
    GreaterThanOrEqual,
    /// Alarm when the metric is strictly greater than the threshold.
    GreaterThan,
}

/// One metric alarm on the function.
#[derive(Clone, Debug, PartialEq)]
pub struct AlarmSpec {
    /// Alarm name.
    pub name: String,
    /// Function metric watched (for example `Errors`).
    pub metric: String,
    /// Aggregation.
    pub statistic: Statistic,
    /// Threshold compared against the aggregated metric.
    pub threshold: f64,
    /// Evaluation period in seconds.
    pub period_secs: i32,
    /// Comparison operator.
    pub comparison: Comparison,
    /// Description shown in the console.
    pub description: String,
}

/// Log group, alarms, and dashboard for the function.
///
/// The log group is the identity-bearing resource; alarms and the dashboard
/// are applied as secondary calls.
#[derive(Clone, Debug, PartialEq)]
pub struct MonitoringSpec {
    /// Log group name.
    pub log_group_name: String,
    /// Log retention in days.
    pub retention_days: i32,
    /// Function watched by the alarms.
    pub function_name: String,
    /// ARN of the function (from the function handle).
    pub function_arn: String,
    /// Topic ARN used for alarm and OK actions (from the topic handle).
    pub topic_arn: Option<String>,
    /// Table shown on the dashboard.
    pub table_name: String,
    /// Alarms to put.
    pub alarms: Vec<AlarmSpec>,
    /// Dashboard name.
    pub dashboard_name: String,
}

impl MonitoringSpec {
    /// Returns a copy bound to the function and topic handles.
    #[must_use]
    pub fn with_targets(mut self, function: &ResourceHandle, topic: &ResourceHandle) -> Self {
        self.function_arn.clone_from(&function.id);
        self.topic_arn = Some(topic.id.clone());
        self
    }

    /// Names of every alarm in the spec.
    #[must_use]
    pub fn alarm_names(&self) -> Vec<String> {
        self.alarms.iter().map(|alarm| alarm.name.clone()).collect()
    }
}

/// Alarm set applied to every function: errors, duration, throttles.
#[must_use]
pub fn default_alarms(function_name: &str, timeout_secs: i32) -> Vec<AlarmSpec> {
    // 75% of the function timeout, in milliseconds.
    let duration_threshold_ms = i64::from(timeout_secs).saturating_mul(750);
    vec![
        AlarmSpec {
            name: format!("{function_name}-errors"),
            metric: String::from("Errors"),
            statistic: Statistic::Sum,
            threshold: 1.0,
            period_secs: 300,
            comparison: Comparison::GreaterThanOrEqual,
            description: String::from("Alert when the function returns an error"),
        },
        AlarmSpec {
            name: format!("{function_name}-duration"),
            metric: String::from("Duration"),
            statistic: Statistic::Average,
            threshold: f64::from(i32::try_from(duration_threshold_ms).unwrap_or(i32::MAX)),
            period_secs: 300,
            comparison: Comparison::GreaterThan,
            description: String::from("Alert when execution time is too high"),
        },
        AlarmSpec {
            name: format!("{function_name}-throttles"),
            metric: String::from("Throttles"),
            statistic: Statistic::Sum,
            threshold: 1.0,
            period_secs: 300,
            comparison: Comparison::GreaterThanOrEqual,
            description: String::from("Alert when the function is being throttled"),
        },
    ]
}

macro_rules! impl_resource_spec {
    ($ty:ty, $kind:expr, $field:ident) => {
        impl ResourceSpec for $ty {
            fn kind(&self) -> ResourceKind {
                $kind
            }

            fn name(&self) -> &str {
                &self.$field
            }
        }
    };
}

impl_resource_spec!(TopicSpec, ResourceKind::Topic, name);
impl_resource_spec!(RoleSpec, ResourceKind::Role, name);
impl_resource_spec!(TableSpec, ResourceKind::Table, name);
impl_resource_spec!(FunctionSpec, ResourceKind::Function, name);
impl_resource_spec!(MonitoringSpec, ResourceKind::Monitoring, log_group_name);

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn default_alarms_cover_errors_duration_and_throttles() {
        let alarms = default_alarms("fetcher", 60);
        let names: Vec<_> = alarms.iter().map(|alarm| alarm.name.as_str()).collect();
        assert_eq!(
            names,
            ["fetcher-errors", "fetcher-duration", "fetcher-throttles"]
        );
    }

    #[rstest]
    #[case(60, 45_000.0)]
    #[case(10, 7_500.0)]
    fn duration_alarm_tracks_three_quarters_of_timeout(#[case] timeout: i32, #[case] expected: f64) {
        let alarms = default_alarms("fetcher", timeout);
        let duration = alarms
            .iter()
            .find(|alarm| alarm.metric == "Duration")
            .expect("duration alarm");
        assert!((duration.threshold - expected).abs() < f64::EPSILON);
        assert_eq!(duration.comparison, Comparison::GreaterThan);
    }

    #[rstest]
    fn monitoring_spec_is_named_after_its_log_group() {
        let spec = MonitoringSpec {
            log_group_name: String::from("/aws/lambda/fetcher"),
            retention_days: 30,
            function_name: String::from("fetcher"),
            function_arn: String::from("arn:fn"),
            topic_arn: None,
            table_name: String::from("table"),
            alarms: Vec::new(),
            dashboard_name: String::from("fetcher-dashboard"),
        };
        assert_eq!(spec.name(), "/aws/lambda/fetcher");
        assert_eq!(spec.kind(), ResourceKind::Monitoring);
    }
}

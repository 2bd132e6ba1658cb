//! Configuration loading via `ortho-config`.
//!
//! [`DeployConfig`] is the single source of names and sizes for a run. It
//! builds the spec of every resource kind, the deployment plan, and the
//! teardown targets.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::deploy::{DeploymentPlan, RoleSource};
use crate::retry::RetryPolicy;
use crate::spec::{
    BillingMode, FunctionSpec, MonitoringSpec, RoleSpec, TableSpec, TopicSpec, default_alarms,
};
use crate::teardown::TeardownTargets;

/// Runtime of the deployed function.
pub const FUNCTION_RUNTIME: &str = "python3.12";

/// Entry point of the deployed function inside its payload.
pub const FUNCTION_HANDLER: &str = "handler.lambda_handler";

const MAX_FUNCTION_MEMORY_MB: i32 = 10_240;
const MIN_FUNCTION_MEMORY_MB: i32 = 128;
const MAX_FUNCTION_TIMEOUT_SECS: i32 = 900;
const MAX_RETRIES: u32 = 10;

/// Deployment configuration merged from defaults, configuration files, and
/// environment variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "STACKWRIGHT",
    discovery(
        app_name = "stackwright",
        env_var = "STACKWRIGHT_CONFIG_PATH",
        config_file_name = "stackwright.toml",
        dotfile_name = ".stackwright.toml",
        project_file_name = "stackwright.toml"
    )
)]
pub struct DeployConfig {
    /// Region every client is bound to.
    #[ortho_config(default = "eu-west-1".to_owned())]
    pub aws_region: String,
    /// Name of the data table.
    #[ortho_config(default = "iac-data-store".to_owned())]
    pub table_name: String,
    /// Name of the compute function.
    #[ortho_config(default = "iac-data-fetcher".to_owned())]
    pub function_name: String,
    /// Name of the managed execution role.
    #[ortho_config(default = "iac-lambda-role".to_owned())]
    pub role_name: String,
    /// ARN of an existing execution role. When set, the role is neither
    /// created nor deleted.
    pub role_arn: Option<String>,
    /// Permissions boundary attached to the managed role.
    pub permissions_boundary_arn: Option<String>,
    /// Log group name; defaults to `/aws/lambda/<function_name>`.
    pub log_group_name: Option<String>,
    /// Name of the alarm notification topic.
    #[ortho_config(default = "iac-alerts".to_owned())]
    pub topic_name: String,
    /// Email address subscribed to the topic.
    pub alert_email: Option<String>,
    /// Upstream API the function fetches from.
    #[ortho_config(default = "https://jsonplaceholder.typicode.com/posts".to_owned())]
    pub external_api_url: String,
    /// Attempts used by the post-deploy health check, also passed to the
    /// function.
    #[ortho_config(default = 3)]
    pub max_retries: u32,
    /// Directory holding the function sources.
    #[ortho_config(default = "lambda_src".to_owned())]
    pub function_source_dir: String,
    /// Function memory in megabytes.
    #[ortho_config(default = 256)]
    pub function_memory_mb: i32,
    /// Function timeout in seconds.
    #[ortho_config(default = 60)]
    pub function_timeout_secs: i32,
    /// Retention applied to the function log group.
    #[ortho_config(default = 30)]
    pub log_retention_days: i32,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn hint(&self) -> String {
        format!(
            "set {} or add {} to stackwright.toml",
            self.env_var, self.toml_key
        )
    }
}

const REQUIRED_FIELDS: [FieldMetadata; 7] = [
    FieldMetadata::new("AWS region", "STACKWRIGHT_AWS_REGION", "aws_region"),
    FieldMetadata::new("table name", "STACKWRIGHT_TABLE_NAME", "table_name"),
    FieldMetadata::new("function name", "STACKWRIGHT_FUNCTION_NAME", "function_name"),
    FieldMetadata::new("role name", "STACKWRIGHT_ROLE_NAME", "role_name"),
    FieldMetadata::new("topic name", "STACKWRIGHT_TOPIC_NAME", "topic_name"),
    FieldMetadata::new(
        "external API URL",
        "STACKWRIGHT_EXTERNAL_API_URL",
        "external_api_url",
    ),
    FieldMetadata::new(
        "function source directory",
        "STACKWRIGHT_FUNCTION_SOURCE_DIR",
        "function_source_dir",
    ),
];

impl DeployConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: {}",
                metadata.description,
                metadata.hint()
            )));
        }
        Ok(())
    }

    fn require_range(
        value: i64,
        range: std::ops::RangeInclusive<i64>,
        metadata: &FieldMetadata,
    ) -> Result<(), ConfigError> {
        if !range.contains(&value) {
            return Err(ConfigError::Invalid(format!(
                "{} must be between {} and {}, got {value}: {}",
                metadata.description,
                range.start(),
                range.end(),
                metadata.hint()
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("stackwright")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and TOML key that supply the offending value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is blank
    /// and [`ConfigError::Invalid`] when a numeric field is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let [region, table, function, role, topic, api_url, source_dir] = &REQUIRED_FIELDS;
        Self::require_field(&self.aws_region, region)?;
        Self::require_field(&self.table_name, table)?;
        Self::require_field(&self.function_name, function)?;
        let role_arn = non_blank(self.role_arn.as_deref());
        if role_arn.is_none() {
            Self::require_field(&self.role_name, role)?;
        }
        Self::require_field(&self.topic_name, topic)?;
        Self::require_field(&self.external_api_url, api_url)?;
        Self::require_field(&self.function_source_dir, source_dir)?;

        if let Some(arn) = role_arn {
            if !arn.starts_with("arn:") {
                return Err(ConfigError::Invalid(format!(
                    "role ARN `{arn}` is not an ARN: set STACKWRIGHT_ROLE_ARN or add role_arn to stackwright.toml"
                )));
            }
        }

        Self::require_range(
            i64::from(self.max_retries),
            1..=i64::from(MAX_RETRIES),
            &FieldMetadata::new("max retries", "STACKWRIGHT_MAX_RETRIES", "max_retries"),
        )?;
        Self::require_range(
            i64::from(self.function_memory_mb),
            i64::from(MIN_FUNCTION_MEMORY_MB)..=i64::from(MAX_FUNCTION_MEMORY_MB),
            &FieldMetadata::new(
                "function memory (MB)",
                "STACKWRIGHT_FUNCTION_MEMORY_MB",
                "function_memory_mb",
            ),
        )?;
        Self::require_range(
            i64::from(self.function_timeout_secs),
            1..=i64::from(MAX_FUNCTION_TIMEOUT_SECS),
            &FieldMetadata::new(
                "function timeout (seconds)",
                "STACKWRIGHT_FUNCTION_TIMEOUT_SECS",
                "function_timeout_secs",
            ),
        )?;
        Self::require_range(
            i64::from(self.log_retention_days),
            1..=i64::from(i32::MAX),
            &FieldMetadata::new(
                "log retention (days)",
                "STACKWRIGHT_LOG_RETENTION_DAYS",
                "log_retention_days",
            ),
        )?;
        Ok(())
    }

    /// Log group name, falling back to the function's default group.
    #[must_use]
    pub fn log_group_name(&self) -> String {
        self.log_group_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("/aws/lambda/{}", self.function_name))
    }

    /// Name of the function dashboard.
    #[must_use]
    pub fn dashboard_name(&self) -> String {
        format!("{}-dashboard", self.function_name)
    }

    /// Directory the function payload is built from.
    #[must_use]
    pub fn source_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(&self.function_source_dir)
    }

    /// Backoff used by the post-deploy health check.
    #[must_use]
    pub fn health_check_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries)
    }

    /// Topic spec.
    #[must_use]
    pub fn topic_spec(&self) -> TopicSpec {
        TopicSpec {
            name: self.topic_name.clone(),
            alert_email: non_blank(self.alert_email.as_deref()),
        }
    }

    /// Role source: external when a role ARN is configured, managed
    /// otherwise.
    #[must_use]
    pub fn role_source(&self) -> RoleSource {
        match non_blank(self.role_arn.as_deref()) {
            Some(arn) => RoleSource::External { arn },
            None => RoleSource::Managed(RoleSpec {
                name: self.role_name.clone(),
                permissions_boundary_arn: non_blank(self.permissions_boundary_arn.as_deref()),
                table_name: self.table_name.clone(),
                region: self.aws_region.clone(),
            }),
        }
    }

    /// Table spec with an `id` partition key and a `timestamp` sort key.
    #[must_use]
    pub fn table_spec(&self) -> TableSpec {
        TableSpec {
            name: self.table_name.clone(),
            partition_key: String::from("id"),
            sort_key: String::from("timestamp"),
            billing_mode: BillingMode::PayPerRequest,
        }
    }

    /// Function spec carrying `package` as its payload. The role ARN is
    /// bound later from the role handle.
    #[must_use]
    pub fn function_spec(&self, package: Vec<u8>) -> FunctionSpec {
        let environment = BTreeMap::from([
            (
                String::from("DYNAMODB_TABLE_NAME"),
                self.table_name.clone(),
            ),
            (
                String::from("EXTERNAL_API_URL"),
                self.external_api_url.clone(),
            ),
            (String::from("MAX_RETRIES"), self.max_retries.to_string()),
        ]);
        FunctionSpec {
            name: self.function_name.clone(),
            description: String::from("Fetches records from an external API into the data table"),
            role_arn: String::new(),
            runtime: FUNCTION_RUNTIME.to_owned(),
            handler: FUNCTION_HANDLER.to_owned(),
            memory_mb: self.function_memory_mb,
            timeout_secs: self.function_timeout_secs,
            environment,
            package,
        }
    }

    /// Monitoring spec. Function and topic ARNs are bound later from their
    /// handles.
    #[must_use]
    pub fn monitoring_spec(&self) -> MonitoringSpec {
        MonitoringSpec {
            log_group_name: self.log_group_name(),
            retention_days: self.log_retention_days,
            function_name: self.function_name.clone(),
            function_arn: String::new(),
            topic_arn: None,
            table_name: self.table_name.clone(),
            alarms: default_alarms(&self.function_name, self.function_timeout_secs),
            dashboard_name: self.dashboard_name(),
        }
    }

    /// Plan for one deploy run.
    #[must_use]
    pub fn deployment_plan(&self, package: Vec<u8>, test_invoke: bool) -> DeploymentPlan {
        DeploymentPlan {
            topic: self.topic_spec(),
            role: self.role_source(),
            table: self.table_spec(),
            function: self.function_spec(package),
            monitoring: self.monitoring_spec(),
            health_check: self.health_check_policy(),
            test_invoke,
        }
    }

    /// Names deleted by a destroy run. An external role is never deleted.
    #[must_use]
    pub fn teardown_targets(&self) -> TeardownTargets {
        let role = match self.role_source() {
            RoleSource::Managed(spec) => Some(spec.name),
            RoleSource::External { .. } => None,
        };
        TeardownTargets {
            topic: self.topic_name.clone(),
            role,
            table: self.table_name.clone(),
            function: self.function_name.clone(),
            monitoring: self.log_group_name(),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// A field holds a value outside its accepted range.
    #[error("invalid configuration value: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

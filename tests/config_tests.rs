//! Validation and spec-building tests for the deploy configuration.

use rstest::*;
use stackwright::config::ConfigError;
use stackwright::{DeployConfig, ResourceKind, RoleSource};

#[fixture]
fn valid_config() -> DeployConfig {
    DeployConfig {
        aws_region: String::from("us-east-1"),
        table_name: String::from("iac-data-store"),
        function_name: String::from("iac-data-fetcher"),
        role_name: String::from("iac-lambda-role"),
        role_arn: None,
        permissions_boundary_arn: Some(String::from(
            "arn:aws:iam::123456789012:policy/boundary",
        )),
        log_group_name: None,
        topic_name: String::from("iac-alerts"),
        alert_email: Some(String::from("ops@example.com")),
        external_api_url: String::from("https://jsonplaceholder.typicode.com/posts"),
        max_retries: 3,
        function_source_dir: String::from("lambda_src"),
        function_memory_mb: 256,
        function_timeout_secs: 60,
        log_retention_days: 30,
    }
}

/// Every required field names its environment variable and TOML key when
/// left blank.
#[rstest]
#[case(|cfg: &mut DeployConfig| cfg.aws_region.clear(), "STACKWRIGHT_AWS_REGION", "aws_region")]
#[case(|cfg: &mut DeployConfig| cfg.table_name.clear(), "STACKWRIGHT_TABLE_NAME", "table_name")]
#[case(
    |cfg: &mut DeployConfig| cfg.function_name.clear(),
    "STACKWRIGHT_FUNCTION_NAME",
    "function_name"
)]
#[case(|cfg: &mut DeployConfig| cfg.role_name.clear(), "STACKWRIGHT_ROLE_NAME", "role_name")]
#[case(|cfg: &mut DeployConfig| cfg.topic_name.clear(), "STACKWRIGHT_TOPIC_NAME", "topic_name")]
#[case(
    |cfg: &mut DeployConfig| cfg.external_api_url.clear(),
    "STACKWRIGHT_EXTERNAL_API_URL",
    "external_api_url"
)]
fn blank_fields_produce_actionable_errors(
    valid_config: DeployConfig,
    #[case] mutate: fn(&mut DeployConfig),
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    let mut cfg = valid_config;
    mutate(&mut cfg);

    let error = cfg.validate().expect_err("validation should fail");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField error, got {error:?}");
    };
    assert!(
        message.contains(env_var),
        "error should mention env var {env_var}: {message}"
    );
    assert!(
        message.contains("stackwright.toml"),
        "error should mention config file: {message}"
    );
    assert!(
        message.contains(toml_key),
        "error should mention TOML key {toml_key}: {message}"
    );
}

#[rstest]
fn managed_role_carries_boundary_and_table_scope(valid_config: DeployConfig) {
    let RoleSource::Managed(role) = valid_config.role_source() else {
        panic!("expected a managed role");
    };

    assert_eq!(role.name, "iac-lambda-role");
    assert_eq!(role.table_name, "iac-data-store");
    assert_eq!(role.region, "us-east-1");
    assert_eq!(
        role.permissions_boundary_arn.as_deref(),
        Some("arn:aws:iam::123456789012:policy/boundary")
    );
}

#[rstest]
fn teardown_targets_follow_configured_names(valid_config: DeployConfig) {
    let targets = valid_config.teardown_targets();

    assert_eq!(targets.name(ResourceKind::Topic), Some("iac-alerts"));
    assert_eq!(targets.name(ResourceKind::Role), Some("iac-lambda-role"));
    assert_eq!(targets.name(ResourceKind::Table), Some("iac-data-store"));
    assert_eq!(targets.name(ResourceKind::Function), Some("iac-data-fetcher"));
    assert_eq!(
        targets.name(ResourceKind::Monitoring),
        Some("/aws/lambda/iac-data-fetcher")
    );
}

#[rstest]
fn monitoring_spec_alarms_use_the_function_timeout(valid_config: DeployConfig) {
    let spec = valid_config.monitoring_spec();

    assert_eq!(
        spec.alarm_names(),
        [
            "iac-data-fetcher-errors",
            "iac-data-fetcher-duration",
            "iac-data-fetcher-throttles"
        ]
    );
    assert_eq!(spec.retention_days, 30);
    assert_eq!(spec.dashboard_name, "iac-data-fetcher-dashboard");
    assert!(spec.topic_arn.is_none());
}

#[rstest]
fn topic_spec_subscribes_the_alert_email(valid_config: DeployConfig) {
    assert_eq!(
        valid_config.topic_spec().alert_email.as_deref(),
        Some("ops@example.com")
    );
}

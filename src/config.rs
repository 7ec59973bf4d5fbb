use std::time::Duration;

use eyre::{eyre, Result};

/// All recognised environment options (spec §6), assembled once at process
/// start and passed down explicitly — no component in this crate reads
/// `std::env` directly once `Config::from_env` has run.
#[derive(Debug, Clone)]
pub struct Config {
    pub github_org: String,
    pub runner_group: String,
    pub runner_labels: Vec<String>,

    pub subnet_ids: Vec<String>,
    pub security_group_ids: Vec<String>,
    pub ami_id: String,
    pub instance_profile_arn: String,
    pub instance_types: Vec<String>,
    pub spot_enabled: bool,
    pub key_name: Option<String>,

    pub runners_max: u32,
    pub min_running_time: Duration,
    pub max_runtime: Duration,

    pub secret_arn: String,
    pub sqs_queue_url: String,

    /// Open question (spec §9) resolved as a configurable policy: when all
    /// instance-type launches fail, ack the message (rely on the forge to
    /// reschedule) if true, or leave it for redelivery if false.
    pub ack_on_launch_error: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let github_org = require_env("GITHUB_ORG")?;
        let runner_group = std::env::var("RUNNER_GROUP").unwrap_or_else(|_| "default".into());
        let runner_labels = split_csv(
            &std::env::var("RUNNER_LABELS").unwrap_or_else(|_| "self-hosted,linux,x64".into()),
        );

        let subnet_ids = split_csv(&require_env("SUBNET_IDS")?);
        let security_group_ids = split_csv(&require_env("SECURITY_GROUP_IDS")?);
        let ami_id = require_env("AMI_ID")?;
        let instance_profile_arn = require_env("INSTANCE_PROFILE_ARN")?;
        let instance_types = split_csv(
            &std::env::var("INSTANCE_TYPES").unwrap_or_else(|_| "m5.large".into()),
        );
        let spot_enabled = parse_bool(&std::env::var("SPOT_ENABLED").unwrap_or_else(|_| "true".into()));
        let key_name = std::env::var("KEY_NAME").ok().filter(|s| !s.is_empty());

        let runners_max: u32 = std::env::var("RUNNERS_MAX")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .map_err(|e| eyre!("RUNNERS_MAX must be an integer: {e}"))?;

        let min_running_time_mins: u64 = std::env::var("MIN_RUNNING_TIME_MINS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .map_err(|e| eyre!("MIN_RUNNING_TIME_MINS must be an integer: {e}"))?;

        let secret_arn = require_env("SECRET_ARN")?;
        let sqs_queue_url = require_env("SQS_QUEUE_URL")?;

        let ack_on_launch_error = parse_bool(
            &std::env::var("ACK_ON_LAUNCH_ERROR").unwrap_or_else(|_| "true".into()),
        );

        if subnet_ids.is_empty() {
            return Err(eyre!("SUBNET_IDS must contain at least one subnet"));
        }
        if security_group_ids.is_empty() {
            return Err(eyre!("SECURITY_GROUP_IDS must contain at least one group"));
        }
        if instance_types.is_empty() {
            return Err(eyre!("INSTANCE_TYPES must contain at least one type"));
        }

        if runners_max == 0 {
            tracing::warn!("RUNNERS_MAX is 0; every admitted job will be skipped on cap check");
        }

        Ok(Self {
            github_org,
            runner_group,
            runner_labels,
            subnet_ids,
            security_group_ids,
            ami_id,
            instance_profile_arn,
            instance_types,
            spot_enabled,
            key_name,
            runners_max,
            min_running_time: Duration::from_secs(min_running_time_mins.saturating_mul(60)),
            max_runtime: Duration::from_secs(4 * 3600),
            secret_arn,
            sqs_queue_url,
            ack_on_launch_error,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| eyre!("missing required environment variable {key}"))
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_csv_trims_and_drops_empty() {
        assert_eq!(split_csv(" a, b ,,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn parse_bool_accepts_common_truthy_strings() {
        assert!(parse_bool("true"));
        assert!(parse_bool("True"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool(""));
    }
}

use async_trait::async_trait;
use aws_sdk_ec2::types::{
    Filter, InstanceInterruptionBehavior, InstanceMarketOptionsRequest, InstanceMetadataEndpointState,
    InstanceMetadataOptionsRequest, InstanceMetadataTokensState, InstanceMarketType, IamInstanceProfileSpecification,
    ResourceType, SpotInstanceType, SpotMarketOptions, Tag, TagSpecification,
};
use aws_sdk_ec2::Client as Ec2Client;
use chrono::{DateTime, Utc};
use eyre::{eyre, Result};

use crate::error::ControlPlaneError;
use crate::model::{RunnerInstance, PURPOSE_TAG_VALUE};

/// Launch parameters for a single instance (spec §4.6 "Launch spec").
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub image_id: String,
    pub subnet_id: String,
    pub security_group_ids: Vec<String>,
    pub instance_profile_arn: String,
    pub instance_type: String,
    pub key_name: Option<String>,
    pub spot_enabled: bool,
    pub name_tag: String,
    pub job_id: u64,
    pub user_data_b64: String,
}

/// Thin adapter over the cloud compute API (spec §4.3). Abstracted behind a
/// trait so scale-up and the reaper can be exercised against a fake in
/// tests instead of real EC2.
#[async_trait]
pub trait CloudComputeClient: Send + Sync {
    /// Enumerates active (`pending` or `running`) instances tagged
    /// `Purpose=github-runner`, paginating as needed.
    async fn list_active(&self) -> Result<Vec<RunnerInstance>>;

    /// Blocks until the cloud returns an instance id — not until the
    /// instance actually runs.
    async fn launch(&self, spec: &LaunchSpec) -> Result<String>;

    /// Fire-and-forget: per-instance failures are logged, never abort the batch.
    async fn terminate(&self, instance_ids: &[String]);
}

pub struct Ec2ComputeClient {
    client: Ec2Client,
}

impl Ec2ComputeClient {
    pub fn new(client: Ec2Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CloudComputeClient for Ec2ComputeClient {
    async fn list_active(&self) -> Result<Vec<RunnerInstance>> {
        let mut instances = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut req = self
                .client
                .describe_instances()
                .filters(
                    Filter::builder()
                        .name("tag:Purpose")
                        .values(PURPOSE_TAG_VALUE)
                        .build(),
                )
                .filters(
                    Filter::builder()
                        .name("instance-state-name")
                        .values("pending")
                        .values("running")
                        .build(),
                );

            if let Some(token) = &next_token {
                req = req.next_token(token);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| eyre!("describe_instances failed: {e}"))?;

            for reservation in resp.reservations() {
                for instance in reservation.instances() {
                    let Some(instance_id) = instance.instance_id() else {
                        continue;
                    };
                    let Some(launch_time) = instance.launch_time() else {
                        continue;
                    };
                    let launch_time: DateTime<Utc> = DateTime::from_timestamp(
                        launch_time.secs(),
                        launch_time.subsec_nanos(),
                    )
                    .unwrap_or_else(Utc::now);

                    instances.push(RunnerInstance {
                        instance_id: instance_id.to_string(),
                        launch_time,
                    });
                }
            }

            next_token = resp.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }

        Ok(instances)
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<String> {
        let mut req = self
            .client
            .run_instances()
            .image_id(&spec.image_id)
            .min_count(1)
            .max_count(1)
            .subnet_id(&spec.subnet_id)
            .set_security_group_ids(Some(spec.security_group_ids.clone()))
            .iam_instance_profile(
                IamInstanceProfileSpecification::builder()
                    .arn(&spec.instance_profile_arn)
                    .build(),
            )
            .instance_type(spec.instance_type.as_str().into())
            .user_data(&spec.user_data_b64)
            .metadata_options(
                InstanceMetadataOptionsRequest::builder()
                    .http_tokens(InstanceMetadataTokensState::Required)
                    .http_put_response_hop_limit(1)
                    .http_endpoint(InstanceMetadataEndpointState::Enabled)
                    .build(),
            )
            .tag_specifications(
                TagSpecification::builder()
                    .resource_type(ResourceType::Instance)
                    .tags(Tag::builder().key("Name").value(&spec.name_tag).build())
                    .tags(Tag::builder().key("Purpose").value(PURPOSE_TAG_VALUE).build())
                    .tags(Tag::builder().key("JobId").value(spec.job_id.to_string()).build())
                    .build(),
            );

        if let Some(key_name) = &spec.key_name {
            req = req.key_name(key_name);
        }

        if spec.spot_enabled {
            req = req.instance_market_options(
                InstanceMarketOptionsRequest::builder()
                    .market_type(InstanceMarketType::Spot)
                    .spot_options(
                        SpotMarketOptions::builder()
                            .spot_instance_type(SpotInstanceType::OneTime)
                            .instance_interruption_behavior(InstanceInterruptionBehavior::Terminate)
                            .build(),
                    )
                    .build(),
            );
        }

        let resp = req.send().await.map_err(|e| {
            ControlPlaneError::LaunchRejected {
                instance_type: spec.instance_type.clone(),
                reason: e.to_string(),
            }
        })?;

        resp.instances()
            .first()
            .and_then(|i| i.instance_id())
            .map(str::to_string)
            .ok_or_else(|| {
                ControlPlaneError::LaunchRejected {
                    instance_type: spec.instance_type.clone(),
                    reason: "run_instances returned no instance id".to_string(),
                }
                .into()
            })
    }

    async fn terminate(&self, instance_ids: &[String]) {
        if instance_ids.is_empty() {
            return;
        }

        if let Err(e) = self
            .client
            .terminate_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await
        {
            for instance_id in instance_ids {
                let err = ControlPlaneError::TerminateFailed {
                    instance_id: instance_id.clone(),
                    reason: e.to_string(),
                };
                tracing::error!(instance_id, error = %err, "terminate_instances failed");
            }
        }
    }
}

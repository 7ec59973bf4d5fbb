use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use eyre::Result;
use rand::seq::SliceRandom;
use tokio::sync::Semaphore;

use crate::cloud::{CloudComputeClient, LaunchSpec};
use crate::config::Config;
use crate::forge::ForgeClient;
use crate::metrics::{self, SkipReason};
use crate::model::{runner_name, AppCredentials, JobDescriptor};
use crate::{bootstrap, queue::QueueAdapter};

/// Aggregate counts for one batch: `launched + skipped + errors == |batch|` always holds.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScaleUpOutcome {
    pub launched: usize,
    pub skipped: usize,
    pub errors: usize,
}

enum MessageOutcome {
    Launched { instance_type: String },
    Skipped,
    Errored,
}

/// Drains a batch of queue messages, processing each independently — a
/// failure on one message must never fail the batch (spec §4.6, §7, §9).
///
/// Intra-batch processing is strictly sequential: the `Semaphore` of size 1
/// wrapping cap-check + launch is a deliberate tripwire (spec §5) rather
/// than dead code — it exists so that a future change to concurrent batch
/// handling cannot silently widen the cap-check race without first deleting
/// this guard.
pub async fn process_batch(
    queue: &dyn QueueAdapter,
    cloud: &dyn CloudComputeClient,
    forge: &ForgeClient,
    creds: &AppCredentials,
    config: &Config,
    max_messages: i32,
) -> Result<ScaleUpOutcome> {
    let started = Instant::now();
    let batch_guard = Arc::new(Semaphore::new(1));
    let mut outcome = ScaleUpOutcome::default();

    let messages = queue.receive_batch(max_messages).await?;

    for message in messages {
        let job: JobDescriptor = match serde_json::from_str(&message.body) {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(error = %e, "malformed job descriptor on queue; acking and dropping");
                outcome.errors += 1;
                let _ = queue.ack(&message.receipt_handle).await;
                continue;
            }
        };

        let result = {
            let _permit = batch_guard.acquire().await.expect("semaphore never closed");
            process_message(cloud, forge, creds, config, &job).await
        };

        let errored = matches!(result, MessageOutcome::Errored);

        match result {
            MessageOutcome::Launched { instance_type } => {
                outcome.launched += 1;
                metrics::emit_runner_launched(&instance_type, config.spot_enabled);
            }
            MessageOutcome::Skipped => {
                outcome.skipped += 1;
                metrics::emit_runners_skipped(SkipReason::MaxLimit);
            }
            MessageOutcome::Errored => {
                outcome.errors += 1;
                metrics::emit_runner_launch_errors(1);
            }
        }

        // Skips and successful launches always ack. Errors ack too, unless
        // the operator opted into nack-and-redeliver: an unserviceable job
        // now will almost certainly still be unserviceable on immediate
        // redelivery, and the forge's own job scheduling timeout is the
        // correct place to observe that (spec §4.6 step 5, §9 open question).
        if !errored || config.ack_on_launch_error {
            if let Err(e) = queue.ack(&message.receipt_handle).await {
                tracing::error!(job_id = job.id, error = %e, "failed to ack queue message");
            }
        }
    }

    let elapsed = started.elapsed().as_secs_f64();
    metrics::emit_scaleup_processing_time(elapsed);

    Ok(outcome)
}

async fn process_message(
    cloud: &dyn CloudComputeClient,
    forge: &ForgeClient,
    creds: &AppCredentials,
    config: &Config,
    job: &JobDescriptor,
) -> MessageOutcome {
    let active = match cloud.list_active().await {
        Ok(instances) => instances,
        Err(e) => {
            tracing::error!(job_id = job.id, error = %e, "list_active failed");
            return MessageOutcome::Errored;
        }
    };

    metrics::emit_active_runners(active.len());

    if active.len() as u32 >= config.runners_max {
        tracing::warn!(job_id = job.id, active = active.len(), max = config.runners_max, "runner limit reached");
        return MessageOutcome::Skipped;
    }

    let installation_token = match forge.installation_token(creds).await {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(job_id = job.id, error = %e, "failed to mint installation token");
            return MessageOutcome::Errored;
        }
    };

    let registration_token = match forge.registration_token(&installation_token, &config.github_org).await {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(job_id = job.id, error = %e, "failed to mint registration token");
            return MessageOutcome::Errored;
        }
    };

    let now = Utc::now();
    let name_tag = runner_name(now, job.id);

    let mut labels: Vec<String> = config.runner_labels.clone();
    for label in &job.labels {
        if !labels.contains(label) {
            labels.push(label.clone());
        }
    }

    let user_data_b64 = bootstrap::render_user_data(
        &config.github_org,
        &registration_token,
        &name_tag,
        &labels,
        &config.runner_group,
    );

    let subnet_id = config
        .subnet_ids
        .choose(&mut rand::thread_rng())
        .cloned()
        .unwrap_or_default();

    let base_spec = LaunchSpec {
        image_id: config.ami_id.clone(),
        subnet_id,
        security_group_ids: config.security_group_ids.clone(),
        instance_profile_arn: config.instance_profile_arn.clone(),
        instance_type: String::new(),
        key_name: config.key_name.clone(),
        spot_enabled: config.spot_enabled,
        name_tag: name_tag.clone(),
        job_id: job.id,
        user_data_b64,
    };

    match launch_with_fallback(cloud, &base_spec, &config.instance_types, job.id).await {
        Some(instance_type) => MessageOutcome::Launched { instance_type },
        None => MessageOutcome::Errored,
    }
}

/// Tries each instance type in order against an otherwise-complete launch
/// spec, returning the type that succeeded. Pulled out of `process_message`
/// so the fallback behaviour (spec §4.6 step 5, §8 boundary behaviours) is
/// testable without needing a live forge client.
async fn launch_with_fallback(
    cloud: &dyn CloudComputeClient,
    base_spec: &LaunchSpec,
    instance_types: &[String],
    job_id: u64,
) -> Option<String> {
    for instance_type in instance_types {
        let spec = LaunchSpec {
            instance_type: instance_type.clone(),
            ..base_spec.clone()
        };

        match cloud.launch(&spec).await {
            Ok(instance_id) => {
                tracing::info!(job_id, instance_id, instance_type, "launched runner");
                return Some(instance_type.clone());
            }
            Err(e) => {
                tracing::warn!(job_id, instance_type, error = %e, "launch failed; trying next instance type");
            }
        }
    }

    tracing::error!(job_id, "all instance types exhausted; giving up on this job");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunnerInstance;
    use crate::queue::QueueMessage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeCloud {
        active_count: usize,
        fail_until_attempt: usize,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl CloudComputeClient for FakeCloud {
        async fn list_active(&self) -> Result<Vec<RunnerInstance>> {
            Ok((0..self.active_count)
                .map(|i| RunnerInstance {
                    instance_id: format!("i-{i}"),
                    launch_time: Utc::now(),
                })
                .collect())
        }

        async fn launch(&self, _spec: &LaunchSpec) -> Result<String> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.fail_until_attempt {
                return Err(eyre::eyre!("InsufficientInstanceCapacity"));
            }
            Ok(format!("i-new-{attempt}"))
        }

        async fn terminate(&self, _instance_ids: &[String]) {}
    }

    fn sample_job() -> JobDescriptor {
        JobDescriptor {
            id: 42,
            run_id: 1,
            name: "build".into(),
            labels: ["self-hosted".to_string()].into_iter().collect(),
            repository: "o/r".into(),
            org: "o".into(),
        }
    }

    fn sample_config(instance_types: Vec<&str>, runners_max: u32) -> Config {
        Config {
            github_org: "o".into(),
            runner_group: "default".into(),
            runner_labels: vec!["self-hosted".into()],
            subnet_ids: vec!["subnet-1".into()],
            security_group_ids: vec!["sg-1".into()],
            ami_id: "ami-1".into(),
            instance_profile_arn: "arn:profile".into(),
            instance_types: instance_types.into_iter().map(String::from).collect(),
            spot_enabled: true,
            key_name: None,
            runners_max,
            min_running_time: std::time::Duration::from_secs(300),
            max_runtime: std::time::Duration::from_secs(4 * 3600),
            secret_arn: "arn:secret".into(),
            sqs_queue_url: "https://sqs".into(),
            ack_on_launch_error: true,
        }
    }

    fn base_spec_template() -> LaunchSpec {
        LaunchSpec {
            image_id: "ami-1".into(),
            subnet_id: "subnet-1".into(),
            security_group_ids: vec!["sg-1".into()],
            instance_profile_arn: "arn:profile".into(),
            instance_type: String::new(),
            key_name: None,
            spot_enabled: true,
            name_tag: "runner-20260101-000000-42".into(),
            job_id: 42,
            user_data_b64: "ZmFrZQ==".into(),
        }
    }

    #[tokio::test]
    async fn fallback_succeeds_on_last_viable_type_after_k_minus_one_failures() {
        let types = vec!["m5.large".to_string(), "m5a.large".to_string(), "m6i.large".to_string()];
        let cloud = FakeCloud {
            active_count: 0,
            fail_until_attempt: types.len() - 1,
            attempts: AtomicUsize::new(0),
        };
        let base_spec = base_spec_template();

        let picked = launch_with_fallback(&cloud, &base_spec, &types, 42).await;

        assert_eq!(picked, Some("m6i.large".to_string()));
        assert_eq!(cloud.attempts.load(Ordering::SeqCst), types.len());
    }

    #[tokio::test]
    async fn fallback_gives_up_after_exhausting_every_type() {
        let types = vec!["m5.large".to_string(), "m5a.large".to_string()];
        let cloud = FakeCloud {
            active_count: 0,
            fail_until_attempt: types.len(),
            attempts: AtomicUsize::new(0),
        };
        let base_spec = base_spec_template();

        let picked = launch_with_fallback(&cloud, &base_spec, &types, 42).await;

        assert_eq!(picked, None);
        assert_eq!(cloud.attempts.load(Ordering::SeqCst), types.len());
    }

    #[tokio::test]
    async fn fallback_stops_at_first_success_without_trying_later_types() {
        let types = vec!["m5.large".to_string(), "m5a.large".to_string()];
        let cloud = FakeCloud {
            active_count: 0,
            fail_until_attempt: 0,
            attempts: AtomicUsize::new(0),
        };
        let base_spec = base_spec_template();

        let picked = launch_with_fallback(&cloud, &base_spec, &types, 42).await;

        assert_eq!(picked, Some("m5.large".to_string()));
        assert_eq!(cloud.attempts.load(Ordering::SeqCst), 1);
    }

    struct FakeQueue {
        messages: Vec<QueueMessage>,
        acked: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl QueueAdapter for FakeQueue {
        async fn receive_batch(&self, _max_messages: i32) -> Result<Vec<QueueMessage>> {
            Ok(self.messages.clone())
        }

        async fn ack(&self, receipt_handle: &str) -> Result<()> {
            self.acked.lock().unwrap().push(receipt_handle.to_string());
            Ok(())
        }

        async fn send(&self, _job: &JobDescriptor) -> Result<()> {
            Ok(())
        }
    }

    fn sample_creds() -> AppCredentials {
        AppCredentials {
            app_id: "1".into(),
            installation_id: "2".into(),
            private_key: "key".into(),
            webhook_secret: "secret".into(),
        }
    }

    #[tokio::test]
    async fn malformed_job_body_is_acked_and_counted_as_error() {
        let queue = FakeQueue {
            messages: vec![QueueMessage {
                body: "not json".to_string(),
                receipt_handle: "r1".to_string(),
            }],
            acked: Mutex::new(Vec::new()),
        };
        let cloud = FakeCloud {
            active_count: 0,
            fail_until_attempt: 0,
            attempts: AtomicUsize::new(0),
        };
        let forge = ForgeClient::new();
        let config = sample_config(vec!["m5.large"], 10);

        let outcome = process_batch(&queue, &cloud, &forge, &sample_creds(), &config, 10)
            .await
            .unwrap();

        assert_eq!(outcome.errors, 1);
        assert_eq!(outcome.launched, 0);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(*queue.acked.lock().unwrap(), vec!["r1".to_string()]);
    }

    #[tokio::test]
    async fn cap_check_skips_and_acks_when_at_limit() {
        let job = sample_job();
        let queue = FakeQueue {
            messages: vec![QueueMessage {
                body: serde_json::to_string(&job).unwrap(),
                receipt_handle: "r1".to_string(),
            }],
            acked: Mutex::new(Vec::new()),
        };
        // Cap check happens before any forge call, so runners_max == active_count
        // lets this batch exercise the full Skipped path without a live forge client.
        let cloud = FakeCloud {
            active_count: 10,
            fail_until_attempt: 0,
            attempts: AtomicUsize::new(0),
        };
        let forge = ForgeClient::new();
        let config = sample_config(vec!["m5.large"], 10);

        let outcome = process_batch(&queue, &cloud, &forge, &sample_creds(), &config, 10)
            .await
            .unwrap();

        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.launched, 0);
        assert_eq!(outcome.errors, 0);
        assert_eq!(*queue.acked.lock().unwrap(), vec!["r1".to_string()]);
    }

    #[tokio::test]
    async fn runners_max_zero_skips_every_admitted_message() {
        let job = sample_job();
        let queue = FakeQueue {
            messages: vec![QueueMessage {
                body: serde_json::to_string(&job).unwrap(),
                receipt_handle: "r1".to_string(),
            }],
            acked: Mutex::new(Vec::new()),
        };
        let cloud = FakeCloud {
            active_count: 0,
            fail_until_attempt: 0,
            attempts: AtomicUsize::new(0),
        };
        let forge = ForgeClient::new();
        let config = sample_config(vec!["m5.large"], 0);

        let outcome = process_batch(&queue, &cloud, &forge, &sample_creds(), &config, 10)
            .await
            .unwrap();

        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.launched, 0);
        assert_eq!(outcome.errors, 0);
        assert_eq!(cloud.attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn aggregate_counts_sum_to_batch_size() {
        let outcome = ScaleUpOutcome {
            launched: 2,
            skipped: 1,
            errors: 1,
        };
        assert_eq!(outcome.launched + outcome.skipped + outcome.errors, 4);
    }
}

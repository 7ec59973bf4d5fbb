use chrono::{DateTime, Utc};
use eyre::Result;

use crate::cloud::CloudComputeClient;
use crate::config::Config;
use crate::metrics;

/// Aggregate counts for one sweep: `terminated + spared == |active|` always holds.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReaperOutcome {
    pub terminated: usize,
    pub spared: usize,
}

/// Lists active runner instances and terminates every one that has run
/// longer than `config.max_runtime` (spec §4.7). Instances younger than
/// `config.min_running_time` are always spared, even past `max_runtime`,
/// so a sweep racing a just-launched instance can never terminate it before
/// its `config.sh` registration has had a chance to run.
///
/// A `terminate` failure for one instance is logged and does not stop the
/// sweep from considering the rest — mirroring `process_batch`'s
/// one-bad-message-must-not-fail-the-batch rule (spec §4.6, §7).
pub async fn sweep(cloud: &dyn CloudComputeClient, config: &Config, now: DateTime<Utc>) -> Result<ReaperOutcome> {
    let active = cloud.list_active().await?;
    metrics::emit_active_runners(active.len());

    let mut outcome = ReaperOutcome::default();
    let mut to_terminate = Vec::new();

    for instance in &active {
        let age = now.signed_duration_since(instance.launch_time);
        let age = age.to_std().unwrap_or_default();

        if age < config.min_running_time {
            outcome.spared += 1;
            continue;
        }

        if age > config.max_runtime {
            to_terminate.push(instance.instance_id.clone());
        } else {
            outcome.spared += 1;
        }
    }

    if !to_terminate.is_empty() {
        tracing::info!(count = to_terminate.len(), "terminating overdue runners");
        cloud.terminate(&to_terminate).await;
        outcome.terminated += to_terminate.len();
        metrics::emit_runner_terminated(to_terminate.len());
    }

    Ok(outcome)
}

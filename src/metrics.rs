//! Write-only metrics emission (spec §4.8).
//!
//! No push-based metrics client appears anywhere in this system's ambient
//! stack: it runs as short-lived, AWS-hosted processes, so each metric is a
//! single structured `tracing::info!` line a CloudWatch Logs metric filter
//! (or any log-based pipeline) can scrape. A failed *emission* is not
//! observable from inside `tracing` itself, which already satisfies "must
//! not break the control loop" without extra try/catch scaffolding.

pub fn emit_active_runners(count: usize) {
    tracing::info!(metric = "ActiveRunners", value = count, "metric");
}

pub fn emit_runner_launched(instance_type: &str, spot_enabled: bool) {
    tracing::info!(
        metric = "RunnerLaunched",
        instance_type,
        spot_enabled,
        "metric"
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MaxLimit,
}

impl SkipReason {
    fn as_str(self) -> &'static str {
        match self {
            SkipReason::MaxLimit => "MaxLimit",
        }
    }
}

pub fn emit_runners_skipped(reason: SkipReason) {
    tracing::info!(metric = "RunnersSkipped", reason = reason.as_str(), "metric");
}

pub fn emit_runner_launch_errors(count: usize) {
    tracing::info!(metric = "RunnerLaunchErrors", value = count, "metric");
}

pub fn emit_scaleup_processing_time(seconds: f64) {
    tracing::info!(metric = "ScaleUpProcessingTime", value = seconds, "metric");
}

pub fn emit_runner_terminated(count: usize) {
    tracing::info!(metric = "RunnerTerminated", value = count, "metric");
}

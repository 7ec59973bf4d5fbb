use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The unit that flows from ingress to the scale-up reconciler.
///
/// Serialised as a single UTF-8 JSON object per queue message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobDescriptor {
    pub id: u64,
    pub run_id: u64,
    pub name: String,
    pub labels: BTreeSet<String>,
    pub repository: String,
    pub org: String,
}

/// Process-cached GitHub App credentials, fetched once per cold start.
///
/// `Debug` is implemented by hand so a stray `{:?}` never leaks the private
/// key or webhook secret into logs.
#[derive(Clone, Deserialize)]
pub struct AppCredentials {
    pub app_id: String,
    pub installation_id: String,
    /// Base64-encoded PEM of an RSA private key; the decoded PEM signs RS256 assertions.
    pub private_key: String,
    /// HMAC-SHA256 key used to verify inbound webhook signatures.
    pub webhook_secret: String,
}

impl fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppCredentials")
            .field("app_id", &self.app_id)
            .field("installation_id", &self.installation_id)
            .field("private_key", &"<redacted>")
            .field("webhook_secret", &"<redacted>")
            .finish()
    }
}

/// A runner instance as observed by tag — the system never stores this
/// itself, it is reconstructed from the cloud API on every sweep or cap check.
#[derive(Debug, Clone)]
pub struct RunnerInstance {
    pub instance_id: String,
    pub launch_time: DateTime<Utc>,
}

/// The sole tag filter used by both the scale-up cap check and the reaper.
pub const PURPOSE_TAG_VALUE: &str = "github-runner";

/// Builds the `Name` tag value: `runner-<UTC yyyymmdd-HHMMSS>-<jobId>`.
pub fn runner_name(now: DateTime<Utc>, job_id: u64) -> String {
    format!("runner-{}-{}", now.format("%Y%m%d-%H%M%S"), job_id)
}

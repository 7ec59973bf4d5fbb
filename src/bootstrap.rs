use base64::Engine;

/// Watchdog ceiling for the self-hosted runner process, in seconds (4h).
const WATCHDOG_TIMEOUT_SECS: u64 = 14_400;

/// Renders the POSIX shell bootstrap script and returns it base64-encoded,
/// ready to hand to the cloud compute client as instance user data.
///
/// Byte-level contract (spec §6): strict mode, tee to a setup log, register
/// as an unprivileged runner user with the eight listed flags, run in the
/// background behind a 4-hour watchdog, then resolve the instance's own id
/// and region from the metadata service and terminate itself.
pub fn render_user_data(
    org: &str,
    registration_token: &str,
    runner_name: &str,
    labels: &[String],
    runner_group: &str,
) -> String {
    let labels_csv = labels.join(",");

    let script = format!(
        r#"#!/bin/bash
set -euo pipefail
exec > >(tee /var/log/runner-setup.log) 2>&1
cd /home/runner/actions-runner
sudo -u runner ./config.sh --url "https://github.com/{org}" --token "{registration_token}" --name "{runner_name}" --labels "{labels_csv}" --runnergroup "{runner_group}" --ephemeral --unattended --disableupdate
sudo -u runner ./run.sh &
RUNNER_PID=$!
TIMEOUT={WATCHDOG_TIMEOUT_SECS}
ELAPSED=0
while kill -0 $RUNNER_PID 2>/dev/null; do
    sleep 30
    ELAPSED=$((ELAPSED + 30))
    [ $ELAPSED -ge $TIMEOUT ] && break
done
TOKEN=$(curl -s -X PUT "http://169.254.169.254/latest/api/token" -H "X-aws-ec2-metadata-token-ttl-seconds: 60")
INSTANCE_ID=$(curl -s -H "X-aws-ec2-metadata-token: $TOKEN" http://169.254.169.254/latest/meta-data/instance-id)
REGION=$(curl -s -H "X-aws-ec2-metadata-token: $TOKEN" http://169.254.169.254/latest/meta-data/placement/region)
aws ec2 terminate-instances --instance-ids "$INSTANCE_ID" --region "$REGION"
"#
    );

    base64::engine::general_purpose::STANDARD.encode(script)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeds_all_config_fields_and_required_flags() {
        let labels = vec!["self-hosted".to_string(), "linux".to_string(), "x64".to_string()];
        let encoded = render_user_data("acme", "reg-token-abc", "runner-20260101-000000-1", &labels, "default");

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&encoded)
            .expect("valid base64");
        let script = String::from_utf8(decoded).expect("valid utf8");

        assert!(script.contains("https://github.com/acme"));
        assert!(script.contains("--token \"reg-token-abc\""));
        assert!(script.contains("--name \"runner-20260101-000000-1\""));
        assert!(script.contains("--labels \"self-hosted,linux,x64\""));
        assert!(script.contains("--runnergroup \"default\""));
        assert!(script.contains("--ephemeral"));
        assert!(script.contains("--unattended"));
        assert!(script.contains("--disableupdate"));
        assert!(script.contains("TIMEOUT=14400"));
        assert!(script.contains("terminate-instances"));
    }
}

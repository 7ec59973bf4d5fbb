use aws_sdk_secretsmanager::Client as SecretsManagerClient;

use crate::error::ControlPlaneError;
use crate::model::AppCredentials;

/// Pulls a named secret containing a single JSON object and exposes its
/// fields. Holds no cache of its own — process-wide caching of the single
/// successful fetch per cold start is the caller's responsibility (see
/// `src/bin/*.rs`, which fetch once and pass the result down), matching the
/// "explicit lazily-constructed client, no hidden globals" design note.
#[derive(Clone)]
pub struct SecretStore {
    client: SecretsManagerClient,
}

impl SecretStore {
    pub fn new(client: SecretsManagerClient) -> Self {
        Self { client }
    }

    /// Fetches and parses `secret_arn` into `AppCredentials`. Any fetch or
    /// parse error is fatal for the invocation, per spec.
    pub async fn load(&self, secret_arn: &str) -> Result<AppCredentials, ControlPlaneError> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(secret_arn)
            .send()
            .await
            .map_err(|e| ControlPlaneError::ConfigUnavailable(e.to_string()))?;

        let raw = output
            .secret_string()
            .ok_or_else(|| ControlPlaneError::ConfigUnavailable("secret has no string value".into()))?;

        serde_json::from_str(raw)
            .map_err(|e| ControlPlaneError::ConfigUnavailable(format!("invalid secret JSON: {e}")))
    }
}

use std::time::{SystemTime, UNIX_EPOCH};

use eyre::{eyre, Result};
use serde::Deserialize;

use crate::forge::assertion::sign_app_assertion;
use crate::forge::retry::{Classification, RetryPolicy};
use crate::model::AppCredentials;

const API_BASE: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";

/// Three-step token minting against the forge (GitHub), each call wrapped
/// in the same `RetryPolicy`. Registration tokens are minted fresh per
/// launch and never cached across launches — the forge consumes them once.
#[derive(Clone)]
pub struct ForgeClient {
    http: reqwest::Client,
    policy: RetryPolicy,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

impl ForgeClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            policy: RetryPolicy::default(),
        }
    }

    /// Mints a short-lived installation access token good for ~1h.
    pub async fn installation_token(&self, creds: &AppCredentials) -> Result<String> {
        let now_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| eyre!("system clock before epoch: {e}"))?
            .as_secs() as i64;

        let assertion = sign_app_assertion(&creds.app_id, &creds.private_key, now_unix)?;

        let url = format!(
            "{API_BASE}/app/installations/{}/access_tokens",
            creds.installation_id
        );

        let token = self
            .post_with_retry(&url, |req| {
                req.bearer_auth(&assertion)
                    .header("Accept", "application/vnd.github+json")
                    .header("X-GitHub-Api-Version", API_VERSION)
            })
            .await?;

        Ok(token)
    }

    /// Mints a single-use, short-TTL runner registration token consumed by
    /// the instance bootstrap script.
    pub async fn registration_token(&self, installation_token: &str, org: &str) -> Result<String> {
        let url = format!("{API_BASE}/orgs/{org}/actions/runners/registration-token");

        self.post_with_retry(&url, |req| {
            req.header("Authorization", format!("token {installation_token}"))
                .header("Accept", "application/vnd.github+json")
                .header("X-GitHub-Api-Version", API_VERSION)
        })
        .await
    }

    async fn post_with_retry<F>(&self, url: &str, build: F) -> Result<String>
    where
        F: Fn(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let req = build(self.http.post(url));
            let resp = req.send().await.map_err(|e| eyre!("forge request failed: {e}"))?;

            let status = resp.status().as_u16();
            let retry_after = resp
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());

            match RetryPolicy::classify(status, retry_after) {
                Classification::Ok => {
                    let body: TokenResponse = resp
                        .json()
                        .await
                        .map_err(|e| eyre!("forge response was not valid JSON: {e}"))?;
                    return Ok(body.token);
                }
                _ if attempt > self.policy.max_retries => {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(RetryPolicy::terminal_error(status, body).into());
                }
                Classification::RetryAfter(delay) => {
                    tracing::warn!(status, delay_s = delay.as_secs(), attempt, "forge rate limited; retrying");
                    tokio::time::sleep(delay).await;
                }
                Classification::Backoff => {
                    let delay = self.policy.backoff_delay(attempt);
                    tracing::warn!(status, delay_s = delay.as_secs(), attempt, "forge call failed; retrying");
                    tokio::time::sleep(delay).await;
                }
                Classification::Fail => {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(RetryPolicy::terminal_error(status, body).into());
                }
            }
        }
    }
}

impl Default for ForgeClient {
    fn default() -> Self {
        Self::new()
    }
}

use std::collections::{BTreeMap, BTreeSet};

use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::model::JobDescriptor;

type HmacSha256 = Hmac<Sha256>;

/// An HTTP request surfaced the way the hosting transport hands it to us —
/// headers, a possibly base64-framed body, and the framing flag — mirroring
/// spec §4.5's `{headers, body, isBase64Encoded}` contract exactly, so the
/// verification/classification logic is testable independent of axum.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    /// Already case-folded to lowercase by the caller.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub is_base64_encoded: bool,
}

/// The result of running a webhook request through verification and
/// classification. Maps 1:1 onto the HTTP responses spec §4.5 describes.
#[derive(Debug, PartialEq)]
pub enum IngressOutcome {
    Unauthorized,
    InvalidJson,
    Ignored,
    Queued(JobDescriptor),
}

impl IngressOutcome {
    pub fn status_code(&self) -> u16 {
        match self {
            IngressOutcome::Unauthorized => 401,
            IngressOutcome::InvalidJson => 400,
            IngressOutcome::Ignored => 200,
            IngressOutcome::Queued(_) => 200,
        }
    }

    pub fn body_text(&self) -> &'static str {
        match self {
            IngressOutcome::Unauthorized => "Invalid signature",
            IngressOutcome::InvalidJson => "Invalid JSON",
            IngressOutcome::Ignored => "Ignored",
            IngressOutcome::Queued(_) => "Queued",
        }
    }
}

#[derive(Debug, Deserialize)]
struct WorkflowJobEvent {
    #[serde(default)]
    action: String,
    #[serde(default)]
    workflow_job: WorkflowJob,
    #[serde(default)]
    repository: Repository,
    #[serde(default)]
    organization: Organization,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowJob {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    run_id: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    labels: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Repository {
    #[serde(default)]
    full_name: String,
}

#[derive(Debug, Default, Deserialize)]
struct Organization {
    #[serde(default)]
    login: String,
}

/// Verifies `x-hub-signature-256` over the raw body bytes, keyed by
/// `webhook_secret`. `Mac::verify_slice` performs the comparison in
/// constant time, so no separate constant-time-compare step is needed.
pub fn verify_signature(body: &[u8], signature_header: Option<&str>, webhook_secret: &str) -> bool {
    let Some(header) = signature_header else {
        return false;
    };
    let Some(hex_sig) = header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(hex_sig) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(webhook_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&sig_bytes).is_ok()
}

/// Verifies, parses, classifies, and — on admission — builds the
/// `JobDescriptor` to enqueue. Never panics and never performs I/O; the
/// caller is responsible for the actual queue send on `Queued`.
pub fn process_webhook(req: &WebhookRequest, webhook_secret: &str, runner_labels: &BTreeSet<String>) -> IngressOutcome {
    let body = if req.is_base64_encoded {
        match base64::engine::general_purpose::STANDARD.decode(&req.body) {
            Ok(decoded) => decoded,
            Err(_) => return IngressOutcome::Unauthorized,
        }
    } else {
        req.body.clone()
    };

    let signature = req.headers.get("x-hub-signature-256").map(String::as_str);
    if !verify_signature(&body, signature, webhook_secret) {
        return IngressOutcome::Unauthorized;
    }

    let payload: WorkflowJobEvent = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return IngressOutcome::InvalidJson,
    };

    let event = req.headers.get("x-github-event").map(String::as_str).unwrap_or("");
    if event != "workflow_job" {
        return IngressOutcome::Ignored;
    }

    if payload.action != "queued" {
        return IngressOutcome::Ignored;
    }

    let job_labels: BTreeSet<String> = payload.workflow_job.labels.into_iter().collect();
    if runner_labels.is_disjoint(&job_labels) {
        return IngressOutcome::Ignored;
    }

    IngressOutcome::Queued(JobDescriptor {
        id: payload.workflow_job.id,
        run_id: payload.workflow_job.run_id,
        name: payload.workflow_job.name,
        labels: job_labels,
        repository: payload.repository.full_name,
        org: payload.organization.login,
    })
}

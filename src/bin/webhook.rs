use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{body::Bytes, Router};
use eyre::Result;
use gh_runner_control_plane::config::Config;
use gh_runner_control_plane::ingress::{process_webhook, IngressOutcome, WebhookRequest};
use gh_runner_control_plane::init_tracing;
use gh_runner_control_plane::queue::{QueueAdapter, SqsQueueAdapter};
use gh_runner_control_plane::secrets::SecretStore;

struct AppState {
    webhook_secret: String,
    runner_labels: BTreeSet<String>,
    queue: SqsQueueAdapter,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env()?;
    let bind_addr = std::env::var("WEBHOOK_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into());

    let aws_config = aws_config::load_from_env().await;
    let secrets = SecretStore::new(aws_sdk_secretsmanager::Client::new(&aws_config));
    let queue = SqsQueueAdapter::new(aws_sdk_sqs::Client::new(&aws_config), config.sqs_queue_url.clone());

    let creds = secrets.load(&config.secret_arn).await?;

    let state = Arc::new(AppState {
        webhook_secret: creds.webhook_secret,
        runner_labels: config.runner_labels.iter().cloned().collect(),
        queue,
    });

    let app = Router::new()
        .route("/webhook", post(handle_webhook))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!(bind_addr, "webhook ingress starting");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn handle_webhook(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> (StatusCode, String) {
    let mut lowercased: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            lowercased.insert(name.as_str().to_ascii_lowercase(), value.to_string());
        }
    }

    let req = WebhookRequest {
        headers: lowercased,
        body: body.to_vec(),
        is_base64_encoded: false,
    };

    let outcome = process_webhook(&req, &state.webhook_secret, &state.runner_labels);

    if let IngressOutcome::Queued(job) = &outcome {
        if let Err(e) = state.queue.send(job).await {
            tracing::error!(job_id = job.id, error = %e, "failed to enqueue job; GitHub will retry the webhook");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to enqueue job".to_string());
        }
        tracing::info!(job_id = job.id, repository = job.repository, "job queued");
    }

    let status = StatusCode::from_u16(outcome.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, outcome.body_text().to_string())
}

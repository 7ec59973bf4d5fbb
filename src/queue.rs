use async_trait::async_trait;
use aws_sdk_sqs::Client as SqsClient;
use eyre::{eyre, Result};

use crate::model::JobDescriptor;

/// A single received message: the parsed-later body plus whatever handle
/// the queue needs to ack it on handler success.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub body: String,
    pub receipt_handle: String,
}

/// At-least-once queue consumer/producer semantics (spec §4.4). `ack` deletes
/// a message after its handler completed successfully; a message that is
/// never acked is redelivered until the hosting queue's own dead-letter
/// policy retires it — this crate does not implement a DLQ itself.
#[async_trait]
pub trait QueueAdapter: Send + Sync {
    /// Long-polls up to `max_messages` queued job descriptors.
    async fn receive_batch(&self, max_messages: i32) -> Result<Vec<QueueMessage>>;

    async fn ack(&self, receipt_handle: &str) -> Result<()>;

    /// Fire-and-forget send of a single JSON body.
    async fn send(&self, job: &JobDescriptor) -> Result<()>;
}

pub struct SqsQueueAdapter {
    client: SqsClient,
    queue_url: String,
}

impl SqsQueueAdapter {
    pub fn new(client: SqsClient, queue_url: String) -> Self {
        Self { client, queue_url }
    }
}

#[async_trait]
impl QueueAdapter for SqsQueueAdapter {
    async fn receive_batch(&self, max_messages: i32) -> Result<Vec<QueueMessage>> {
        let resp = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(20)
            .send()
            .await
            .map_err(|e| eyre!("receive_message failed: {e}"))?;

        let messages = resp
            .messages()
            .iter()
            .filter_map(|m| {
                let body = m.body()?.to_string();
                let receipt_handle = m.receipt_handle()?.to_string();
                Some(QueueMessage { body, receipt_handle })
            })
            .collect();

        Ok(messages)
    }

    async fn ack(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| eyre!("delete_message failed: {e}"))?;
        Ok(())
    }

    async fn send(&self, job: &JobDescriptor) -> Result<()> {
        let body = serde_json::to_string(job).map_err(|e| eyre!("failed to serialise job: {e}"))?;
        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| eyre!("send_message failed: {e}"))?;
        Ok(())
    }
}

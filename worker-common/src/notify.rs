//! C3: publishes a single completion message to an external topic once a
//! pipeline finishes. Optional: falls back to a mock that only logs when
//! `SNS_ARN` is not configured.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
pub struct DeploymentCompleteMessage<'a> {
    pub entity_id: &'a str,
    pub entity_type: &'a str,
    pub success: bool,
}

#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    async fn publish(&self, message: &DeploymentCompleteMessage<'_>);
}

pub struct SnsPublisher {
    client: aws_sdk_sns::Client,
    topic_arn: String,
}

impl SnsPublisher {
    pub fn new(client: aws_sdk_sns::Client, topic_arn: String) -> Self {
        Self { client, topic_arn }
    }
}

#[async_trait]
impl NotificationPublisher for SnsPublisher {
    async fn publish(&self, message: &DeploymentCompleteMessage<'_>) {
        let body = match serde_json::to_string(message) {
            Ok(body) => body,
            Err(e) => {
                warn!("failed to serialize completion message: {}", e);
                return;
            }
        };

        if let Err(e) = self
            .client
            .publish()
            .topic_arn(&self.topic_arn)
            .message(body)
            .send()
            .await
        {
            warn!("failed to publish completion notification: {}", e);
        } else {
            info!("published completion notification for {}", message.entity_id);
        }
    }
}

/// Used when `SNS_ARN` is unset: logs what would have been published.
pub struct MockPublisher;

#[async_trait]
impl NotificationPublisher for MockPublisher {
    async fn publish(&self, message: &DeploymentCompleteMessage<'_>) {
        info!(
            "mock notification publisher: would publish completion for {} (success={})",
            message.entity_id, message.success
        );
    }
}

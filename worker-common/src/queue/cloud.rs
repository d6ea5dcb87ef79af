use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sqs::Client as SqsClient;
use tracing::{error, info, warn};

use super::{JobHandler, Queue};
use crate::error::QueueError;
use crate::model::{decode_job, encode_job, EntityType, Job, QueueMessage};

/// Visibility timeout for in-flight deliveries: the slowest pipeline is
/// assumed to finish within this window (see `DESIGN.md` for the known
/// limitation if it doesn't).
const VISIBILITY_TIMEOUT_SECS: i32 = 10_800;
const SHORT_WAIT_SECS: i32 = 1;
const LONG_WAIT_SECS: i32 = 15;

/// One entity-typed queue in the round-robin rotation.
struct EntityQueue {
    entity_type: EntityType,
    url: String,
}

/// Multi-queue cloud backend: an optional priority queue, strictly
/// preferred on every poll, plus round-robin fairness across up to three
/// entity-typed queues (scene, wearable, emote).
pub struct CloudQueue {
    client: SqsClient,
    priority_queue_url: Option<String>,
    entity_queues: Vec<EntityQueue>,
    cursor: AtomicUsize,
}

impl CloudQueue {
    pub fn new(
        client: SqsClient,
        priority_queue_url: Option<String>,
        scene_queue_url: String,
        wearable_queue_url: Option<String>,
        emote_queue_url: Option<String>,
    ) -> Self {
        let mut entity_queues = vec![EntityQueue {
            entity_type: EntityType::Scene,
            url: scene_queue_url,
        }];
        if let Some(url) = wearable_queue_url {
            entity_queues.push(EntityQueue {
                entity_type: EntityType::Wearable,
                url,
            });
        }
        if let Some(url) = emote_queue_url {
            entity_queues.push(EntityQueue {
                entity_type: EntityType::Emote,
                url,
            });
        }

        Self {
            client,
            priority_queue_url,
            entity_queues,
            cursor: AtomicUsize::new(0),
        }
    }

    fn queue_url_for(&self, entity_type: EntityType) -> Option<&str> {
        self.entity_queues
            .iter()
            .find(|q| q.entity_type == entity_type)
            .map(|q| q.url.as_str())
    }

    fn label_for_url(&self, url: &str) -> String {
        if Some(url) == self.priority_queue_url.as_deref() {
            return "priority".to_owned();
        }
        self.entity_queues
            .iter()
            .find(|q| q.url == url)
            .map(|q| q.entity_type.to_string())
            .unwrap_or_else(|| "unknown".to_owned())
    }

    async fn receive_one(
        &self,
        url: &str,
        wait_seconds: i32,
    ) -> Result<Option<aws_sdk_sqs::types::Message>, QueueError> {
        let response = self
            .client
            .receive_message()
            .queue_url(url)
            .max_number_of_messages(1)
            .wait_time_seconds(wait_seconds)
            .visibility_timeout(VISIBILITY_TIMEOUT_SECS)
            .send()
            .await
            .map_err(|e| QueueError::Receive {
                queue: url.to_owned(),
                message: e.to_string(),
            })?;

        Ok(response.messages.unwrap_or_default().into_iter().next())
    }

    async fn ack(&self, url: &str, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Ack {
                queue: url.to_owned(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    /// Decode the job body and dispatch it to `handler`, recording metrics
    /// and acking regardless of the handler's outcome. Duplicates from a
    /// re-delivery are considered preferable to dropped jobs for this
    /// workload (see `DESIGN.md`).
    async fn process_and_ack(
        &self,
        handler: &dyn JobHandler,
        url: &str,
        is_priority: bool,
        message: aws_sdk_sqs::types::Message,
    ) -> Result<(), QueueError> {
        let queue_label = self.label_for_url(url);
        let body = message.body.clone().unwrap_or_default();
        let receipt = message.receipt_handle.clone().unwrap_or_default();
        let message_id = message.message_id.clone().unwrap_or_default();

        let queue_message = QueueMessage {
            id: message_id,
            is_priority,
            receipt: receipt.clone(),
            source_queue: queue_label.clone(),
        };

        let timer = std::time::Instant::now();
        let labels = [("queue", queue_label.clone())];
        let result = match decode_job(&body) {
            Ok(job) => handler.handle(job, &queue_message).await,
            Err(e) => Err(e.into()),
        };
        metrics::histogram!("duration_seconds", &labels).record(timer.elapsed().as_secs_f64());

        if let Err(error) = result {
            error!("handler failed for job on {}: {}", queue_label, error);
            metrics::counter!("failures_total", &labels).increment(1);
        }

        if !receipt.is_empty() {
            self.ack(url, &receipt).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl Queue for CloudQueue {
    async fn publish(&self, job: &Job, priority: bool) -> Result<(), QueueError> {
        let url = if priority && self.priority_queue_url.is_some() {
            self.priority_queue_url.as_deref().unwrap()
        } else {
            self.queue_url_for(job.entity_type)
                .ok_or_else(|| QueueError::NoQueueConfigured(job.entity_type.to_string()))?
        };

        let body = encode_job(job)?;
        let label = self.label_for_url(url);

        self.client
            .send_message()
            .queue_url(url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| QueueError::Publish {
                queue: url.to_owned(),
                message: e.to_string(),
            })?;

        metrics::counter!("enqueue_total", &[("queue", label)]).increment(1);
        Ok(())
    }

    async fn consume_and_process(&self, handler: &dyn JobHandler) -> Result<(), QueueError> {
        if let Some(priority_url) = self.priority_queue_url.clone() {
            match self.receive_one(&priority_url, SHORT_WAIT_SECS).await {
                Ok(Some(message)) => {
                    return self
                        .process_and_ack(handler, &priority_url, true, message)
                        .await;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("error receiving from priority queue: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        let n = self.entity_queues.len();
        if n == 0 {
            return Ok(());
        }

        let start = self.cursor.load(Ordering::SeqCst) % n;
        for offset in 0..n {
            let index = (start + offset) % n;
            let is_last_attempt = offset == n - 1;
            let wait_seconds = if is_last_attempt {
                LONG_WAIT_SECS
            } else {
                SHORT_WAIT_SECS
            };
            let url = self.entity_queues[index].url.clone();

            match self.receive_one(&url, wait_seconds).await {
                Ok(Some(message)) => {
                    self.cursor.store((index + 1) % n, Ordering::SeqCst);
                    return self.process_and_ack(handler, &url, false, message).await;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("error receiving from queue {}: {}", url, e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        // Every queue was empty this cycle: still advance the cursor by one
        // so no single queue starves its neighbours.
        self.cursor.store((start + 1) % n, Ordering::SeqCst);
        info!("all entity queues empty this cycle");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_for_url_prefers_priority() {
        let queue = CloudQueue::new(
            fake_client(),
            Some("priority-url".to_owned()),
            "scene-url".to_owned(),
            None,
            None,
        );
        assert_eq!(queue.label_for_url("priority-url"), "priority");
        assert_eq!(queue.label_for_url("scene-url"), "scene");
    }

    fn fake_client() -> SqsClient {
        let config = aws_sdk_sqs::Config::builder()
            .behavior_version(aws_sdk_sqs::config::BehaviorVersion::latest())
            .region(aws_sdk_sqs::config::Region::new("us-east-1"))
            .credentials_provider(aws_sdk_sqs::config::Credentials::new(
                "test", "test", None, None, "test",
            ))
            .build();
        SqsClient::from_conf(config)
    }
}

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{error, info};

use super::{JobHandler, Queue};
use crate::error::QueueError;
use crate::model::{Job, QueueMessage};

/// FIFO, in-process queue used when no `TASK_QUEUE` is configured: handy for
/// tests and for the admin server's demo `/add-queue` route. There is no ack
/// step, since there is no redelivery to guard against.
pub struct InMemoryQueue {
    sender: mpsc::UnboundedSender<Job>,
    receiver: Mutex<mpsc::UnboundedReceiver<Job>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn publish(&self, job: &Job, priority: bool) -> Result<(), QueueError> {
        metrics::counter!("enqueue_total", &[("queue", "in-memory")]).increment(1);
        // Priority has no effect here: there is only one lane.
        let _ = priority;
        self.sender
            .send(job.clone())
            .map_err(|_| QueueError::ChannelClosed)?;
        Ok(())
    }

    async fn consume_and_process(&self, handler: &dyn JobHandler) -> Result<(), QueueError> {
        let job = {
            let mut receiver = self.receiver.lock().await;
            receiver.recv().await
        };

        let Some(job) = job else {
            return Ok(());
        };

        let message = QueueMessage {
            id: job.entity_id.clone(),
            is_priority: false,
            receipt: String::new(),
            source_queue: "in-memory".to_owned(),
        };

        let timer = std::time::Instant::now();
        let labels = [("queue", "in-memory")];
        let result = handler.handle(job, &message).await;
        metrics::histogram!("duration_seconds", &labels).record(timer.elapsed().as_secs_f64());

        if let Err(error) = result {
            error!("in-memory job handler failed: {}", error);
            metrics::counter!("failures_total", &labels).increment(1);
        } else {
            info!("processed in-memory job {}", message.id);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn handle(&self, _job: Job, _message: &QueueMessage) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn publishes_and_consumes_fifo() {
        let queue = InMemoryQueue::new();
        let job = Job {
            entity_id: "bafy1".to_owned(),
            entity_type: EntityType::Scene,
            content_server_urls: vec!["https://content.example.com".to_owned()],
            profile_data: None,
        };
        queue.publish(&job, false).await.unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let handler = CountingHandler(count.clone());
        queue.consume_and_process(&handler).await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}

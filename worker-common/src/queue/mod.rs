//! C6: a uniform queue port over an in-memory channel (tests, one-shot CLI
//! modes) or a multi-queue cloud backend with priority pre-emption and
//! round-robin fairness across entity-typed queues.

mod cloud;
mod in_memory;

pub use cloud::CloudQueue;
pub use in_memory::InMemoryQueue;

use async_trait::async_trait;

use crate::error::QueueError;
use crate::model::{Job, QueueMessage};

/// The capability a queue consumer needs: handle one delivered job. Kept as
/// its own trait (rather than a bare closure) so it stays object-safe and
/// the dispatcher can hand it a concrete pipeline without the queue needing
/// to know which one.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: Job, message: &QueueMessage) -> anyhow::Result<()>;
}

/// The contract both queue backends implement.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Publish `job`, routing to the priority queue when `priority` is true
    /// and a priority queue is configured, otherwise to the queue matching
    /// the job's entity type.
    async fn publish(&self, job: &Job, priority: bool) -> Result<(), QueueError>;

    /// Poll for (at most) one job and, if one is available, hand it to
    /// `handler` and acknowledge the delivery once the handler returns,
    /// regardless of whether it succeeded. Returns once this poll cycle is
    /// done, whether or not a job was processed.
    async fn consume_and_process(&self, handler: &dyn JobHandler) -> Result<(), QueueError>;
}

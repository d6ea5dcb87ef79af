//! C7: the top-level processing loop. Selects the dispatch mode from
//! `PROCESS_METHOD`, drives the queue, and restarts the engine between jobs
//! when running in `godot_optimizer` mode.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};
use worker_common::model::{Job, QueueMessage};
use worker_common::queue::{JobHandler, Queue};

use crate::config::ProcessMethod;
use crate::pipeline::{process_job, PipelineContext};

pub struct Dispatcher {
    pub method: ProcessMethod,
    pub ctx: PipelineContext,
    processed_this_cycle: AtomicBool,
}

impl Dispatcher {
    pub fn new(method: ProcessMethod, ctx: PipelineContext) -> Self {
        Self {
            method,
            ctx,
            processed_this_cycle: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl JobHandler for Dispatcher {
    async fn handle(&self, job: Job, message: &QueueMessage) -> anyhow::Result<()> {
        self.processed_this_cycle.store(true, Ordering::SeqCst);
        match self.method {
            ProcessMethod::Log => {
                info!("log mode: would process {} ({})", job.entity_id, job.entity_type);
                Ok(())
            }
            ProcessMethod::GodotOptimizer => {
                process_job(&self.ctx, &job, message.is_priority).await;
                Ok(())
            }
            other => {
                warn!("{:?} is accepted but not implemented in this core; skipping job", other);
                Ok(())
            }
        }
    }
}

/// Run the queue loop forever. The engine is restarted after every poll
/// cycle that ran `godot_optimizer`, win or lose, to bound its memory
/// growth; restarts never interleave with another job on this worker since
/// the loop is sequential.
pub async fn run(queue: Arc<dyn Queue>, dispatcher: Arc<Dispatcher>, liveness: health::HealthHandle) {
    loop {
        liveness.report_healthy().await;

        dispatcher.processed_this_cycle.store(false, Ordering::SeqCst);

        if let Err(e) = queue.consume_and_process(dispatcher.as_ref()).await {
            error!("queue poll failed: {}", e);
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            continue;
        }

        let processed = dispatcher.processed_this_cycle.load(Ordering::SeqCst);
        if processed && dispatcher.method == ProcessMethod::GodotOptimizer {
            if let Err(e) = dispatcher.ctx.engine.restart().await {
                error!("failed to restart engine: {}", e);
            }
        }
    }
}

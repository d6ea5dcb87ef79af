//! C8/C9/C10: the three pipelines a job (or a one-shot CLI invocation) can
//! be routed through. `mod.rs` holds the shared context and the per-job
//! entry point; each pipeline only knows how to produce a `PipelineResult`
//! and mutate the `ProcessReport` it's handed.

pub mod profile;
pub mod scene;
pub mod wearable_emote;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use worker_common::engine::EngineClient;
use worker_common::fetcher::Fetcher;
use worker_common::model::{EntityType, Job, ProcessReport};
use worker_common::monitor::{MonitoringReporter, MonitoringStatus};
use worker_common::notify::{DeploymentCompleteMessage, NotificationPublisher};
use worker_common::storage::Storage;

/// Everything a pipeline needs to run a single job, shared across jobs and
/// cheap to clone (every field is an `Arc` or a plain value).
#[derive(Clone)]
pub struct PipelineContext {
    pub engine: Arc<EngineClient>,
    pub storage: Arc<dyn Storage>,
    pub fetcher: Arc<Fetcher>,
    pub monitor: Arc<MonitoringReporter>,
    pub notifier: Arc<dyn NotificationPublisher>,
    pub scene_wait_timeout: Duration,
    pub concurrent_bundles: usize,
    pub profile_concurrent_limit: usize,
    pub max_gltf_count: usize,
    pub max_content_size_bytes: u64,
}

/// Run the pipeline matching `job.entity_type`, write the resulting report
/// to storage, fire the completion notification and the monitoring report,
/// and hand the report back to the caller (the dispatcher logs it).
pub async fn process_job(ctx: &PipelineContext, job: &Job, is_priority: bool) -> ProcessReport {
    let content_server = job.content_server().unwrap_or_default().to_owned();
    let mut report = ProcessReport::new(job.entity_id.clone(), job.entity_type, content_server);

    ctx.monitor
        .set_status(MonitoringStatus {
            status: "processing".to_owned(),
            current_scene_id: Some(job.entity_id.clone()),
            current_step: Some("started".to_owned()),
            progress_percent: Some(0.0),
            started_at: Some(report.started_at),
            is_priority: Some(is_priority),
        })
        .await;

    let outcome = match job.entity_type {
        EntityType::Scene => scene::run(ctx, job, &mut report).await,
        EntityType::Wearable | EntityType::Emote => {
            wearable_emote::run(ctx, job, &mut report).await
        }
    };

    let success = match outcome {
        Ok(()) => true,
        Err(e) => {
            error!("pipeline failed for {}: {}", job.entity_id, e);
            report.push_error(e.to_string());
            false
        }
    };
    report.finish(success);

    ctx.monitor
        .set_status(MonitoringStatus {
            status: "idle".to_owned(),
            ..Default::default()
        })
        .await;
    ctx.monitor
        .report_job_complete(
            &job.entity_id,
            success,
            report.started_at,
            report.errors.last().map(|s| s.as_str()),
            Some(is_priority),
        )
        .await;

    write_report(ctx, &report).await;

    ctx.notifier
        .publish(&DeploymentCompleteMessage {
            entity_id: &job.entity_id,
            entity_type: &job.entity_type.to_string(),
            success,
        })
        .await;

    info!(
        "finished processing {} ({}): success={}",
        job.entity_id, job.entity_type, success
    );

    report
}

async fn write_report(ctx: &PipelineContext, report: &ProcessReport) {
    let key = report.storage_key();
    let body = match serde_json::to_vec_pretty(report) {
        Ok(body) => body,
        Err(e) => {
            error!("failed to serialize report for {}: {}", report.entity_id, e);
            return;
        }
    };

    let write_result = tokio::task::spawn_blocking(move || {
        let mut file = tempfile::NamedTempFile::new()?;
        std::io::Write::write_all(&mut file, &body)?;
        Ok::<_, std::io::Error>(file)
    })
    .await;

    let tmp = match write_result {
        Ok(Ok(file)) => file,
        Ok(Err(e)) => {
            error!("failed to write temp report for {}: {}", report.entity_id, e);
            return;
        }
        Err(e) => {
            error!("report write task panicked for {}: {}", report.entity_id, e);
            return;
        }
    };

    ctx.storage.store(&key, tmp.path()).await;
}

/// Validate the pre-submission GLTF count against `MAX_GLTF_COUNT`.
pub fn validate_gltf_count(count: usize, max: usize) -> Result<(), anyhow::Error> {
    if count > max {
        anyhow::bail!("scene exceeds MAX_GLTF_COUNT: {} > {}", count, max);
    }
    Ok(())
}

/// Validate total asset size against `MAX_CONTENT_SIZE_BYTES`. Unlike the
/// GLTF count, this can't be checked before the engine submission: the
/// content server's entity listing carries no size field, so the total is
/// only known once the metadata pass reports `hashSizeMap`/`originalSizes`
/// (see `DESIGN.md`). Callers should run this before the per-asset fan-out
/// so an oversized scene still does no further engine work.
pub fn validate_content_size(total_bytes: u64, max: u64) -> Result<(), anyhow::Error> {
    if total_bytes > max {
        anyhow::bail!(
            "scene exceeds MAX_CONTENT_SIZE_BYTES: {} > {}",
            total_bytes,
            max
        );
    }
    Ok(())
}

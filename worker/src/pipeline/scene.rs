//! C8: the scene optimization pipeline. Two phases: a metadata-only engine
//! pass that discovers which assets need their own optimization run, then a
//! bounded fan-out of per-asset passes.

use std::collections::HashSet;
use std::io::Read;

use anyhow::{anyhow, Context};
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{info, warn};
use worker_common::model::{BatchState, EntityDefinition, Job, ProcessReport, SceneMetadata};

use super::{validate_content_size, validate_gltf_count, PipelineContext};

pub async fn run(
    ctx: &PipelineContext,
    job: &Job,
    report: &mut ProcessReport,
) -> anyhow::Result<()> {
    let content_server = job
        .content_server()
        .ok_or_else(|| anyhow!("job has no content server URL"))?;
    let scene_hash = &job.entity_id;
    let content_base_url = format!("{}/contents/", content_server.trim_end_matches('/'));

    if let Ok(entity) = fetch_entity(ctx, content_server, scene_hash).await {
        let gltf_count = entity.gltf_files().len();
        if let Err(e) = validate_gltf_count(gltf_count, ctx.max_gltf_count) {
            report.push_error(e.to_string());
            return Err(e);
        }
    }

    if !ctx.engine.is_ready().await {
        return Err(anyhow!("engine is not ready"));
    }

    let submission = ctx
        .engine
        .process_scene(scene_hash, &content_base_url, Some(scene_hash), &[])
        .await;

    let submission = match submission {
        Ok(submission) => submission,
        Err(e) if e.is_empty_scene() => {
            info!("scene {} has no processable assets", scene_hash);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    report.result.batch_id = Some(submission.batch_id.clone());

    let status = ctx
        .engine
        .wait_for_completion(&submission.batch_id, ctx.scene_wait_timeout)
        .await
        .context("metadata pass did not complete")?;

    let Some(zip_path) = status.zip_path.clone() else {
        info!("scene {} metadata pass produced no zip", scene_hash);
        return Ok(());
    };

    let metadata = match read_scene_metadata(&zip_path, scene_hash)? {
        Some(metadata) => metadata,
        None => {
            cleanup(&zip_path);
            return Ok(());
        }
    };

    let total_size: u64 = metadata
        .hash_size_map
        .as_ref()
        .or(metadata.original_sizes.as_ref())
        .map(|sizes| sizes.values().sum())
        .unwrap_or(0);
    if let Err(e) = validate_content_size(total_size, ctx.max_content_size_bytes) {
        report.push_error(e.to_string());
        cleanup(&zip_path);
        return Err(e);
    }

    let zip_path_buf = std::path::PathBuf::from(&zip_path);
    ctx.storage
        .store(&format!("{scene_hash}-mobile.zip"), &zip_path_buf)
        .await;
    cleanup(&zip_path);

    let dependency_hashes: HashSet<String> =
        metadata.external_scene_dependencies.keys().cloned().collect();
    let additional: HashSet<String> = metadata
        .optimized_content
        .iter()
        .filter(|h| !dependency_hashes.contains(*h))
        .cloned()
        .collect();

    let all_hashes: Vec<String> = dependency_hashes.union(&additional).cloned().collect();
    report.individual_assets.total = all_hashes.len() as u32;

    if all_hashes.is_empty() {
        return Ok(());
    }

    let mut uploaded_keys = Vec::new();
    let mut successful = 0u32;
    let mut failed = 0u32;

    for batch in all_hashes.chunks(ctx.concurrent_bundles.max(1)) {
        let mut futs = FuturesUnordered::new();
        for hash in batch {
            futs.push(process_single_asset(
                ctx,
                scene_hash,
                &content_base_url,
                hash.clone(),
            ));
        }

        while let Some(outcome) = futs.next().await {
            match outcome {
                Ok(Some(key)) => {
                    uploaded_keys.push(key);
                    successful += 1;
                }
                Ok(None) => {
                    successful += 1;
                }
                Err((hash, e)) => {
                    warn!("asset {} failed to optimize: {}", hash, e);
                    report.push_error(format!("{hash}: {e}"));
                    failed += 1;
                }
            }
        }
    }

    report.individual_assets.successful = successful;
    report.individual_assets.failed = failed;
    report.result.zip_keys = uploaded_keys;

    Ok(())
}

/// Submit, wait for, and (on success) upload a single per-asset pass.
/// Returns `Ok(Some(key))` on an uploaded zip, `Ok(None)` if the batch
/// completed without producing one, or `Err` with the hash attached so the
/// caller can record it without losing context.
async fn process_single_asset(
    ctx: &PipelineContext,
    scene_hash: &str,
    content_base_url: &str,
    hash: String,
) -> Result<Option<String>, (String, anyhow::Error)> {
    let result: anyhow::Result<Option<String>> = async {
        let submission = ctx
            .engine
            .process_scene(scene_hash, content_base_url, Some(&hash), &[hash.clone()])
            .await?;

        let status = ctx
            .engine
            .wait_for_completion(&submission.batch_id, ctx.scene_wait_timeout)
            .await?;

        if status.status != BatchState::Completed {
            return Ok(None);
        }

        let Some(zip_path) = status.zip_path else {
            return Ok(None);
        };

        let key = format!("{hash}-mobile.zip");
        ctx.storage
            .store(&key, &std::path::PathBuf::from(&zip_path))
            .await;
        cleanup(&zip_path);
        Ok(Some(key))
    }
    .await;

    result.map_err(|e| (hash, e))
}

async fn fetch_entity(
    ctx: &PipelineContext,
    content_server: &str,
    entity_id: &str,
) -> anyhow::Result<EntityDefinition> {
    let url = format!("{}/contents/{}", content_server.trim_end_matches('/'), entity_id);
    let response = ctx
        .fetcher
        .fetch(&url, worker_common::fetcher::FetchOptions::default())
        .await?;
    Ok(response.json().await?)
}

/// Open the metadata ZIP and extract `{scene_hash}-optimized.json`, if
/// present. `Ok(None)` covers both an empty archive and a missing entry.
fn read_scene_metadata(zip_path: &str, scene_hash: &str) -> anyhow::Result<Option<SceneMetadata>> {
    let file = std::fs::File::open(zip_path)
        .with_context(|| format!("opening metadata zip at {zip_path}"))?;
    let mut archive = zip::ZipArchive::new(file).context("reading metadata zip")?;

    if archive.is_empty() {
        return Ok(None);
    }

    let entry_name = format!("{scene_hash}-optimized.json");
    let mut entry = match archive.by_name(&entry_name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut contents = String::new();
    entry.read_to_string(&mut contents)?;
    Ok(Some(serde_json::from_str(&contents)?))
}

fn cleanup(path: &str) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!("failed to remove temp zip {}: {}", path, e);
    }
}

//! C9: single-asset optimization for a wearable or emote job. Two entry
//! shapes share this one pass: a standard content-server fetch, or a
//! profile-attached job that already carries the GLTF hash/mapping inline.

use std::collections::HashMap;

use anyhow::{anyhow, Context};
use worker_common::engine::wearable_asset_request;
use worker_common::model::{AssetType, EntityDefinition, Job, ProcessReport};

use super::PipelineContext;

struct ResolvedAsset {
    gltf_hash: String,
    content_base_url: String,
    content_mapping: HashMap<String, String>,
}

pub async fn run(
    ctx: &PipelineContext,
    job: &Job,
    report: &mut ProcessReport,
) -> anyhow::Result<()> {
    let asset_type = AssetType::from(job.entity_type);

    let resolved = match &job.profile_data {
        Some(profile_data) => ResolvedAsset {
            gltf_hash: profile_data.gltf_hash.clone(),
            content_base_url: profile_data.content_base_url.clone(),
            content_mapping: profile_data.content_mapping.clone(),
        },
        None => match resolve_from_content_server(ctx, job).await? {
            Some(resolved) => resolved,
            None => {
                info_no_gltf(&job.entity_id);
                return Ok(());
            }
        },
    };

    report.individual_assets.total = 1;

    let request = wearable_asset_request(
        asset_type,
        &resolved.content_base_url,
        &resolved.gltf_hash,
        resolved.content_mapping,
    );

    let submission = ctx
        .engine
        .process_assets(Some(&resolved.gltf_hash), &[request])
        .await
        .context("submitting wearable/emote asset")?;

    report.result.batch_id = Some(submission.batch_id.clone());

    let status = ctx
        .engine
        .wait_for_completion(&submission.batch_id, ctx.scene_wait_timeout)
        .await
        .context("waiting for wearable/emote batch")?;

    if let Some(zip_path) = status.zip_path {
        let key = format!("{}-mobile.zip", resolved.gltf_hash);
        ctx.storage
            .store(&key, &std::path::PathBuf::from(&zip_path))
            .await;
        if let Err(e) = std::fs::remove_file(&zip_path) {
            tracing::warn!("failed to remove temp zip {}: {}", zip_path, e);
        }
        report.result.zip_keys.push(key);
    }

    report.individual_assets.successful = 1;
    Ok(())
}

fn info_no_gltf(entity_id: &str) {
    tracing::info!("entity {} has no GLTF/GLB files, nothing to optimize", entity_id);
}

async fn resolve_from_content_server(
    ctx: &PipelineContext,
    job: &Job,
) -> anyhow::Result<Option<ResolvedAsset>> {
    let content_server = job
        .content_server()
        .ok_or_else(|| anyhow!("job has no content server URL"))?;
    let content_base_url = format!("{}/contents/", content_server.trim_end_matches('/'));

    let url = format!(
        "{}/contents/{}",
        content_server.trim_end_matches('/'),
        job.entity_id
    );
    let response = ctx
        .fetcher
        .fetch(&url, worker_common::fetcher::FetchOptions::default())
        .await?;
    let entity: EntityDefinition = response.json().await?;

    let gltfs = entity.gltf_files();
    let Some(first) = gltfs.first() else {
        return Ok(None);
    };

    Ok(Some(ResolvedAsset {
        gltf_hash: first.hash.clone(),
        content_base_url,
        content_mapping: entity.content_mapping(),
    }))
}

//! C10: one-shot profile expansion, invoked via `--profile <address>`.
//! Resolves an avatar's wearables and emotes to entities, then optimizes
//! every GLTF those entities contain in bounded parallel batches. Does not
//! touch the queue.

use std::collections::HashMap;

use anyhow::Context;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Deserialize;
use tracing::{info, warn};
use worker_common::engine::wearable_asset_request;
use worker_common::model::{AssetType, ContentFile, EntityDefinition};
use worker_common::urn::{emote_pointers, wearable_pointers};

use super::PipelineContext;

#[derive(Deserialize)]
struct ProfileResponse {
    avatars: Vec<ProfileEntry>,
}

#[derive(Deserialize)]
struct ProfileEntry {
    avatar: Avatar,
}

#[derive(Deserialize)]
struct Avatar {
    #[serde(default)]
    wearables: Vec<String>,
    #[serde(default)]
    emotes: Vec<EmoteRef>,
}

#[derive(Deserialize)]
struct EmoteRef {
    urn: String,
}

#[derive(serde::Serialize)]
struct ActiveEntitiesRequest<'a> {
    pointers: &'a [String],
}

pub async fn run(ctx: &PipelineContext, address: &str, content_server: &str) -> anyhow::Result<()> {
    let profile_url = format!("https://peer.decentraland.org/lambdas/profiles/{address}");
    let response = ctx
        .fetcher
        .fetch(&profile_url, worker_common::fetcher::FetchOptions::default())
        .await
        .context("fetching profile")?;
    let profile: ProfileResponse = response.json().await?;

    let Some(entry) = profile.avatars.into_iter().next() else {
        info!("profile {} has no avatars", address);
        return Ok(());
    };

    let wearable_ptrs = wearable_pointers(entry.avatar.wearables.iter().map(|s| s.as_str()));
    let emote_ptrs = emote_pointers(entry.avatar.emotes.iter().map(|e| e.urn.as_str()));

    let mut pointers = wearable_ptrs.clone();
    pointers.extend(emote_ptrs.clone());

    if pointers.is_empty() {
        info!("profile {} has no resolvable wearables/emotes", address);
        return Ok(());
    }

    let entities_url = format!("{}/entities/active", content_server.trim_end_matches('/'));
    let body = serde_json::to_vec(&ActiveEntitiesRequest { pointers: &pointers })?;
    let response = ctx
        .fetcher
        .fetch(
            &entities_url,
            worker_common::fetcher::FetchOptions {
                method: Some(reqwest::Method::POST),
                headers: vec![("content-type".to_owned(), "application/json".to_owned())],
                body: Some(body),
                timeout: None,
            },
        )
        .await
        .context("resolving pointers to entities")?;
    let entities: Vec<EntityDefinition> = response.json().await?;

    let wearable_ptrs: std::collections::HashSet<_> = wearable_ptrs.into_iter().collect();

    let content_base_url = format!("{}/contents/", content_server.trim_end_matches('/'));

    let mut jobs = Vec::new();
    for entity in &entities {
        let entity_type = if entity.pointers.iter().any(|p| wearable_ptrs.contains(p)) {
            AssetType::Wearable
        } else {
            AssetType::Emote
        };
        let content_mapping = entity.content_mapping();
        for gltf in entity.gltf_files() {
            jobs.push((entity_type, gltf.clone(), content_mapping.clone()));
        }
    }

    info!("profile {} resolved {} GLTF jobs", address, jobs.len());

    let limit = ctx.profile_concurrent_limit.max(1);
    for batch in jobs.chunks(limit) {
        let mut futs = FuturesUnordered::new();
        for (entity_type, gltf, content_mapping) in batch {
            futs.push(process_one(
                ctx,
                *entity_type,
                gltf.clone(),
                content_mapping.clone(),
                content_base_url.clone(),
            ));
        }
        while let Some(outcome) = futs.next().await {
            if let Err((hash, e)) = outcome {
                warn!("profile asset {} failed: {}", hash, e);
            }
        }
    }

    Ok(())
}

async fn process_one(
    ctx: &PipelineContext,
    asset_type: AssetType,
    gltf: ContentFile,
    content_mapping: HashMap<String, String>,
    content_base_url: String,
) -> Result<(), (String, anyhow::Error)> {
    let result: anyhow::Result<()> = async {
        let request = wearable_asset_request(asset_type, &content_base_url, &gltf.hash, content_mapping);
        let submission = ctx
            .engine
            .process_assets(Some(&gltf.hash), &[request])
            .await?;
        let status = ctx
            .engine
            .wait_for_completion(&submission.batch_id, ctx.scene_wait_timeout)
            .await?;

        if let Some(zip_path) = status.zip_path {
            let key = format!("{}-mobile.zip", gltf.hash);
            ctx.storage
                .store(&key, &std::path::PathBuf::from(&zip_path))
                .await;
            if let Err(e) = std::fs::remove_file(&zip_path) {
                warn!("failed to remove temp zip {}: {}", zip_path, e);
            }
        }
        Ok(())
    }
    .await;

    result.map_err(|e| (gltf.hash, e))
}

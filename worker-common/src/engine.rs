//! C5: a thin client for the local asset-optimization engine's HTTP API and
//! process lifecycle. Performs no business logic; all sequencing lives in
//! the pipelines.

use std::collections;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::fetcher::{FetchConfig, FetchOptions, Fetcher};
use crate::model::{AssetRequest, BatchStatus};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub base_url: String,
    pub port: u16,
    pub process_name: String,
}

#[derive(Serialize)]
struct ProcessSceneRequest<'a> {
    scene_hash: &'a str,
    content_base_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_hash: Option<&'a str>,
    pack_hashes: &'a [String],
}

#[derive(Deserialize)]
struct ProcessSceneResponse {
    batch_id: String,
    output_hash: String,
    #[serde(default)]
    #[allow(dead_code)]
    scene_hash: String,
    #[serde(default)]
    #[allow(dead_code)]
    total_assets: u32,
    #[serde(default)]
    #[allow(dead_code)]
    pack_assets: u32,
}

#[derive(Serialize)]
struct ProcessAssetsRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    output_hash: Option<&'a str>,
    assets: &'a [AssetRequest],
}

#[derive(Deserialize)]
struct ProcessAssetsResponse {
    batch_id: String,
    output_hash: String,
    #[serde(default)]
    #[allow(dead_code)]
    jobs: Vec<serde_json::Value>,
    #[serde(default)]
    #[allow(dead_code)]
    total: u32,
}

/// The outcome of a submission to `/process` or `/process-scene`.
pub struct SubmittedBatch {
    pub batch_id: String,
    pub output_hash: String,
}

pub struct EngineClient {
    fetcher: Fetcher,
    config: EngineConfig,
}

impl EngineClient {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            fetcher: Fetcher::new(FetchConfig::default()),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// `GET /health`: true iff the response is a 2xx. Any error, including a
    /// connection failure, is treated as "not ready".
    pub async fn is_ready(&self) -> bool {
        match self
            .fetcher
            .fetch(&self.url("/health"), FetchOptions::default())
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// `POST /process-scene`. An empty `pack_hashes` selects metadata-only
    /// mode.
    pub async fn process_scene(
        &self,
        scene_hash: &str,
        content_base_url: &str,
        output_hash: Option<&str>,
        pack_hashes: &[String],
    ) -> Result<SubmittedBatch, EngineError> {
        let body = serde_json::to_vec(&ProcessSceneRequest {
            scene_hash,
            content_base_url,
            output_hash,
            pack_hashes,
        })
        .expect("ProcessSceneRequest is always serializable");

        let response = self
            .fetcher
            .fetch(
                &self.url("/process-scene"),
                FetchOptions {
                    method: Some(reqwest::Method::POST),
                    headers: vec![("content-type".to_owned(), "application/json".to_owned())],
                    body: Some(body),
                    timeout: None,
                },
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EngineError::SubmissionFailed {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ProcessSceneResponse = response.json().await?;
        Ok(SubmittedBatch {
            batch_id: parsed.batch_id,
            output_hash: parsed.output_hash,
        })
    }

    /// `POST /process`.
    pub async fn process_assets(
        &self,
        output_hash: Option<&str>,
        assets: &[AssetRequest],
    ) -> Result<SubmittedBatch, EngineError> {
        let body = serde_json::to_vec(&ProcessAssetsRequest {
            output_hash,
            assets,
        })
        .expect("ProcessAssetsRequest is always serializable");

        let response = self
            .fetcher
            .fetch(
                &self.url("/process"),
                FetchOptions {
                    method: Some(reqwest::Method::POST),
                    headers: vec![("content-type".to_owned(), "application/json".to_owned())],
                    body: Some(body),
                    timeout: None,
                },
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EngineError::SubmissionFailed {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ProcessAssetsResponse = response.json().await?;
        Ok(SubmittedBatch {
            batch_id: parsed.batch_id,
            output_hash: parsed.output_hash,
        })
    }

    /// `GET /status/{batch_id}`.
    pub async fn get_batch_status(&self, batch_id: &str) -> Result<BatchStatus, EngineError> {
        let response = self
            .fetcher
            .fetch(&self.url(&format!("/status/{batch_id}")), FetchOptions::default())
            .await?;

        if !response.status().is_success() {
            return Err(EngineError::SubmissionFailed {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.json().await?)
    }

    /// Poll `getBatchStatus` every 2 seconds until a terminal status is
    /// reached, or raise once `timeout` has elapsed.
    pub async fn wait_for_completion(
        &self,
        batch_id: &str,
        timeout: Duration,
    ) -> Result<BatchStatus, EngineError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let status = self.get_batch_status(batch_id).await?;
            if status.status.is_terminal() {
                if status.status == crate::model::BatchState::Failed {
                    return Err(EngineError::BatchFailed {
                        batch_id: batch_id.to_owned(),
                        message: status.error.clone().unwrap_or_default(),
                    });
                }
                return Ok(status);
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(EngineError::WaitTimeout {
                    batch_id: batch_id.to_owned(),
                });
            }

            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }

    /// Kill the engine process (matched by `process_name`), wait briefly,
    /// re-spawn it detached, and poll `is_ready` until it comes up or 60
    /// seconds elapse. Only the dispatcher should call this, and only
    /// between jobs.
    pub async fn restart(&self) -> Result<(), EngineError> {
        info!("restarting engine process {}", self.config.process_name);

        let _ = Command::new("pkill")
            .arg("-f")
            .arg(&self.config.process_name)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        tokio::time::sleep(Duration::from_secs(2)).await;

        match Command::new(&self.config.process_name)
            .arg("--headless")
            .arg("--asset-server")
            .arg("--asset-server-port")
            .arg(self.config.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => {
                // Detach: we don't wait on the child, the engine outlives
                // this call and is torn down again by a future restart.
                std::mem::drop(child);
            }
            Err(e) => warn!("failed to spawn engine process: {}", e),
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
        while tokio::time::Instant::now() < deadline {
            if self.is_ready().await {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        Err(EngineError::RestartTimeout)
    }
}

/// Build an [`AssetRequest`] for a single wearable/emote GLTF.
pub fn wearable_asset_request(
    asset_type: crate::model::AssetType,
    content_base_url: &str,
    gltf_hash: &str,
    content_mapping: collections::HashMap<String, String>,
) -> AssetRequest {
    AssetRequest {
        url: format!("{content_base_url}{gltf_hash}"),
        asset_type,
        hash: gltf_hash.to_owned(),
        base_url: content_base_url.to_owned(),
        content_mapping,
    }
}

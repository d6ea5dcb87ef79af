//! Wire types shared by the queue, the engine client, and the pipelines.

use std::collections;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of entity a deployment job targets. Defaults to `Scene` to match
/// the producer, which historically only ever enqueued scenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Scene,
    Wearable,
    Emote,
}

impl Default for EntityType {
    fn default() -> Self {
        EntityType::Scene
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EntityType::Scene => write!(f, "scene"),
            EntityType::Wearable => write!(f, "wearable"),
            EntityType::Emote => write!(f, "emote"),
        }
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scene" => Ok(EntityType::Scene),
            "wearable" => Ok(EntityType::Wearable),
            "emote" => Ok(EntityType::Emote),
            other => Err(format!("unknown entity type: {other}")),
        }
    }
}

/// Attachment the profile expansion pipeline stashes onto a job so the
/// wearable/emote pipeline can skip the content-server fetch entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileData {
    pub gltf_hash: String,
    pub gltf_file: String,
    pub content_mapping: collections::HashMap<String, String>,
    pub content_base_url: String,
}

/// A deployment job as it is published onto (and read back off) a queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "entityId")]
    pub entity_id: String,
    #[serde(rename = "entityType", default)]
    pub entity_type: EntityType,
    #[serde(rename = "contentServerUrls")]
    pub content_server_urls: Vec<String>,
    #[serde(rename = "_profileData", skip_serializing_if = "Option::is_none", default)]
    pub profile_data: Option<ProfileData>,
}

impl Job {
    /// The base URL of the content server this job should fetch from, which
    /// is always the first entry of `contentServerUrls`.
    pub fn content_server(&self) -> Option<&str> {
        self.content_server_urls.first().map(|s| s.as_str())
    }
}

/// The envelope a notification-over-queue producer wraps jobs in:
/// `{"Message": "<json-escaped Job>"}`. We must be able to decode both this
/// and a bare `Job` for robustness against producer variations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    #[serde(rename = "Message")]
    pub message: String,
}

/// Decode a queue body that may either be a bare `Job` or a `MessageEnvelope`
/// wrapping one.
pub fn decode_job(body: &str) -> Result<Job, serde_json::Error> {
    if let Ok(envelope) = serde_json::from_str::<MessageEnvelope>(body) {
        return serde_json::from_str(&envelope.message);
    }
    serde_json::from_str(body)
}

/// Encode a `Job` the same way the producer does, wrapped in a
/// `MessageEnvelope`.
pub fn encode_job(job: &Job) -> Result<String, serde_json::Error> {
    let message = serde_json::to_string(job)?;
    serde_json::to_string(&MessageEnvelope { message })
}

/// A queue delivery handle: the opaque receipt required to ack (delete) the
/// delivery, plus enough context to route it through the dispatcher.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub id: String,
    pub is_priority: bool,
    pub receipt: String,
    pub source_queue: String,
}

/// One file entry of an entity's content mapping, as returned by the content
/// server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentFile {
    pub file: String,
    pub hash: String,
}

/// An entity definition as served by the content server's
/// `/contents/{id}` and `/entities/active` endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub id: String,
    #[serde(default)]
    pub pointers: Vec<String>,
    pub content: Vec<ContentFile>,
}

impl EntityDefinition {
    /// Every GLTF/GLB file entry in this entity's content mapping.
    pub fn gltf_files(&self) -> Vec<&ContentFile> {
        self.content
            .iter()
            .filter(|f| {
                let lower = f.file.to_ascii_lowercase();
                lower.ends_with(".glb") || lower.ends_with(".gltf")
            })
            .collect()
    }

    /// The `{file -> hash}` content mapping expected by the engine.
    pub fn content_mapping(&self) -> collections::HashMap<String, String> {
        self.content
            .iter()
            .map(|f| (f.file.clone(), f.hash.clone()))
            .collect()
    }
}

/// The kind of asset the engine is being asked to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Scene,
    Wearable,
    Emote,
    Texture,
}

impl From<EntityType> for AssetType {
    fn from(value: EntityType) -> Self {
        match value {
            EntityType::Scene => AssetType::Scene,
            EntityType::Wearable => AssetType::Wearable,
            EntityType::Emote => AssetType::Emote,
        }
    }
}

/// An individual asset optimization request, as submitted to the engine's
/// `/process` and `/process-scene` endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRequest {
    pub url: String,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    pub hash: String,
    pub base_url: String,
    pub content_mapping: collections::HashMap<String, String>,
}

/// Terminal and non-terminal states of an optimization batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    Processing,
    Packing,
    Completed,
    Failed,
}

impl BatchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchState::Completed | BatchState::Failed)
    }
}

/// Per-asset job status nested inside a `BatchStatus`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetJobStatus {
    pub id: String,
    pub status: BatchState,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

/// The engine's response to `/status/{batch_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatus {
    pub batch_id: String,
    pub output_hash: String,
    pub status: BatchState,
    #[serde(default)]
    pub progress: f32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub zip_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    #[serde(default)]
    pub jobs: Vec<AssetJobStatus>,
}

/// Produced by the engine's metadata-only pass (empty `pack_hashes`):
/// the set of assets the scene references and their cross-scene dependency
/// graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneMetadata {
    #[serde(default)]
    pub optimized_content: Vec<String>,
    #[serde(default)]
    pub external_scene_dependencies: collections::HashMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub original_sizes: Option<collections::HashMap<String, u64>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub hash_size_map: Option<collections::HashMap<String, u64>>,
}

/// Asset counts tracked for a `ProcessReport`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndividualAssetCounts {
    pub total: u32,
    pub successful: u32,
    pub failed: u32,
}

/// The final outcome of a pipeline invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub zip_keys: Vec<String>,
}

/// The per-job record the worker persists to storage at `{entityId}-report.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessReport {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub content_server: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub individual_assets: IndividualAssetCounts,
    pub result: PipelineResult,
}

impl ProcessReport {
    pub fn new(entity_id: String, entity_type: EntityType, content_server: String) -> Self {
        Self {
            entity_id,
            entity_type,
            content_server,
            started_at: Utc::now(),
            finished_at: None,
            errors: Vec::new(),
            individual_assets: IndividualAssetCounts::default(),
            result: PipelineResult::default(),
        }
    }

    pub fn storage_key(&self) -> String {
        format!("{}-report.json", self.entity_id)
    }

    pub fn finish(&mut self, success: bool) {
        self.finished_at = Some(Utc::now());
        self.result.success = success;
    }

    pub fn push_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_job_handles_envelope_and_bare_forms() {
        let job = Job {
            entity_id: "bafy123".to_owned(),
            entity_type: EntityType::Scene,
            content_server_urls: vec!["https://peer.example.com/content".to_owned()],
            profile_data: None,
        };
        let bare = serde_json::to_string(&job).unwrap();
        let enveloped = encode_job(&job).unwrap();

        let from_bare = decode_job(&bare).unwrap();
        let from_envelope = decode_job(&enveloped).unwrap();

        assert_eq!(from_bare.entity_id, job.entity_id);
        assert_eq!(from_envelope.entity_id, job.entity_id);
    }

    #[test]
    fn entity_type_defaults_to_scene() {
        let raw = r#"{"entityId": "x", "contentServerUrls": []}"#;
        let job: Job = serde_json::from_str(raw).unwrap();
        assert_eq!(job.entity_type, EntityType::Scene);
    }

    #[test]
    fn gltf_files_filters_by_extension() {
        let entity = EntityDefinition {
            id: "e1".to_owned(),
            pointers: vec![],
            content: vec![
                ContentFile {
                    file: "model.glb".to_owned(),
                    hash: "h1".to_owned(),
                },
                ContentFile {
                    file: "texture.png".to_owned(),
                    hash: "h2".to_owned(),
                },
                ContentFile {
                    file: "rig.GLTF".to_owned(),
                    hash: "h3".to_owned(),
                },
            ],
        };
        let gltfs = entity.gltf_files();
        assert_eq!(gltfs.len(), 2);
    }
}

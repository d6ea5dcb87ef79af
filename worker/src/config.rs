use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

/// Millisecond duration parsed from an env var, as the teacher's workers do.
#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;
        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

/// `PROCESS_METHOD`: selects which pipeline the dispatcher routes jobs to.
/// Only `godot_optimizer` is a mandatory route in this core; the others are
/// accepted but otherwise inert placeholders for sibling deployment modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessMethod {
    Log,
    GodotMinimap,
    GodotOptimizer,
    GenerateCrdt,
    GenerateImposters,
}

impl FromStr for ProcessMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "log" => Ok(ProcessMethod::Log),
            "godot_minimap" => Ok(ProcessMethod::GodotMinimap),
            "godot_optimizer" => Ok(ProcessMethod::GodotOptimizer),
            "generate_crdt" => Ok(ProcessMethod::GenerateCrdt),
            "generate_imposters" => Ok(ProcessMethod::GenerateImposters),
            other => Err(format!("unknown PROCESS_METHOD: {other}")),
        }
    }
}

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3301")]
    pub port: u16,

    #[envconfig(from = "PROCESS_METHOD", default = "godot_optimizer")]
    pub process_method: String,

    #[envconfig(from = "TASK_QUEUE")]
    pub task_queue: Option<String>,

    #[envconfig(from = "PRIORITY_TASK_QUEUE")]
    pub priority_task_queue: Option<String>,

    #[envconfig(from = "WEARABLE_TASK_QUEUE")]
    pub wearable_task_queue: Option<String>,

    #[envconfig(from = "EMOTE_TASK_QUEUE")]
    pub emote_task_queue: Option<String>,

    #[envconfig(from = "AWS_ENDPOINT")]
    pub aws_endpoint: Option<String>,

    #[envconfig(from = "AWS_REGION", default = "us-east-1")]
    pub aws_region: String,

    #[envconfig(from = "BUCKET")]
    pub bucket: Option<String>,

    #[envconfig(from = "S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    #[envconfig(from = "S3_PREFIX")]
    pub s3_prefix: Option<String>,

    #[envconfig(from = "S3_ACCESS_KEY_ID")]
    pub s3_access_key_id: Option<String>,

    #[envconfig(from = "S3_SECRET_ACCESS_KEY")]
    pub s3_secret_access_key: Option<String>,

    #[envconfig(from = "LOCAL_STORAGE_DIR", default = "./storage")]
    pub local_storage_dir: String,

    #[envconfig(from = "SNS_ARN")]
    pub sns_arn: Option<String>,

    #[envconfig(from = "SNS_ENDPOINT")]
    pub sns_endpoint: Option<String>,

    #[envconfig(from = "ASSET_SERVER_URL", default = "http://localhost:8080")]
    pub asset_server_url: String,

    #[envconfig(from = "ASSET_SERVER_PORT", default = "8080")]
    pub asset_server_port: u16,

    #[envconfig(from = "ASSET_SERVER_PROCESS_NAME", default = "godot")]
    pub asset_server_process_name: String,

    #[envconfig(from = "ASSET_SERVER_TIMEOUT_MS", default = "600000")]
    pub asset_server_timeout_ms: EnvMsDuration,

    #[envconfig(from = "ASSET_SERVER_CONCURRENT_BUNDLES", default = "4")]
    pub asset_server_concurrent_bundles: usize,

    #[envconfig(from = "PROFILE_CONCURRENT_LIMIT", default = "16")]
    pub profile_concurrent_limit: usize,

    #[envconfig(from = "MAX_GLTF_COUNT", default = "200")]
    pub max_gltf_count: usize,

    #[envconfig(from = "MAX_CONTENT_SIZE_BYTES", default = "1073741824")]
    pub max_content_size_bytes: u64,

    #[envconfig(from = "FETCH_MAX_RETRIES", default = "3")]
    pub fetch_max_retries: u32,

    #[envconfig(from = "FETCH_INITIAL_DELAY_MS", default = "1000")]
    pub fetch_initial_delay_ms: EnvMsDuration,

    #[envconfig(from = "FETCH_MAX_DELAY_MS", default = "30000")]
    pub fetch_max_delay_ms: EnvMsDuration,

    #[envconfig(from = "FETCH_TIMEOUT_MS", default = "60000")]
    pub fetch_timeout_ms: EnvMsDuration,

    #[envconfig(from = "FETCH_BACKOFF_MULTIPLIER", default = "2")]
    pub fetch_backoff_multiplier: u32,

    #[envconfig(from = "MONITORING_URL")]
    pub monitoring_url: Option<String>,

    #[envconfig(from = "MONITORING_SECRET")]
    pub monitoring_secret: Option<String>,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn process_method(&self) -> Result<ProcessMethod, String> {
        ProcessMethod::from_str(&self.process_method)
    }

    pub fn fetch_config(&self) -> worker_common::fetcher::FetchConfig {
        worker_common::fetcher::FetchConfig {
            max_retries: self.fetch_max_retries,
            initial_delay: self.fetch_initial_delay_ms.0,
            max_delay: self.fetch_max_delay_ms.0,
            request_timeout: self.fetch_timeout_ms.0,
            backoff_multiplier: self.fetch_backoff_multiplier,
        }
    }
}

use thiserror::Error;

/// Errors surfaced by the retrying fetcher once its retry budget is
/// exhausted (or a non-retryable failure is hit on the first attempt).
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("network error calling {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned non-retryable status {status}")]
    Status { url: String, status: u16 },
    #[error("failed to build request for {url}: {source}")]
    Build {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Errors raised by the storage abstraction (C2).
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to read source file {path}: {source}")]
    SourceRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("upload of {key} failed: {message}")]
    UploadFailed { key: String, message: String },
    #[error("{failed} of {total} files in the batch failed permanently")]
    BatchFailed { failed: usize, total: usize },
}

/// Errors raised by the engine client (C5).
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine submission failed with status {status}: {message}")]
    SubmissionFailed { status: u16, message: String },
    #[error("engine batch {batch_id} failed: {message}")]
    BatchFailed { batch_id: String, message: String },
    #[error("timed out waiting for batch {batch_id} to complete")]
    WaitTimeout { batch_id: String },
    #[error("engine request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("engine fetch error: {0}")]
    Fetch(#[from] FetchError),
    #[error("engine restart did not become healthy within the deadline")]
    RestartTimeout,
}

impl EngineError {
    /// True when the submission failure matches the engine's
    /// "no processable assets" contract, which the scene pipeline treats as
    /// a successful, empty result rather than a failure.
    pub fn is_empty_scene(&self) -> bool {
        match self {
            EngineError::SubmissionFailed { status, message } => {
                *status == 400 || message.contains("No processable assets")
            }
            _ => false,
        }
    }
}

/// Errors raised by the queue port (C6). SQS failures are flattened to their
/// display string rather than threading `aws_sdk_sqs::Error` through, since
/// every caller here only logs or propagates them.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("failed to receive from queue {queue}: {message}")]
    Receive { queue: String, message: String },
    #[error("failed to publish to queue {queue}: {message}")]
    Publish { queue: String, message: String },
    #[error("failed to ack message on queue {queue}: {message}")]
    Ack { queue: String, message: String },
    #[error("failed to decode job payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("in-memory queue channel is closed")]
    ChannelClosed,
    #[error("no queue configured for entity type {0}")]
    NoQueueConfigured(String),
}

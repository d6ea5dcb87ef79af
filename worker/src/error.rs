use thiserror::Error;

/// Top-level errors that abort the worker process entirely: anything a
/// pipeline can recover from is instead folded into a `ProcessReport` and
/// never reaches here.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("invalid PROCESS_METHOD: {0}")]
    UnknownProcessMethod(String),
}

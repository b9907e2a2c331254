use std::time::Duration;

use milky_index::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no uploaded file with id {0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("upload failed: {0:#}")]
    UploadFailed(anyhow::Error),
    #[error("indexing did not complete within {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("{0:#}")]
    GenerationFailed(anyhow::Error),
    /// Never returned by the pipelines; built only so the failure is logged
    /// with a consistent message.
    #[error("failed to delete remote document {document}: {cause:#}")]
    RemoteCleanupFailed {
        document: String,
        cause: anyhow::Error,
    },
    #[error("record store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

use thiserror::Error;

use super::target::TargetError;
use crate::error::ComposeError;
use crate::job::JobStoreError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Triage was cancelled")]
    Cancelled,

    #[error("Invalid target: {0}")]
    Target(#[from] TargetError),

    #[error("Grid composition failed: {0}")]
    Compose(#[from] ComposeError),

    #[error("Failed to record progress: {0}")]
    Store(JobStoreError),
}

impl From<JobStoreError> for PipelineError {
    fn from(e: JobStoreError) -> Self {
        // a write bounced off a cancelled job
        if e.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Store(e)
        }
    }
}

use std::sync::Arc;

use crate::job::{JobPhase, JobStatus, JobStore, JobStoreError, SelectionFlag};
use crate::photo::PhotoId;

/// Events emitted by the pipeline while it runs.
#[derive(Debug)]
pub enum ProgressEvent<'a> {
    Phase(JobPhase),
    /// Emitted after planning and after every grid.
    Steps {
        current_step: u64,
        total_steps: u64,
        api_calls: u64,
    },
    /// Photos picked by one grid.
    Selected {
        flag: SelectionFlag,
        photo_ids: &'a [PhotoId],
    },
    CoarseSurvivors(u64),
}

/// Sink for pipeline progress, also polled for cancellation between grids.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent<'_>) -> Result<(), JobStoreError>;

    fn is_cancelled(&self) -> bool;
}

/// Ignores everything. For runs without a backing job.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent<'_>) -> Result<(), JobStoreError> {
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Writes progress through to a job in the job store.
pub struct StoreProgress {
    store: Arc<dyn JobStore>,
    job_id: String,
}

impl StoreProgress {
    pub fn new(store: Arc<dyn JobStore>, job_id: impl Into<String>) -> Self {
        Self {
            store,
            job_id: job_id.into(),
        }
    }
}

impl ProgressReporter for StoreProgress {
    fn report(&self, event: ProgressEvent<'_>) -> Result<(), JobStoreError> {
        match event {
            ProgressEvent::Phase(phase) => self.store.set_phase(&self.job_id, phase),
            ProgressEvent::Steps {
                current_step,
                total_steps,
                api_calls,
            } => self
                .store
                .set_progress(&self.job_id, current_step, total_steps, api_calls),
            ProgressEvent::Selected { flag, photo_ids } => self
                .store
                .mark_selected(&self.job_id, flag, photo_ids)
                .map(|_| ()),
            ProgressEvent::CoarseSurvivors(n) => {
                self.store.record_coarse_survivors(&self.job_id, n)
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        match self.store.get_job(&self.job_id) {
            Ok(job) => job.status == JobStatus::Cancelled,
            Err(e) => {
                tracing::warn!(job_id = %self.job_id, "Cancellation check failed: {}", e);
                false
            }
        }
    }
}

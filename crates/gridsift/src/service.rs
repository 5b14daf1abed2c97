//! Job control surface: start, observe, fetch results of and cancel triage
//! jobs.
//!
//! Each started job runs as its own tokio task. Credits are reserved before
//! the job exists and refunded in full, at most once per job, when the run
//! fails.

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

use crate::billing::{credit_cost, BillingError, CreditLedger, SqliteCreditLedger};
use crate::config::Config;
use crate::db::Database;
use crate::error::ConfigError;
use crate::gateway::HttpVisionGateway;
use crate::job::{
    JobPhase, JobProgressBroadcaster, JobStatus, JobStore, JobStoreError, NewJob, SqliteJobStore,
    TriageJob, TriageProgressEvent,
};
use crate::photo::{dedup_by_hash, Photo, PhotoId};
use crate::pipeline::{
    parse_target, PipelineConfig, PipelineError, StoreProgress, TargetError, TriagePipeline,
    TriageRequest,
};
use crate::sanitize::redact_ref;
use crate::storage::{FileObjectStore, ObjectStore};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid target: {0}")]
    Target(#[from] TargetError),

    #[error(transparent)]
    Billing(#[from] BillingError),

    #[error(transparent)]
    Store(#[from] JobStoreError),
}

/// A triage submission.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub user_id: String,
    pub photos: Vec<Photo>,
    pub target: String,
    pub criteria: String,
    pub passes: u8,
}

/// Status snapshot handed to API callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,
    pub phase: JobPhase,
    pub progress_pct: f64,
    pub total_input: u64,
    pub pass1_survivors: u64,
    pub final_selected: u64,
    pub api_calls: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&TriageJob> for JobStatusView {
    fn from(job: &TriageJob) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            phase: job.phase,
            progress_pct: job.progress_pct(),
            total_input: job.total_input,
            pass1_survivors: job.pass1_survivors,
            final_selected: job.final_selected,
            api_calls: job.api_calls,
            error: job.error_message.clone(),
        }
    }
}

/// A started job. Dropping the handle does not stop the job.
pub struct JobHandle {
    job_id: String,
    task: JoinHandle<()>,
}

impl JobHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Waits for the background task to finish.
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            error!(job_id = %self.job_id, "Triage task ended abnormally: {}", e);
        }
    }
}

/// Shared pieces a job task needs.
#[derive(Clone)]
struct JobRunner {
    pipeline: Arc<TriagePipeline>,
    jobs: Arc<dyn JobStore>,
    ledger: Arc<dyn CreditLedger>,
}

impl JobRunner {
    async fn run(self, job: TriageJob, photos: Vec<Photo>, request: TriageRequest) {
        if let Err(e) = self.jobs.claim(&job.id) {
            if e.is_cancelled() {
                info!("Job cancelled before it started");
            } else {
                error!("Failed to claim job: {}", e);
                self.fail_and_refund(&job, &e.to_string());
            }
            return;
        }
        info!(job_target = %request.target, passes = request.passes, "Triage started");

        let progress = StoreProgress::new(Arc::clone(&self.jobs), job.id.clone());
        let result = AssertUnwindSafe(self.pipeline.run(&photos, &request, &progress))
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(outcome)) => match self.jobs.complete(&job.id, &outcome.completion()) {
                Ok(()) => info!(
                    selected = outcome.final_selection.len(),
                    coarse_survivors = outcome.coarse_survivors.len(),
                    api_calls = outcome.api_calls,
                    "Triage completed"
                ),
                Err(e) if e.is_cancelled() => info!("Job cancelled before completion"),
                Err(e) => self.fail_and_refund(&job, &e.to_string()),
            },
            Ok(Err(PipelineError::Cancelled)) => info!("Triage stopped after cancellation"),
            Ok(Err(e)) => self.fail_and_refund(&job, &e.to_string()),
            Err(panic) => {
                let message = format!("internal error: {}", panic_message(panic.as_ref()));
                self.fail_and_refund(&job, &message);
            }
        }
    }

    /// Marks the job failed and returns its credits. A job that was cancelled
    /// or completed keeps its state and gets no refund. When the status write
    /// itself fails the credits are still returned.
    fn fail_and_refund(&self, job: &TriageJob, message: &str) {
        match self.jobs.fail(&job.id, message) {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {
                info!("Job was cancelled, not marking failed");
                return;
            }
            Err(JobStoreError::InvalidTransition {
                from: JobStatus::Completed,
                ..
            }) => {
                info!("Job already completed, not marking failed");
                return;
            }
            Err(e) => error!("Could not mark job failed ({}): {}", message, e),
        }
        self.refund(job);
    }

    fn refund(&self, job: &TriageJob) {
        if let Err(e) = self
            .ledger
            .refund_job(&job.id, &job.user_id, job.credits_reserved)
        {
            error!(
                credits = job.credits_reserved,
                "Refund after failure did not go through: {}", e
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "triage task panicked"
    }
}

pub struct TriageService {
    runner: JobRunner,
    objects: Arc<dyn ObjectStore>,
    progress: Option<JobProgressBroadcaster>,
}

impl TriageService {
    pub fn new(
        pipeline: Arc<TriagePipeline>,
        jobs: Arc<dyn JobStore>,
        ledger: Arc<dyn CreditLedger>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            runner: JobRunner {
                pipeline,
                jobs,
                ledger,
            },
            objects,
            progress: None,
        }
    }

    /// Wires the SQLite stores, filesystem object store and HTTP gateway
    /// described by `config`.
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let db_path = config.database_path().ok_or_else(|| ConfigError::Validation {
            message: "database_path is not set and no home directory was found".to_string(),
        })?;
        let storage_root = config.storage_root().ok_or_else(|| ConfigError::Validation {
            message: "storage_root is not set and no home directory was found".to_string(),
        })?;

        let db = Database::open(&db_path)?;
        let broadcaster = JobProgressBroadcaster::default();
        let jobs = SqliteJobStore::new(db.clone()).with_broadcaster(broadcaster.clone());
        let ledger = SqliteCreditLedger::new(db);
        let objects: Arc<dyn ObjectStore> = Arc::new(FileObjectStore::new(storage_root));
        let gateway = HttpVisionGateway::new(config.gateway.to_http_config()?)?;

        let pipeline = TriagePipeline::new(
            PipelineConfig::from_config(config),
            Arc::clone(&objects),
            Arc::new(gateway),
            config.models.clone(),
        );

        let mut service = Self::new(
            Arc::new(pipeline),
            Arc::new(jobs),
            Arc::new(ledger),
            objects,
        );
        service.progress = Some(broadcaster);
        Ok(service)
    }

    /// Live progress events, when the store publishes them.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<TriageProgressEvent>> {
        self.progress.as_ref().map(|b| b.subscribe())
    }

    /// Validates the request, reserves credits, records the job and starts
    /// it in the background. Nothing is created when validation or the
    /// reservation fails.
    pub fn start(&self, request: StartRequest) -> Result<JobHandle, ServiceError> {
        let StartRequest {
            user_id,
            photos,
            target,
            criteria,
            passes,
        } = request;

        if user_id.trim().is_empty() {
            return Err(ServiceError::InvalidRequest("user id is empty".to_string()));
        }
        if !(1..=2).contains(&passes) {
            return Err(ServiceError::InvalidRequest(format!(
                "passes must be 1 or 2, got {}",
                passes
            )));
        }
        let mut seen = HashSet::with_capacity(photos.len());
        if let Some(dup) = photos.iter().find(|p| !seen.insert(&p.id)) {
            return Err(ServiceError::InvalidRequest(format!(
                "photo id '{}' submitted twice",
                dup.id
            )));
        }

        let submitted = photos.len();
        let photos = dedup_by_hash(photos);
        if photos.len() < submitted {
            info!(
                dropped = submitted - photos.len(),
                "Dropped duplicate photos by content hash"
            );
        }
        parse_target(&target, photos.len())?;

        let cost = credit_cost(photos.len());
        self.runner.ledger.reserve(&user_id, cost)?;

        let new_job = NewJob {
            user_id: user_id.clone(),
            target: target.clone(),
            criteria: criteria.clone(),
            passes,
            total_input: photos.len() as u64,
            credits_reserved: cost,
        };
        let job = match self.create_job(new_job, &photos) {
            Ok(job) => job,
            Err(e) => {
                if let Err(refund_err) = self.runner.ledger.refund(&user_id, cost) {
                    error!("Refund after failed job creation did not go through: {}", refund_err);
                }
                return Err(e);
            }
        };

        let span = info_span!(
            "triage",
            job_id = %job.id,
            user_id = %job.user_id,
            photos = photos.len()
        );
        let job_id = job.id.clone();
        let triage = TriageRequest {
            target,
            criteria,
            passes,
        };
        let task = tokio::spawn(self.runner.clone().run(job, photos, triage).instrument(span));

        Ok(JobHandle { job_id, task })
    }

    fn create_job(&self, new_job: NewJob, photos: &[Photo]) -> Result<TriageJob, ServiceError> {
        let jobs = &self.runner.jobs;
        let job = jobs.create_job(new_job)?;
        if let Err(e) = jobs.attach_photos(&job.id, photos) {
            // leave no pending job behind that could never run
            if let Err(fail_err) = jobs.fail(&job.id, &e.to_string()) {
                warn!(job_id = %job.id, "Could not mark job failed: {}", fail_err);
            }
            return Err(e.into());
        }
        Ok(job)
    }

    pub fn status(&self, job_id: &str) -> Result<JobStatusView, ServiceError> {
        let job = self.runner.jobs.get_job(job_id)?;
        Ok(JobStatusView::from(&job))
    }

    /// Final selection in submission order. Empty unless the job completed.
    pub fn results(&self, job_id: &str) -> Result<Vec<PhotoId>, ServiceError> {
        let job = self.runner.jobs.get_job(job_id)?;
        if job.status != JobStatus::Completed {
            return Ok(Vec::new());
        }
        let photos = self.runner.jobs.photos(job_id, true)?;
        Ok(photos.into_iter().map(|p| p.photo.id).collect())
    }

    /// Cancels a pending or processing job and removes its photos. A grid
    /// already being evaluated finishes, but its results are discarded.
    pub async fn cancel(&self, job_id: &str) -> Result<(), ServiceError> {
        let jobs = &self.runner.jobs;
        jobs.cancel(job_id)?;

        let photos = jobs.photos(job_id, false)?;
        let mut removed = 0usize;
        for photo in &photos {
            match self.objects.delete(&photo.photo.storage_ref).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    job_id,
                    storage_ref = %redact_ref(&photo.photo.storage_ref),
                    "Could not delete photo: {}",
                    e
                ),
            }
        }
        let records = jobs.delete_photos(job_id)?;
        info!(job_id, objects = removed, records, "Cancelled job cleaned up");
        Ok(())
    }

    /// Pending and processing jobs of a user, newest first.
    pub fn active_jobs(&self, user_id: &str) -> Result<Vec<JobStatusView>, ServiceError> {
        let jobs = self.runner.jobs.active_jobs_for_user(user_id)?;
        Ok(jobs.iter().map(JobStatusView::from).collect())
    }
}
